//! Newtypes that make the `package_number` vs `tracking_number` confusion the
//! source code permits structurally impossible (SPEC_FULL.md §9).

use std::fmt;

/// A carrier-assigned tracking identifier. Never constructed from a
/// [`PackageNumber`] — there is no `From<PackageNumber> for TrackingNumber`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TrackingNumber(pub String);

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A marketplace package identifier, e.g. `package_number` in
/// `get_order_detail`. This is *not* a tracking number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PackageNumber(pub String);

impl fmt::Display for PackageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_and_package_numbers_are_distinct_types() {
        let tracking = TrackingNumber("TN9".to_string());
        let package = PackageNumber("TN9".to_string());
        // Same underlying string, but the compiler will not let a
        // PackageNumber stand in anywhere a TrackingNumber is expected.
        assert_eq!(tracking.0, package.0);
    }
}
