//! HMAC-SHA256 request signing for Shopee Open API v2.
//!
//! Every authenticated endpoint is signed over the concatenation
//! `partner_id || path || timestamp || access_token || shop_id`, keyed by the
//! partner secret. Optional components that are absent contribute no bytes —
//! never the literal string `"null"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Inputs to a single signature computation.
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    pub partner_id: i64,
    pub path: &'a str,
    pub timestamp: i64,
    pub access_token: Option<&'a str>,
    pub shop_id: Option<i64>,
}

/// Compute the hex-lowercase HMAC-SHA256 signature for a request.
///
/// # Example
/// ```
/// use shopee_order_sync::signer::{sign, SignRequest};
///
/// let sig = sign(
///     "partner-key",
///     SignRequest {
///         partner_id: 123,
///         path: "/api/v2/order/get_order_list",
///         timestamp: 1_700_000_000,
///         access_token: Some("tok"),
///         shop_id: Some(456),
///     },
/// );
/// assert_eq!(sig.len(), 64);
/// ```
pub fn sign(partner_key: &str, req: SignRequest<'_>) -> String {
    let mut base = String::with_capacity(128);
    base.push_str(&req.partner_id.to_string());
    base.push_str(req.path);
    base.push_str(&req.timestamp.to_string());
    if let Some(token) = req.access_token {
        base.push_str(token);
    }
    if let Some(shop_id) = req.shop_id {
        base.push_str(&shop_id.to_string());
    }

    let mut mac =
        HmacSha256::new_from_slice(partner_key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
