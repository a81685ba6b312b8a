//! Signed, rate-limited client for the Shopee Open API v2.

pub mod transport;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::constants;
use crate::signer::{sign, SignRequest};
use transport::{Method, RawRequest, Transport, TransportError};
use types::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("marketplace error {code}: {message}")]
    Marketplace { code: String, message: String },
    #[error("response was missing expected field: {0}")]
    MissingField(&'static str),
    #[error("http status {0}")]
    HttpStatus(u16),
}

impl ApiError {
    /// Marketplace error codes this client treats as non-retriable within a
    /// shop cycle (authentication failures): retrying them burns the retry
    /// budget without any chance of success.
    pub fn is_fatal_for_shop(&self) -> bool {
        matches!(self, ApiError::Marketplace { code, .. } if code.starts_with("error_auth"))
    }
}

pub const PRODUCTION_BASE_URL: &str = "https://partner.shopeemobile.com";
pub const SANDBOX_BASE_URL: &str = "https://partner.test-stable.shopeemobile.com";

/// Parameters common to every authenticated call.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext<'a> {
    pub access_token: Option<&'a str>,
    pub shop_id: Option<i64>,
}

pub struct ShopeeClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    partner_id: i64,
    partner_key: String,
}

impl ShopeeClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>, partner_id: i64, partner_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            partner_id,
            partner_key: partner_key.into(),
        }
    }

    pub fn base_url_for(is_sandbox: bool) -> &'static str {
        if is_sandbox {
            SANDBOX_BASE_URL
        } else {
            PRODUCTION_BASE_URL
        }
    }

    /// Clone this client's transport and partner credentials onto a
    /// different base URL. Used to pick sandbox vs. production per shop
    /// without standing up a second `reqwest::Client`.
    pub fn with_base_url(&self, base_url: &'static str) -> Self {
        Self {
            transport: self.transport.clone(),
            base_url: base_url.to_string(),
            partner_id: self.partner_id,
            partner_key: self.partner_key.clone(),
        }
    }

    fn full_path(path: &str) -> String {
        if path.starts_with("/api/v2") {
            path.to_string()
        } else {
            format!("/api/v2{path}")
        }
    }

    /// Issue a signed request and decode the marketplace envelope.
    ///
    /// `query` carries caller-supplied parameters for GET requests; `body`
    /// carries the JSON payload for POST requests. Both are merged with the
    /// mandatory `partner_id`/`timestamp`/`sign`/`access_token`/`shop_id`
    /// parameters, which always live in the query string regardless of verb.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        auth: AuthContext<'_>,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let full_path = Self::full_path(path);
        let timestamp = Utc::now().timestamp();
        let signature = sign(
            &self.partner_key,
            SignRequest {
                partner_id: self.partner_id,
                path: &full_path,
                timestamp,
                access_token: auth.access_token,
                shop_id: auth.shop_id,
            },
        );

        let mut url = format!("{}{}?partner_id={}&timestamp={}&sign={}", self.base_url, full_path, self.partner_id, timestamp, signature);
        if let Some(token) = auth.access_token {
            url.push_str(&format!("&access_token={token}"));
        }
        if let Some(shop_id) = auth.shop_id {
            url.push_str(&format!("&shop_id={shop_id}"));
        }
        for (key, value) in query {
            url.push_str(&format!("&{key}={}", urlencode(value)));
        }

        let request = RawRequest { method, url, body, timeout };
        let response = self.transport.send(request).await?;
        if !(200..300).contains(&response.status) {
            return Err(ApiError::HttpStatus(response.status));
        }
        let envelope: Envelope<T> = serde_json::from_value(response.body)
            .map_err(|_| ApiError::MissingField("response"))?;

        if envelope.is_error() {
            return Err(ApiError::Marketplace { code: envelope.error, message: envelope.message });
        }
        envelope.response.ok_or(ApiError::MissingField("response"))
    }

    pub async fn get_access_token(&self, code: &str, shop_id: i64) -> Result<types::TokenResponse, ApiError> {
        let body = serde_json::json!({ "code": code, "partner_id": self.partner_id, "shop_id": shop_id });
        self.call(
            Method::Post,
            "/auth/token/get",
            AuthContext { access_token: None, shop_id: None },
            &[],
            Some(body),
            constants::HTTP_REQUEST_TIMEOUT,
        )
        .await
    }

    pub async fn refresh_access_token(&self, refresh_token: &str, shop_id: i64) -> Result<types::TokenResponse, ApiError> {
        let body = serde_json::json!({ "refresh_token": refresh_token, "partner_id": self.partner_id, "shop_id": shop_id });
        self.call(
            Method::Post,
            "/auth/access_token/get",
            AuthContext { access_token: None, shop_id: Some(shop_id) },
            &[],
            Some(body),
            constants::HTTP_REQUEST_TIMEOUT,
        )
        .await
    }

    pub async fn get_order_list(
        &self,
        auth: AuthContext<'_>,
        time_from: i64,
        time_to: i64,
        cursor: &str,
    ) -> Result<types::OrderListResponse, ApiError> {
        let query = vec![
            ("time_range_field".to_string(), "update_time".to_string()),
            ("time_from".to_string(), time_from.to_string()),
            ("time_to".to_string(), time_to.to_string()),
            ("page_size".to_string(), constants::ORDER_LIST_PAGE_SIZE.to_string()),
            ("cursor".to_string(), cursor.to_string()),
        ];
        let query: Vec<(&str, String)> = query.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        self.call(Method::Get, "/order/get_order_list", auth, &query, None, constants::HTTP_REQUEST_TIMEOUT)
            .await
    }

    pub async fn get_order_detail(&self, auth: AuthContext<'_>, order_sns: &[String]) -> Result<types::OrderDetailResponse, ApiError> {
        let fields = types::ORDER_DETAIL_OPTIONAL_FIELDS.join(",");
        let query = vec![
            ("order_sn_list", order_sns.join(",")),
            ("response_optional_fields", fields),
        ];
        self.call(Method::Get, "/order/get_order_detail", auth, &query, None, constants::HTTP_REQUEST_TIMEOUT)
            .await
    }

    pub async fn get_shipment_list(&self, auth: AuthContext<'_>, cursor: &str) -> Result<types::ShipmentListResponse, ApiError> {
        let query = vec![
            ("page_size", constants::ORDER_LIST_PAGE_SIZE.to_string()),
            ("cursor", cursor.to_string()),
        ];
        self.call(Method::Get, "/order/get_shipment_list", auth, &query, None, constants::HTTP_REQUEST_TIMEOUT)
            .await
    }

    pub async fn get_tracking_number(
        &self,
        auth: AuthContext<'_>,
        order_sn: &str,
        package_number: Option<&str>,
    ) -> Result<types::TrackingNumberResponse, ApiError> {
        let mut query = vec![
            ("order_sn", order_sn.to_string()),
            ("response_optional_fields", types::TRACKING_NUMBER_OPTIONAL_FIELDS.to_string()),
        ];
        if let Some(pkg) = package_number {
            query.push(("package_number", pkg.to_string()));
        }
        self.call(
            Method::Get,
            "/logistics/get_tracking_number",
            auth,
            &query,
            None,
            constants::TRACKING_REQUEST_TIMEOUT,
        )
        .await
    }

    pub async fn get_detailed_tracking_info(&self, auth: AuthContext<'_>, tracking_number: &str) -> Result<types::TrackingInfoResponse, ApiError> {
        let query = vec![("tracking_number", tracking_number.to_string())];
        self.call(
            Method::Get,
            "/logistics/get_tracking_info",
            auth,
            &query,
            None,
            constants::TRACKING_REQUEST_TIMEOUT,
        )
        .await
    }
}

fn urlencode(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            other => format!("%{:02X}", other as u32),
        })
        .collect()
}
