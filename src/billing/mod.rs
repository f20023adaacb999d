use crate::config::{BILLING_API_KEY_ENV, Config};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const PLATFORM: &str = "stripe";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entitlement {
    pub product_identifier: String,
    pub purchase_date: Option<DateTime<Utc>>,
    pub expires_date: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerInfo {
    pub app_user_id: String,
    pub entitlements: BTreeMap<String, Entitlement>,
    pub management_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl CustomerInfo {
    pub fn active_entitlements(&self) -> impl Iterator<Item = &str> {
        self.entitlements
            .iter()
            .filter(|(_, entitlement)| entitlement.is_active)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub identifier: String,
    #[serde(rename = "platform_product_identifier")]
    pub product_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub identifier: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub packages: Vec<Package>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseResult {
    pub success: bool,
    pub customer_info: Option<CustomerInfo>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriberEnvelope {
    subscriber: SubscriberPayload,
}

#[derive(Debug, Deserialize)]
struct SubscriberPayload {
    original_app_user_id: String,
    #[serde(default)]
    entitlements: BTreeMap<String, EntitlementPayload>,
    management_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntitlementPayload {
    product_identifier: String,
    purchase_date: Option<DateTime<Utc>>,
    expires_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct OfferingsPayload {
    #[serde(default)]
    offerings: Vec<Offering>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

/// True when the customer holds at least one active entitlement.
pub fn is_active_subscriber(info: &CustomerInfo) -> bool {
    info.active_entitlements().next().is_some()
}

/// Client for the RevenueCat REST API. Requests run on a dedicated thread
/// because the blocking client cannot be driven from inside the runtime.
#[derive(Debug, Clone)]
pub struct BillingClient {
    base_url: String,
    api_key: String,
    timeout_seconds: u64,
    app_user_id: Option<String>,
}

impl BillingClient {
    pub fn new(base_url: &str, api_key: &str, timeout_seconds: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            timeout_seconds: timeout_seconds.max(5),
            app_user_id: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.resolved_billing_api_key().with_context(|| {
            format!(
                "Billing API key is missing. Set `vices config set billing.api_key <KEY>` or `{BILLING_API_KEY_ENV}`."
            )
        })?;

        Ok(Self::new(
            &config.billing_api_base_url,
            &api_key,
            config.billing_timeout_seconds,
        ))
    }

    pub fn is_initialized(&self) -> bool {
        self.app_user_id.is_some()
    }

    /// Binds the client to an owner. Calling it again is a no-op.
    pub fn initialize(&mut self, owner_id: i64) -> Result<()> {
        if self.is_initialized() {
            debug!(owner_id, "billing already initialized");
            return Ok(());
        }

        let app_user_id = owner_id.to_string();
        self.fetch_customer_info(&app_user_id)
            .context("Failed to initialize billing")?;
        self.app_user_id = Some(app_user_id);
        info!(owner_id, "billing initialized");

        Ok(())
    }

    pub fn offerings(&self) -> Result<Vec<Offering>> {
        let app_user_id = self.require_user()?;
        let body = self.request(Method::GET, &["subscribers", app_user_id, "offerings"], None)?;
        let payload: OfferingsPayload =
            serde_json::from_value(body).context("Failed to parse offerings response")?;

        Ok(payload.offerings)
    }

    /// Records a store purchase token against the owner. Failures are
    /// reported in the result rather than as an error.
    pub fn purchase(&self, package: &Package, fetch_token: &str) -> PurchaseResult {
        let outcome = self.require_user().and_then(|app_user_id| {
            info!(package = %package.identifier, "attempting purchase");
            let body = self.request(
                Method::POST,
                &["receipts"],
                Some(json!({
                    "app_user_id": app_user_id,
                    "fetch_token": fetch_token,
                    "product_id": package.product_id,
                })),
            )?;
            parse_customer_info(body, Utc::now())
        });

        match outcome {
            Ok(customer_info) => PurchaseResult {
                success: true,
                customer_info: Some(customer_info),
                error: None,
            },
            Err(error) => {
                warn!(error = %error, package = %package.identifier, "purchase failed");
                PurchaseResult {
                    success: false,
                    customer_info: None,
                    error: Some(format!("{error:#}")),
                }
            }
        }
    }

    /// Re-reads the entitlements the store already knows for the owner.
    pub fn restore(&self) -> Result<CustomerInfo> {
        let app_user_id = self.require_user()?;
        let info = self
            .fetch_customer_info(app_user_id)
            .context("Failed to restore purchases")?;
        info!(
            active = info.active_entitlements().count(),
            "purchases restored"
        );

        Ok(info)
    }

    pub fn customer_info(&self) -> Result<CustomerInfo> {
        let app_user_id = self.require_user()?;
        self.fetch_customer_info(app_user_id)
    }

    pub fn log_out(&mut self) {
        if let Some(app_user_id) = self.app_user_id.take() {
            info!(app_user_id = %app_user_id, "billing logged out");
        }
    }

    fn fetch_customer_info(&self, app_user_id: &str) -> Result<CustomerInfo> {
        let body = self.request(Method::GET, &["subscribers", app_user_id], None)?;
        parse_customer_info(body, Utc::now())
    }

    fn require_user(&self) -> Result<&str> {
        self.app_user_id
            .as_deref()
            .ok_or_else(|| anyhow!("Billing is not initialized"))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid billing base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Billing base URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str], body: Option<Value>) -> Result<Value> {
        let endpoint = self.endpoint(segments)?;
        let api_key = self.api_key.clone();
        let timeout_seconds = self.timeout_seconds;

        std::thread::spawn(move || request_blocking(method, endpoint, &api_key, timeout_seconds, body))
            .join()
            .map_err(|_| anyhow!("Billing worker thread panicked"))?
    }
}

fn request_blocking(
    method: Method,
    endpoint: Url,
    api_key: &str,
    timeout_seconds: u64,
    body: Option<Value>,
) -> Result<Value> {
    if api_key.is_empty() {
        bail!("Billing API key is empty");
    }

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static("x-platform"),
        HeaderValue::from_static(PLATFORM),
    );
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("Failed to build Authorization header")?,
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .default_headers(headers)
        .build()
        .context("Failed to create billing HTTP client")?;

    let mut request = client.request(method, endpoint.clone());
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .with_context(|| format!("Billing request failed: {endpoint}"))?;

    let status = response.status();
    let text = response
        .text()
        .context("Failed to read billing response body")?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorPayload>(&text)
            .ok()
            .and_then(|payload| payload.message)
            .unwrap_or(text);
        bail!("Billing API error {status}: {message}");
    }

    serde_json::from_str(&text).with_context(|| format!("Failed to parse billing response: {text}"))
}

fn parse_customer_info(body: Value, now: DateTime<Utc>) -> Result<CustomerInfo> {
    let envelope: SubscriberEnvelope =
        serde_json::from_value(body).context("Failed to parse subscriber response")?;
    let subscriber = envelope.subscriber;

    let entitlements = subscriber
        .entitlements
        .into_iter()
        .map(|(name, payload)| {
            let is_active = payload.expires_date.is_none_or(|expires| expires > now);
            (
                name,
                Entitlement {
                    product_identifier: payload.product_identifier,
                    purchase_date: payload.purchase_date,
                    expires_date: payload.expires_date,
                    is_active,
                },
            )
        })
        .collect();

    Ok(CustomerInfo {
        app_user_id: subscriber.original_app_user_id,
        entitlements,
        management_url: subscriber.management_url,
        fetched_at: now,
    })
}

/// Refuses premium commands for owners without an active entitlement when
/// the paywall is switched on.
pub fn require_active_subscription(config: &Config, owner_id: i64) -> Result<()> {
    if !config.require_subscription {
        return Ok(());
    }

    let mut client = BillingClient::from_config(config)?;
    client.initialize(owner_id)?;
    let info = client.customer_info()?;
    if !is_active_subscriber(&info) {
        bail!("An active subscription is required. Run `vices subscription offerings` to subscribe.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SUBSCRIBER_BODY: &str = r#"{
        "request_date": "2025-03-01T10:00:00Z",
        "subscriber": {
            "original_app_user_id": "42",
            "management_url": null,
            "entitlements": {
                "premium": {
                    "product_identifier": "vices_monthly",
                    "purchase_date": "2025-02-01T10:00:00Z",
                    "expires_date": "2025-04-01T10:00:00Z"
                },
                "legacy": {
                    "product_identifier": "vices_old",
                    "purchase_date": "2024-01-01T10:00:00Z",
                    "expires_date": "2024-02-01T10:00:00Z"
                }
            }
        }
    }"#;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    async fn mount_subscriber(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/subscribers/42"))
            .and(header("authorization", "Bearer rc_key"))
            .and(header("x-platform", "stripe"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(SUBSCRIBER_BODY, "application/json"),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn expired_entitlements_are_inactive() {
        let body: Value = serde_json::from_str(SUBSCRIBER_BODY).expect("json");
        let info = parse_customer_info(body, at(2025, 3, 1)).expect("parse");

        assert_eq!(info.app_user_id, "42");
        assert_eq!(info.active_entitlements().collect::<Vec<_>>(), vec!["premium"]);
        assert!(is_active_subscriber(&info));

        let body: Value = serde_json::from_str(SUBSCRIBER_BODY).expect("json");
        let later = parse_customer_info(body, at(2025, 5, 1)).expect("parse");
        assert!(!is_active_subscriber(&later));
    }

    #[test]
    fn lifetime_entitlement_never_expires() {
        let body = json!({
            "subscriber": {
                "original_app_user_id": "7",
                "entitlements": {
                    "lifetime": {"product_identifier": "vices_lifetime", "expires_date": null}
                }
            }
        });
        let info = parse_customer_info(body, at(2030, 1, 1)).expect("parse");
        assert!(is_active_subscriber(&info));

        let empty = parse_customer_info(
            json!({"subscriber": {"original_app_user_id": "8"}}),
            at(2030, 1, 1),
        )
        .expect("parse");
        assert!(!is_active_subscriber(&empty));
    }

    #[test]
    fn endpoint_escapes_path_segments() {
        let client = BillingClient::new("https://billing.test/v1/", "key", 20);
        let url = client
            .endpoint(&["subscribers", "user 1", "offerings"])
            .expect("endpoint");

        assert_eq!(url.as_str(), "https://billing.test/v1/subscribers/user%201/offerings");
    }

    #[test]
    fn calls_before_initialize_are_rejected() {
        let client = BillingClient::new("https://billing.test/v1", "key", 20);

        assert!(client.offerings().is_err());
        assert!(client.customer_info().is_err());

        let package = Package {
            identifier: "$rc_monthly".to_string(),
            product_id: "vices_monthly".to_string(),
        };
        let result = client.purchase(&package, "tok");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Billing is not initialized"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn initialize_is_idempotent() {
        let server = MockServer::start().await;
        mount_subscriber(&server).await;
        let base_url = format!("{}/v1", server.uri());

        let mut client = tokio::task::spawn_blocking(move || {
            let mut client = BillingClient::new(&base_url, "rc_key", 5);
            client.initialize(42).expect("initialize");
            client.initialize(42).expect("second initialize");
            client
        })
        .await
        .expect("blocking task");

        server.verify().await;
        assert!(client.is_initialized());

        client.log_out();
        assert!(!client.is_initialized());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejected_purchase_reports_store_message() {
        let server = MockServer::start().await;
        mount_subscriber(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/receipts"))
            .and(body_partial_json(json!({
                "app_user_id": "42",
                "fetch_token": "bad-token",
                "product_id": "vices_monthly",
            })))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 7102,
                "message": "The receipt is not valid.",
            })))
            .expect(1)
            .mount(&server)
            .await;
        let base_url = format!("{}/v1", server.uri());

        let result = tokio::task::spawn_blocking(move || {
            let mut client = BillingClient::new(&base_url, "rc_key", 5);
            client.initialize(42).expect("initialize");
            let package = Package {
                identifier: "$rc_monthly".to_string(),
                product_id: "vices_monthly".to_string(),
            };
            client.purchase(&package, "bad-token")
        })
        .await
        .expect("blocking task");

        server.verify().await;
        assert!(!result.success);
        assert!(result.customer_info.is_none());
        assert_eq!(
            result.error.as_deref(),
            Some("Billing API error 400 Bad Request: The receipt is not valid.")
        );
    }

    #[test]
    fn offerings_parse_packages() {
        let payload: OfferingsPayload = serde_json::from_str(
            r#"{
                "current_offering_id": "default",
                "offerings": [{
                    "identifier": "default",
                    "description": "Standard plans",
                    "packages": [
                        {"identifier": "$rc_monthly", "platform_product_identifier": "vices_monthly"},
                        {"identifier": "$rc_annual", "platform_product_identifier": "vices_annual"}
                    ]
                }]
            }"#,
        )
        .expect("parse");

        assert_eq!(payload.offerings.len(), 1);
        assert_eq!(payload.offerings[0].packages[1].product_id, "vices_annual");
    }

    #[test]
    fn paywall_is_skipped_when_disabled() {
        let config = Config::default();
        assert!(!config.require_subscription);
        assert!(require_active_subscription(&config, 1).is_ok());
    }
}
