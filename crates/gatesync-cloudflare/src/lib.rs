// # Cloudflare Zero Trust Gateway Client
//
// This crate provides the Cloudflare implementation of `GatewayApi` for
// gatesync: domain lists and filtering rules under
// `/accounts/:account_id/gateway`.
//
// ## Behavior
//
// - One HTTP request per trait call, plus retries of transient failures
// - Retries with exponential backoff (5xx, 429, connection errors)
// - No retry for authentication, not-found, or validation errors
// - HTTP timeout configured (30 seconds)
// - Dry-run mode: lookups go out, mutations are logged and answered locally
// - No caching between calls
//
// ## Security Requirements
//
// - Credentials NEVER appear in logs or Debug output
// - Credentials are taken per account from `AccountConfig`
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - Lists: GET/POST `/accounts/:account_id/gateway/lists`, DELETE `.../lists/:id`
// - Rules: GET/POST `/accounts/:account_id/gateway/rules`, PUT/DELETE `.../rules/:id`

use async_trait::async_trait;
use gatesync_core::config::{AccountConfig, Credentials};
use gatesync_core::traits::{GatewayApi, RemoteList, RemoteRule, RulePayload};
use gatesync_core::{Error, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER: &str = "cloudflare";

/// Retry policy for transient failures
///
/// Attempt `n` (0-based) waits `base_delay * 2^n` before the next try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Response envelope of the Cloudflare API
#[derive(Debug, Deserialize)]
struct GatewayResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct ListItem<'a> {
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateListBody<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    items: Vec<ListItem<'a>>,
}

/// Cloudflare Zero Trust Gateway client
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the client will:
/// - Perform all GET requests (list and rule lookups)
/// - Log the intended POST/PUT/DELETE with its payload
/// - **NOT** modify anything, answering with synthetic `dry-run-<n>` ids
pub struct CloudflareGateway {
    /// API base, without trailing slash
    api_host: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Retry policy for transient failures
    retry: RetryPolicy,

    /// Dry-run mode: if true, perform GET requests but skip mutations
    dry_run: bool,

    /// Counter for synthetic dry-run ids
    dry_run_ids: AtomicUsize,
}

// Custom Debug implementation; credentials live in AccountConfig and are
// never held here, but the client is still kept out of the output
impl std::fmt::Debug for CloudflareGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareGateway")
            .field("api_host", &self.api_host)
            .field("retry", &self.retry)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareGateway {
    /// Create a new Cloudflare gateway client
    ///
    /// # Parameters
    ///
    /// - `api_host`: API base URL, usually [`CLOUDFLARE_API_BASE`]
    /// - `retry`: Retry policy for transient failures
    /// - `dry_run`: If true, perform GET requests but skip mutations
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an empty host, [`Error::Http`] when the HTTP
    /// client cannot be built.
    pub fn new(api_host: impl Into<String>, retry: RetryPolicy, dry_run: bool) -> Result<Self> {
        let api_host = api_host.into().trim_end_matches('/').to_string();
        if api_host.is_empty() {
            return Err(Error::config("Cloudflare API host cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        if dry_run {
            tracing::warn!("Cloudflare client running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            api_host,
            client,
            retry,
            dry_run,
            dry_run_ids: AtomicUsize::new(0),
        })
    }

    /// Create a live client against the public API
    pub fn new_live(retry: RetryPolicy) -> Result<Self> {
        Self::new(CLOUDFLARE_API_BASE, retry, false)
    }

    /// Whether mutations are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn url(&self, account: &AccountConfig, path: &str) -> String {
        format!(
            "{}/accounts/{}/gateway{}",
            self.api_host, account.account_id, path
        )
    }

    fn next_dry_run_id(&self) -> String {
        format!("dry-run-{}", self.dry_run_ids.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Send a request, retrying transient failures per the retry policy
    async fn request<T: DeserializeOwned>(
        &self,
        account: &AccountConfig,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<T>> {
        let mut attempt = 0;
        loop {
            match self.send_once(account, method.clone(), path, body).await {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "{} {} failed: {} - retrying in {:?} ({}/{})",
                        method,
                        path,
                        e,
                        delay,
                        attempt,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        account: &AccountConfig,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<T>> {
        let url = self.url(account, path);
        tracing::debug!("{} {} (Account {})", method, path, account.account_number);

        let mut request = authorize(
            self.client
                .request(method, &url)
                .header("Content-Type", "application/json"),
            &account.credentials,
        );
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(status_error(status, path, &text));
        }

        let envelope: GatewayResponse<T> = serde_json::from_str(&text).map_err(|e| {
            Error::provider(PROVIDER, format!("Failed to parse response: {}", e))
        })?;

        if !envelope.success {
            return Err(envelope_error(&envelope.errors, path));
        }

        Ok(envelope.result)
    }
}

/// Attach the account's credentials to `request`
fn authorize(request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
    match credentials {
        Credentials::ApiToken { token } => request.bearer_auth(token),
        Credentials::ApiKey { key, email } => request
            .header("X-Auth-Email", email)
            .header("X-Auth-Key", key),
    }
}

/// Map a non-2xx status to an error
fn status_error(status: StatusCode, path: &str, body: &str) -> Error {
    let detail = serde_json::from_str::<GatewayResponse<Value>>(body)
        .ok()
        .and_then(|envelope| envelope.errors.into_iter().next())
        .map(|error| error.message)
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Invalid credentials or insufficient permissions for {}. Status: {} - {}",
            path, status, detail
        )),
        404 => Error::not_found(format!("{} - {}", path, detail)),
        429 => Error::rate_limited(format!("Rate limit exceeded. Status: {}", status)),
        500..=599 => Error::unavailable(format!("Cloudflare server error: {} - {}", status, detail)),
        _ => Error::provider(
            PROVIDER,
            format!("Request to {} failed: {} - {}", path, status, detail),
        ),
    }
}

/// Map a `success: false` envelope to an error
fn envelope_error(errors: &[ApiMessage], path: &str) -> Error {
    match errors.first() {
        Some(error) => Error::provider(
            PROVIDER,
            format!("{} ({}): {}", path, error.code, error.message),
        ),
        None => Error::provider(PROVIDER, format!("{}: request was not successful", path)),
    }
}

fn require<T>(result: Option<T>, what: &str) -> Result<T> {
    result.ok_or_else(|| Error::provider(PROVIDER, format!("{} returned no result", what)))
}

#[async_trait]
impl GatewayApi for CloudflareGateway {
    async fn list_lists(&self, account: &AccountConfig) -> Result<Option<Vec<RemoteList>>> {
        let lists: Option<Vec<RemoteList>> =
            self.request(account, Method::GET, "/lists", None).await?;
        Ok(lists.map(|lists| {
            lists
                .into_iter()
                .map(|mut list| {
                    list.account_id = account.account_id.clone();
                    list
                })
                .collect()
        }))
    }

    async fn create_list(
        &self,
        account: &AccountConfig,
        name: &str,
        items: &[String],
    ) -> Result<RemoteList> {
        let body = serde_json::to_value(CreateListBody {
            name,
            kind: "DOMAIN",
            items: items.iter().map(|value| ListItem { value }).collect(),
        })?;

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would POST {} with list \"{}\" ({} items)",
                self.url(account, "/lists"),
                name,
                items.len()
            );
            return Ok(RemoteList {
                id: self.next_dry_run_id(),
                name: name.to_string(),
                account_id: account.account_id.clone(),
            });
        }

        let mut list: RemoteList = require(
            self.request(account, Method::POST, "/lists", Some(&body)).await?,
            "create list",
        )?;
        list.account_id = account.account_id.clone();
        Ok(list)
    }

    async fn delete_list(&self, account: &AccountConfig, list_id: &str) -> Result<()> {
        let path = format!("/lists/{}", list_id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would DELETE {}", self.url(account, &path));
            return Ok(());
        }

        self.request::<Value>(account, Method::DELETE, &path, None)
            .await
            .map(|_| ())
    }

    async fn list_rules(&self, account: &AccountConfig) -> Result<Option<Vec<RemoteRule>>> {
        let rules: Option<Vec<RemoteRule>> =
            self.request(account, Method::GET, "/rules", None).await?;
        Ok(rules.map(|rules| {
            rules
                .into_iter()
                .map(|mut rule| {
                    rule.account_id = account.account_id.clone();
                    rule
                })
                .collect()
        }))
    }

    async fn create_rule(&self, account: &AccountConfig, payload: &RulePayload) -> Result<RemoteRule> {
        let body = serde_json::to_value(payload)?;

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would POST {} with payload: {}",
                self.url(account, "/rules"),
                body
            );
            return Ok(synthetic_rule(self.next_dry_run_id(), payload, account));
        }

        let mut rule: RemoteRule = require(
            self.request(account, Method::POST, "/rules", Some(&body)).await?,
            "create rule",
        )?;
        rule.account_id = account.account_id.clone();
        Ok(rule)
    }

    async fn update_rule(
        &self,
        account: &AccountConfig,
        rule_id: &str,
        payload: &RulePayload,
    ) -> Result<RemoteRule> {
        let path = format!("/rules/{}", rule_id);
        let body = serde_json::to_value(payload)?;

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would PUT {} with payload: {}",
                self.url(account, &path),
                body
            );
            return Ok(synthetic_rule(rule_id.to_string(), payload, account));
        }

        let mut rule: RemoteRule = require(
            self.request(account, Method::PUT, &path, Some(&body)).await?,
            "update rule",
        )?;
        rule.account_id = account.account_id.clone();
        Ok(rule)
    }

    async fn delete_rule(&self, account: &AccountConfig, rule_id: &str) -> Result<()> {
        let path = format!("/rules/{}", rule_id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would DELETE {}", self.url(account, &path));
            return Ok(());
        }

        self.request::<Value>(account, Method::DELETE, &path, None)
            .await
            .map(|_| ())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

fn synthetic_rule(id: String, payload: &RulePayload, account: &AccountConfig) -> RemoteRule {
    RemoteRule {
        id,
        name: payload.name.clone(),
        filters: payload
            .filters
            .iter()
            .map(|filter| filter.as_str().to_string())
            .collect(),
        traffic: payload.traffic.clone(),
        enabled: payload.enabled,
        account_id: account.account_id.clone(),
    }
}
