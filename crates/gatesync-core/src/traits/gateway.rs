// # Gateway API Trait
//
// Defines the interface to the remote filtering service: domain lists and
// filtering rules, scoped per account.
//
// ## Implementations
//
// - Cloudflare Zero Trust Gateway: `gatesync-cloudflare` crate
// - In-memory fake: `tests/common/mod.rs`
//
// ## Usage
//
// ```rust,ignore
// use gatesync_core::GatewayApi;
//
// let lists = gateway.list_lists(&account).await?.unwrap_or_default();
// for list in lists {
//     gateway.delete_list(&account, &list.id).await?;
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AccountConfig;

/// A domain list that exists on the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteList {
    /// Remote-assigned identifier
    pub id: String,
    /// List name
    pub name: String,
    /// Account owning the list (filled in by the client, not sent by the API)
    #[serde(skip)]
    pub account_id: String,
}

/// A filtering rule that exists on the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRule {
    /// Remote-assigned identifier
    pub id: String,
    /// Rule name
    pub name: String,
    /// Traffic classes the rule applies to
    #[serde(default)]
    pub filters: Vec<String>,
    /// Match expression
    #[serde(default)]
    pub traffic: String,
    /// Whether the rule is active
    #[serde(default)]
    pub enabled: bool,
    /// Account owning the rule (filled in by the client, not sent by the API)
    #[serde(skip)]
    pub account_id: String,
}

/// Traffic class a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficFilter {
    /// Name-resolution traffic
    Dns,
    /// HTTP traffic
    Http,
    /// Network (layer 4) traffic, including TLS server name
    L4,
    /// Egress policies
    Egress,
}

impl TrafficFilter {
    /// Wire name of the filter
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficFilter::Dns => "dns",
            TrafficFilter::Http => "http",
            TrafficFilter::L4 => "l4",
            TrafficFilter::Egress => "egress",
        }
    }
}

/// Rule action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Block matching traffic
    Block,
}

/// Block page settings of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSettings {
    /// Show the block page
    pub block_page_enabled: bool,
    /// Reason shown on the block page
    pub block_reason: String,
}

/// Full rule body for create and update calls
///
/// The remote service does not accept partial updates. Every field is sent
/// every time, and `enabled` is always `true`: a missing or false flag
/// disables the rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePayload {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub action: RuleAction,
    pub rule_settings: RuleSettings,
    pub filters: Vec<TrafficFilter>,
    pub traffic: String,
}

/// Trait for remote filtering service implementations
///
/// Every method addresses exactly one account and performs exactly one
/// logical remote operation. Implementations may retry transient transport
/// failures; they never decide *what* to create, update, or delete.
///
/// # Lookups
///
/// `list_lists` and `list_rules` return `Ok(None)` when the service answers
/// without a result. Callers treat that as "nothing to reconcile", not as a
/// failure.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Fetch every list of the account
    ///
    /// ```http
    /// GET /accounts/:account_id/gateway/lists
    /// ```
    async fn list_lists(
        &self,
        account: &AccountConfig,
    ) -> Result<Option<Vec<RemoteList>>, crate::Error>;

    /// Create a domain list holding `items`
    ///
    /// ```http
    /// POST /accounts/:account_id/gateway/lists
    /// { "name": "...", "type": "DOMAIN", "items": [{ "value": "..." }] }
    /// ```
    async fn create_list(
        &self,
        account: &AccountConfig,
        name: &str,
        items: &[String],
    ) -> Result<RemoteList, crate::Error>;

    /// Delete a list by id
    async fn delete_list(&self, account: &AccountConfig, list_id: &str)
    -> Result<(), crate::Error>;

    /// Fetch every rule of the account
    async fn list_rules(
        &self,
        account: &AccountConfig,
    ) -> Result<Option<Vec<RemoteRule>>, crate::Error>;

    /// Create a rule
    async fn create_rule(
        &self,
        account: &AccountConfig,
        payload: &RulePayload,
    ) -> Result<RemoteRule, crate::Error>;

    /// Replace an existing rule, keeping its id
    async fn update_rule(
        &self,
        account: &AccountConfig,
        rule_id: &str,
        payload: &RulePayload,
    ) -> Result<RemoteRule, crate::Error>;

    /// Delete a rule by id
    async fn delete_rule(&self, account: &AccountConfig, rule_id: &str)
    -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
