//! Configuration types for the gatesync system
//!
//! This module defines all configuration structures used throughout the crate.
//! A [`SyncConfig`] is built once per run and handed to the
//! [`Orchestrator`](crate::engine::Orchestrator) by value.

use serde::{Deserialize, Serialize};

/// Default number of domains per remote list
pub const DEFAULT_LIST_ITEM_SIZE: usize = 1000;

/// Default number of domains one account may hold across all its lists
pub const DEFAULT_LIST_ITEM_LIMIT: usize = 300_000;

/// Main gatesync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Accounts to sync, in fill order
    pub accounts: Vec<AccountConfig>,

    /// Remote quota limits
    #[serde(default)]
    pub limits: ListLimits,

    /// Names identifying managed lists and rules
    #[serde(default)]
    pub names: ManagedNames,

    /// Rule feature flags
    #[serde(default)]
    pub rules: RuleOptions,
}

impl SyncConfig {
    /// Create a configuration with defaults for the given accounts
    pub fn new(accounts: Vec<AccountConfig>) -> Self {
        Self {
            accounts,
            limits: ListLimits::default(),
            names: ManagedNames::default(),
            rules: RuleOptions::default(),
        }
    }

    /// Set the list limits
    pub fn with_limits(mut self, limits: ListLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the rule options
    pub fn with_rules(mut self, rules: RuleOptions) -> Self {
        self.rules = rules;
        self
    }

    /// Whether more than one account is configured
    pub fn is_multi_account(&self) -> bool {
        self.accounts.len() > 1
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.accounts.is_empty() {
            return Err(crate::Error::config("No account configurations provided"));
        }

        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            account.validate()?;
            if !seen.insert(account.account_id.as_str()) {
                return Err(crate::Error::config(format!(
                    "Account id {} is configured more than once",
                    account.account_id
                )));
            }
        }

        self.limits.validate()?;
        self.names.validate()?;

        Ok(())
    }
}

/// One tenant account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Opaque account identifier used in API paths
    pub account_id: String,

    /// 1-based number used in list names and log lines
    pub account_number: usize,

    /// Credential used for every call against this account
    pub credentials: Credentials,
}

impl AccountConfig {
    /// Create an account authenticated by an API token
    pub fn with_token(
        account_id: impl Into<String>,
        account_number: usize,
        token: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            account_number,
            credentials: Credentials::ApiToken {
                token: token.into(),
            },
        }
    }

    /// Create an account authenticated by a global API key and email
    pub fn with_key(
        account_id: impl Into<String>,
        account_number: usize,
        key: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            account_number,
            credentials: Credentials::ApiKey {
                key: key.into(),
                email: email.into(),
            },
        }
    }

    /// Validate the account configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.account_id.trim().is_empty() {
            return Err(crate::Error::config(format!(
                "Account {} is missing an account ID",
                self.account_number
            )));
        }

        match &self.credentials {
            Credentials::ApiToken { token } if token.is_empty() => {
                Err(crate::Error::config(format!(
                    "Account {} has an empty API token",
                    self.account_number
                )))
            }
            Credentials::ApiKey { key, email } if key.is_empty() || email.is_empty() => {
                Err(crate::Error::config(format!(
                    "Account {} needs both an API key and an account email",
                    self.account_number
                )))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("account_id", &self.account_id)
            .field("account_number", &self.account_number)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Credential for one account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Scoped API token, sent as a bearer token
    ApiToken {
        /// ⚠️ NEVER log this value
        token: String,
    },

    /// Global API key plus the account email
    ApiKey {
        /// ⚠️ NEVER log this value
        key: String,
        /// Account email
        email: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ApiToken { .. } => f
                .debug_struct("ApiToken")
                .field("token", &"<REDACTED>")
                .finish(),
            Credentials::ApiKey { email, .. } => f
                .debug_struct("ApiKey")
                .field("key", &"<REDACTED>")
                .field("email", email)
                .finish(),
        }
    }
}

/// Remote quota limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLimits {
    /// Maximum number of domains in one list
    #[serde(default = "default_list_item_size")]
    pub list_item_size: usize,

    /// Maximum number of domains one account may hold
    ///
    /// One slot is held back, so an account stores at most
    /// `list_item_limit - 1` domains.
    #[serde(default = "default_list_item_limit")]
    pub list_item_limit: usize,
}

impl ListLimits {
    /// Domains one account can take
    pub fn usable_per_account(&self) -> usize {
        self.list_item_limit.saturating_sub(1)
    }

    /// Validate the limits
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.list_item_size == 0 {
            return Err(crate::Error::config("List item size must be > 0"));
        }
        if self.list_item_limit < 2 {
            return Err(crate::Error::config("List item limit must be >= 2"));
        }
        Ok(())
    }
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            list_item_size: default_list_item_size(),
            list_item_limit: default_list_item_limit(),
        }
    }
}

fn default_list_item_size() -> usize {
    DEFAULT_LIST_ITEM_SIZE
}

fn default_list_item_limit() -> usize {
    DEFAULT_LIST_ITEM_LIMIT
}

/// Names that mark lists and rules as owned by gatesync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedNames {
    /// Prefix of every managed list name
    #[serde(default = "default_list_prefix")]
    pub list_prefix: String,

    /// Name of the DNS rule
    #[serde(default = "default_rule_name")]
    pub rule_name: String,

    /// Name of the SNI rule
    #[serde(default = "default_sni_rule_name")]
    pub sni_rule_name: String,
}

impl ManagedNames {
    /// Validate the names
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.list_prefix.is_empty() || self.rule_name.is_empty() {
            return Err(crate::Error::config(
                "Managed list prefix and rule name cannot be empty",
            ));
        }
        if !self.sni_rule_name.starts_with(&self.rule_name) {
            // Rule deletion matches by prefix of `rule_name`.
            return Err(crate::Error::config(format!(
                "SNI rule name \"{}\" must start with \"{}\"",
                self.sni_rule_name, self.rule_name
            )));
        }
        Ok(())
    }
}

impl Default for ManagedNames {
    fn default() -> Self {
        Self {
            list_prefix: default_list_prefix(),
            rule_name: default_rule_name(),
            sni_rule_name: default_sni_rule_name(),
        }
    }
}

fn default_list_prefix() -> String {
    "Gatesync List".to_string()
}

fn default_rule_name() -> String {
    "Gatesync Filter Lists".to_string()
}

fn default_sni_rule_name() -> String {
    "Gatesync Filter Lists - SNI Based Filtering".to_string()
}

/// Rule feature flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOptions {
    /// Also maintain a rule matching the TLS server name
    ///
    /// Only effective for traffic proxied through the gateway.
    #[serde(default)]
    pub block_based_on_sni: bool,

    /// Show the block page for blocked requests
    #[serde(default)]
    pub block_page_enabled: bool,

    /// Reason shown on the block page
    #[serde(default = "default_block_reason")]
    pub block_reason: String,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            block_based_on_sni: false,
            block_page_enabled: false,
            block_reason: default_block_reason(),
        }
    }
}

fn default_block_reason() -> String {
    "Blocked by gatesync, check your filter lists if this was a mistake.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accounts_rejected() {
        let config = SyncConfig::new(Vec::new());
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn missing_account_id_rejected() {
        let config = SyncConfig::new(vec![AccountConfig::with_token("", 1, "token")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_account_ids_rejected() {
        let config = SyncConfig::new(vec![
            AccountConfig::with_token("acc-x", 1, "token-1"),
            AccountConfig::with_token("acc-y", 2, "token-2"),
            AccountConfig::with_token("acc-x", 3, "token-3"),
        ]);

        match config.validate() {
            Err(crate::Error::Config(message)) => assert!(message.contains("acc-x")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn key_without_email_rejected() {
        let account = AccountConfig::with_key("acc", 1, "key", "");
        assert!(account.validate().is_err());
    }

    #[test]
    fn usable_capacity_reserves_one_slot() {
        let limits = ListLimits {
            list_item_size: 1000,
            list_item_limit: 300_000,
        };
        assert_eq!(limits.usable_per_account(), 299_999);
    }

    #[test]
    fn debug_redacts_credentials() {
        let account = AccountConfig::with_token("acc", 1, "secret_token_12345");
        let debug_str = format!("{:?}", account);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(debug_str.contains("<REDACTED>"));

        let account = AccountConfig::with_key("acc", 1, "global_key_999", "ops@example.com");
        let debug_str = format!("{:?}", account);
        assert!(!debug_str.contains("global_key_999"));
        assert!(debug_str.contains("ops@example.com"));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let json = serde_json::json!({
            "accounts": [{
                "account_id": "acc",
                "account_number": 1,
                "credentials": { "type": "api_token", "token": "t" }
            }]
        });

        let config: SyncConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.limits, ListLimits::default());
        assert_eq!(config.names.rule_name, "Gatesync Filter Lists");
        assert!(!config.rules.block_based_on_sni);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sni_rule_name_must_extend_rule_name() {
        let names = ManagedNames {
            sni_rule_name: "Something Else".to_string(),
            ..ManagedNames::default()
        };
        assert!(names.validate().is_err());
    }
}
