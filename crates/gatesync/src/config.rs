//! Environment configuration
//!
//! All configuration is read once from environment variables at startup.

use anyhow::{Context, Result};
use gatesync_cloudflare::{CLOUDFLARE_API_BASE, RetryPolicy};
use gatesync_core::config::{
    AccountConfig, DEFAULT_LIST_ITEM_LIMIT, DEFAULT_LIST_ITEM_SIZE, ListLimits, RuleOptions,
    SyncConfig,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
pub struct Config {
    pub accounts: Vec<AccountConfig>,
    pub api_host: String,
    pub limits: ListLimits,
    pub rules: RuleOptions,
    pub dry_run: bool,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub blocklist: PathBuf,
    pub allowlist: Option<PathBuf>,
    pub webhook_url: Option<String>,
    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("accounts", &self.accounts)
            .field("api_host", &self.api_host)
            .field("limits", &self.limits)
            .field("rules", &self.rules)
            .field("dry_run", &self.dry_run)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("blocklist", &self.blocklist)
            .field("allowlist", &self.allowlist)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "<REDACTED>"))
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `var`, which returns a variable's value
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        let debug = flag(var("DEBUG"));
        let log_level = if debug {
            "debug".to_string()
        } else {
            var("GATESYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string())
        };

        Ok(Self {
            accounts: accounts(&var)?,
            api_host: var("CLOUDFLARE_API_HOST").unwrap_or_else(|| CLOUDFLARE_API_BASE.to_string()),
            limits: ListLimits {
                list_item_size: parse(&var, "CLOUDFLARE_LIST_ITEM_SIZE")?
                    .unwrap_or(DEFAULT_LIST_ITEM_SIZE),
                list_item_limit: parse(&var, "CLOUDFLARE_LIST_ITEM_LIMIT")?
                    .unwrap_or(DEFAULT_LIST_ITEM_LIMIT),
            },
            rules: RuleOptions {
                block_based_on_sni: flag(var("BLOCK_BASED_ON_SNI")),
                block_page_enabled: flag(var("BLOCK_PAGE_ENABLED")),
                ..RuleOptions::default()
            },
            dry_run: var("GATESYNC_MODE").is_some_and(|mode| mode.eq_ignore_ascii_case("dry-run")),
            max_retries: parse(&var, "GATESYNC_MAX_RETRIES")?.unwrap_or(3),
            retry_delay_secs: parse(&var, "GATESYNC_RETRY_DELAY_SECS")?.unwrap_or(2),
            blocklist: var("GATESYNC_BLOCKLIST")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("blocklist.txt")),
            allowlist: Some(
                var("GATESYNC_ALLOWLIST")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("allowlist.txt")),
            ),
            webhook_url: var("WEBHOOK_URL"),
            log_level,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            anyhow::bail!(
                "No Cloudflare account configured. \
                Set CLOUDFLARE_ACCOUNT_ID and CLOUDFLARE_API_TOKEN, \
                or CLOUDFLARE_ACCOUNT_ID_1 and CLOUDFLARE_API_TOKEN_1 for multiple accounts"
            );
        }

        for account in &self.accounts {
            account.validate()?;
        }

        self.limits.validate()?;

        if !self.api_host.starts_with("https://") && !self.api_host.starts_with("http://") {
            anyhow::bail!(
                "CLOUDFLARE_API_HOST must use HTTP or HTTPS scheme. Got: {}",
                self.api_host
            );
        }

        if self.max_retries > 10 {
            anyhow::bail!(
                "GATESYNC_MAX_RETRIES must be between 0 and 10. Got: {}",
                self.max_retries
            );
        }

        if !(1..=300).contains(&self.retry_delay_secs) {
            anyhow::bail!(
                "GATESYNC_RETRY_DELAY_SECS must be between 1 and 300 seconds. Got: {}",
                self.retry_delay_secs
            );
        }

        if let Some(ref url) = self.webhook_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            anyhow::bail!("WEBHOOK_URL must use HTTP or HTTPS scheme");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "GATESYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Run configuration handed to the orchestrator
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(self.accounts.clone())
            .with_limits(self.limits)
            .with_rules(self.rules.clone())
    }

    /// Transport retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

/// Resolve the configured accounts
///
/// Numbered variables (`CLOUDFLARE_ACCOUNT_ID_1`, `_2`, ...) take precedence
/// and are scanned until the first missing number. Without them a single
/// account is read from the unnumbered variables.
fn accounts(var: &impl Fn(&str) -> Option<String>) -> Result<Vec<AccountConfig>> {
    let mut accounts = Vec::new();

    for number in 1.. {
        let Some(account_id) = var(&format!("CLOUDFLARE_ACCOUNT_ID_{}", number)) else {
            break;
        };
        let token = var(&format!("CLOUDFLARE_API_TOKEN_{}", number))
            .or_else(|| var("CLOUDFLARE_API_TOKEN"));
        accounts.push(account(var, account_id, number, token).with_context(|| {
            format!(
                "CLOUDFLARE_API_TOKEN_{} is required for CLOUDFLARE_ACCOUNT_ID_{}",
                number, number
            )
        })?);
    }

    if accounts.is_empty()
        && let Some(account_id) = var("CLOUDFLARE_ACCOUNT_ID")
    {
        accounts.push(
            account(var, account_id, 1, var("CLOUDFLARE_API_TOKEN")).context(
                "CLOUDFLARE_API_TOKEN (or CLOUDFLARE_API_KEY and CLOUDFLARE_ACCOUNT_EMAIL) is required",
            )?,
        );
    }

    Ok(accounts)
}

fn account(
    var: &impl Fn(&str) -> Option<String>,
    account_id: String,
    number: usize,
    token: Option<String>,
) -> Result<AccountConfig> {
    if let Some(token) = token {
        return Ok(AccountConfig::with_token(account_id, number, token));
    }

    match (var("CLOUDFLARE_API_KEY"), var("CLOUDFLARE_ACCOUNT_EMAIL")) {
        (Some(key), Some(email)) => Ok(AccountConfig::with_key(account_id, number, key, email)),
        _ => anyhow::bail!("No credentials for Account {}", number),
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|value| value.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{} is not a valid number", name))
}

fn flag(value: Option<String>) -> bool {
    value.is_some_and(|value| matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatesync_core::config::Credentials;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn single_account_with_defaults() {
        let config = load(&[
            ("CLOUDFLARE_ACCOUNT_ID", "acc"),
            ("CLOUDFLARE_API_TOKEN", "token"),
        ])
        .unwrap();

        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].account_number, 1);
        assert_eq!(config.api_host, CLOUDFLARE_API_BASE);
        assert_eq!(config.limits.list_item_size, 1000);
        assert_eq!(config.limits.list_item_limit, 300_000);
        assert!(!config.dry_run);
        assert_eq!(config.log_level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn numbered_accounts_stop_at_first_gap() {
        let config = load(&[
            ("CLOUDFLARE_ACCOUNT_ID_1", "a1"),
            ("CLOUDFLARE_API_TOKEN_1", "t1"),
            ("CLOUDFLARE_ACCOUNT_ID_2", "a2"),
            ("CLOUDFLARE_API_TOKEN_2", "t2"),
            ("CLOUDFLARE_ACCOUNT_ID_4", "a4"),
            ("CLOUDFLARE_API_TOKEN_4", "t4"),
            ("CLOUDFLARE_ACCOUNT_ID", "ignored"),
        ])
        .unwrap();

        let ids: Vec<&str> = config.accounts.iter().map(|a| a.account_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(config.accounts[1].account_number, 2);
    }

    #[test]
    fn key_and_email_credentials() {
        let config = load(&[
            ("CLOUDFLARE_ACCOUNT_ID", "acc"),
            ("CLOUDFLARE_API_KEY", "key"),
            ("CLOUDFLARE_ACCOUNT_EMAIL", "ops@example.com"),
        ])
        .unwrap();

        assert!(matches!(
            config.accounts[0].credentials,
            Credentials::ApiKey { .. }
        ));
    }

    #[test]
    fn missing_credentials_fail() {
        assert!(load(&[("CLOUDFLARE_ACCOUNT_ID", "acc")]).is_err());
        assert!(load(&[("CLOUDFLARE_ACCOUNT_ID_1", "acc")]).is_err());
    }

    #[test]
    fn debug_lists_settings_and_redacts_secrets() {
        let config = load(&[
            ("CLOUDFLARE_ACCOUNT_ID", "acc"),
            ("CLOUDFLARE_API_TOKEN", "secret_token_12345"),
            ("WEBHOOK_URL", "https://hooks.example/secret-path"),
            ("GATESYNC_BLOCKLIST", "/etc/gatesync/blocklist.txt"),
            ("GATESYNC_MAX_RETRIES", "5"),
        ])
        .unwrap();

        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(!debug_str.contains("secret-path"));
        assert!(debug_str.contains("/etc/gatesync/blocklist.txt"));
        assert!(debug_str.contains("max_retries: 5"));
        assert!(debug_str.contains("block_based_on_sni"));
        assert!(debug_str.contains("log_level"));
    }

    #[test]
    fn no_accounts_fails_validation() {
        let config = load(&[]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn flags_and_overrides() {
        let config = load(&[
            ("CLOUDFLARE_ACCOUNT_ID", "acc"),
            ("CLOUDFLARE_API_TOKEN", "token"),
            ("CLOUDFLARE_LIST_ITEM_SIZE", "500"),
            ("BLOCK_BASED_ON_SNI", "true"),
            ("BLOCK_PAGE_ENABLED", "1"),
            ("GATESYNC_MODE", "dry-run"),
            ("DEBUG", "true"),
        ])
        .unwrap();

        assert_eq!(config.limits.list_item_size, 500);
        assert!(config.rules.block_based_on_sni);
        assert!(config.rules.block_page_enabled);
        assert!(config.dry_run);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn invalid_number_fails() {
        let result = load(&[
            ("CLOUDFLARE_ACCOUNT_ID", "acc"),
            ("CLOUDFLARE_API_TOKEN", "token"),
            ("CLOUDFLARE_LIST_ITEM_LIMIT", "lots"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn retry_bounds_are_validated() {
        let config = load(&[
            ("CLOUDFLARE_ACCOUNT_ID", "acc"),
            ("CLOUDFLARE_API_TOKEN", "token"),
            ("GATESYNC_RETRY_DELAY_SECS", "0"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }
}
