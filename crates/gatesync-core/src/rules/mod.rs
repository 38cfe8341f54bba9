//! Managed rule reconciliation
//!
//! A managed rule is keyed by its exact name within an account. Reconciling
//! is a two-state decision:
//!
//! ```text
//!   lookup ──► Absent  ──► create ──► Created
//!          └─► Present ──► update ──► Updated (same id)
//! ```
//!
//! Running the create flow any number of times leaves at most one live rule
//! per (account, rule name).

use tracing::{debug, error, info, warn};

use crate::config::{AccountConfig, ManagedNames, RuleOptions};
use crate::error::{Error, Result};
use crate::expression::{DNS_DOMAINS_FIELD, SNI_DOMAINS_FIELD, build_expression};
use crate::traits::{
    GatewayApi, RemoteRule, RuleAction, RulePayload, RuleSettings, TrafficFilter,
};

/// Description attached to every managed rule
pub const RULE_DESCRIPTION: &str = "Filter lists created by gatesync. Avoid editing this rule. \
     Changing the name of this rule will break the sync.";

/// The managed rules gatesync maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Matches resolved names in DNS traffic
    Dns,
    /// Matches the TLS server name in proxied traffic
    Sni,
}

impl RuleKind {
    /// Field the rule expression matches on
    pub fn field_path(&self) -> &'static str {
        match self {
            RuleKind::Dns => DNS_DOMAINS_FIELD,
            RuleKind::Sni => SNI_DOMAINS_FIELD,
        }
    }

    /// Traffic classes the rule applies to
    pub fn filters(&self) -> Vec<TrafficFilter> {
        match self {
            RuleKind::Dns => vec![TrafficFilter::Dns],
            RuleKind::Sni => vec![TrafficFilter::L4],
        }
    }

    /// Rule name under `names`
    pub fn rule_name<'n>(&self, names: &'n ManagedNames) -> &'n str {
        match self {
            RuleKind::Dns => &names.rule_name,
            RuleKind::Sni => &names.sni_rule_name,
        }
    }

    /// Short label for log lines
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::Dns => "DNS",
            RuleKind::Sni => "SNI",
        }
    }

    /// Kinds enabled by `options`, in creation order
    pub fn enabled(options: &RuleOptions) -> Vec<RuleKind> {
        if options.block_based_on_sni {
            vec![RuleKind::Dns, RuleKind::Sni]
        } else {
            vec![RuleKind::Dns]
        }
    }
}

/// Result of looking up a rule by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertDecision {
    /// No rule with the name exists; create one
    Absent,
    /// A rule with the name exists; update it in place
    Present {
        /// Id of the existing rule
        rule_id: String,
    },
}

impl UpsertDecision {
    /// Decide from a lookup result
    ///
    /// `None` (no result) and a list without an exact name match are both
    /// [`UpsertDecision::Absent`].
    pub fn from_lookup(rules: Option<&[RemoteRule]>, name: &str) -> Self {
        rules
            .and_then(|rules| rules.iter().find(|rule| rule.name == name))
            .map_or(UpsertDecision::Absent, |rule| UpsertDecision::Present {
                rule_id: rule.id.clone(),
            })
    }
}

/// Terminal state of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new rule was created
    Created(RemoteRule),
    /// The existing rule was replaced
    Updated(RemoteRule),
}

impl UpsertOutcome {
    /// The resulting rule
    pub fn rule(&self) -> &RemoteRule {
        match self {
            UpsertOutcome::Created(rule) | UpsertOutcome::Updated(rule) => rule,
        }
    }

    /// Whether the upsert created a new rule
    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// Upserts and deletes managed rules for one account at a time
pub struct RuleReconciler<'a> {
    gateway: &'a dyn GatewayApi,
    names: &'a ManagedNames,
    options: &'a RuleOptions,
}

impl<'a> RuleReconciler<'a> {
    /// Create a reconciler over `gateway`
    pub fn new(
        gateway: &'a dyn GatewayApi,
        names: &'a ManagedNames,
        options: &'a RuleOptions,
    ) -> Self {
        Self {
            gateway,
            names,
            options,
        }
    }

    /// Full rule body for `name`
    pub fn payload(&self, name: &str, filters: &[TrafficFilter], expression: &str) -> RulePayload {
        RulePayload {
            name: name.to_string(),
            description: RULE_DESCRIPTION.to_string(),
            enabled: true,
            action: RuleAction::Block,
            rule_settings: RuleSettings {
                block_page_enabled: self.options.block_page_enabled,
                block_reason: self.options.block_reason.clone(),
            },
            filters: filters.to_vec(),
            traffic: expression.to_string(),
        }
    }

    /// Look up `name` in `account`
    ///
    /// A failed lookup is logged and treated as [`UpsertDecision::Absent`].
    pub async fn decide(&self, account: &AccountConfig, name: &str) -> UpsertDecision {
        match self.gateway.list_rules(account).await {
            Ok(Some(rules)) => UpsertDecision::from_lookup(Some(rules.as_slice()), name),
            Ok(None) => {
                info!(
                    "No existing rules found for Account {}, creating new rule \"{}\"",
                    account.account_number, name
                );
                UpsertDecision::Absent
            }
            Err(e) => {
                warn!(
                    "Rule lookup failed for Account {} ({}), creating new rule \"{}\"",
                    account.account_number, e, name
                );
                UpsertDecision::Absent
            }
        }
    }

    /// Create or update the rule `name` of `account` to match `expression`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for an empty expression (nothing is sent)
    /// - The remote error of the create or update call
    pub async fn upsert_rule(
        &self,
        expression: &str,
        name: &str,
        filters: &[TrafficFilter],
        account: &AccountConfig,
    ) -> Result<UpsertOutcome> {
        if expression.trim().is_empty() {
            return Err(Error::invalid_input(format!(
                "Refusing to submit rule \"{}\" with an empty expression",
                name
            )));
        }

        let payload = self.payload(name, filters, expression);

        let outcome = match self.decide(account, name).await {
            UpsertDecision::Present { rule_id } => {
                debug!("Found \"{}\" in rules, updating...", name);
                self.gateway
                    .update_rule(account, &rule_id, &payload)
                    .await
                    .map(UpsertOutcome::Updated)
            }
            UpsertDecision::Absent => {
                debug!("No existing rule named \"{}\", creating...", name);
                self.gateway
                    .create_rule(account, &payload)
                    .await
                    .map(UpsertOutcome::Created)
            }
        };

        match outcome {
            Ok(mut outcome) => {
                match &mut outcome {
                    UpsertOutcome::Created(rule) | UpsertOutcome::Updated(rule) => {
                        rule.account_id = account.account_id.clone();
                    }
                }
                info!(
                    "{} rule \"{}\" for Account {}",
                    if outcome.is_created() { "Created" } else { "Updated" },
                    name,
                    account.account_number
                );
                Ok(outcome)
            }
            Err(e) => {
                error!("Error upserting rule \"{}\": {}", name, e);
                Err(e)
            }
        }
    }

    /// Build the expression for `kind` over `list_ids` and upsert it
    ///
    /// Returns `Ok(None)` without any remote call when `list_ids` is empty.
    pub async fn upsert_kind<S: AsRef<str>>(
        &self,
        kind: RuleKind,
        list_ids: &[S],
        account: &AccountConfig,
    ) -> Result<Option<UpsertOutcome>> {
        let expression = build_expression(list_ids, kind.field_path());
        if expression.is_empty() {
            warn!(
                "No lists for Account {}, skipping {} rule",
                account.account_number,
                kind.label()
            );
            return Ok(None);
        }

        info!(
            "Creating {} rule for Account {}...",
            kind.label(),
            account.account_number
        );
        self.upsert_rule(&expression, kind.rule_name(self.names), &kind.filters(), account)
            .await
            .map(Some)
    }

    /// Fetch the managed rules of `account`
    ///
    /// Matches the configured rule name exactly or as a prefix, which covers
    /// the SNI rule. An absent result is an empty set.
    pub async fn managed_rules(&self, account: &AccountConfig) -> Result<Vec<RemoteRule>> {
        let Some(rules) = self.gateway.list_rules(account).await? else {
            warn!(
                "No rules found for Account {} (API returned an empty response)",
                account.account_number
            );
            return Ok(Vec::new());
        };

        Ok(rules
            .into_iter()
            .filter(|rule| rule.name.starts_with(&self.names.rule_name))
            .map(|mut rule| {
                rule.account_id = account.account_id.clone();
                rule
            })
            .collect())
    }

    /// Delete every managed rule of `account`, one call per rule
    ///
    /// Returns the number of deleted rules. No managed rules is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::PartialDelete`] when a delete fails; earlier deletes stand.
    pub async fn delete_managed_rules(&self, account: &AccountConfig) -> Result<usize> {
        let rules = self.managed_rules(account).await?;

        if rules.is_empty() {
            info!("No managed rules found for Account {}", account.account_number);
            return Ok(0);
        }

        let mut remaining = rules.len();
        for rule in &rules {
            info!("Deleting rule {}...", rule.name);
            if let Err(e) = self.gateway.delete_rule(account, &rule.id).await {
                error!("Error occurred while deleting rule {} - {}", rule.name, e);
                return Err(Error::PartialDelete {
                    resource: "rule",
                    deleted: rules.len() - remaining,
                    remaining,
                    source: Box::new(e),
                });
            }
            remaining -= 1;
        }

        info!(
            "Deleted {} rules for Account {}",
            rules.len(),
            account.account_number
        );
        Ok(rules.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, name: &str) -> RemoteRule {
        RemoteRule {
            id: id.to_string(),
            name: name.to_string(),
            filters: vec!["dns".to_string()],
            traffic: String::new(),
            enabled: true,
            account_id: String::new(),
        }
    }

    #[test]
    fn decision_absent_without_result() {
        assert_eq!(
            UpsertDecision::from_lookup(None, "Gatesync Filter Lists"),
            UpsertDecision::Absent
        );
    }

    #[test]
    fn decision_requires_exact_name() {
        let rules = vec![rule("1", "Gatesync Filter Lists - SNI Based Filtering")];
        assert_eq!(
            UpsertDecision::from_lookup(Some(rules.as_slice()), "Gatesync Filter Lists"),
            UpsertDecision::Absent
        );
    }

    #[test]
    fn decision_present_keeps_id() {
        let rules = vec![rule("7", "Other"), rule("9", "Gatesync Filter Lists")];
        assert_eq!(
            UpsertDecision::from_lookup(Some(rules.as_slice()), "Gatesync Filter Lists"),
            UpsertDecision::Present {
                rule_id: "9".to_string()
            }
        );
    }

    #[test]
    fn kinds_follow_sni_flag() {
        let mut options = RuleOptions::default();
        assert_eq!(RuleKind::enabled(&options), vec![RuleKind::Dns]);

        options.block_based_on_sni = true;
        assert_eq!(RuleKind::enabled(&options), vec![RuleKind::Dns, RuleKind::Sni]);
    }

    #[test]
    fn kind_wiring() {
        let names = ManagedNames::default();
        assert_eq!(RuleKind::Sni.filters(), vec![TrafficFilter::L4]);
        assert_eq!(RuleKind::Sni.field_path(), "net.sni.domains[*]");
        assert_eq!(
            RuleKind::Sni.rule_name(&names),
            "Gatesync Filter Lists - SNI Based Filtering"
        );
        assert_eq!(RuleKind::Dns.filters(), vec![TrafficFilter::Dns]);
    }
}
