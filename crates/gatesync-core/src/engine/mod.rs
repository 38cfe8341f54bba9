//! Multi-account orchestrator
//!
//! The Orchestrator drives the create and delete flows across every
//! configured account.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   domains ────► │ Orchestrator │ ◄──── SyncConfig
//!                 └──────────────┘
//!                        │ per account
//!       ┌────────────────┼─────────────────┬──────────────────┐
//!       ▼                ▼                 ▼                  ▼
//! ┌───────────┐  ┌────────────────┐  ┌────────────┐  ┌────────────────┐
//! │ partition │  │ListSynchronizer│  │ expression │  │ RuleReconciler │
//! └───────────┘  └────────────────┘  └────────────┘  └────────────────┘
//!                        │                                    │
//!                        └──────────► GatewayApi ◄────────────┘
//! ```
//!
//! ## Error propagation
//!
//! Two tiers:
//! 1. Inside one account the first remote failure ends that account's work.
//! 2. Across accounts failures are recorded in the [`RunReport`] and the
//!    next account proceeds.
//!
//! Only pre-flight errors (no accounts, invalid configuration, capacity
//! shortfall) are returned as `Err` for the whole run, and they are raised
//! before any remote call.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::{AccountConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::lists::ListSynchronizer;
use crate::partition::{AccountShare, partition};
use crate::rules::{RuleKind, RuleReconciler, UpsertOutcome};
use crate::traits::GatewayApi;

/// Which flow a report describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Upload lists and upsert rules
    Upload,
    /// Upsert rules over lists already present remotely
    CreateRules,
    /// Delete managed rules and lists
    Delete,
}

impl Operation {
    fn label(&self) -> &'static str {
        match self {
            Operation::Upload => "List upload",
            Operation::CreateRules => "Rule create",
            Operation::Delete => "Delete",
        }
    }
}

/// Work done for one account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSummary {
    /// Lists created
    pub lists_created: usize,
    /// Lists deleted
    pub lists_deleted: usize,
    /// Rules deleted
    pub rules_deleted: usize,
    /// Rule upserts, in the order they ran
    pub rules: Vec<UpsertOutcome>,
}

/// How one account's iteration ended
#[derive(Debug)]
pub enum AccountOutcome {
    /// Every step completed
    Succeeded(AccountSummary),
    /// Nothing to do for the account
    Skipped {
        /// Why the account was skipped
        reason: String,
    },
    /// A remote call failed; later steps for the account were not attempted
    Failed {
        /// The failure
        error: Error,
    },
}

/// Outcome of one account within a run
#[derive(Debug)]
pub struct AccountReport {
    /// Account number
    pub account_number: usize,
    /// Account id
    pub account_id: String,
    /// Outcome
    pub outcome: AccountOutcome,
}

impl AccountReport {
    fn new(account: &AccountConfig, outcome: AccountOutcome) -> Self {
        Self {
            account_number: account.account_number,
            account_id: account.account_id.clone(),
            outcome,
        }
    }

    /// Whether the account completed
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AccountOutcome::Succeeded(_))
    }

    /// Whether the account failed
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, AccountOutcome::Failed { .. })
    }

    fn summary(&self) -> Option<&AccountSummary> {
        match &self.outcome {
            AccountOutcome::Succeeded(summary) => Some(summary),
            _ => None,
        }
    }
}

/// Aggregate outcome of a run
#[derive(Debug)]
pub struct RunReport {
    /// Flow that ran
    pub operation: Operation,
    /// Start of the run
    pub started_at: DateTime<Utc>,
    /// End of the run
    pub finished_at: DateTime<Utc>,
    /// One entry per configured account, in account order
    pub accounts: Vec<AccountReport>,
}

impl RunReport {
    /// Numbers of the accounts that completed
    pub fn succeeded(&self) -> Vec<usize> {
        self.numbers(AccountReport::is_success)
    }

    /// Numbers of the accounts that failed
    pub fn failed(&self) -> Vec<usize> {
        self.numbers(AccountReport::is_failure)
    }

    /// Numbers of the accounts that were skipped
    pub fn skipped(&self) -> Vec<usize> {
        self.numbers(|report| matches!(report.outcome, AccountOutcome::Skipped { .. }))
    }

    /// Whether any account failed
    pub fn has_failures(&self) -> bool {
        self.accounts.iter().any(AccountReport::is_failure)
    }

    /// Lists created across accounts
    pub fn lists_created(&self) -> usize {
        self.total(|summary| summary.lists_created)
    }

    /// Lists deleted across accounts
    pub fn lists_deleted(&self) -> usize {
        self.total(|summary| summary.lists_deleted)
    }

    /// Rules deleted across accounts
    pub fn rules_deleted(&self) -> usize {
        self.total(|summary| summary.rules_deleted)
    }

    /// Rules created or updated across accounts
    pub fn rules_upserted(&self) -> usize {
        self.total(|summary| summary.rules.len())
    }

    /// Human-readable one-line summary, used for the webhook notification
    pub fn summary(&self) -> String {
        let span = match self.accounts.len() {
            1 => String::new(),
            n => format!(" across {} accounts", n),
        };

        let counts = match self.operation {
            Operation::Upload => format!(
                "{} lists created, {} rules upserted",
                self.lists_created(),
                self.rules_upserted()
            ),
            Operation::CreateRules => format!("{} rules upserted", self.rules_upserted()),
            Operation::Delete => format!(
                "{} rules and {} lists deleted",
                self.rules_deleted(),
                self.lists_deleted()
            ),
        };

        let mut message = format!(
            "{} finished running{} ({}) in {}s",
            self.operation.label(),
            span,
            counts,
            (self.finished_at - self.started_at).num_seconds()
        );

        let failed = self.failed();
        if !failed.is_empty() {
            let numbers: Vec<String> = failed.iter().map(ToString::to_string).collect();
            message.push_str(&format!("; failed accounts: {}", numbers.join(", ")));
        }

        message
    }

    fn numbers(&self, predicate: impl Fn(&AccountReport) -> bool) -> Vec<usize> {
        self.accounts
            .iter()
            .filter(|report| predicate(*report))
            .map(|report| report.account_number)
            .collect()
    }

    fn total(&self, count: impl Fn(&AccountSummary) -> usize) -> usize {
        self.accounts
            .iter()
            .filter_map(AccountReport::summary)
            .map(count)
            .sum()
    }
}

/// Multi-account orchestrator
///
/// Owns the gateway client and the run configuration. Every flow re-reads
/// remote state; nothing is cached between runs.
///
/// ## Threading
///
/// All remote calls are issued sequentially: accounts one after another,
/// and within an account chunks and rules one after another.
pub struct Orchestrator {
    /// Remote filtering service
    gateway: Box<dyn GatewayApi>,

    /// Accounts, limits, names, and rule flags
    config: SyncConfig,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the configuration is invalid or has no accounts.
    pub fn new(gateway: Box<dyn GatewayApi>, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { gateway, config })
    }

    /// The run configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn lists(&self) -> ListSynchronizer<'_> {
        ListSynchronizer::new(self.gateway.as_ref(), &self.config.names)
    }

    fn rules(&self) -> RuleReconciler<'_> {
        RuleReconciler::new(
            self.gateway.as_ref(),
            &self.config.names,
            &self.config.rules,
        )
    }

    /// Verify that `domains` fit the configured accounts, without any remote
    /// call
    ///
    /// # Errors
    ///
    /// [`Error::Capacity`] or [`Error::Config`], as [`run_create`](Self::run_create)
    /// would raise them.
    pub fn preflight(&self, domains: &[String]) -> Result<()> {
        partition(domains, &self.config.limits, &self.config.accounts).map(|_| ())
    }

    /// Upload `domains` as managed lists and upsert the managed rules
    ///
    /// # Errors
    ///
    /// Pre-flight only: [`Error::Capacity`] or [`Error::Config`]. Remote
    /// failures are reported per account in the [`RunReport`].
    pub async fn run_create(&self, domains: &[String]) -> Result<RunReport> {
        let started_at = Utc::now();

        let shares = partition(domains, &self.config.limits, &self.config.accounts)?;
        let multi_account = self.config.is_multi_account();

        if multi_account {
            info!(
                "Distributing {} domains across {} accounts ({} domains per account)",
                domains.len(),
                shares.len(),
                self.config.limits.usable_per_account()
            );
        }

        let mut accounts = Vec::with_capacity(shares.len());
        for share in &shares {
            let outcome = if share.chunks.is_empty() {
                info!(
                    "No domains assigned to Account {}, skipping",
                    share.account.account_number
                );
                AccountOutcome::Skipped {
                    reason: "no domains assigned".to_string(),
                }
            } else {
                Self::settle(
                    &share.account,
                    self.create_for_account(share, multi_account).await,
                )
            };
            accounts.push(AccountReport::new(&share.account, outcome));
        }

        Ok(self.finish(Operation::Upload, started_at, accounts))
    }

    async fn create_for_account(
        &self,
        share: &AccountShare,
        multi_account: bool,
    ) -> Result<AccountSummary> {
        let account = &share.account;
        info!(
            "Creating lists for Account {} ({} domains, domains {}-{})",
            account.account_number,
            share.domain_count(),
            share.offset + 1,
            share.offset + share.domain_count()
        );

        let lists = self
            .lists()
            .create_lists(account, &share.chunks, multi_account)
            .await?;
        let ids: Vec<&str> = lists.iter().map(|list| list.id.as_str()).collect();
        let rules = self.upsert_rules(account, &ids).await?;

        Ok(AccountSummary {
            lists_created: lists.len(),
            rules,
            ..AccountSummary::default()
        })
    }

    /// Upsert the managed rules over the managed lists already present in
    /// each account
    ///
    /// Accounts without managed lists are skipped.
    pub async fn run_create_rules(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        info!(
            "Creating rules across {} accounts...",
            self.config.accounts.len()
        );

        let mut accounts = Vec::with_capacity(self.config.accounts.len());
        for account in &self.config.accounts {
            info!("Creating rules for Account {}...", account.account_number);
            let outcome = match self.lists().managed_lists(account).await {
                Ok(lists) if lists.is_empty() => {
                    warn!(
                        "No lists found for Account {}, skipping rule creation.",
                        account.account_number
                    );
                    AccountOutcome::Skipped {
                        reason: "no managed lists".to_string(),
                    }
                }
                Ok(lists) => {
                    let ids: Vec<&str> = lists.iter().map(|list| list.id.as_str()).collect();
                    let result = self.upsert_rules(account, &ids).await.map(|rules| {
                        AccountSummary {
                            rules,
                            ..AccountSummary::default()
                        }
                    });
                    Self::settle(account, result)
                }
                Err(e) => Self::settle(account, Err(e)),
            };
            accounts.push(AccountReport::new(account, outcome));
        }

        Ok(self.finish(Operation::CreateRules, started_at, accounts))
    }

    async fn upsert_rules(&self, account: &AccountConfig, ids: &[&str]) -> Result<Vec<UpsertOutcome>> {
        let reconciler = self.rules();
        let mut outcomes = Vec::new();

        for kind in RuleKind::enabled(&self.config.rules) {
            if let Some(outcome) = reconciler.upsert_kind(kind, ids, account).await? {
                outcomes.push(outcome);
            }
        }

        Ok(outcomes)
    }

    /// Delete managed rules, then managed lists, in every account
    ///
    /// Rules go first so no live rule references a deleted list.
    pub async fn run_delete(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        info!(
            "Deleting rules and lists across {} accounts...",
            self.config.accounts.len()
        );

        let mut accounts = Vec::with_capacity(self.config.accounts.len());
        for account in &self.config.accounts {
            let outcome = Self::settle(account, self.delete_for_account(account).await);
            accounts.push(AccountReport::new(account, outcome));
        }

        Ok(self.finish(Operation::Delete, started_at, accounts))
    }

    async fn delete_for_account(&self, account: &AccountConfig) -> Result<AccountSummary> {
        info!("Deleting rules for Account {}", account.account_number);
        let rules_deleted = self.rules().delete_managed_rules(account).await?;

        info!("Deleting lists for Account {}", account.account_number);
        let lists_deleted = self.lists().delete_managed_lists(account).await?;

        Ok(AccountSummary {
            lists_deleted,
            rules_deleted,
            ..AccountSummary::default()
        })
    }

    /// Convert one account's result into its outcome, logging failures
    fn settle(account: &AccountConfig, result: Result<AccountSummary>) -> AccountOutcome {
        match result {
            Ok(summary) => AccountOutcome::Succeeded(summary),
            Err(error) => {
                error!(
                    "Error processing Account {}: {}",
                    account.account_number, error
                );
                info!("Skipping Account {} due to error", account.account_number);
                AccountOutcome::Failed { error }
            }
        }
    }

    fn finish(
        &self,
        operation: Operation,
        started_at: DateTime<Utc>,
        accounts: Vec<AccountReport>,
    ) -> RunReport {
        let report = RunReport {
            operation,
            started_at,
            finished_at: Utc::now(),
            accounts,
        };

        if report.has_failures() {
            warn!("{}", report.summary());
        } else {
            info!("{}", report.summary());
        }

        report
    }
}
