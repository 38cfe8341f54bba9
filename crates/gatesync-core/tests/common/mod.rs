//! Test doubles and common utilities for contract tests
//!
//! `FakeGateway` keeps lists and rules in memory per account. Clones share
//! state, so a test can hand one clone to the orchestrator and inspect the
//! other afterwards.

#![allow(dead_code)]

use gatesync_core::config::{AccountConfig, ListLimits, SyncConfig};
use gatesync_core::error::{Error, Result};
use gatesync_core::traits::{GatewayApi, RemoteList, RemoteRule, RulePayload};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Remote operations recorded by the fake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListLists,
    CreateList,
    DeleteList,
    ListRules,
    CreateRule,
    UpdateRule,
    DeleteRule,
}

#[derive(Default)]
struct State {
    lists: HashMap<String, Vec<RemoteList>>,
    rules: HashMap<String, Vec<RemoteRule>>,
    next_id: usize,
    calls: Vec<(Op, String)>,
    /// account id → successful create_list calls allowed before failing
    create_list_budget: HashMap<String, usize>,
    /// account id → successful delete_list calls allowed before failing
    delete_list_budget: HashMap<String, usize>,
    /// account id → successful delete_rule calls allowed before failing
    delete_rule_budget: HashMap<String, usize>,
    failing_accounts: HashSet<String>,
    failing_upserts: HashSet<String>,
    failing_rule_lookups: HashSet<String>,
    absent_results: bool,
    items: HashMap<String, Vec<String>>,
    payloads: Vec<(String, RulePayload)>,
}

/// In-memory gateway
#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<State>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call against `account_id` fails with a server error
    pub fn fail_account(&self, account_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_accounts
            .insert(account_id.to_string());
    }

    /// create_list for `account_id` fails after `after` successes
    pub fn fail_create_list_after(&self, account_id: &str, after: usize) {
        self.state
            .lock()
            .unwrap()
            .create_list_budget
            .insert(account_id.to_string(), after);
    }

    /// delete_list for `account_id` fails after `after` successes
    pub fn fail_delete_list_after(&self, account_id: &str, after: usize) {
        self.state
            .lock()
            .unwrap()
            .delete_list_budget
            .insert(account_id.to_string(), after);
    }

    /// delete_rule for `account_id` fails after `after` successes
    pub fn fail_delete_rule_after(&self, account_id: &str, after: usize) {
        self.state
            .lock()
            .unwrap()
            .delete_rule_budget
            .insert(account_id.to_string(), after);
    }

    /// create_rule and update_rule for `account_id` fail
    pub fn fail_upsert(&self, account_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_upserts
            .insert(account_id.to_string());
    }

    /// list_rules for `account_id` fails
    pub fn fail_rule_lookup(&self, account_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_rule_lookups
            .insert(account_id.to_string());
    }

    /// list_lists and list_rules return no result at all
    pub fn return_absent_results(&self) {
        self.state.lock().unwrap().absent_results = true;
    }

    /// Store a list without recording a call
    pub fn seed_list(&self, account_id: &str, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "list");
        state
            .lists
            .entry(account_id.to_string())
            .or_default()
            .push(RemoteList {
                id: id.clone(),
                name: name.to_string(),
                account_id: String::new(),
            });
        id
    }

    /// Store a rule without recording a call
    pub fn seed_rule(&self, account_id: &str, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "rule");
        state
            .rules
            .entry(account_id.to_string())
            .or_default()
            .push(RemoteRule {
                id: id.clone(),
                name: name.to_string(),
                filters: vec!["dns".to_string()],
                traffic: String::new(),
                enabled: true,
                account_id: String::new(),
            });
        id
    }

    /// Lists currently stored for `account_id`
    pub fn lists(&self, account_id: &str) -> Vec<RemoteList> {
        self.state
            .lock()
            .unwrap()
            .lists
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Rules currently stored for `account_id`
    pub fn rules(&self, account_id: &str) -> Vec<RemoteRule> {
        self.state
            .lock()
            .unwrap()
            .rules
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of calls of `op`, across accounts
    pub fn calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .count()
    }

    /// Number of calls of `op` against `account_id`
    pub fn calls_for(&self, op: Op, account_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(o, a)| *o == op && a == account_id)
            .count()
    }

    /// Every call in order, as (operation, account id)
    pub fn call_log(&self) -> Vec<(Op, String)> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Domains uploaded into `list_id`
    pub fn items(&self, list_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .items
            .get(list_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Total remote calls of any kind
    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Rule payloads submitted by create_rule and update_rule, in order
    pub fn payloads(&self) -> Vec<(String, RulePayload)> {
        self.state.lock().unwrap().payloads.clone()
    }

    fn enter(&self, op: Op, account: &AccountConfig) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((op, account.account_id.clone()));
        if state.failing_accounts.contains(&account.account_id) {
            return Err(Error::unavailable(format!(
                "502 Bad Gateway for {}",
                account.account_id
            )));
        }
        Ok(state)
    }
}

fn next_id(state: &mut State, kind: &str) -> String {
    state.next_id += 1;
    format!("{}-{}", kind, state.next_id)
}

fn take_budget(budget: &mut HashMap<String, usize>, account_id: &str) -> bool {
    match budget.get_mut(account_id) {
        Some(0) => false,
        Some(left) => {
            *left -= 1;
            true
        }
        None => true,
    }
}

#[async_trait::async_trait]
impl GatewayApi for FakeGateway {
    async fn list_lists(&self, account: &AccountConfig) -> Result<Option<Vec<RemoteList>>> {
        let state = self.enter(Op::ListLists, account)?;
        if state.absent_results {
            return Ok(None);
        }
        Ok(Some(
            state.lists.get(&account.account_id).cloned().unwrap_or_default(),
        ))
    }

    async fn create_list(
        &self,
        account: &AccountConfig,
        name: &str,
        items: &[String],
    ) -> Result<RemoteList> {
        let mut state = self.enter(Op::CreateList, account)?;
        if !take_budget(&mut state.create_list_budget, &account.account_id) {
            return Err(Error::unavailable("create_list rejected"));
        }
        let list = RemoteList {
            id: next_id(&mut state, "list"),
            name: name.to_string(),
            account_id: String::new(),
        };
        state.items.insert(list.id.clone(), items.to_vec());
        state
            .lists
            .entry(account.account_id.clone())
            .or_default()
            .push(list.clone());
        Ok(list)
    }

    async fn delete_list(&self, account: &AccountConfig, list_id: &str) -> Result<()> {
        let mut state = self.enter(Op::DeleteList, account)?;
        if !take_budget(&mut state.delete_list_budget, &account.account_id) {
            return Err(Error::unavailable("delete_list rejected"));
        }
        if let Some(lists) = state.lists.get_mut(&account.account_id) {
            lists.retain(|list| list.id != list_id);
        }
        Ok(())
    }

    async fn list_rules(&self, account: &AccountConfig) -> Result<Option<Vec<RemoteRule>>> {
        let state = self.enter(Op::ListRules, account)?;
        if state.failing_rule_lookups.contains(&account.account_id) {
            return Err(Error::unavailable("rule lookup failed"));
        }
        if state.absent_results {
            return Ok(None);
        }
        Ok(Some(
            state.rules.get(&account.account_id).cloned().unwrap_or_default(),
        ))
    }

    async fn create_rule(&self, account: &AccountConfig, rule: &RulePayload) -> Result<RemoteRule> {
        let mut state = self.enter(Op::CreateRule, account)?;
        if state.failing_upserts.contains(&account.account_id) {
            return Err(Error::provider("fake", "create_rule rejected"));
        }
        state
            .payloads
            .push((account.account_id.clone(), rule.clone()));
        let created = RemoteRule {
            id: next_id(&mut state, "rule"),
            name: rule.name.clone(),
            filters: rule.filters.iter().map(|f| f.as_str().to_string()).collect(),
            traffic: rule.traffic.clone(),
            enabled: rule.enabled,
            account_id: String::new(),
        };
        state
            .rules
            .entry(account.account_id.clone())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_rule(
        &self,
        account: &AccountConfig,
        rule_id: &str,
        rule: &RulePayload,
    ) -> Result<RemoteRule> {
        let mut state = self.enter(Op::UpdateRule, account)?;
        if state.failing_upserts.contains(&account.account_id) {
            return Err(Error::provider("fake", "update_rule rejected"));
        }
        state
            .payloads
            .push((account.account_id.clone(), rule.clone()));
        let existing = state
            .rules
            .get_mut(&account.account_id)
            .and_then(|rules| rules.iter_mut().find(|r| r.id == rule_id))
            .ok_or_else(|| Error::not_found(format!("rule {}", rule_id)))?;
        existing.name = rule.name.clone();
        existing.traffic = rule.traffic.clone();
        existing.enabled = rule.enabled;
        Ok(existing.clone())
    }

    async fn delete_rule(&self, account: &AccountConfig, rule_id: &str) -> Result<()> {
        let mut state = self.enter(Op::DeleteRule, account)?;
        if !take_budget(&mut state.delete_rule_budget, &account.account_id) {
            return Err(Error::unavailable("delete_rule rejected"));
        }
        if let Some(rules) = state.rules.get_mut(&account.account_id) {
            rules.retain(|rule| rule.id != rule_id);
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// Accounts `acc-1` .. `acc-n`, numbered from 1
pub fn accounts(n: usize) -> Vec<AccountConfig> {
    (1..=n)
        .map(|i| AccountConfig::with_token(format!("acc-{}", i), i, format!("token-{}", i)))
        .collect()
}

/// Domains `d0.example` .. `d{n-1}.example`
pub fn domains(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("d{}.example", i)).collect()
}

/// Config with small limits: `size` domains per list, `limit - 1` per account
pub fn small_config(n_accounts: usize, size: usize, limit: usize) -> SyncConfig {
    SyncConfig::new(accounts(n_accounts)).with_limits(ListLimits {
        list_item_size: size,
        list_item_limit: limit,
    })
}
