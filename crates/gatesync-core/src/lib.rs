// # gatesync-core
//
// Core library for syncing domain filter lists into gateway accounts.
//
// ## Architecture Overview
//
// This library provides the core functionality for list and rule sync:
// - **GatewayApi**: Trait for the remote list/rule API of a filtering service
// - **partition**: Deterministic split of domains into chunks and accounts
// - **ListSynchronizer**: Creates and deletes managed lists per account
// - **RuleReconciler**: Upserts and deletes managed rules per account
// - **Orchestrator**: Drives the create and delete flows across accounts
// - **DomainSet**: Blocklist/allowlist loading and normalization
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from the HTTP client
// 2. **Library-First**: All core functionality can be used as a library
// 3. **Idempotency**: Rules are keyed by name, so repeated runs update in place
// 4. **Pre-flight Checks**: Capacity is verified before any remote call

pub mod traits;
pub mod partition;
pub mod lists;
pub mod expression;
pub mod rules;
pub mod engine;
pub mod config;
pub mod error;
pub mod source;

// Re-export core types for convenience
pub use traits::{GatewayApi, RemoteList, RemoteRule, RulePayload, TrafficFilter};
pub use engine::{AccountOutcome, AccountReport, AccountSummary, Operation, Orchestrator, RunReport};
pub use partition::{AccountShare, ListChunk, partition};
pub use lists::ListSynchronizer;
pub use rules::{RuleKind, RuleReconciler, UpsertDecision, UpsertOutcome};
pub use config::{AccountConfig, Credentials, ListLimits, ManagedNames, RuleOptions, SyncConfig};
pub use error::{Error, Result};
pub use source::DomainSet;
