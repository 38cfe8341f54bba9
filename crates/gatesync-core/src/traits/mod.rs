//! Core traits for the gatesync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`GatewayApi`]: Create, enumerate, and delete remote lists and rules

pub mod gateway;

pub use gateway::{
    GatewayApi, RemoteList, RemoteRule, RuleAction, RulePayload, RuleSettings, TrafficFilter,
};
