//! skyforge Cloud Infrastructure
//!
//! This crate provides the provider-independent half of skyforge: resource
//! descriptors, the dependency graph, plan/apply bookkeeping and the local
//! state file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  skyforge CLI                    │
//! │           (plan / apply / destroy)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │ ResourceSet
//! ┌─────────────────▼───────────────────────────────┐
//! │                 skyforge-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudProvider { plan, apply, … }  │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │  │   Graph    │ │  Executor  │ │ State Mgmt │   │
//! │  │  (waves)   │ │ (per wave) │ │            │   │
//! │  └────────────┘ └────────────┘ └────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │  google-cloud │
//!           │   provider    │
//!           └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod executor;
pub mod graph;
pub mod provider;
pub mod reference;
pub mod state;
pub mod wait;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use error::{CloudError, Result};
pub use graph::DependencyGraph;
pub use provider::{AuthStatus, CloudProvider, Lifecycle, ResourceConfig, ResourceSet};
pub use reference::{AttrRef, Attributes};
pub use state::{
    GlobalState, ProviderState, ResourceState, ResourceStatus, StateLock, StateManager,
};
pub use wait::{WaitConfig, wait_until};
