//! # opengear-om - Desired-state configuration for Opengear OM appliances
//!
//! Each resource module compares declared configuration against the facts
//! read from an Opengear OM/CM8100 console server and computes the REST
//! commands that bring the device to the requested state.
//!
//! ## Core Concepts
//!
//! - **Resources**: users, groups, conns, pdus, physifs, ports, static routes,
//!   services, system and failover settings
//! - **States**: `merged`, `replaced`, `overridden`, `deleted`, `gathered`, `rendered`
//! - **Commands**: `{path, method, data}` triples sent through a [`DeviceClient`](connection::DeviceClient)
//! - **Facts**: the current device state, shaped like module configuration
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  ModuleRegistry (om_users, ...)                  │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │      ResourceModule: gather facts -> plan -> apply -> report     │
//! └──────────────────────────────────────────────────────────────────┘
//!          │                      │                       │
//!          ▼                      ▼                       ▼
//! ┌─────────────────┐   ┌───────────────────┐   ┌───────────────────┐
//! │  FactsProvider  │   │    Reconcilers    │   │   DeviceClient    │
//! │ (device facts)  │   │ (identity, diff,  │   │ (GET/PUT/POST/    │
//! │                 │   │  command builder) │   │  DELETE)          │
//! └─────────────────┘   └───────────────────┘   └───────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use opengear_om::prelude::*;
//! use std::sync::Arc;
//!
//! let client: Arc<dyn DeviceClient> = Arc::new(my_rest_client);
//! let context = ModuleContext::new(client);
//! let registry = ModuleRegistry::with_builtins();
//!
//! let mut params = ModuleParams::new();
//! params.insert("state".into(), serde_json::json!("merged"));
//! params.insert("config".into(), serde_json::json!([{"groupname": "netops", "role": "Admin"}]));
//!
//! let output = registry.execute("om_groups", &params, &context)?;
//! println!("changed: {}", output.changed);
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Device capability
    pub use crate::connection::{ConnectionError, ConnectionResult, DeviceClient, Method, Response};

    // Error handling
    pub use crate::error::{Error, Result};

    // Facts
    pub use crate::facts::{DeviceFacts, Facts, FactsProvider};

    // Module system
    pub use crate::modules::network::{
        command_builder, find_instance_id, Command, Reconciler, Resource, State,
    };
    pub use crate::modules::{
        Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleRegistry,
        ModuleResult,
    };

    // Configuration
    pub use crate::config::Config;
}

// ============================================================================
// Core
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Engine configuration: delete exceptions, the empty-body marker and
/// logging defaults, loaded from TOML or YAML files and the environment.
pub mod config;

// ============================================================================
// Device
// ============================================================================

/// The [`DeviceClient`](connection::DeviceClient) capability and the REST
/// wire conventions of the appliance.
pub mod connection;

/// Current device state gathered per resource.
pub mod facts;

// ============================================================================
// Reconciliation
// ============================================================================

/// Structural comparison helpers and before/after diff rendering.
pub mod diff;

/// Module system and the Opengear resource modules.
pub mod modules;

// ============================================================================
// Observability
// ============================================================================

/// Logging setup built on `tracing-subscriber`.
pub mod telemetry;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
