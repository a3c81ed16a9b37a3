//! Opengear OM/CM8100 resource modules.
//!
//! Each module reconciles one resource collection of the appliance's REST API
//! against a declared configuration:
//!
//! ```text
//!  params {config, state}
//!          |
//!          v
//! +------------------+   facts    +------------------+
//! |  ResourceModule  |<-----------|  FactsProvider   |
//! +------------------+            +------------------+
//!          | plan(state, want, have)
//!          v
//! +------------------+  commands  +------------------+
//! |    Reconciler    |----------->|   DeviceClient   |
//! +------------------+  in order  +------------------+
//! ```
//!
//! # States
//!
//! - `merged`: update matching objects with the declared fields, create the rest
//! - `replaced`: make matching objects exactly as declared, create the rest
//! - `overridden`: delete undeclared objects, then `replaced`
//! - `deleted`: delete the declared objects (all of them when `config` is omitted)
//! - `gathered`: report current facts, no commands
//! - `rendered`: compute commands offline, never send them
//!
//! # Example Usage
//!
//! ```yaml
//! - name: Ensure operators exist
//!   om_users:
//!     config:
//!       - username: operator
//!         enabled: true
//!         groups: [netgrp]
//!     state: merged
//! ```

pub mod collection;
pub mod common;
pub mod conns;
pub mod facts;
pub mod failover;
pub mod groups;
pub mod identity;
pub mod pdus;
pub mod physifs;
pub mod ports;
pub mod services;
pub mod static_routes;
pub mod system;
pub mod users;

pub use collection::{Collection, CollectionResource, MergeCheck};
pub use common::{command_builder, Command, CommandBuilder, Instance};
pub use identity::{find_instance_id, IdentityMap, Resolved};

use crate::connection::{DeviceClient, Response};
use crate::diff::{diff_stats, render_json_diff};
use crate::modules::{
    Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleRegistry,
    ModuleResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

// ============================================================================
// Resources and States
// ============================================================================

/// A category of device objects reconciled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Users,
    Groups,
    Conns,
    Pdus,
    Physifs,
    Ports,
    StaticRoutes,
    Services,
    System,
    Failover,
}

impl Resource {
    pub const ALL: [Resource; 10] = [
        Resource::Users,
        Resource::Groups,
        Resource::Conns,
        Resource::Pdus,
        Resource::Physifs,
        Resource::Ports,
        Resource::StaticRoutes,
        Resource::Services,
        Resource::System,
        Resource::Failover,
    ];

    /// Resource name as used in facts and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Groups => "groups",
            Resource::Conns => "conns",
            Resource::Pdus => "pdus",
            Resource::Physifs => "physifs",
            Resource::Ports => "ports",
            Resource::StaticRoutes => "static_routes",
            Resource::Services => "services",
            Resource::System => "system",
            Resource::Failover => "failover",
        }
    }

    /// Name of the module managing this resource.
    pub fn module_name(&self) -> &'static str {
        match self {
            Resource::Users => "om_users",
            Resource::Groups => "om_groups",
            Resource::Conns => "om_conns",
            Resource::Pdus => "om_pdus",
            Resource::Physifs => "om_physifs",
            Resource::Ports => "om_ports",
            Resource::StaticRoutes => "om_static_routes",
            Resource::Services => "om_services",
            Resource::System => "om_system",
            Resource::Failover => "om_failover",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Resource {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(Resource::Users),
            "groups" => Ok(Resource::Groups),
            "conns" => Ok(Resource::Conns),
            "pdu" | "pdus" => Ok(Resource::Pdus),
            "physifs" => Ok(Resource::Physifs),
            "ports" => Ok(Resource::Ports),
            "static_routes" => Ok(Resource::StaticRoutes),
            "services" => Ok(Resource::Services),
            "system" => Ok(Resource::System),
            "failover" => Ok(Resource::Failover),
            _ => Err(ModuleError::InvalidParameter(format!(
                "Unknown resource: {}",
                s
            ))),
        }
    }
}

/// Requested reconciliation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Merged,
    Replaced,
    Overridden,
    Deleted,
    Gathered,
    Rendered,
}

impl State {
    /// States that may send commands to the device.
    pub fn is_action(&self) -> bool {
        matches!(
            self,
            State::Merged | State::Replaced | State::Overridden | State::Deleted
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Merged => write!(f, "merged"),
            State::Replaced => write!(f, "replaced"),
            State::Overridden => write!(f, "overridden"),
            State::Deleted => write!(f, "deleted"),
            State::Gathered => write!(f, "gathered"),
            State::Rendered => write!(f, "rendered"),
        }
    }
}

impl FromStr for State {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merged" => Ok(State::Merged),
            "replaced" => Ok(State::Replaced),
            "overridden" => Ok(State::Overridden),
            "deleted" => Ok(State::Deleted),
            "gathered" => Ok(State::Gathered),
            "rendered" => Ok(State::Rendered),
            _ => Err(ModuleError::InvalidParameter(format!(
                "state must be one of merged, replaced, overridden, deleted, gathered, rendered; got {}",
                s
            ))),
        }
    }
}

/// Parameters shared by every resource module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceArgs {
    pub config: Value,
    pub state: State,
}

impl ResourceArgs {
    pub fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let state = match params.get("state") {
            None | Some(Value::Null) => State::default(),
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(ModuleError::InvalidParameter(format!(
                    "state must be a string, got {}",
                    other
                )))
            }
        };
        let config = params.get("config").cloned().unwrap_or(Value::Null);

        let needs_config = matches!(
            state,
            State::Merged | State::Replaced | State::Overridden | State::Rendered
        );
        if needs_config && crate::diff::is_empty_value(&config) {
            return Err(ModuleError::InvalidParameter(format!(
                "value of config parameter must not be empty for state {}",
                state
            )));
        }

        Ok(Self { config, state })
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Commands computed for one module run, plus anything worth telling the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub commands: Vec<Command>,
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command if the builder produced one.
    pub fn push(&mut self, command: Option<Command>) {
        if let Some(command) = command {
            debug!(method = %command.method, path = %command.path, "planned command");
            self.commands.push(command);
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn extend(&mut self, other: Plan) {
        self.commands.extend(other.commands);
        self.warnings.extend(other.warnings);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Computes the commands that move one resource from `have` to `want`.
pub trait Reconciler: Send + Sync {
    fn resource(&self) -> Resource;

    fn description(&self) -> &'static str;

    /// Commands for an action state. `protected` ids are never deleted.
    fn plan(
        &self,
        state: State,
        want: &Value,
        have: &Value,
        protected: &[String],
    ) -> ModuleResult<Plan>;

    /// Commands for `state: rendered`, computed without a device.
    fn render(&self, want: &Value) -> ModuleResult<Plan> {
        self.plan(State::Merged, want, &Value::Null, &[])
    }

    /// Send `commands` in order.
    ///
    /// Returns the resulting facts when the reconciler can derive them without
    /// another read, `None` to have them re-fetched.
    fn apply(
        &self,
        commands: &[Command],
        _have: &Value,
        context: &ModuleContext,
    ) -> ModuleResult<Option<Value>> {
        send_all(commands, context)?;
        Ok(None)
    }
}

/// Send `commands` in order, stopping at the first failure.
pub fn send_all(commands: &[Command], context: &ModuleContext) -> ModuleResult<()> {
    for command in commands {
        send_command(context.client.as_ref(), command, &context.empty_body_marker)?;
    }
    Ok(())
}

/// Send one command, treating an empty-body reply as success.
pub fn send_command(
    client: &dyn DeviceClient,
    command: &Command,
    empty_body_marker: &str,
) -> ModuleResult<Response> {
    debug!(method = %command.method, path = %command.path, "sending command");

    match client.send(command.method, &command.path, command.data.clone()) {
        Ok(response) => Ok(response),
        Err(e) if e.is_tolerated_empty_body(empty_body_marker) => {
            debug!(path = %command.path, error = %e, "accepting empty response body");
            Ok(Response::Empty)
        }
        Err(e) => {
            warn!(method = %command.method, path = %command.path, error = %e, "command failed");
            Err(e.into())
        }
    }
}

/// Adapts a [`Reconciler`] to the [`Module`] interface.
#[derive(Debug, Clone, Default)]
pub struct ResourceModule<R> {
    reconciler: R,
}

impl<R: Reconciler> ResourceModule<R> {
    pub fn new(reconciler: R) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &R {
        &self.reconciler
    }

    fn gather(&self, context: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let facts = context.facts.facts(self.reconciler.resource())?;
        Ok(ModuleOutput::ok("Gathered current configuration").with_gathered(facts))
    }

    fn render(&self, want: &Value) -> ModuleResult<ModuleOutput> {
        let plan = self.reconciler.render(want)?;
        Ok(ModuleOutput::ok(format!("Rendered {} command(s)", plan.commands.len()))
            .with_rendered(plan.commands)
            .with_warnings(plan.warnings))
    }

    fn reconcile(
        &self,
        state: State,
        want: &Value,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let resource = self.reconciler.resource();
        let before = context.facts.facts(resource)?;
        let plan = self.reconciler.plan(
            state,
            want,
            &before,
            context.protected_ids(resource.name()),
        )?;

        if plan.is_empty() {
            info!(module = resource.module_name(), "already in desired state");
            return Ok(ModuleOutput::ok("No changes required")
                .with_before(before)
                .with_warnings(plan.warnings));
        }

        if context.check_mode {
            info!(
                module = resource.module_name(),
                commands = plan.commands.len(),
                "check mode, commands not sent"
            );
            return Ok(
                ModuleOutput::changed(format!("Would send {} command(s)", plan.commands.len()))
                    .with_commands(plan.commands)
                    .with_before(before)
                    .with_warnings(plan.warnings),
            );
        }

        let after = match self.reconciler.apply(&plan.commands, &before, context)? {
            Some(after) => after,
            None => context.facts.facts(resource)?,
        };

        info!(
            module = resource.module_name(),
            commands = plan.commands.len(),
            "configuration updated"
        );

        let mut output = ModuleOutput::changed(format!("Sent {} command(s)", plan.commands.len()));
        if context.diff_mode {
            if let Some(details) = render_json_diff(&before, &after, context.diff_context) {
                let stats = diff_stats(
                    &serde_json::to_string_pretty(&before)?,
                    &serde_json::to_string_pretty(&after)?,
                );
                output = output.with_diff(
                    Diff::new(
                        format!("{} line(s) removed", stats.deletions),
                        format!("{} line(s) added", stats.insertions),
                    )
                    .with_details(details),
                );
            }
        }

        Ok(output
            .with_commands(plan.commands)
            .with_before(before)
            .with_after(after)
            .with_warnings(plan.warnings))
    }
}

impl<R: Reconciler> Module for ResourceModule<R> {
    fn name(&self) -> &'static str {
        self.reconciler.resource().module_name()
    }

    fn description(&self) -> &'static str {
        self.reconciler.description()
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        ResourceArgs::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let args = ResourceArgs::from_params(params)?;
        let span = info_span!("module", module = self.name(), state = %args.state);
        let _enter = span.enter();

        match args.state {
            State::Gathered => self.gather(context),
            State::Rendered => self.render(&args.config),
            state => self.reconcile(state, &args.config, context),
        }
    }
}

/// Register every Opengear module.
pub fn register_om_modules(registry: &mut ModuleRegistry) {
    registry.register(Arc::new(users::UsersModule::default()));
    registry.register(Arc::new(groups::GroupsModule::default()));
    registry.register(Arc::new(conns::ConnsModule::default()));
    registry.register(Arc::new(pdus::PdusModule::default()));
    registry.register(Arc::new(physifs::PhysifsModule::default()));
    registry.register(Arc::new(static_routes::StaticRoutesModule::default()));
    registry.register(Arc::new(ports::PortsModule::default()));
    registry.register(Arc::new(services::ServicesModule::default()));
    registry.register(Arc::new(system::SystemModule::default()));
    registry.register(Arc::new(failover::FailoverModule::default()));
    registry.register(Arc::new(facts::FactsModule));
}

/// Build the reconciler for a resource.
pub fn reconciler_for(resource: Resource) -> Box<dyn Reconciler> {
    match resource {
        Resource::Users => Box::new(Collection::<users::Users>::default()),
        Resource::Groups => Box::new(Collection::<groups::Groups>::default()),
        Resource::Conns => Box::new(Collection::<conns::Conns>::default()),
        Resource::Pdus => Box::new(Collection::<pdus::Pdus>::default()),
        Resource::Physifs => Box::new(Collection::<physifs::Physifs>::default()),
        Resource::StaticRoutes => Box::new(Collection::<static_routes::StaticRoutes>::default()),
        Resource::Ports => Box::new(ports::Ports),
        Resource::Services => Box::new(services::Services),
        Resource::System => Box::new(system::System),
        Resource::Failover => Box::new(failover::Failover),
    }
}
