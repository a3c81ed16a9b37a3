//! Module system for the Opengear OM engine.
//!
//! Every configurable resource on the appliance is exposed as a [`Module`]: it
//! receives its parameters (`config` and `state`), reconciles them against the
//! device and reports what it did through [`ModuleOutput`]. Modules are looked up
//! by name through the [`ModuleRegistry`].

pub mod network;

use crate::connection::{ConnectionError, DeviceClient};
use crate::facts::{DeviceFacts, FactsProvider};
use network::Command;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during module execution
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("State '{state}' is not supported by {module}")]
    UnsupportedState { module: String, state: String },

    #[error("Failed to gather facts for {resource}: {message}")]
    Facts { resource: String, message: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for module operations
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Status of a module execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Module executed successfully and made changes
    Changed,
    /// Module executed successfully but no changes were needed
    Ok,
    /// Module execution failed
    Failed,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStatus::Changed => write!(f, "changed"),
            ModuleStatus::Ok => write!(f, "ok"),
            ModuleStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Represents a difference between current and desired state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diff {
    /// Facts before the run
    pub before: String,
    /// Facts after the run
    pub after: String,
    /// Unified diff of the two
    pub details: Option<String>,
}

impl Diff {
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Result of a module execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleOutput {
    /// Whether the module changed anything
    pub changed: bool,
    /// Human-readable message about what happened
    pub msg: String,
    /// Status of the execution
    pub status: ModuleStatus,
    /// Commands computed for the requested state
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Facts before any command was sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    /// Facts after the commands were applied (only when changed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    /// Facts returned by `state: gathered`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gathered: Option<Value>,
    /// Commands returned by `state: rendered`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered: Option<Vec<Command>>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Optional diff showing what changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    /// Additional data returned by the module
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, Value>,
}

impl ModuleOutput {
    fn with_status(changed: bool, status: ModuleStatus, msg: impl Into<String>) -> Self {
        Self {
            changed,
            msg: msg.into(),
            status,
            commands: Vec::new(),
            before: None,
            after: None,
            gathered: None,
            rendered: None,
            warnings: Vec::new(),
            diff: None,
            data: HashMap::new(),
        }
    }

    /// Create a new successful output with no changes
    pub fn ok(msg: impl Into<String>) -> Self {
        Self::with_status(false, ModuleStatus::Ok, msg)
    }

    /// Create a new successful output with changes
    pub fn changed(msg: impl Into<String>) -> Self {
        Self::with_status(true, ModuleStatus::Changed, msg)
    }

    /// Create a failed output
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::with_status(false, ModuleStatus::Failed, msg)
    }

    pub fn with_commands(mut self, commands: Vec<Command>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_gathered(mut self, gathered: Value) -> Self {
        self.gathered = Some(gathered);
        self
    }

    pub fn with_rendered(mut self, rendered: Vec<Command>) -> Self {
        self.rendered = Some(rendered);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Add a diff to the output
    pub fn with_diff(mut self, diff: Diff) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Add data to the output
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// The result as the JSON document handed back to the caller.
    pub fn to_json(&self) -> Value {
        let mut result = serde_json::Map::new();
        result.insert("changed".into(), Value::Bool(self.changed));
        result.insert(
            "commands".into(),
            serde_json::to_value(&self.commands).unwrap_or(Value::Null),
        );
        if let Some(before) = &self.before {
            result.insert("before".into(), before.clone());
        }
        if let Some(after) = &self.after {
            result.insert("after".into(), after.clone());
        }
        if let Some(gathered) = &self.gathered {
            result.insert("gathered".into(), gathered.clone());
        }
        if let Some(rendered) = &self.rendered {
            result.insert(
                "rendered".into(),
                serde_json::to_value(rendered).unwrap_or(Value::Null),
            );
        }
        result.insert(
            "warnings".into(),
            Value::Array(self.warnings.iter().cloned().map(Value::String).collect()),
        );
        for (key, value) in &self.data {
            result.insert(key.clone(), value.clone());
        }
        Value::Object(result)
    }
}

/// Parameters passed to a module
pub type ModuleParams = HashMap<String, Value>;

/// Context for module execution
#[derive(Clone)]
pub struct ModuleContext {
    /// Whether to run in check mode (dry run)
    pub check_mode: bool,
    /// Whether to show diffs
    pub diff_mode: bool,
    /// Device the commands are sent to
    pub client: Arc<dyn DeviceClient>,
    /// Source of the current device state
    pub facts: Arc<dyn FactsProvider>,
    /// Ids that must never be deleted, keyed by resource name
    pub delete_exceptions: HashMap<String, Vec<String>>,
    /// Message prefix accepted as an empty-body success
    pub empty_body_marker: String,
    /// Context lines for diff mode
    pub diff_context: usize,
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("check_mode", &self.check_mode)
            .field("diff_mode", &self.diff_mode)
            .field("delete_exceptions", &self.delete_exceptions)
            .field("empty_body_marker", &self.empty_body_marker)
            .field("diff_context", &self.diff_context)
            .finish_non_exhaustive()
    }
}

impl ModuleContext {
    /// Context whose facts are read from the same device the commands go to.
    pub fn new(client: Arc<dyn DeviceClient>) -> Self {
        let facts: Arc<dyn FactsProvider> = Arc::new(DeviceFacts::new(client.clone()));
        let engine = crate::config::EngineConfig::default();
        Self {
            check_mode: false,
            diff_mode: false,
            client,
            facts,
            delete_exceptions: crate::config::default_delete_exceptions(),
            empty_body_marker: engine.empty_body_marker,
            diff_context: engine.diff_context,
        }
    }

    /// Context built from a loaded configuration.
    pub fn from_config(client: Arc<dyn DeviceClient>, config: &crate::config::Config) -> Self {
        Self::new(client)
            .with_delete_exceptions(config.protected.clone())
            .with_empty_body_marker(config.engine.empty_body_marker.clone())
            .with_diff_context(config.engine.diff_context)
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    pub fn with_diff_mode(mut self, diff_mode: bool) -> Self {
        self.diff_mode = diff_mode;
        self
    }

    pub fn with_facts(mut self, facts: Arc<dyn FactsProvider>) -> Self {
        self.facts = facts;
        self
    }

    pub fn with_delete_exceptions(mut self, exceptions: HashMap<String, Vec<String>>) -> Self {
        self.delete_exceptions = exceptions;
        self
    }

    pub fn with_empty_body_marker(mut self, marker: impl Into<String>) -> Self {
        self.empty_body_marker = marker.into();
        self
    }

    pub fn with_diff_context(mut self, lines: usize) -> Self {
        self.diff_context = lines;
        self
    }

    /// Protected ids for a resource.
    pub fn protected_ids(&self, resource: &str) -> &[String] {
        self.delete_exceptions
            .get(resource)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Trait that all modules must implement
pub trait Module: Send + Sync {
    /// Returns the name of the module
    fn name(&self) -> &'static str;

    /// Returns a description of what the module does
    fn description(&self) -> &'static str;

    /// Execute the module with the given parameters
    fn execute(&self, params: &ModuleParams, context: &ModuleContext)
        -> ModuleResult<ModuleOutput>;

    /// Check what would change without making changes (for check mode)
    fn check(&self, params: &ModuleParams, context: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let check_context = ModuleContext {
            check_mode: true,
            ..context.clone()
        };
        self.execute(params, &check_context)
    }

    /// Validate the parameters before execution
    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        let _ = params;
        Ok(())
    }

    /// Returns the list of required parameters
    fn required_params(&self) -> &[&'static str] {
        &[]
    }
}

/// Helper trait for extracting parameters
pub trait ParamExt {
    fn get_string(&self, key: &str) -> ModuleResult<Option<String>>;
    fn get_bool_or(&self, key: &str, default: bool) -> bool;
    fn get_vec_string(&self, key: &str) -> ModuleResult<Option<Vec<String>>>;
}

impl ParamExt for ModuleParams {
    fn get_string(&self, key: &str) -> ModuleResult<Option<String>> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Null) | None => Ok(None),
            Some(_) => Err(ModuleError::InvalidParameter(format!(
                "{} must be a string",
                key
            ))),
        }
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => true,
                "false" | "no" | "0" | "off" => false,
                _ => default,
            },
            _ => default,
        }
    }

    fn get_vec_string(&self, key: &str) -> ModuleResult<Option<Vec<String>>> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(ModuleError::InvalidParameter(format!(
                        "{} must be a list of strings",
                        key
                    ))),
                })
                .collect::<ModuleResult<Vec<_>>>()
                .map(Some),
            Some(Value::String(s)) => Ok(Some(
                s.split(',').map(|part| part.trim().to_string()).collect(),
            )),
            Some(Value::Null) | None => Ok(None),
            Some(_) => Err(ModuleError::InvalidParameter(format!(
                "{} must be a list",
                key
            ))),
        }
    }
}

/// Registry of available modules
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Create a registry with all built-in modules
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        network::register_om_modules(&mut registry);
        registry
    }

    /// Register a module
    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Get a module by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    /// Check if a module exists
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Get all module names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Execute a module by name
    pub fn execute(
        &self,
        name: &str,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let module = self
            .get(name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;

        module.validate_params(params)?;

        for param in module.required_params() {
            if !params.contains_key(*param) {
                return Err(ModuleError::MissingParameter((*param).to_string()));
            }
        }

        if context.check_mode {
            module.check(params, context)
        } else {
            module.execute(params, context)
        }
    }
}
