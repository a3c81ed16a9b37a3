//! Device and resource facts (`om_facts`).
//!
//! `gather_network_resources` selects resources by name, `all` for every
//! resource, or `!name` to exclude one. `gather_subset` controls the basic
//! device facts (`min` or `all`, the default being `min`).

use super::Resource;
use crate::connection::DeviceInfo;
use crate::facts::Facts;
use crate::modules::{
    Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult, ParamExt,
};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Module for gathering device facts
#[derive(Debug, Clone, Copy, Default)]
pub struct FactsModule;

impl FactsModule {
    /// Resolve the requested resources, keeping declaration order.
    pub fn select_resources(requested: &[String]) -> ModuleResult<Vec<Resource>> {
        let mut include_all = false;
        let mut included = Vec::new();
        let mut excluded = Vec::new();

        for entry in requested {
            let entry = entry.trim();
            if let Some(name) = entry.strip_prefix('!') {
                if name == "all" {
                    return Ok(Vec::new());
                }
                excluded.push(Resource::from_str(name)?);
            } else if entry == "all" {
                include_all = true;
            } else {
                let resource = Resource::from_str(entry)?;
                if !included.contains(&resource) {
                    included.push(resource);
                }
            }
        }

        // Only exclusions means everything else.
        if include_all || (included.is_empty() && !excluded.is_empty()) {
            included = Resource::ALL.to_vec();
        }
        included.retain(|resource| !excluded.contains(resource));
        Ok(included)
    }

    fn device_facts(context: &ModuleContext) -> ModuleResult<Map<String, Value>> {
        let info = DeviceInfo::gather(context.client.as_ref())?;
        let mut facts = Map::new();
        for (key, value) in [
            ("network_os", info.network_os),
            ("version", info.firmware_version),
            ("api_version", info.rest_api_version),
            ("hostname", info.hostname),
            ("serialnum", info.serial_number),
            ("model", info.model_name),
        ] {
            facts.insert(format!("ansible_net_{}", key), Value::String(value));
        }
        Ok(facts)
    }
}

impl Module for FactsModule {
    fn name(&self) -> &'static str {
        "om_facts"
    }

    fn description(&self) -> &'static str {
        "Collect facts from Opengear OM appliances"
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        let subset = params
            .get_vec_string("gather_subset")?
            .unwrap_or_default();
        for entry in &subset {
            if !matches!(entry.trim_start_matches('!'), "all" | "min") {
                return Err(ModuleError::InvalidParameter(format!(
                    "gather_subset must be one of all, min, got '{}'",
                    entry
                )));
            }
        }
        if let Some(requested) = params.get_vec_string("gather_network_resources")? {
            Self::select_resources(&requested)?;
        }
        Ok(())
    }

    fn execute(&self, params: &ModuleParams, context: &ModuleContext) -> ModuleResult<ModuleOutput> {
        self.validate_params(params)?;

        let subset = params
            .get_vec_string("gather_subset")?
            .unwrap_or_else(|| vec!["min".to_string()]);
        let requested = params
            .get_vec_string("gather_network_resources")?
            .unwrap_or_default();
        let resources = Self::select_resources(&requested)?;

        let _span = tracing::info_span!("module", module = "om_facts").entered();

        let mut ansible_facts = if subset.iter().any(|s| s == "min" || s == "all") {
            Self::device_facts(context)?
        } else {
            Map::new()
        };

        let gathered = Facts::gather(context.facts.as_ref(), &resources)?;
        ansible_facts.insert(
            "ansible_net_gather_network_resources".into(),
            Value::Array(
                resources
                    .iter()
                    .map(|r| Value::String(r.name().to_string()))
                    .collect(),
            ),
        );
        ansible_facts.insert(
            "ansible_net_gather_subset".into(),
            Value::Array(subset.into_iter().map(Value::String).collect()),
        );
        ansible_facts.insert("ansible_network_resources".into(), gathered.to_value());

        tracing::debug!(resources = resources.len(), "facts gathered");
        Ok(ModuleOutput::ok("Facts gathered successfully")
            .with_data("ansible_facts", Value::Object(ansible_facts)))
    }

    fn check(&self, params: &ModuleParams, context: &ModuleContext) -> ModuleResult<ModuleOutput> {
        self.execute(params, context)
    }
}
