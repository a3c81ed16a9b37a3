//! Cellular failover settings (`om_failover`).
//!
//! A single settings mapping written with `PUT failover/settings`. The
//! settings cannot be deleted.

use super::common::{instance_map, Command, Instance};
use super::{Plan, Reconciler, Resource, ResourceModule, State};
use crate::diff::{dict_diff, dict_merge, normalized_eq, remove_empties};
use crate::modules::ModuleResult;
use serde_json::Value;

const SETTINGS_PATH: &str = "failover/settings";
const SETTINGS_BODY: &str = "failover_settings";

fn write_settings(settings: Instance) -> Command {
    let mut body = Instance::new();
    body.insert(SETTINGS_BODY.to_string(), Value::Object(settings));
    Command::put(SETTINGS_PATH, Value::Object(body))
}

/// Reconciler for failover settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Failover;

pub type FailoverModule = ResourceModule<Failover>;

impl Reconciler for Failover {
    fn resource(&self) -> Resource {
        Resource::Failover
    }

    fn description(&self) -> &'static str {
        "Manage failover settings on Opengear OM appliances"
    }

    fn plan(
        &self,
        state: State,
        want: &Value,
        have: &Value,
        _protected: &[String],
    ) -> ModuleResult<Plan> {
        let have = remove_empties(&instance_map(have, "failover")?);
        let mut plan = Plan::new();

        match state {
            State::Merged => {
                let want = remove_empties(&instance_map(want, "config")?);
                if !dict_diff(&have, &want).is_empty() {
                    plan.push(Some(write_settings(dict_merge(&have, &want))));
                }
            }
            State::Replaced | State::Overridden => {
                let want = remove_empties(&instance_map(want, "config")?);
                if !normalized_eq(&have, &want) {
                    plan.push(Some(write_settings(want)));
                }
            }
            State::Deleted => {
                plan.warn("failover settings cannot be deleted, use state replaced to change them")
            }
            State::Gathered | State::Rendered => {}
        }

        Ok(plan)
    }
}
