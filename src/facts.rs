//! Current device state ("facts") for each resource.
//!
//! [`DeviceFacts`] reads the appliance's REST API and reshapes the replies
//! into the same form modules accept as `config`, so declared and current
//! state compare directly. Empty fields are dropped and read-only noise such
//! as port status or key fingerprints is removed.

use crate::connection::DeviceClient;
use crate::diff::remove_empties;
use crate::modules::network::common::{instance_list, without, Instance};
use crate::modules::network::services::{ServiceCollection, ServiceOption, ServicesConfig};
use crate::modules::network::system::{SystemOption, AUTHORIZED_KEYS, REBOOT};
use crate::modules::network::Resource;
use crate::modules::{ModuleError, ModuleResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Port fields reported by the device but never configured.
const PORT_STATUS_FIELDS: [&str; 3] = ["available_pinouts", "device", "status"];

/// Facts gathered for several resources, keyed by resource name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Facts {
    data: IndexMap<String, Value>,
}

impl Facts {
    /// Create empty facts
    pub fn new() -> Self {
        Self::default()
    }

    /// Gather facts for each resource, in order.
    pub fn gather(provider: &dyn FactsProvider, resources: &[Resource]) -> ModuleResult<Self> {
        let mut facts = Self::new();
        for resource in resources {
            facts.set(resource.name(), provider.facts(*resource)?);
        }
        Ok(facts)
    }

    /// Set a fact
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Get a fact
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get all facts
    pub fn all(&self) -> &IndexMap<String, Value> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// Source of the current state of a resource.
#[cfg_attr(test, mockall::automock)]
pub trait FactsProvider: Send + Sync {
    /// Current state of `resource`, shaped like the module's `config`.
    fn facts(&self, resource: Resource) -> ModuleResult<Value>;
}

/// Facts read from the device over its REST API.
#[derive(Clone)]
pub struct DeviceFacts {
    client: Arc<dyn DeviceClient>,
}

impl std::fmt::Debug for DeviceFacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFacts").finish_non_exhaustive()
    }
}

impl DeviceFacts {
    pub fn new(client: Arc<dyn DeviceClient>) -> Self {
        Self { client }
    }

    fn read(&self, path: &str) -> ModuleResult<Value> {
        let reply = self.client.get(path)?;
        trace!(path, reply = %reply, "facts reply");
        Ok(reply)
    }

    fn collection(&self, resource: Resource) -> ModuleResult<Value> {
        let reply = self.read(collection_path(resource))?;
        normalize_collection(resource, &reply, resource.name())
    }

    fn ports(&self) -> ModuleResult<Value> {
        let ports = self.read("ports")?;
        let schedule = self.read("ports/auto_discover/schedule")?;
        normalize_ports(&ports, &schedule)
    }

    fn services(&self) -> ModuleResult<Value> {
        let mut config = ServicesConfig::default();

        for kind in ServiceCollection::ALL {
            let reply = self.read(&format!("services/{}", kind.option()))?;
            let list = field(Resource::Services, &reply, kind.facts_key())?;
            *config.list_mut(kind) = instance_list(list, kind.option())?
                .iter()
                .map(remove_empties)
                .collect();
        }

        for option in ServiceOption::ALL {
            let reply = self.read(&option.path())?;
            let settings = match reply.get(option.name()) {
                Some(Value::Object(settings)) => Some(remove_empties(settings)),
                _ => None,
            };
            config.set_option(option, settings.filter(|s| !s.is_empty()));
        }

        Ok(serde_json::to_value(config)?)
    }

    fn system(&self) -> ModuleResult<Value> {
        let mut replies = Vec::with_capacity(SystemOption::ALL.len());
        for option in SystemOption::ALL {
            replies.push((option, self.read(&option.path())?));
        }
        let keys = self.read(&format!("system/{}", AUTHORIZED_KEYS))?;
        normalize_system(&replies, &keys)
    }

    fn failover(&self) -> ModuleResult<Value> {
        let reply = self.read("failover/settings")?;
        match field(Resource::Failover, &reply, "failover_settings")? {
            Value::Object(settings) => Ok(Value::Object(remove_empties(settings))),
            _ => Ok(Value::Object(Map::new())),
        }
    }
}

impl FactsProvider for DeviceFacts {
    fn facts(&self, resource: Resource) -> ModuleResult<Value> {
        debug!(%resource, "gathering facts");
        match resource {
            Resource::Users
            | Resource::Groups
            | Resource::Conns
            | Resource::Pdus
            | Resource::Physifs
            | Resource::StaticRoutes => self.collection(resource),
            Resource::Ports => self.ports(),
            Resource::Services => self.services(),
            Resource::System => self.system(),
            Resource::Failover => self.failover(),
        }
    }
}

/// Endpoint a collection is listed from.
fn collection_path(resource: Resource) -> &'static str {
    match resource {
        Resource::Users => "users/",
        Resource::Groups => "groups/",
        Resource::Conns => "conns/",
        Resource::Pdus => "pdus/",
        Resource::Physifs => "physifs",
        Resource::StaticRoutes => "static_routes/",
        other => other.name(),
    }
}

fn field<'a>(resource: Resource, reply: &'a Value, key: &str) -> ModuleResult<&'a Value> {
    reply.get(key).ok_or_else(|| ModuleError::Facts {
        resource: resource.name().to_string(),
        message: format!("reply has no '{}' key", key),
    })
}

/// Shape a `GET {collection}` reply: the list under `key`, empties removed.
pub fn normalize_collection(resource: Resource, reply: &Value, key: &str) -> ModuleResult<Value> {
    let list = instance_list(field(resource, reply, key)?, key)?;
    Ok(Value::Array(
        list.iter()
            .map(|instance| Value::Object(remove_empties(instance)))
            .collect(),
    ))
}

/// Shape the `ports` and `ports/auto_discover/schedule` replies.
pub fn normalize_ports(ports: &Value, schedule: &Value) -> ModuleResult<Value> {
    let list = instance_list(field(Resource::Ports, ports, "ports")?, "ports")?;
    let ports: Vec<Value> = list.iter().map(|port| Value::Object(clean_port(port))).collect();

    let mut schedule = match schedule.get("auto_discover_schedule") {
        Some(Value::Object(schedule)) => schedule.clone(),
        _ => Map::new(),
    };
    let mut auto_discover = Map::new();
    if let Some(discover_ports) = schedule.remove("ports") {
        auto_discover.insert("ports".into(), discover_ports);
    }
    auto_discover.insert("schedule".into(), Value::Object(schedule));

    let mut facts = Map::new();
    facts.insert("ports".into(), Value::Array(ports));
    facts.insert("auto_discover".into(), Value::Object(remove_empties(&auto_discover)));
    Ok(Value::Object(facts))
}

fn clean_port(port: &Instance) -> Instance {
    let mut port = without(port, &PORT_STATUS_FIELDS);
    if let Some(Value::Array(sessions)) = port.get_mut("sessions") {
        for session in sessions.iter_mut() {
            if let Value::Object(session) = session {
                session.remove("port");
            }
        }
    }
    remove_empties(&port)
}

/// Shape the per-option `system/{option}` replies and the authorized key list.
pub fn normalize_system(replies: &[(SystemOption, Value)], keys: &Value) -> ModuleResult<Value> {
    let mut facts = Map::new();

    for (option, reply) in replies {
        if let Some(value) = option.extract(reply) {
            facts.insert(option.name().to_string(), value.clone());
        }
    }

    let keys = instance_list(field(Resource::System, keys, AUTHORIZED_KEYS)?, AUTHORIZED_KEYS)?;
    facts.insert(
        AUTHORIZED_KEYS.to_string(),
        Value::Array(
            keys.iter()
                .map(|key| Value::Object(without(key, &["key_fingerprint"])))
                .collect(),
        ),
    );

    let mut facts = remove_empties(&facts);
    facts.insert(REBOOT.to_string(), Value::Bool(false));
    Ok(Value::Object(facts))
}
