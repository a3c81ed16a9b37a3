//! Appliance services (`om_services`).
//!
//! The services tree mixes two kinds of settings:
//!
//! - list collections ([`ServiceCollection`]): remote syslog servers and SNMP
//!   alert managers, each a set of named instances under `services/{option}/`
//! - option blocks ([`ServiceOption`]): one settings mapping per service,
//!   written with `PUT services/{option}`
//!
//! List collections follow the usual collection rules. Option blocks cannot
//! be deleted, only written.

use super::collection::{self, CollectionSpec};
use super::common::{Command, Instance};
use super::{Plan, Reconciler, Resource, ResourceModule, State};
use crate::diff::{dict_diff, dict_merge, normalized_eq, remove_empties_value};
use crate::modules::{ModuleError, ModuleResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Services whose configuration is a list of named instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCollection {
    Syslog,
    SnmpAlertManager,
}

impl ServiceCollection {
    pub const ALL: [ServiceCollection; 2] =
        [ServiceCollection::Syslog, ServiceCollection::SnmpAlertManager];

    /// Option name in configuration and request paths.
    pub fn option(&self) -> &'static str {
        match self {
            ServiceCollection::Syslog => "syslog",
            ServiceCollection::SnmpAlertManager => "snmp_alert_manager",
        }
    }

    /// Key of the instance list in `GET services/{option}` replies.
    pub fn facts_key(&self) -> &'static str {
        match self {
            ServiceCollection::Syslog => "syslogServers",
            ServiceCollection::SnmpAlertManager => "snmp_alert_manager",
        }
    }

    pub fn spec(&self) -> CollectionSpec {
        match self {
            ServiceCollection::Syslog => {
                CollectionSpec::new("syslogServer", "name", "services/syslog/")
            }
            ServiceCollection::SnmpAlertManager => CollectionSpec::new(
                "snmp_alert_manager",
                "name",
                "services/snmp_alert_manager/",
            ),
        }
    }
}

/// Services configured as a single settings block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOption {
    Ntp,
    Snmpd,
    Ssh,
    Https,
    Lldp,
    Routing,
}

impl ServiceOption {
    pub const ALL: [ServiceOption; 6] = [
        ServiceOption::Ntp,
        ServiceOption::Snmpd,
        ServiceOption::Ssh,
        ServiceOption::Https,
        ServiceOption::Lldp,
        ServiceOption::Routing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ServiceOption::Ntp => "ntp",
            ServiceOption::Snmpd => "snmpd",
            ServiceOption::Ssh => "ssh",
            ServiceOption::Https => "https",
            ServiceOption::Lldp => "lldp",
            ServiceOption::Routing => "routing",
        }
    }

    pub fn path(&self) -> String {
        format!("services/{}", self.name())
    }
}

impl fmt::Display for ServiceOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The services configuration, as declared or as gathered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub syslog: Vec<Instance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snmp_alert_manager: Vec<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntp: Option<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmpd: Option<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lldp: Option<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<Instance>,
}

impl ServicesConfig {
    /// Parse a services mapping. Null and empty values count as undeclared,
    /// and a null mapping is an empty configuration.
    pub fn from_value(value: &Value) -> ModuleResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(remove_empties_value(value)).map_err(|e| {
            ModuleError::InvalidParameter(format!("invalid services configuration: {}", e))
        })
    }

    pub fn list(&self, collection: ServiceCollection) -> &[Instance] {
        match collection {
            ServiceCollection::Syslog => &self.syslog,
            ServiceCollection::SnmpAlertManager => &self.snmp_alert_manager,
        }
    }

    pub fn list_mut(&mut self, collection: ServiceCollection) -> &mut Vec<Instance> {
        match collection {
            ServiceCollection::Syslog => &mut self.syslog,
            ServiceCollection::SnmpAlertManager => &mut self.snmp_alert_manager,
        }
    }

    pub fn option(&self, option: ServiceOption) -> Option<&Instance> {
        match option {
            ServiceOption::Ntp => self.ntp.as_ref(),
            ServiceOption::Snmpd => self.snmpd.as_ref(),
            ServiceOption::Ssh => self.ssh.as_ref(),
            ServiceOption::Https => self.https.as_ref(),
            ServiceOption::Lldp => self.lldp.as_ref(),
            ServiceOption::Routing => self.routing.as_ref(),
        }
    }

    pub fn set_option(&mut self, option: ServiceOption, value: Option<Instance>) {
        let slot = match option {
            ServiceOption::Ntp => &mut self.ntp,
            ServiceOption::Snmpd => &mut self.snmpd,
            ServiceOption::Ssh => &mut self.ssh,
            ServiceOption::Https => &mut self.https,
            ServiceOption::Lldp => &mut self.lldp,
            ServiceOption::Routing => &mut self.routing,
        };
        *slot = value;
    }

    fn declared_options(&self) -> impl Iterator<Item = (ServiceOption, &Instance)> {
        ServiceOption::ALL
            .into_iter()
            .filter_map(move |option| self.option(option).map(|value| (option, value)))
    }
}

fn write_option(option: ServiceOption, value: &Instance) -> Command {
    let mut body = Instance::new();
    body.insert(option.name().to_string(), Value::Object(value.clone()));
    Command::put(option.path(), Value::Object(body))
}

/// Reconciler for appliance services.
#[derive(Debug, Clone, Copy, Default)]
pub struct Services;

pub type ServicesModule = ResourceModule<Services>;

impl Reconciler for Services {
    fn resource(&self) -> Resource {
        Resource::Services
    }

    fn description(&self) -> &'static str {
        "Manage syslog, SNMP alerting and service settings on Opengear OM appliances"
    }

    fn plan(
        &self,
        state: State,
        want: &Value,
        have: &Value,
        protected: &[String],
    ) -> ModuleResult<Plan> {
        let have = ServicesConfig::from_value(have)?;
        let mut plan = Plan::new();

        if state == State::Deleted && want.is_null() {
            for kind in ServiceCollection::ALL {
                let existing = have.list(kind);
                plan.extend(collection::deleted(
                    &kind.spec(),
                    existing,
                    existing,
                    protected,
                ));
            }
            return Ok(plan);
        }

        let want = ServicesConfig::from_value(want)?;

        match state {
            State::Merged => {
                for kind in ServiceCollection::ALL {
                    if !want.list(kind).is_empty() {
                        plan.extend(collection::merged(
                            &kind.spec(),
                            want.list(kind),
                            have.list(kind),
                        ));
                    }
                }
                for (option, declared) in want.declared_options() {
                    let current = have.option(option).cloned().unwrap_or_default();
                    let merged = dict_merge(&current, declared);
                    if !dict_diff(&current, &merged).is_empty() {
                        plan.push(Some(write_option(option, &merged)));
                    }
                }
            }
            State::Replaced | State::Overridden => {
                for kind in ServiceCollection::ALL {
                    let spec = kind.spec();
                    if state == State::Overridden {
                        plan.extend(collection::overridden(
                            &spec,
                            want.list(kind),
                            have.list(kind),
                            protected,
                        ));
                    } else if !want.list(kind).is_empty() {
                        plan.extend(collection::replaced(
                            &spec,
                            want.list(kind),
                            have.list(kind),
                        ));
                    }
                }
                for (option, declared) in want.declared_options() {
                    let current = have.option(option).cloned().unwrap_or_default();
                    if !normalized_eq(declared, &current) {
                        plan.push(Some(write_option(option, declared)));
                    }
                }
            }
            State::Deleted => {
                for kind in ServiceCollection::ALL {
                    plan.extend(collection::deleted(
                        &kind.spec(),
                        want.list(kind),
                        have.list(kind),
                        protected,
                    ));
                }
                for (option, _) in want.declared_options() {
                    plan.warn(format!("service option {} cannot be deleted, ignored", option));
                }
            }
            State::Gathered | State::Rendered => {}
        }

        Ok(plan)
    }
}
