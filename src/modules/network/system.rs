//! System settings (`om_system`).
//!
//! `system` is a single mapping of options. Each scalar option lives at its
//! own endpoint, `system/{option}`, wrapped in a fixed envelope:
//!
//! | option                  | request body                                       |
//! |-------------------------|----------------------------------------------------|
//! | `hostname`              | `{"system_hostname": {"hostname": v}}`             |
//! | `banner`                | `{"system_banner": {"banner": v}}`                 |
//! | `webui_session_timeout` | `{"system_webui_session_timeout": {"timeout": v}}` |
//! | `cli_session_timeout`   | `{"system_cli_session_timeout": {"timeout": v}}`   |
//! | `ssh_port`              | `{"system_ssh_port": {"port": v}}`                 |
//! | `timezone`              | `{"system_timezone": {"timezone": v}}`             |
//! | `time`                  | `{"time": {"time": v}}`                            |
//! | `admin_info`            | `{"system_admin_info": v}`                         |
//!
//! Authorized SSH keys are a list managed under `system/system_authorized_keys`,
//! and `reboot: true` requests a reboot.

use super::common::{field_str, instance_list, instance_map, without, Command, Instance};
use super::{Plan, Reconciler, Resource, ResourceModule, State};
use crate::diff::{dict_diff, dict_merge, normalized_eq, remove_empties, values_equal};
use crate::modules::{ModuleError, ModuleResult};
use serde_json::{Map, Value};

/// Option holding the authorized key list.
pub const AUTHORIZED_KEYS: &str = "system_authorized_keys";
const AUTHORIZED_KEY_BODY: &str = "system_authorized_key";
/// Action option.
pub const REBOOT: &str = "reboot";
const REBOOT_PATH: &str = "system/reboot";

/// Scalar system options and where their value sits in the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemOption {
    Hostname,
    Banner,
    WebuiSessionTimeout,
    CliSessionTimeout,
    SshPort,
    Timezone,
    Time,
    AdminInfo,
}

impl SystemOption {
    pub const ALL: [SystemOption; 8] = [
        SystemOption::Hostname,
        SystemOption::Banner,
        SystemOption::WebuiSessionTimeout,
        SystemOption::CliSessionTimeout,
        SystemOption::SshPort,
        SystemOption::Timezone,
        SystemOption::Time,
        SystemOption::AdminInfo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SystemOption::Hostname => "hostname",
            SystemOption::Banner => "banner",
            SystemOption::WebuiSessionTimeout => "webui_session_timeout",
            SystemOption::CliSessionTimeout => "cli_session_timeout",
            SystemOption::SshPort => "ssh_port",
            SystemOption::Timezone => "timezone",
            SystemOption::Time => "time",
            SystemOption::AdminInfo => "admin_info",
        }
    }

    /// Keys leading from the request body to the option's value.
    pub fn body_path(&self) -> &'static [&'static str] {
        match self {
            SystemOption::Hostname => &["system_hostname", "hostname"],
            SystemOption::Banner => &["system_banner", "banner"],
            SystemOption::WebuiSessionTimeout => &["system_webui_session_timeout", "timeout"],
            SystemOption::CliSessionTimeout => &["system_cli_session_timeout", "timeout"],
            SystemOption::SshPort => &["system_ssh_port", "port"],
            SystemOption::Timezone => &["system_timezone", "timezone"],
            SystemOption::Time => &["time", "time"],
            SystemOption::AdminInfo => &["system_admin_info"],
        }
    }

    pub fn path(&self) -> String {
        format!("system/{}", self.name())
    }

    /// Nest `value` into the option's request body.
    pub fn wrap(&self, value: Value) -> Value {
        self.body_path().iter().rev().fold(value, |inner, key| {
            let mut outer = Map::new();
            outer.insert((*key).to_string(), inner);
            Value::Object(outer)
        })
    }

    /// Extract the option's value from a `GET system/{option}` reply.
    pub fn extract<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.body_path()
            .iter()
            .try_fold(document, |node, key| node.get(*key))
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|option| option.name() == name)
    }
}

fn check_options(want: &Instance) -> ModuleResult<()> {
    for key in want.keys() {
        if SystemOption::from_name(key).is_none() && key != AUTHORIZED_KEYS && key != REBOOT {
            return Err(ModuleError::InvalidParameter(format!(
                "unsupported system option: {}",
                key
            )));
        }
    }
    Ok(())
}

fn same_key(a: &Instance, b: &Instance) -> bool {
    match (field_str(a, "key"), field_str(b, "key")) {
        (Some(x), Some(y)) => x == y,
        _ => matches!((field_str(a, "id"), field_str(b, "id")), (Some(x), Some(y)) if x == y),
    }
}

fn authorized_keys(config: &Instance) -> ModuleResult<Option<Vec<Instance>>> {
    match config.get(AUTHORIZED_KEYS) {
        None => Ok(None),
        Some(value) => instance_list(value, AUTHORIZED_KEYS).map(Some),
    }
}

fn add_key(key: &Instance) -> Command {
    let mut body = Map::new();
    body.insert(
        AUTHORIZED_KEY_BODY.to_string(),
        Value::Object(without(key, &["id", "key_fingerprint"])),
    );
    Command::post(format!("system/{}", AUTHORIZED_KEYS), Some(Value::Object(body)))
}

fn remove_key(id: &str) -> Command {
    Command::delete(format!("system/{}/{}", AUTHORIZED_KEYS, id))
}

/// Reconciler for system settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct System;

pub type SystemModule = ResourceModule<System>;

impl System {
    fn scalars(want: &Instance, have: &Instance, merge: bool) -> Plan {
        let mut plan = Plan::new();

        for option in SystemOption::ALL {
            let Some(declared) = want.get(option.name()) else {
                continue;
            };
            let current = have.get(option.name());

            let value = match (option, declared, current) {
                (SystemOption::AdminInfo, Value::Object(declared), Some(Value::Object(current)))
                    if merge =>
                {
                    if dict_diff(current, declared).is_empty() {
                        continue;
                    }
                    Value::Object(dict_merge(current, declared))
                }
                (_, Value::Object(declared), Some(Value::Object(current))) => {
                    if normalized_eq(declared, current) {
                        continue;
                    }
                    Value::Object(declared.clone())
                }
                (_, declared, Some(current)) if values_equal(declared, current) => continue,
                (_, declared, _) => declared.clone(),
            };

            plan.push(Some(Command::put(option.path(), option.wrap(value))));
        }

        plan
    }

    /// POST the declared keys the device lacks; with `exact`, DELETE the rest.
    fn keys(want: Option<&[Instance]>, have: &[Instance], exact: bool) -> Plan {
        let mut plan = Plan::new();
        let Some(want) = want else {
            return plan;
        };

        if exact {
            for existing in have {
                if !want.iter().any(|key| same_key(key, existing)) {
                    if let Some(id) = field_str(existing, "id") {
                        plan.push(Some(remove_key(&id)));
                    }
                }
            }
        }
        for key in want {
            if !have.iter().any(|existing| same_key(key, existing)) {
                plan.push(Some(add_key(key)));
            }
        }

        plan
    }

    fn reboot(want: &Instance) -> Plan {
        let mut plan = Plan::new();
        if want.get(REBOOT).and_then(Value::as_bool).unwrap_or(false) {
            plan.push(Some(Command::post(REBOOT_PATH, None)));
        }
        plan
    }
}

impl Reconciler for System {
    fn resource(&self) -> Resource {
        Resource::System
    }

    fn description(&self) -> &'static str {
        "Manage hostname, banner, session, time and SSH key settings on Opengear OM appliances"
    }

    fn plan(
        &self,
        state: State,
        want: &Value,
        have: &Value,
        _protected: &[String],
    ) -> ModuleResult<Plan> {
        let have = remove_empties(&instance_map(have, "system")?);
        let have_keys = authorized_keys(&have)?.unwrap_or_default();

        if state == State::Deleted && want.is_null() {
            return Ok(Self::keys(Some(&[]), &have_keys, true));
        }

        let want = remove_empties(&instance_map(want, "config")?);
        check_options(&want)?;
        let want_keys = authorized_keys(&want)?;

        let mut plan = Plan::new();
        match state {
            State::Merged => {
                plan.extend(Self::scalars(&want, &have, true));
                plan.extend(Self::keys(want_keys.as_deref(), &have_keys, false));
                plan.extend(Self::reboot(&want));
            }
            State::Replaced => {
                plan.extend(Self::keys(want_keys.as_deref(), &have_keys, true));
                plan.extend(Self::scalars(&want, &have, false));
                plan.extend(Self::reboot(&want));
            }
            State::Overridden => {
                let want_keys = want_keys.unwrap_or_default();
                plan.extend(Self::keys(Some(&want_keys), &have_keys, true));
                plan.extend(Self::scalars(&want, &have, false));
                plan.extend(Self::reboot(&want));
            }
            State::Deleted => {
                for key in want_keys.unwrap_or_default() {
                    match have_keys.iter().find(|existing| same_key(&key, existing)) {
                        Some(existing) => {
                            if let Some(id) = field_str(existing, "id") {
                                plan.push(Some(remove_key(&id)));
                            }
                        }
                        None => tracing::debug!("authorized key not on the device"),
                    }
                }
                for option in SystemOption::ALL {
                    if want.contains_key(option.name()) {
                        plan.warn(format!("system option {} cannot be deleted, ignored", option.name()));
                    }
                }
            }
            State::Gathered | State::Rendered => {}
        }

        Ok(plan)
    }
}
