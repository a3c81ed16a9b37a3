//! Serial ports (`om_ports`).
//!
//! Ports exist in hardware, so they are only ever updated: a declared port
//! whose id is unknown to the device is skipped with a warning. Besides the
//! port settings this module drives three side channels:
//!
//! - `power`: a power action for the device attached to the port
//! - `auto_discover`: the port auto-discovery schedule, and `start` to run it now
//! - `sessions`: `state: deleted` terminates console sessions
//!
//! Configuration shape:
//!
//! ```yaml
//! config:
//!   ports:
//!     - id: ports-1
//!       label: core-sw-01
//!       mode: consoleServer
//!       escape_char: "~"
//!       power: cycle
//!   auto_discover:
//!     ports: [ports-1, ports-2]
//!     schedule: {enabled: true, period: weekly, day_of_week: monday}
//!     start: false
//! ```

use super::common::{field_str, instance_list, instance_map, without, Command, CommandBuilder, Instance};
use super::{Plan, Reconciler, Resource, ResourceModule, State};
use crate::diff::{dict_diff, dict_merge, is_subset, normalized_eq, remove_empties};
use crate::modules::ModuleResult;
use indexmap::IndexMap;
use serde_json::{json, Value};

const PORTS_PATH: &str = "ports/";
const AUTO_DISCOVER_PATH: &str = "ports/auto_discover";

/// Fields only meaningful in `consoleServer` mode.
const CONSOLE_SERVER_FIELDS: [&str; 2] = ["escape_char", "ip_alias"];
/// Fields only meaningful in `localConsole` mode.
const LOCAL_CONSOLE_FIELDS: [&str; 2] = ["terminal_emulation", "kernel_debug"];

/// Reconciler for serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ports;

pub type PortsModule = ResourceModule<Ports>;

impl Reconciler for Ports {
    fn resource(&self) -> Resource {
        Resource::Ports
    }

    fn description(&self) -> &'static str {
        "Manage serial ports, port power and auto-discovery on Opengear OM appliances"
    }

    fn plan(
        &self,
        state: State,
        want: &Value,
        have: &Value,
        _protected: &[String],
    ) -> ModuleResult<Plan> {
        let have = instance_map(have, "ports")?;
        let have_ports = index_ports(&instance_list(
            have.get("ports").unwrap_or(&Value::Null),
            "ports",
        )?);
        let have_discover = instance_map(
            have.get("auto_discover").unwrap_or(&Value::Null),
            "auto_discover",
        )?;

        if state == State::Deleted && want.is_null() {
            return Ok(terminate_all_sessions(&have_ports));
        }

        let want = remove_empties(&instance_map(want, "config")?);
        let want_ports = instance_list(want.get("ports").unwrap_or(&Value::Null), "ports")?;
        let want_discover = instance_map(
            want.get("auto_discover").unwrap_or(&Value::Null),
            "auto_discover",
        )?;

        let mut plan = Plan::new();
        match state {
            State::Merged => {
                plan.extend(update_ports(&want_ports, Some(&have_ports), true));
                plan.extend(auto_discover(&want_discover, &have_discover, true));
            }
            State::Replaced | State::Overridden => {
                plan.extend(update_ports(&want_ports, Some(&have_ports), false));
                plan.extend(auto_discover(&want_discover, &have_discover, false));
            }
            State::Deleted => plan.extend(terminate_sessions(&want_ports, &have_ports)),
            State::Gathered | State::Rendered => {}
        }
        Ok(plan)
    }

    fn render(&self, want: &Value) -> ModuleResult<Plan> {
        let want = remove_empties(&instance_map(want, "config")?);
        let want_ports = instance_list(want.get("ports").unwrap_or(&Value::Null), "ports")?;
        let want_discover = instance_map(
            want.get("auto_discover").unwrap_or(&Value::Null),
            "auto_discover",
        )?;

        let mut plan = update_ports(&want_ports, None, false);
        plan.extend(auto_discover(&want_discover, &Instance::new(), false));
        Ok(plan)
    }
}

fn index_ports(ports: &[Instance]) -> IndexMap<String, Instance> {
    ports
        .iter()
        .filter_map(|port| field_str(port, "id").map(|id| (id, port.clone())))
        .collect()
}

/// Drop settings that do not apply to the port's mode.
fn clear_mode_fields(port: &mut Instance) {
    let Some(mode) = port.get("mode").and_then(Value::as_str).map(str::to_string) else {
        return;
    };
    if mode != "consoleServer" {
        for field in CONSOLE_SERVER_FIELDS {
            port.remove(field);
        }
    }
    if mode != "localConsole" {
        for field in LOCAL_CONSOLE_FIELDS {
            port.remove(field);
        }
    }
}

/// PUT port settings and power actions.
///
/// With `have` set to `None` every declared port is written unconditionally.
fn update_ports(
    want: &[Instance],
    have: Option<&IndexMap<String, Instance>>,
    merge: bool,
) -> Plan {
    let mut plan = Plan::new();

    for port in want {
        let Some(id) = field_str(port, "id") else {
            plan.warn("port entry without an id skipped");
            continue;
        };

        let mut body = without(port, &["id", "sessions", "power"]);
        clear_mode_fields(&mut body);

        let update = match have {
            None => Some(body),
            Some(have) => match have.get(&id) {
                None => {
                    plan.warn(format!("port {} does not exist on the device, skipped", id));
                    continue;
                }
                Some(existing) => {
                    let existing = without(&remove_empties(existing), &["id", "sessions"]);
                    if merge {
                        if is_subset(&body, &existing) {
                            None
                        } else {
                            let mut merged = dict_merge(&existing, &body);
                            clear_mode_fields(&mut merged);
                            Some(merged)
                        }
                    } else if normalized_eq(&body, &existing) {
                        None
                    } else {
                        Some(body)
                    }
                }
            },
        };

        if let Some(update) = update {
            plan.push(
                CommandBuilder::new(PORTS_PATH)
                    .body("port", update)
                    .id(Some(&id))
                    .build(),
            );
        }

        if let Some(power) = port.get("power") {
            plan.push(Some(Command::put(
                format!("{}{}/power", PORTS_PATH, id),
                json!({ "cmd": power }),
            )));
        }
    }

    plan
}

/// Keep `day_of_week` only for weekly and `day_of_month` only for monthly schedules.
fn clear_period_fields(schedule: &mut Instance) {
    let Some(period) = schedule.get("period").and_then(Value::as_str).map(str::to_string) else {
        return;
    };
    if period != "weekly" {
        schedule.remove("day_of_week");
    }
    if period != "monthly" {
        schedule.remove("day_of_month");
    }
}

fn sorted_ports(value: Option<&Value>) -> Option<Vec<Value>> {
    let mut ports = value?.as_array()?.clone();
    ports.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    Some(ports)
}

/// Schedule update and on-demand discovery run.
fn auto_discover(want: &Instance, have: &Instance, merge: bool) -> Plan {
    let mut plan = Plan::new();
    if want.is_empty() {
        return plan;
    }

    let have_ports = sorted_ports(have.get("ports")).unwrap_or_default();
    let declared_ports = sorted_ports(want.get("ports"));
    let ports = match declared_ports {
        Some(ports) => ports,
        None if merge => have_ports.clone(),
        None => Vec::new(),
    };

    if let Some(schedule) = want.get("schedule").and_then(Value::as_object) {
        let have_schedule = have
            .get("schedule")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut schedule = if merge {
            dict_merge(&have_schedule, schedule)
        } else {
            schedule.clone()
        };
        clear_period_fields(&mut schedule);

        let schedule_changed = if merge {
            !dict_diff(&have_schedule, &schedule).is_empty()
        } else {
            !normalized_eq(&have_schedule, &schedule)
        };

        if ports != have_ports || schedule_changed {
            schedule.insert("ports".into(), Value::Array(ports.clone()));
            plan.push(Some(Command::put(
                format!("{}/schedule", AUTO_DISCOVER_PATH),
                json!({ "auto_discover_schedule": schedule }),
            )));
        }
    }

    if want.get("start").and_then(Value::as_bool).unwrap_or(false) {
        plan.push(Some(Command::post(
            AUTO_DISCOVER_PATH,
            Some(json!({ "auto_discover": { "ports": ports } })),
        )));
    }

    plan
}

fn session_pids(port: &Instance) -> Vec<String> {
    port.get("sessions")
        .and_then(Value::as_array)
        .map(|sessions| {
            sessions
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|session| field_str(session, "client_pid"))
                .collect()
        })
        .unwrap_or_default()
}

fn end_sessions(id: &str, pids: &[String]) -> Vec<Command> {
    let path = format!("{}{}", PORTS_PATH, id);
    if pids.is_empty() {
        return CommandBuilder::new(&path)
            .id(Some("/sessions/"))
            .build()
            .into_iter()
            .collect();
    }
    pids.iter()
        .filter_map(|pid| {
            let suffix = format!("/sessions/{}", pid);
            CommandBuilder::new(&path).id(Some(&suffix)).build()
        })
        .collect()
}

/// Terminate the declared sessions, or every session of a port that lists none.
fn terminate_sessions(want: &[Instance], have: &IndexMap<String, Instance>) -> Plan {
    let mut plan = Plan::new();

    for port in want {
        let Some(id) = field_str(port, "id") else {
            plan.warn("port entry without an id skipped");
            continue;
        };
        let Some(existing) = have.get(&id) else {
            plan.warn(format!("port {} does not exist on the device, skipped", id));
            continue;
        };

        let active = session_pids(existing);
        let requested = session_pids(port);
        if active.is_empty() {
            continue;
        }

        let pids: Vec<String> = requested.into_iter().filter(|pid| active.contains(pid)).collect();
        if port.contains_key("sessions") && pids.is_empty() {
            continue;
        }
        for command in end_sessions(&id, &pids) {
            plan.push(Some(command));
        }
    }

    plan
}

fn terminate_all_sessions(have: &IndexMap<String, Instance>) -> Plan {
    let mut plan = Plan::new();
    for (id, port) in have {
        if !session_pids(port).is_empty() {
            for command in end_sessions(id, &[]) {
                plan.push(Some(command));
            }
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn have() -> Value {
        json!({
            "ports": [
                {"id": "ports-1", "label": "Port-1", "mode": "consoleServer", "escape_char": "~",
                 "pinout": "X2", "sessions": [{"client_pid": 4321, "username": "root"}]},
                {"id": "ports-2", "label": "Port-2", "mode": "localConsole", "terminal_emulation": "vt220"}
            ],
            "auto_discover": {
                "ports": ["ports-2", "ports-1"],
                "schedule": {"enabled": true, "period": "daily"}
            }
        })
    }

    fn plan(state: State, want: Value) -> Plan {
        Ports.plan(state, &want, &have(), &[]).unwrap()
    }

    #[test]
    fn test_merged_update_and_power() {
        let plan = plan(
            State::Merged,
            json!({"ports": [{"id": "ports-1", "label": "core-sw", "power": "cycle"}]}),
        );
        assert_eq!(
            plan.commands,
            vec![
                Command::put(
                    "ports/ports-1",
                    json!({"port": {"label": "core-sw", "mode": "consoleServer", "escape_char": "~", "pinout": "X2"}})
                ),
                Command::put("ports/ports-1/power", json!({"cmd": "cycle"})),
            ]
        );
    }

    #[test]
    fn test_merged_unchanged_port_only_power() {
        let plan = plan(
            State::Merged,
            json!({"ports": [{"id": "ports-2", "label": "Port-2", "power": "on"}]}),
        );
        assert_eq!(
            plan.commands,
            vec![Command::put("ports/ports-2/power", json!({"cmd": "on"}))]
        );
    }

    #[test]
    fn test_unknown_port_warns() {
        let plan = plan(State::Replaced, json!({"ports": [{"id": "ports-9", "label": "x"}]}));
        assert!(plan.commands.is_empty());
        assert_eq!(plan.warnings, vec!["port ports-9 does not exist on the device, skipped"]);
    }

    #[test]
    fn test_replaced_clears_mode_fields() {
        let plan = plan(
            State::Replaced,
            json!({"ports": [{"id": "ports-1", "label": "Port-1", "mode": "localConsole",
                              "escape_char": "~", "terminal_emulation": "vt100"}]}),
        );
        assert_eq!(
            plan.commands,
            vec![Command::put(
                "ports/ports-1",
                json!({"port": {"label": "Port-1", "mode": "localConsole", "terminal_emulation": "vt100"}})
            )]
        );
    }

    #[test]
    fn test_replaced_idempotent_ignores_sessions() {
        let plan = plan(
            State::Replaced,
            json!({"ports": [{"id": "ports-1", "label": "Port-1", "mode": "consoleServer",
                              "escape_char": "~", "pinout": "X2"}]}),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_schedule_period_clearing() {
        let plan = plan(
            State::Replaced,
            json!({"auto_discover": {
                "ports": ["ports-1"],
                "schedule": {"enabled": true, "period": "weekly", "day_of_week": "monday", "day_of_month": 3}
            }}),
        );
        assert_eq!(
            plan.commands,
            vec![Command::put(
                "ports/auto_discover/schedule",
                json!({"auto_discover_schedule": {
                    "enabled": true, "period": "weekly", "day_of_week": "monday", "ports": ["ports-1"]
                }})
            )]
        );
    }

    #[test]
    fn test_schedule_unchanged_with_reordered_ports() {
        let plan = plan(
            State::Replaced,
            json!({"auto_discover": {
                "ports": ["ports-1", "ports-2"],
                "schedule": {"enabled": true, "period": "daily"}
            }}),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_merged_start_uses_device_ports() {
        let plan = plan(State::Merged, json!({"auto_discover": {"start": true}}));
        assert_eq!(
            plan.commands,
            vec![Command::post(
                "ports/auto_discover",
                Some(json!({"auto_discover": {"ports": ["ports-1", "ports-2"]}}))
            )]
        );
    }

    #[test]
    fn test_deleted_builds_session_commands() {
        let plan = plan(
            State::Deleted,
            json!({"ports": [{"id": "ports-1", "sessions": [{"client_pid": 4321}, {"client_pid": 1}]},
                             {"id": "ports-2"}]}),
        );
        assert_eq!(plan.commands, vec![Command::delete("ports/ports-1/sessions/4321")]);

        let plan = Ports.plan(State::Deleted, &json!({"ports": [{"id": "ports-1"}]}), &have(), &[]).unwrap();
        assert_eq!(plan.commands, vec![Command::delete("ports/ports-1/sessions/")]);
    }

    #[test]
    fn test_deleted_without_config_ends_every_session() {
        let plan = Ports.plan(State::Deleted, &Value::Null, &have(), &[]).unwrap();
        assert_eq!(plan.commands, vec![Command::delete("ports/ports-1/sessions/")]);
    }

    #[test]
    fn test_render_writes_every_port() {
        let plan = Ports
            .render(&json!({"ports": [{"id": "ports-3", "mode": "disabled", "escape_char": "~"}]}))
            .unwrap();
        assert_eq!(
            plan.commands,
            vec![Command::put("ports/ports-3", json!({"port": {"mode": "disabled"}}))]
        );
    }
}
