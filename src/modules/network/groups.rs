//! User groups (`om_groups`).
//!
//! Groups are matched on `groupname`; `groups-1` (the admin group) is never
//! deleted. Unlike the other collections, applying commands keeps a running
//! mirror of the groups so `after` is reported without reading the device
//! again.

use super::collection::{Collection, CollectionResource, CollectionSpec};
use super::common::{field_str, instance_list, Command, Instance};
use super::{send_command, Resource, ResourceModule};
use crate::connection::{Method, Response};
use crate::diff::remove_empties;
use crate::modules::{ModuleContext, ModuleResult};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

/// The `groups` collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Groups;

impl CollectionResource for Groups {
    const RESOURCE: Resource = Resource::Groups;
    const DESCRIPTION: &'static str = "Manage user groups on Opengear OM appliances";
    const SPEC: CollectionSpec = CollectionSpec::new("group", "groupname", "groups/");

    fn apply(
        commands: &[Command],
        have: &Value,
        context: &ModuleContext,
    ) -> ModuleResult<Option<Value>> {
        let mut mirror = GroupMirror::new(&instance_list(have, "groups")?);
        for command in commands {
            let response =
                send_command(context.client.as_ref(), command, &context.empty_body_marker)?;
            mirror.record(command, &response);
        }
        Ok(mirror.into_facts())
    }
}

pub type GroupsModule = ResourceModule<Collection<Groups>>;

/// Groups as they stand after each applied command.
#[derive(Debug, Clone, Default)]
struct GroupMirror {
    groups: IndexMap<String, Instance>,
    exact: bool,
}

impl GroupMirror {
    fn new(have: &[Instance]) -> Self {
        let groups = have
            .iter()
            .filter_map(|group| field_str(group, "id").map(|id| (id, group.clone())))
            .collect();
        Self {
            groups,
            exact: true,
        }
    }

    fn record(&mut self, command: &Command, response: &Response) {
        let target = command
            .path
            .strip_prefix(Groups::SPEC.path)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let returned = response
            .get("group")
            .and_then(Value::as_object)
            .cloned();

        match (command.method, target, returned) {
            (Method::Delete, Some(id), _) => {
                self.groups.shift_remove(&id);
            }
            (Method::Put, Some(id), Some(group)) => {
                self.groups.insert(id, group);
            }
            (Method::Put, Some(id), None) => {
                match command
                    .data
                    .as_ref()
                    .and_then(|data| data.get("group"))
                    .and_then(Value::as_object)
                {
                    Some(sent) => {
                        let mut group = sent.clone();
                        group.insert("id".into(), Value::String(id.clone()));
                        self.groups.insert(id, group);
                    }
                    None => self.exact = false,
                }
            }
            (Method::Post, _, Some(group)) => match field_str(&group, "id") {
                Some(id) => {
                    self.groups.insert(id, group);
                }
                None => self.exact = false,
            },
            _ => {
                debug!(path = %command.path, "cannot mirror response, facts will be re-read");
                self.exact = false;
            }
        }
    }

    fn into_facts(self) -> Option<Value> {
        if !self.exact {
            return None;
        }
        Some(Value::Array(
            self.groups
                .into_values()
                .map(|group| Value::Object(remove_empties(&group)))
                .collect(),
        ))
    }
}
