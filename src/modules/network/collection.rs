//! Reconciliation of list-shaped resources.
//!
//! Users, groups, connections, PDUs, physical interfaces and static routes all
//! follow the same rules; they differ only in their [`CollectionSpec`]. The
//! list collections inside `services` reuse the same functions with a spec
//! chosen at runtime.

use super::common::{field_str, instance_list, without, Command, CommandBuilder, Instance};
use super::identity::{IdentityMap, Resolved};
use super::{send_all, Plan, Reconciler, Resource, State};
use crate::diff::{dict_diff, dict_merge, is_subset, normalized_eq, remove_empties};
use crate::modules::{ModuleContext, ModuleResult};
use serde_json::Value;
use std::collections::HashSet;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// How `merged` decides that merging changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeCheck {
    /// The merged instance is already contained in the existing one.
    Subset,
    /// The merged instance has no field that differs from the existing one.
    Diff,
}

/// REST shape and reconciliation quirks of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSpec {
    /// Envelope key of request bodies, e.g. `user`
    pub body_key: &'static str,
    /// Natural name used when an instance has no id
    pub name_field: &'static str,
    /// Instance path prefix; the id is appended directly
    pub path: &'static str,
    /// Path new instances are POSTed to
    pub create_path: &'static str,
    pub merge_check: MergeCheck,
    /// `password` and `hashed_password` are mutually exclusive
    pub secret_eviction: bool,
    /// Sequence fields sent as `[]` on replace when not declared
    pub cleared_when_absent: &'static [&'static str],
    /// Fields the device assigns and never accepts in a body
    pub read_only: &'static [&'static str],
}

impl CollectionSpec {
    pub const fn new(body_key: &'static str, name_field: &'static str, path: &'static str) -> Self {
        Self {
            body_key,
            name_field,
            path,
            create_path: path,
            merge_check: MergeCheck::Diff,
            secret_eviction: false,
            cleared_when_absent: &[],
            read_only: &[],
        }
    }

    pub const fn create_path(mut self, path: &'static str) -> Self {
        self.create_path = path;
        self
    }

    pub const fn merge_check(mut self, check: MergeCheck) -> Self {
        self.merge_check = check;
        self
    }

    pub const fn secret_eviction(mut self) -> Self {
        self.secret_eviction = true;
        self
    }

    pub const fn cleared_when_absent(mut self, fields: &'static [&'static str]) -> Self {
        self.cleared_when_absent = fields;
        self
    }

    pub const fn read_only(mut self, fields: &'static [&'static str]) -> Self {
        self.read_only = fields;
        self
    }

    /// PUT to the instance path when `id` is set, POST to the create path otherwise.
    pub fn write(&self, id: Option<&str>, body: &Instance) -> Option<Command> {
        let mut skipped: Vec<&str> = vec!["id"];
        skipped.extend_from_slice(self.read_only);
        let body = without(body, &skipped);
        if body.is_empty() {
            debug!(path = self.path, "nothing left to send after dropping read-only fields");
            return None;
        }

        match id {
            Some(id) => CommandBuilder::new(self.path)
                .body(self.body_key, body)
                .id(Some(id))
                .build(),
            None => CommandBuilder::new(self.create_path)
                .body(self.body_key, body)
                .build(),
        }
    }

    /// DELETE the instance unless it is protected.
    pub fn delete(&self, id: &str, protected: &[String]) -> Option<Command> {
        let command = CommandBuilder::new(self.path)
            .id(Some(id))
            .protect(protected)
            .build();
        if command.is_none() {
            debug!(id, "protected instance kept");
        }
        command
    }

    fn evict_secrets(&self, existing: &Instance, declared: &Instance) -> Instance {
        if !self.secret_eviction {
            return existing.clone();
        }
        if declared.contains_key("password") {
            without(existing, &["hashed_password"])
        } else if declared.contains_key("hashed_password") {
            without(existing, &["password"])
        } else {
            existing.clone()
        }
    }

    fn merge_is_noop(&self, merged: &Instance, existing: &Instance) -> bool {
        match self.merge_check {
            MergeCheck::Subset => is_subset(merged, existing),
            MergeCheck::Diff => dict_diff(existing, merged).is_empty(),
        }
    }
}

/// Update matched instances with the declared fields, create the rest.
pub fn merged(spec: &CollectionSpec, want: &[Instance], have: &[Instance]) -> Plan {
    let ids = IdentityMap::new(have, spec.name_field);
    let mut plan = Plan::new();

    for instance in want {
        let Resolved { id, instance: data } = ids.resolve(&remove_empties(instance));

        let Some((id, existing)) = id.as_deref().and_then(|id| ids.get(id).map(|e| (id, e))) else {
            plan.push(spec.write(None, &data));
            continue;
        };

        let data = without(&data, spec.read_only);
        let existing = spec.evict_secrets(&without(existing, &["id"]), &data);
        let merged = dict_merge(&existing, &data);
        if spec.merge_is_noop(&merged, &existing) {
            trace!(id, "already merged");
            continue;
        }
        plan.push(spec.write(Some(id), &merged));
    }

    plan
}

/// Make matched instances exactly as declared, create the rest.
pub fn replaced(spec: &CollectionSpec, want: &[Instance], have: &[Instance]) -> Plan {
    let ids = IdentityMap::new(have, spec.name_field);
    let mut plan = Plan::new();

    for instance in want {
        let Resolved { id, instance: data } = ids.resolve(instance);
        let mut data = remove_empties(&data);

        if let Some(existing) = id.as_deref().and_then(|id| ids.get(id)) {
            if normalized_eq(&data, &without(existing, &["id"])) {
                trace!(id = id.as_deref(), "already replaced");
                continue;
            }
            for field in spec.cleared_when_absent {
                data.entry(field.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
            }
        }

        plan.push(spec.write(id.as_deref(), &data));
    }

    plan
}

/// Delete every undeclared instance, then replace the declared ones.
///
/// Deletes come first and follow the device's order.
pub fn overridden(
    spec: &CollectionSpec,
    want: &[Instance],
    have: &[Instance],
    protected: &[String],
) -> Plan {
    let ids = IdentityMap::new(have, spec.name_field);
    let referenced: HashSet<String> = want.iter().filter_map(|i| ids.resolve(i).id).collect();

    let mut plan = Plan::new();
    for id in ids.ids().filter(|id| !referenced.contains(*id)) {
        plan.push(spec.delete(id, protected));
    }
    plan.extend(replaced(spec, want, have));
    plan
}

/// Delete the declared instances. Entries that match nothing are skipped.
pub fn deleted(
    spec: &CollectionSpec,
    want: &[Instance],
    have: &[Instance],
    protected: &[String],
) -> Plan {
    let ids = IdentityMap::new(have, spec.name_field);
    let mut plan = Plan::new();

    for instance in want {
        match ids.resolve(instance).id {
            Some(id) => plan.push(spec.delete(&id, protected)),
            None => debug!(
                name = field_str(instance, spec.name_field).as_deref(),
                "no matching instance to delete"
            ),
        }
    }

    plan
}

/// A list-shaped resource reconciled by this module's rules.
pub trait CollectionResource: Send + Sync + 'static {
    const RESOURCE: Resource;
    const DESCRIPTION: &'static str;
    const SPEC: CollectionSpec;

    fn overridden(
        want: &[Instance],
        have: &[Instance],
        protected: &[String],
    ) -> ModuleResult<Plan> {
        Ok(overridden(&Self::SPEC, want, have, protected))
    }

    fn apply(
        commands: &[Command],
        _have: &Value,
        context: &ModuleContext,
    ) -> ModuleResult<Option<Value>> {
        send_all(commands, context)?;
        Ok(None)
    }
}

/// [`Reconciler`] for any [`CollectionResource`].
pub struct Collection<R>(PhantomData<R>);

impl<R> Default for Collection<R> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<R> Clone for Collection<R> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<R> std::fmt::Debug for Collection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Collection")
            .field(&std::any::type_name::<R>())
            .finish()
    }
}

impl<R: CollectionResource> Reconciler for Collection<R> {
    fn resource(&self) -> Resource {
        R::RESOURCE
    }

    fn description(&self) -> &'static str {
        R::DESCRIPTION
    }

    fn plan(
        &self,
        state: State,
        want: &Value,
        have: &Value,
        protected: &[String],
    ) -> ModuleResult<Plan> {
        let have = instance_list(have, R::RESOURCE.name())?;

        match state {
            State::Merged => Ok(merged(&R::SPEC, &instance_list(want, "config")?, &have)),
            State::Replaced => Ok(replaced(&R::SPEC, &instance_list(want, "config")?, &have)),
            State::Overridden => R::overridden(&instance_list(want, "config")?, &have, protected),
            State::Deleted if want.is_null() => Ok(deleted(&R::SPEC, &have, &have, protected)),
            State::Deleted => Ok(deleted(
                &R::SPEC,
                &instance_list(want, "config")?,
                &have,
                protected,
            )),
            State::Gathered | State::Rendered => Ok(Plan::new()),
        }
    }

    fn apply(
        &self,
        commands: &[Command],
        have: &Value,
        context: &ModuleContext,
    ) -> ModuleResult<Option<Value>> {
        R::apply(commands, have, context)
    }
}
