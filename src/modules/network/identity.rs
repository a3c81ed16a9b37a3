//! Matching declared instances to device objects.
//!
//! A declared instance refers to an existing object either by its device id or
//! by its natural name (`username`, `groupname`, `name`, ...). Resolution never
//! touches the caller's value; the `id`-less copy is returned alongside the id.

use super::common::{field_str, without, Instance};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Result of resolving one declared instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Id of the matching device object, or `None` for a new object.
    pub id: Option<String>,
    /// The declared instance without its `id` field.
    pub instance: Instance,
}

/// Resolve `instance` against a `name -> id` map.
///
/// A declared `id` is honoured only if it is one of the map's ids. Otherwise
/// the value of `name_field` is looked up.
pub fn find_instance_id(
    name_id_map: &HashMap<String, String>,
    name_field: &str,
    instance: &Instance,
) -> Resolved {
    resolve_with(
        |id| name_id_map.values().any(|known| known == id),
        |name| name_id_map.get(name).cloned(),
        name_field,
        instance,
    )
}

fn resolve_with(
    is_known_id: impl Fn(&str) -> bool,
    lookup_name: impl Fn(&str) -> Option<String>,
    name_field: &str,
    instance: &Instance,
) -> Resolved {
    let declared = field_str(instance, "id").filter(|id| is_known_id(id));
    let id = declared.or_else(|| field_str(instance, name_field).and_then(|n| lookup_name(&n)));

    Resolved {
        id,
        instance: without(instance, &["id"]),
    }
}

/// Lookup tables over one `have` snapshot.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    name_field: String,
    names: HashMap<String, String>,
    instances: IndexMap<String, Instance>,
}

impl IdentityMap {
    /// Index `have` by id (keeping device order) and by `name_field`.
    pub fn new(have: &[Instance], name_field: &str) -> Self {
        let mut names = HashMap::new();
        let mut instances = IndexMap::new();

        for instance in have {
            let Some(id) = field_str(instance, "id") else {
                continue;
            };
            if let Some(name) = field_str(instance, name_field) {
                names.insert(name, id.clone());
            }
            instances.insert(id, instance.clone());
        }

        Self {
            name_field: name_field.to_string(),
            names,
            instances,
        }
    }

    /// Resolve a declared instance to an existing id.
    ///
    /// Same rule as [`find_instance_id`]: a declared `id` must belong to a
    /// named device object.
    pub fn resolve(&self, instance: &Instance) -> Resolved {
        resolve_with(
            |id| self.names.values().any(|known| known == id),
            |name| self.names.get(name).cloned(),
            &self.name_field,
            instance,
        )
    }

    /// The `name -> id` table.
    pub fn names(&self) -> &HashMap<String, String> {
        &self.names
    }

    pub fn get(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// Ids in device order.
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.instances.keys()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
