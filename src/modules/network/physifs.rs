//! Physical and aggregate network interfaces (`om_physifs`).
//!
//! New interfaces are POSTed to `physifs` (no trailing slash); existing ones
//! are addressed as `physifs/{id}`. Replacing an interface without declaring
//! `slaves` detaches all of them.

use super::collection::{Collection, CollectionResource, CollectionSpec};
use super::{Resource, ResourceModule};

/// The `physifs` collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Physifs;

impl CollectionResource for Physifs {
    const RESOURCE: Resource = Resource::Physifs;
    const DESCRIPTION: &'static str = "Manage network interfaces on Opengear OM appliances";
    const SPEC: CollectionSpec = CollectionSpec::new("physif", "name", "physifs/")
        .create_path("physifs")
        .secret_eviction()
        .cleared_when_absent(&["slaves"]);
}

pub type PhysifsModule = ResourceModule<Collection<Physifs>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::network::{Command, Reconciler, State};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn have() -> Value {
        json!([
            {"id": "system_net_physifs1", "name": "net1", "media": "ethernet", "enabled": true},
            {"id": "system_net_physifs3", "name": "bond0", "media": "bond", "slaves": ["net1", "net2"]}
        ])
    }

    #[test]
    fn test_create_path_has_no_slash() {
        let want = json!([{"name": "br0", "media": "bridge", "slaves": ["net2"]}]);
        let plan = Collection::<Physifs>::default()
            .plan(State::Merged, &want, &have(), &[])
            .unwrap();
        assert_eq!(
            plan.commands,
            vec![Command::post(
                "physifs",
                Some(json!({"physif": {"name": "br0", "media": "bridge", "slaves": ["net2"]}}))
            )]
        );
    }

    #[test]
    fn test_replaced_detaches_slaves() {
        let want = json!([{"name": "bond0", "media": "bond", "description": "uplink"}]);
        let plan = Collection::<Physifs>::default()
            .plan(State::Replaced, &want, &have(), &[])
            .unwrap();
        assert_eq!(
            plan.commands,
            vec![Command::put(
                "physifs/system_net_physifs3",
                json!({"physif": {"name": "bond0", "media": "bond", "description": "uplink", "slaves": []}})
            )]
        );
    }

    #[test]
    fn test_merged_unchanged_interface() {
        let want = json!([{"id": "system_net_physifs1", "enabled": true}]);
        let plan = Collection::<Physifs>::default()
            .plan(State::Merged, &want, &have(), &[])
            .unwrap();
        assert!(plan.is_empty());
    }
}
