//! Network connections (`om_conns`).
//!
//! Connection names are assigned by the device. They are used to find an
//! existing connection but are never sent in a request body.

use super::collection::{Collection, CollectionResource, CollectionSpec};
use super::{Resource, ResourceModule};

/// The `conns` collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conns;

impl CollectionResource for Conns {
    const RESOURCE: Resource = Resource::Conns;
    const DESCRIPTION: &'static str = "Manage network connections on Opengear OM appliances";
    const SPEC: CollectionSpec = CollectionSpec::new("conn", "name", "conns/").read_only(&["name"]);
}

pub type ConnsModule = ResourceModule<Collection<Conns>>;
