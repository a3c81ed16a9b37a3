//! Power distribution units (`om_pdus`).

use super::collection::{Collection, CollectionResource, CollectionSpec};
use super::{Resource, ResourceModule};

/// The `pdus` collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pdus;

impl CollectionResource for Pdus {
    const RESOURCE: Resource = Resource::Pdus;
    const DESCRIPTION: &'static str = "Manage power distribution units on Opengear OM appliances";
    const SPEC: CollectionSpec = CollectionSpec::new("pdu", "name", "pdus/");
}

pub type PdusModule = ResourceModule<Collection<Pdus>>;
