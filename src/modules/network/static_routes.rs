//! Static IP routes (`om_static_routes`).
//!
//! Routes are matched on `destination_address`. When none of the declared
//! routes exists yet, `overridden` replaces the whole table with one bulk PUT.

use super::collection::{self, Collection, CollectionResource, CollectionSpec};
use super::common::{field_str, without, Command, Instance};
use super::identity::IdentityMap;
use super::{Plan, Resource, ResourceModule};
use crate::diff::remove_empties;
use crate::modules::ModuleResult;
use serde_json::{json, Value};

/// The `static_routes` collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRoutes;

impl CollectionResource for StaticRoutes {
    const RESOURCE: Resource = Resource::StaticRoutes;
    const DESCRIPTION: &'static str = "Manage static routes on Opengear OM appliances";
    const SPEC: CollectionSpec =
        CollectionSpec::new("static_route", "destination_address", "static_routes/");

    fn overridden(
        want: &[Instance],
        have: &[Instance],
        protected: &[String],
    ) -> ModuleResult<Plan> {
        let ids = IdentityMap::new(have, Self::SPEC.name_field);
        let keeps_any = want.iter().any(|route| ids.resolve(route).id.is_some());

        if keeps_any || (have.is_empty() && want.is_empty()) {
            return Ok(collection::overridden(&Self::SPEC, want, have, protected));
        }

        let routes: Vec<Value> = want
            .iter()
            .map(|route| Value::Object(remove_empties(&without(route, &["id"]))))
            .collect();
        tracing::debug!(
            routes = routes.len(),
            replaced = have.iter().filter_map(|r| field_str(r, "id")).count(),
            "replacing the route table"
        );

        let mut plan = Plan::new();
        plan.push(Some(Command::put(
            Self::SPEC.path,
            json!({ "static_routes": routes }),
        )));
        Ok(plan)
    }
}

pub type StaticRoutesModule = ResourceModule<Collection<StaticRoutes>>;
