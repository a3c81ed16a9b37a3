//! Local user accounts (`om_users`).
//!
//! Users are matched on `username`. The primary administrator (`users-1` by
//! default) is never deleted. A merge is a no-op when everything it would send
//! is already on the device; declaring either `password` or `hashed_password`
//! replaces the other one. On `replaced`, an account whose `groups` are not
//! declared loses all of its group memberships.

use super::collection::{Collection, CollectionResource, CollectionSpec, MergeCheck};
use super::{Resource, ResourceModule};

/// The `users` collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Users;

impl CollectionResource for Users {
    const RESOURCE: Resource = Resource::Users;
    const DESCRIPTION: &'static str = "Manage local user accounts on Opengear OM appliances";
    const SPEC: CollectionSpec = CollectionSpec::new("user", "username", "users/")
        .merge_check(MergeCheck::Subset)
        .secret_eviction()
        .cleared_when_absent(&["groups"]);
}

pub type UsersModule = ResourceModule<Collection<Users>>;
