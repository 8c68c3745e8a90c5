pub(crate) mod catalog;
pub(crate) mod errors;
pub(crate) mod grading;
pub(crate) mod lifecycle;
pub(crate) mod scoring;
pub(crate) mod submission;
pub(crate) mod validation;

use crate::core::security::ActorRole;

/// The caller as resolved by the identity layer.
#[derive(Debug, Clone)]
pub(crate) struct Actor {
    pub(crate) organization_id: String,
    pub(crate) actor_id: String,
    pub(crate) role: ActorRole,
}
