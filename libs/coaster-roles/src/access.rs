use std::collections::BTreeSet;
use std::sync::Arc;

use crate::constants::{ROLE_ALL, ROLE_ANON, ROLE_AUTH};
use crate::context::AuthContext;
use crate::error::{AccessError, ConfigError, RoleError};
use crate::grants::actors_with;
use crate::identity::{Anchor, Identity};
use crate::lazy_set::LazyRoleSet;
use crate::model::ModelRef;
use crate::proxy::{RoleAccessProxy, RoleSource};

/// Parameters for [`ModelAccess::access_for`]. Either an actor (with
/// optional anchors) or an explicit role set, never both.
#[derive(Debug, Clone, Default)]
pub struct AccessRequest {
    actor: Option<Identity>,
    anchors: Vec<Anchor>,
    roles: Option<BTreeSet<String>>,
    datasets: Option<Vec<String>>,
}

impl AccessRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Actor and anchors taken from an auth context.
    #[must_use]
    pub fn from_context(ctx: &AuthContext) -> Self {
        Self {
            actor: ctx.actor().cloned(),
            anchors: ctx.anchors().to_vec(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn actor(mut self, actor: Identity) -> Self {
        self.actor = Some(actor);
        self
    }

    #[must_use]
    pub fn anchor(mut self, anchor: impl Into<Anchor>) -> Self {
        self.anchors.push(anchor.into());
        self
    }

    #[must_use]
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Dataset names, outermost object first.
    #[must_use]
    pub fn datasets<I, S>(mut self, datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.datasets = Some(datasets.into_iter().map(Into::into).collect());
        self
    }
}

/// Role resolution entry points for model objects.
pub trait ModelAccess {
    /// Roles `actor` holds on this object. `all` plus `anon` or `auth`
    /// are granted up front, the model's
    /// [`crate::RoleModel::adjust_roles`] hook runs next, and everything else
    /// is resolved lazily.
    fn roles_for(&self, actor: Option<&Identity>, anchors: &[Anchor]) -> LazyRoleSet;

    /// Wrap the object in a role-filtered proxy.
    ///
    /// # Errors
    /// [`ConfigError::RolesWithActor`] if the request has both roles and an
    /// actor or anchors; [`AccessError::MissingDataset`] for an undeclared
    /// dataset.
    fn access_for(&self, request: AccessRequest) -> Result<RoleAccessProxy, AccessError>;

    fn current_roles(&self, ctx: &AuthContext) -> LazyRoleSet {
        self.roles_for(ctx.actor(), ctx.anchors())
    }

    /// # Errors
    /// Same as [`Self::access_for`].
    fn current_access(
        &self,
        ctx: &AuthContext,
        datasets: Option<&[&str]>,
    ) -> Result<RoleAccessProxy, AccessError> {
        let mut request = AccessRequest::from_context(ctx);
        if let Some(datasets) = datasets {
            request = request.datasets(datasets.iter().copied());
        }
        self.access_for(request)
    }

    /// Actors holding any of `roles` through `granted_by` or `granted_via`,
    /// each listed once with the first role found for it.
    ///
    /// # Errors
    /// Returns a [`RoleError`] when a declared relationship path does not
    /// resolve.
    fn actors_with(&self, roles: &[&str]) -> Result<Vec<(Identity, String)>, RoleError>;
}

impl ModelAccess for ModelRef {
    fn roles_for(&self, actor: Option<&Identity>, anchors: &[Anchor]) -> LazyRoleSet {
        let base = if actor.is_some() {
            [ROLE_ALL, ROLE_AUTH]
        } else {
            [ROLE_ALL, ROLE_ANON]
        };
        let mut roles = LazyRoleSet::new(Arc::clone(self), actor.cloned(), anchors.to_vec(), base);
        self.adjust_roles(&mut roles, actor, anchors);
        roles
    }

    fn access_for(&self, request: AccessRequest) -> Result<RoleAccessProxy, AccessError> {
        let AccessRequest {
            actor,
            anchors,
            roles,
            datasets,
        } = request;
        let source = match roles {
            Some(_) if actor.is_some() || !anchors.is_empty() => {
                return Err(ConfigError::RolesWithActor.into());
            }
            Some(roles) => RoleSource::Fixed(roles),
            None => RoleSource::Lazy(self.roles_for(actor.as_ref(), &anchors)),
        };
        RoleAccessProxy::new(
            Arc::clone(self),
            source,
            datasets,
            self.model_class().name().to_owned(),
        )
    }

    fn actors_with(&self, roles: &[&str]) -> Result<Vec<(Identity, String)>, RoleError> {
        actors_with(self, roles)
    }
}
