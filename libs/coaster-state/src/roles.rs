//! Role-gated access to transitions.
//!
//! A transition is callable through a [`RoleAccessProxy`] only when the
//! proxy's roles grant `call` on an attribute with the transition's name.

use std::sync::Arc;

use coaster_roles::{AccessError, AccessRequest, ModelAccess, ModelRef, RoleAccessProxy, RoleModel};

use crate::error::TransitionError;
use crate::labeled_enum::StateValue;
use crate::manager::StateManager;
use crate::transition::{Transition, TransitionInfo, TransitionResult};

impl<T, V> StateManager<T, V>
where
    T: RoleModel + 'static,
    V: StateValue,
{
    /// Transitions that are available for `obj` and that the requesting
    /// actor or role set may call.
    ///
    /// # Errors
    /// Whatever [`ModelAccess::access_for`] rejects, such as a request with
    /// both an actor and explicit roles.
    pub fn transitions_for(
        &self,
        obj: &Arc<T>,
        request: AccessRequest,
    ) -> Result<Vec<Arc<dyn TransitionInfo<T>>>, AccessError> {
        let model: ModelRef = Arc::clone(obj) as ModelRef;
        let proxy = model.access_for(request)?;
        let mut allowed = Vec::new();
        for transition in self.transitions(obj, true) {
            if proxy.can_call(transition.name())? {
                allowed.push(transition);
            }
        }
        Ok(allowed)
    }
}

impl<T, A, R> Transition<T, A, R>
where
    T: RoleModel,
{
    /// Call the transition on behalf of `proxy`'s roles.
    ///
    /// `obj` must be the object `proxy` wraps; this is not checked.
    ///
    /// # Errors
    /// [`TransitionError::Access`] when the roles do not grant `call` on the
    /// transition, otherwise the errors of [`Transition::call`].
    pub fn call_via(
        &self,
        proxy: &RoleAccessProxy,
        obj: &T,
        args: A,
    ) -> Result<TransitionResult<R>, TransitionError> {
        if !proxy.can_call(self.name())? {
            tracing::debug!(transition = %self.name(), "Transition not callable with these roles");
            return Err(AccessError::NoAttribute {
                class: proxy.obj().model_class().name().to_owned(),
                attr: self.name().to_owned(),
            }
            .into());
        }
        self.call(obj, args)
    }
}
