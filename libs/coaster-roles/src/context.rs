use crate::identity::{Anchor, Identity};

/// `AuthContext` carries the current actor and the anchors presented with
/// the request. Role resolution consults it when no explicit actor or role
/// set is supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AuthContext {
    actor: Option<Identity>,
    anchors: Vec<Anchor>,
}

impl AuthContext {
    /// Create a new `AuthContext` builder
    #[must_use]
    pub fn builder() -> AuthContextBuilder {
        AuthContextBuilder::default()
    }

    /// Create an anonymous `AuthContext` with no actor and no anchors
    #[must_use]
    pub fn anonymous() -> Self {
        AuthContextBuilder::default().build()
    }

    #[must_use]
    pub fn actor(&self) -> Option<&Identity> {
        self.actor.as_ref()
    }

    #[must_use]
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.actor.is_some()
    }
}

#[derive(Default)]
pub struct AuthContextBuilder {
    actor: Option<Identity>,
    anchors: Vec<Anchor>,
}

impl AuthContextBuilder {
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
    pub fn anchors(mut self, anchors: impl IntoIterator<Item = Anchor>) -> Self {
        self.anchors.extend(anchors);
        self
    }

    #[must_use]
    pub fn build(self) -> AuthContext {
        AuthContext {
            actor: self.actor,
            anchors: self.anchors,
        }
    }
}
