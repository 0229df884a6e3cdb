use crate::annotations::{AnnotationFact, WithRoles};
use crate::registry::{AnnotationKey, AnnotationRegistry, AnnotationToken};

/// Shape of a relationship as seen by role resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Scalar,
    /// Lists and sets.
    Sequence,
    /// Dict-like collections keyed by string.
    Mapping,
    /// Lazily queryable collections supporting existence checks.
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Column,
    Relationship(RelationKind),
    Property,
    Method,
}

impl AttributeKind {
    #[must_use]
    pub fn is_relationship(self) -> bool {
        matches!(self, Self::Relationship(_))
    }

    /// Relationships and properties may hold related objects.
    #[must_use]
    pub fn may_relate(self) -> bool {
        matches!(self, Self::Relationship(_) | Self::Property)
    }
}

/// Descriptor for one attribute declared in a class body.
///
/// Cloning a descriptor (as inheritance does) keeps the facts stamped on it,
/// so a subclass sweep still finds them after the registry entry was claimed
/// by the base class. The clone drops the token: annotating it issues a fresh
/// one, and sibling clones never record under a shared key.
#[derive(Debug)]
pub struct Attribute {
    name: String,
    kind: AttributeKind,
    token: Option<AnnotationToken>,
    stamped: Vec<AnnotationFact>,
    sealed: bool,
}

impl Clone for Attribute {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            token: None,
            stamped: self.stamped.clone(),
            sealed: self.sealed,
        }
    }
}

impl Attribute {
    fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            token: None,
            stamped: Vec::new(),
            sealed: false,
        }
    }

    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Column)
    }

    #[must_use]
    pub fn relationship(name: impl Into<String>, kind: RelationKind) -> Self {
        Self::new(name, AttributeKind::Relationship(kind))
    }

    #[must_use]
    pub fn property(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Property)
    }

    #[must_use]
    pub fn method(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Method)
    }

    /// Mark the descriptor as unable to carry a token or stamped facts.
    /// Annotations on it are kept only in the registry, keyed by name.
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// Declare which roles may read, write or call this attribute, and which
    /// roles it grants.
    #[must_use]
    pub fn with_roles(self, registry: &AnnotationRegistry, roles: WithRoles) -> Self {
        self.record(registry, AnnotationFact::Roles(roles))
    }

    /// Tag the attribute with a column marker such as
    /// [`crate::annotations::IMMUTABLE`].
    #[must_use]
    pub fn annotate(self, registry: &AnnotationRegistry, marker: &str) -> Self {
        self.record(registry, AnnotationFact::Marker(marker.to_owned()))
    }

    fn record(mut self, registry: &AnnotationRegistry, fact: AnnotationFact) -> Self {
        if self.sealed {
            registry.record(AnnotationKey::Name(self.name.clone()), fact);
            return self;
        }
        let token = *self.token.get_or_insert_with(|| registry.issue_token());
        registry.record(AnnotationKey::Token(token), fact.clone());
        self.stamped.push(fact);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    #[must_use]
    pub fn token(&self) -> Option<AnnotationToken> {
        self.token
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Registry key this descriptor's facts are recorded under.
    #[must_use]
    pub fn key(&self) -> AnnotationKey {
        match self.token {
            Some(token) => AnnotationKey::Token(token),
            None => AnnotationKey::Name(self.name.clone()),
        }
    }

    /// Facts carried on the descriptor itself.
    #[must_use]
    pub fn stamped(&self) -> &[AnnotationFact] {
        &self.stamped
    }
}
