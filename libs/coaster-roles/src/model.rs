//! The contract host objects implement to take part in role resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::attribute::RelationKind;
use crate::class::ModelClass;
use crate::error::{ModelError, RoleError};
use crate::identity::{Anchor, Identity};
use crate::lazy_set::LazyRoleSet;

pub type ModelRef = Arc<dyn RoleModel>;

/// A lazily evaluated collection of related objects, such as a database
/// query. Role resolution only asks it yes/no questions or for one record,
/// never for the full set, unless a caller reads it through a proxy.
pub trait LazyQuery: Send + Sync {
    /// Existence check: does the collection contain `actor`?
    fn contains(&self, actor: &Identity) -> bool;

    /// First record whose `attr` relationship refers to `actor`.
    fn first_related(&self, attr: &str, actor: &Identity) -> Option<ModelRef>;

    /// Materialize every record.
    fn fetch(&self) -> Vec<ModelRef>;
}

#[derive(Clone)]
pub enum Relation {
    Scalar(Option<ModelRef>),
    Sequence(Vec<ModelRef>),
    Mapping(BTreeMap<String, ModelRef>),
    Query(Arc<dyn LazyQuery>),
}

impl Relation {
    #[must_use]
    pub fn kind(&self) -> RelationKind {
        match self {
            Self::Scalar(_) => RelationKind::Scalar,
            Self::Sequence(_) => RelationKind::Sequence,
            Self::Mapping(_) => RelationKind::Mapping,
            Self::Query(_) => RelationKind::Query,
        }
    }

    /// Does this relationship hold or contain `actor`?
    #[must_use]
    pub fn refers_to(&self, actor: &Identity) -> bool {
        let is_actor = |obj: &ModelRef| obj.identity().as_ref() == Some(actor);
        match self {
            Self::Scalar(obj) => obj.as_ref().is_some_and(is_actor),
            Self::Sequence(items) => items.iter().any(is_actor),
            Self::Mapping(items) => items.values().any(is_actor),
            Self::Query(query) => query.contains(actor),
        }
    }

    /// Every related object. Queries are materialized.
    #[must_use]
    pub fn objects(&self) -> Vec<ModelRef> {
        match self {
            Self::Scalar(obj) => obj.iter().cloned().collect(),
            Self::Sequence(items) => items.clone(),
            Self::Mapping(items) => items.values().cloned().collect(),
            Self::Query(query) => query.fetch(),
        }
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(obj) => f
                .debug_tuple("Scalar")
                .field(&obj.as_ref().map(|o| o.model_class().name().to_owned()))
                .finish(),
            Self::Sequence(items) => f.debug_tuple("Sequence").field(&items.len()).finish(),
            Self::Mapping(items) => f
                .debug_tuple("Mapping")
                .field(&items.keys().collect::<Vec<_>>())
                .finish(),
            Self::Query(_) => f.write_str("Query"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AttrValue {
    Value(Value),
    Relation(Relation),
}

/// Implemented by objects whose attributes are guarded by roles.
///
/// Writes and calls take `&self`; implementors use interior mutability the
/// way ORM instances do.
pub trait RoleModel: Send + Sync {
    fn model_class(&self) -> &Arc<ModelClass>;

    /// The identity this object stands for when it is itself an actor.
    fn identity(&self) -> Option<Identity> {
        None
    }

    /// Current value of an attribute, or `None` when it does not exist.
    fn attr(&self, name: &str) -> Option<AttrValue>;

    fn relation(&self, name: &str) -> Option<Relation> {
        match self.attr(name) {
            Some(AttrValue::Relation(relation)) => Some(relation),
            _ => None,
        }
    }

    /// # Errors
    /// Returns a [`ModelError`] if the value cannot be stored.
    fn set_attr(&self, name: &str, value: Value) -> Result<(), ModelError> {
        let _ = value;
        Err(ModelError::ReadOnly(name.to_owned()))
    }

    /// # Errors
    /// Returns a [`ModelError`] if the method does not exist or fails.
    fn call(&self, name: &str, args: Value) -> Result<Value, ModelError> {
        let _ = args;
        Err(ModelError::NoMethod(name.to_owned()))
    }

    /// Roles this record offers to the actor it links to, for records that
    /// sit between an object and its actors (memberships, grants).
    fn offered_roles(&self) -> Option<BTreeSet<String>> {
        None
    }

    /// Answer a role check registered with
    /// [`crate::ClassDefinition::role_check`].
    fn check_role(&self, check: &str, actor: Option<&Identity>, anchors: &[Anchor]) -> bool {
        let _ = (check, actor, anchors);
        false
    }

    /// Hook run after the base roles are computed. Add or discard roles
    /// deterministically here, for example roles granted by anchors.
    fn adjust_roles(&self, roles: &mut LazyRoleSet, actor: Option<&Identity>, anchors: &[Anchor]) {
        let _ = (roles, actor, anchors);
    }
}

/// Follow a dotted relationship path from `obj`.
///
/// Intermediate segments must be scalar relationships; an empty one ends the
/// walk with `Ok(None)`.
pub(crate) fn resolve_path(obj: &ModelRef, path: &str) -> Result<Option<Relation>, RoleError> {
    let class_name = || obj.model_class().name().to_owned();
    let mut segments = path.split('.').peekable();
    let mut current = Arc::clone(obj);
    while let Some(segment) = segments.next() {
        let relation = current
            .relation(segment)
            .ok_or_else(|| RoleError::UnknownRelation {
                class: current.model_class().name().to_owned(),
                path: path.to_owned(),
            })?;
        if segments.peek().is_none() {
            return Ok(Some(relation));
        }
        match relation {
            Relation::Scalar(Some(next)) => current = next,
            Relation::Scalar(None) => return Ok(None),
            _ => {
                return Err(RoleError::NotTraversable {
                    class: class_name(),
                    path: path.to_owned(),
                    segment: segment.to_owned(),
                });
            }
        }
    }
    Err(RoleError::UnknownRelation {
        class: class_name(),
        path: path.to_owned(),
    })
}

/// Does `obj`'s `attr` relationship refer to `actor`?
pub(crate) fn relates_to(obj: &ModelRef, attr: &str, actor: &Identity) -> bool {
    obj.relation(attr)
        .is_some_and(|relation| matches!(&relation, Relation::Scalar(_)) && relation.refers_to(actor))
}
