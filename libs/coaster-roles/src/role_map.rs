//! Per-class role maps and the pure finalization step that builds them.
//!
//! | piece | meaning |
//! |-------|---------|
//! | [`RoleAttrs`] | attributes a role may read, write or call, plus where the role is granted from |
//! | [`RoleMap`] | role name to [`RoleAttrs`] |
//! | [`ClassRoles`] | the role map plus datasets, relationship offer maps, role checks and column markers |
//!
//! Each class owns its [`ClassRoles`]. Subclasses start from a copy of their
//! bases' maps and never write back into them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::annotations::{AnnotationFact, ColumnAnnotations, WithRoles};
use crate::attribute::AttributeKind;
use crate::error::ConfigError;

/// Map of related role to local roles for one relationship path.
pub type RoleOfferMap = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Read,
    Write,
    Call,
}

/// Everything a single role allows and where it comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAttrs {
    #[serde(default)]
    pub read: BTreeSet<String>,
    #[serde(default)]
    pub write: BTreeSet<String>,
    #[serde(default)]
    pub call: BTreeSet<String>,
    /// Relationships (or role checks) that grant this role when they refer to
    /// the actor. Order is evaluation order.
    #[serde(default)]
    pub granted_by: Vec<String>,
    /// Relationship path to the optional actor attribute on the related record.
    #[serde(default)]
    pub granted_via: BTreeMap<String, Option<String>>,
}

impl RoleAttrs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn read<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read.extend(attrs.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn write<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write.extend(attrs.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn call<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.call.extend(attrs.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn granted_by(mut self, source: impl Into<String>) -> Self {
        self.add_granted_by(source.into());
        self
    }

    #[must_use]
    pub fn granted_via(mut self, path: impl Into<String>, actor_attr: Option<&str>) -> Self {
        self.granted_via
            .insert(path.into(), actor_attr.map(str::to_owned));
        self
    }

    fn add_granted_by(&mut self, source: String) {
        if !self.granted_by.contains(&source) {
            self.granted_by.push(source);
        }
    }

    #[must_use]
    pub fn attrs(&self, action: Action) -> &BTreeSet<String> {
        match action {
            Action::Read => &self.read,
            Action::Write => &self.write,
            Action::Call => &self.call,
        }
    }

    /// Union `other` into this entry.
    pub fn merge(&mut self, other: &Self) {
        self.read.extend(other.read.iter().cloned());
        self.write.extend(other.write.iter().cloned());
        self.call.extend(other.call.iter().cloned());
        for source in &other.granted_by {
            self.add_granted_by(source.clone());
        }
        for (path, actor_attr) in &other.granted_via {
            self.granted_via
                .entry(path.clone())
                .or_insert_with(|| actor_attr.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleMap(BTreeMap<String, RoleAttrs>);

impl RoleMap {
    #[must_use]
    pub fn get(&self, role: &str) -> Option<&RoleAttrs> {
        self.0.get(role)
    }

    pub fn entry(&mut self, role: &str) -> &mut RoleAttrs {
        self.0.entry(role.to_owned()).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RoleAttrs)> {
        self.0.iter()
    }

    #[must_use]
    pub fn role_names(&self) -> BTreeSet<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Roles allowed to perform `action` on `attr`.
    #[must_use]
    pub fn roles_allowing(&self, action: Action, attr: &str) -> BTreeSet<&str> {
        self.0
            .iter()
            .filter(|(_, attrs)| attrs.attrs(action).contains(attr))
            .map(|(role, _)| role.as_str())
            .collect()
    }

    pub fn merge(&mut self, other: &Self) {
        for (role, attrs) in &other.0 {
            self.entry(role).merge(attrs);
        }
    }
}

/// Facts gathered for one attribute during a sweep.
#[derive(Debug, Clone)]
pub struct DeclaredFacts {
    pub name: String,
    pub kind: AttributeKind,
    pub facts: Vec<AnnotationFact>,
}

/// Complete role configuration of one finalized class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassRoles {
    roles: RoleMap,
    datasets: BTreeMap<String, BTreeSet<String>>,
    offer_maps: BTreeMap<String, RoleOfferMap>,
    reversed_offer_maps: BTreeMap<String, RoleOfferMap>,
    role_checks: BTreeSet<String>,
    annotations: ColumnAnnotations,
}

impl ClassRoles {
    #[must_use]
    pub fn roles(&self) -> &RoleMap {
        &self.roles
    }

    #[must_use]
    pub fn dataset(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.datasets.get(name)
    }

    #[must_use]
    pub fn datasets(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.datasets
    }

    /// Offer map declared for a relationship path, if roles are remapped.
    #[must_use]
    pub fn offer_map(&self, path: &str) -> Option<&RoleOfferMap> {
        self.offer_maps.get(path)
    }

    /// Local role to related roles, the inverse of [`Self::offer_map`].
    #[must_use]
    pub fn reversed_offer_map(&self, path: &str) -> Option<&RoleOfferMap> {
        self.reversed_offer_maps.get(path)
    }

    #[must_use]
    pub fn is_role_check(&self, name: &str) -> bool {
        self.role_checks.contains(name)
    }

    #[must_use]
    pub fn column_annotations(&self) -> &ColumnAnnotations {
        &self.annotations
    }

    /// Union another class's configuration into this one.
    pub fn merge(&mut self, other: &Self) {
        self.roles.merge(&other.roles);
        for (name, attrs) in &other.datasets {
            self.datasets
                .entry(name.clone())
                .or_default()
                .extend(attrs.iter().cloned());
        }
        merge_offer_maps(&mut self.offer_maps, &other.offer_maps);
        merge_offer_maps(&mut self.reversed_offer_maps, &other.reversed_offer_maps);
        self.role_checks.extend(other.role_checks.iter().cloned());
        self.annotations.merge(&other.annotations);
    }

    /// Merge directly declared role entries.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidRoleName`] for an empty role name.
    pub fn declare_role(&mut self, role: &str, attrs: &RoleAttrs) -> Result<(), ConfigError> {
        check_role_name(role)?;
        self.roles.entry(role).merge(attrs);
        Ok(())
    }

    /// Add attributes to a dataset, creating it if needed.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidDataset`] for an empty dataset name.
    pub fn declare_dataset<I, S>(&mut self, name: &str, attrs: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if name.is_empty() {
            return Err(ConfigError::InvalidDataset(name.to_owned()));
        }
        self.datasets
            .entry(name.to_owned())
            .or_default()
            .extend(attrs.into_iter().map(Into::into));
        Ok(())
    }

    /// Register a named predicate that grants `roles`.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidRoleName`] for an empty role name.
    pub fn declare_role_check<I, S>(&mut self, name: &str, roles: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_checks.insert(name.to_owned());
        for role in roles {
            let role = role.into();
            check_role_name(&role)?;
            self.roles.entry(&role).add_granted_by(name.to_owned());
        }
        Ok(())
    }

    /// Apply the facts swept from one class body.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for malformed `grants_via` declarations or
    /// empty role names.
    pub fn apply_declared(
        &mut self,
        class: &str,
        declared: &[DeclaredFacts],
    ) -> Result<(), ConfigError> {
        for attr in declared {
            for fact in &attr.facts {
                match fact {
                    AnnotationFact::Roles(spec) => {
                        self.apply_with_roles(class, &attr.name, attr.kind, spec)?;
                    }
                    AnnotationFact::Marker(marker) => self.annotations.add(&attr.name, marker),
                }
            }
        }
        Ok(())
    }

    fn apply_with_roles(
        &mut self,
        class: &str,
        attr: &str,
        kind: AttributeKind,
        spec: &WithRoles,
    ) -> Result<(), ConfigError> {
        for (action, roles) in [
            (Action::Read, &spec.read),
            (Action::Write, &spec.write),
            (Action::Call, &spec.call),
        ] {
            for role in roles {
                check_role_name(role)?;
                let entry = self.roles.entry(role);
                match action {
                    Action::Read => entry.read.insert(attr.to_owned()),
                    Action::Write => entry.write.insert(attr.to_owned()),
                    Action::Call => entry.call.insert(attr.to_owned()),
                };
            }
        }

        for role in &spec.grants {
            check_role_name(role)?;
            self.roles.entry(role).add_granted_by(attr.to_owned());
        }

        for (actor_attr, via) in &spec.grants_via {
            if !kind.is_relationship() {
                return Err(ConfigError::GrantsViaOnNonRelationship {
                    class: class.to_owned(),
                    attr: attr.to_owned(),
                });
            }
            if via.is_empty() {
                return Err(ConfigError::EmptyGrantsVia {
                    class: class.to_owned(),
                    attr: attr.to_owned(),
                });
            }
            let (path, actor_attr) = split_actor_attr(attr, actor_attr.as_deref())?;
            for role in via.local_roles() {
                check_role_name(&role)?;
                self.roles
                    .entry(&role)
                    .granted_via
                    .insert(path.clone(), actor_attr.clone());
            }
            if let Some(offers) = via.offer_map() {
                let forward = self.offer_maps.entry(path.clone()).or_default();
                let reverse = self.reversed_offer_maps.entry(path).or_default();
                for (related, locals) in offers {
                    forward
                        .entry(related.clone())
                        .or_default()
                        .extend(locals.iter().cloned());
                    for local in locals {
                        reverse
                            .entry(local.clone())
                            .or_default()
                            .insert(related.clone());
                    }
                }
            }
        }

        for dataset in &spec.datasets {
            self.declare_dataset(dataset, [attr])?;
        }
        Ok(())
    }

    /// Every `granted_by` and `granted_via` source must start at an attribute
    /// that can hold related objects, or name a role check.
    pub(crate) fn validate_sources<F>(&self, class: &str, kind_of: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<AttributeKind>,
    {
        for (role, attrs) in self.roles.iter() {
            let sources = attrs
                .granted_by
                .iter()
                .filter(|source| !self.role_checks.contains(*source))
                .chain(attrs.granted_via.keys());
            for source in sources {
                let head = split_path(source)?[0];
                if !kind_of(head).is_some_and(AttributeKind::may_relate) {
                    return Err(ConfigError::UnknownGrantSource {
                        class: class.to_owned(),
                        role: role.clone(),
                        source_name: source.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn merge_offer_maps(
    into: &mut BTreeMap<String, RoleOfferMap>,
    from: &BTreeMap<String, RoleOfferMap>,
) {
    for (path, offers) in from {
        let target = into.entry(path.clone()).or_default();
        for (role, mapped) in offers {
            target
                .entry(role.clone())
                .or_default()
                .extend(mapped.iter().cloned());
        }
    }
}

fn check_role_name(role: &str) -> Result<(), ConfigError> {
    if role.is_empty() || role.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidRoleName(role.to_owned()));
    }
    Ok(())
}

/// Split a dotted path, rejecting empty segments.
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>, ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::MalformedPath(path.to_owned()));
    }
    Ok(segments)
}

/// `("parent", Some("membership.user"))` becomes `("parent.membership", Some("user"))`.
fn split_actor_attr(
    attr: &str,
    actor_attr: Option<&str>,
) -> Result<(String, Option<String>), ConfigError> {
    let Some(actor_attr) = actor_attr else {
        return Ok((attr.to_owned(), None));
    };
    let segments = split_path(actor_attr)?;
    let Some((last, prefix)) = segments.split_last() else {
        return Err(ConfigError::MalformedPath(actor_attr.to_owned()));
    };
    let mut path = attr.to_owned();
    for segment in prefix {
        path.push('.');
        path.push_str(segment);
    }
    Ok((path, Some((*last).to_owned())))
}

/// Build a class's role configuration from its bases and the facts declared
/// in its body.
///
/// Bases are merged in order into a fresh copy, then each declared attribute
/// is applied. Nothing reachable from `bases` is modified.
///
/// # Errors
/// Returns a [`ConfigError`] when a declaration is malformed.
pub fn finalize(
    class: &str,
    bases: &[&ClassRoles],
    declared: &[DeclaredFacts],
) -> Result<ClassRoles, ConfigError> {
    let mut roles = ClassRoles::default();
    for base in bases {
        roles.merge(base);
    }
    roles.apply_declared(class, declared)?;
    Ok(roles)
}
