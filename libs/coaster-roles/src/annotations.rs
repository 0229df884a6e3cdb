//! Declaration-time facts attached to attributes before their class is
//! finalized.
//!
//! [`WithRoles`] is the role declaration for one attribute; markers such as
//! [`IMMUTABLE`] and [`CACHED`] tag columns for the persistence layer and end up
//! in [`ColumnAnnotations`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Column marker: the value must not change once set.
pub const IMMUTABLE: &str = "immutable";
/// Column marker: the value may be served from a cache.
pub const CACHED: &str = "cached";

/// One fact recorded against an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationFact {
    Roles(WithRoles),
    Marker(String),
}

/// Roles offered through a relationship.
///
/// `Roles` grants the listed local roles when the related object (or the
/// related record matching the actor) grants the same role names.
/// `Remap` maps roles found on the related object to local role names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrantsVia {
    Roles(BTreeSet<String>),
    Remap(BTreeMap<String, BTreeSet<String>>),
}

impl GrantsVia {
    #[must_use]
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Roles(roles.into_iter().map(Into::into).collect())
    }

    /// Build a remap from `(related_role, local_role)` pairs. Repeated related
    /// roles accumulate their local roles.
    #[must_use]
    pub fn remap<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (related, local) in pairs {
            map.entry(related.into()).or_default().insert(local.into());
        }
        Self::Remap(map)
    }

    /// Local role names this declaration can grant.
    #[must_use]
    pub fn local_roles(&self) -> BTreeSet<String> {
        match self {
            Self::Roles(roles) => roles.clone(),
            Self::Remap(map) => map.values().flatten().cloned().collect(),
        }
    }

    #[must_use]
    pub fn offer_map(&self) -> Option<&BTreeMap<String, BTreeSet<String>>> {
        match self {
            Self::Roles(_) => None,
            Self::Remap(map) => Some(map),
        }
    }

    fn into_remap(self) -> BTreeMap<String, BTreeSet<String>> {
        match self {
            Self::Roles(roles) => roles
                .into_iter()
                .map(|role| (role.clone(), BTreeSet::from([role])))
                .collect(),
            Self::Remap(map) => map,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Roles(roles) => roles.is_empty(),
            Self::Remap(map) => map.values().all(BTreeSet::is_empty),
        }
    }
}

/// Role declaration for a single attribute.
///
/// ```rust,ignore
/// let title = Attribute::column("title").with_roles(
///     registry,
///     WithRoles::new().read(["all"]).write(["owner"]),
/// );
/// let members = Attribute::relationship("memberships", RelationKind::Query).with_roles(
///     registry,
///     WithRoles::new().grants_via(Some("user"), GrantsVia::roles(["member"])),
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithRoles {
    pub(crate) read: BTreeSet<String>,
    pub(crate) write: BTreeSet<String>,
    pub(crate) call: BTreeSet<String>,
    pub(crate) grants: BTreeSet<String>,
    pub(crate) grants_via: BTreeMap<Option<String>, GrantsVia>,
    pub(crate) datasets: BTreeSet<String>,
}

fn extend<I, S>(set: &mut BTreeSet<String>, items: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    set.extend(items.into_iter().map(Into::into));
}

impl WithRoles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn read<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.read, roles);
        self
    }

    #[must_use]
    pub fn write<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.write, roles);
        self
    }

    /// Read and write for the same roles.
    #[must_use]
    pub fn rw<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        self.read.extend(roles.iter().cloned());
        self.write.extend(roles);
        self
    }

    #[must_use]
    pub fn call<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.call, roles);
        self
    }

    /// The related actor(s) held by this attribute receive `roles`.
    #[must_use]
    pub fn grants<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.grants, roles);
        self
    }

    /// Roles granted through this relationship.
    ///
    /// With `actor_attr` set, the related record whose `actor_attr` refers to
    /// the actor is looked up and its offered roles apply. A dotted
    /// `actor_attr` (`"membership.user"`) extends the relationship path. With
    /// `None`, each related object's own roles for the actor are consulted.
    /// Repeated calls for the same `actor_attr` accumulate.
    #[must_use]
    pub fn grants_via(mut self, actor_attr: Option<&str>, via: GrantsVia) -> Self {
        let key = actor_attr.map(str::to_owned);
        let merged = match self.grants_via.remove(&key) {
            None => via,
            Some(GrantsVia::Roles(mut a)) if matches!(via, GrantsVia::Roles(_)) => {
                a.extend(via.local_roles());
                GrantsVia::Roles(a)
            }
            // Mixed forms widen to a remap; a plain role maps to itself.
            Some(existing) => {
                let mut map = existing.into_remap();
                for (related, locals) in via.into_remap() {
                    map.entry(related).or_default().extend(locals);
                }
                GrantsVia::Remap(map)
            }
        };
        self.grants_via.insert(key, merged);
        self
    }

    /// Add the attribute to the named datasets.
    #[must_use]
    pub fn datasets<I, S>(mut self, datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.datasets, datasets);
        self
    }
}

/// Markers collected from attribute annotations, indexed both ways.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnAnnotations {
    by_marker: BTreeMap<String, Vec<String>>,
    by_attr: BTreeMap<String, Vec<String>>,
}

impl ColumnAnnotations {
    pub(crate) fn add(&mut self, attr: &str, marker: &str) {
        let attrs = self.by_marker.entry(marker.to_owned()).or_default();
        if !attrs.iter().any(|a| a == attr) {
            attrs.push(attr.to_owned());
        }
        let markers = self.by_attr.entry(attr.to_owned()).or_default();
        if !markers.iter().any(|m| m == marker) {
            markers.push(marker.to_owned());
        }
    }

    pub(crate) fn merge(&mut self, other: &Self) {
        for (marker, attrs) in &other.by_marker {
            for attr in attrs {
                self.add(attr, marker);
            }
        }
    }

    /// Attributes carrying `marker`, in declaration order.
    #[must_use]
    pub fn attrs_with(&self, marker: &str) -> &[String] {
        self.by_marker.get(marker).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn markers_on(&self, attr: &str) -> &[String] {
        self.by_attr.get(attr).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_attr.is_empty()
    }
}
