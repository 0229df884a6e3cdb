//! Two-phase class construction.
//!
//! A [`ClassDefinition`] collects attribute descriptors, bases and direct
//! declarations. [`ClassDefinition::sweep`] claims the annotations recorded
//! for those attributes and [`ClassDefinition::finish`] freezes the result
//! into an immutable, shareable [`ModelClass`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::annotations::AnnotationFact;
use crate::attribute::{Attribute, AttributeKind};
use crate::config::ModelRolesConfig;
use crate::error::ConfigError;
use crate::registry::{AnnotationKey, AnnotationRegistry};
use crate::role_map::{ClassRoles, DeclaredFacts, RoleAttrs, RoleMap};

/// A finalized class: its attributes and role configuration.
#[derive(Debug)]
pub struct ModelClass {
    name: String,
    bases: Vec<Arc<ModelClass>>,
    attributes: Vec<Attribute>,
    roles: ClassRoles,
    json_datasets: Vec<String>,
}

impl ModelClass {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bases(&self) -> &[Arc<ModelClass>] {
        &self.bases
    }

    /// Attributes declared in this class body only.
    #[must_use]
    pub fn own_attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Classes in method resolution order, starting with `self`.
    /// Depth-first, left to right, each class listed once.
    #[must_use]
    pub fn mro(&self) -> Vec<&ModelClass> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        self.collect_mro(&mut seen, &mut out);
        out
    }

    fn collect_mro<'a>(&'a self, seen: &mut BTreeSet<&'a str>, out: &mut Vec<&'a ModelClass>) {
        if !seen.insert(self.name.as_str()) {
            return;
        }
        out.push(self);
        for base in &self.bases {
            base.collect_mro(seen, out);
        }
    }

    /// Look up an attribute along the MRO.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.mro()
            .into_iter()
            .find_map(|class| class.attributes.iter().find(|a| a.name() == name))
    }

    #[must_use]
    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.mro().iter().any(|class| class.name == name)
    }

    #[must_use]
    pub fn class_roles(&self) -> &ClassRoles {
        &self.roles
    }

    #[must_use]
    pub fn roles(&self) -> &RoleMap {
        self.roles.roles()
    }

    #[must_use]
    pub fn dataset(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.roles.dataset(name)
    }

    /// Datasets used when the class is rendered to JSON without explicit ones.
    #[must_use]
    pub fn json_datasets(&self) -> &[String] {
        &self.json_datasets
    }
}

/// Builder for a [`ModelClass`].
///
/// ```rust,ignore
/// let registry = AnnotationRegistry::global();
/// let document = ClassDefinition::new("Document")
///     .extends(&base)
///     .attribute(Attribute::column("title").with_roles(registry, WithRoles::new().read(["all"])))
///     .attribute(Attribute::relationship("owner", RelationKind::Scalar)
///         .with_roles(registry, WithRoles::new().grants(["owner"])))
///     .dataset("primary", ["title"])
///     .finish(registry)?;
/// ```
#[derive(Debug)]
pub struct ClassDefinition {
    name: String,
    bases: Vec<Arc<ModelClass>>,
    attributes: Vec<Attribute>,
    direct_roles: BTreeMap<String, RoleAttrs>,
    direct_datasets: BTreeMap<String, BTreeSet<String>>,
    role_checks: BTreeMap<String, BTreeSet<String>>,
    json_datasets: Option<Vec<String>>,
    working: Option<ClassRoles>,
    processed: BTreeSet<String>,
}

impl ClassDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            attributes: Vec::new(),
            direct_roles: BTreeMap::new(),
            direct_datasets: BTreeMap::new(),
            role_checks: BTreeMap::new(),
            json_datasets: None,
            working: None,
            processed: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn extends(mut self, base: &Arc<ModelClass>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Declare a role entry directly, outside attribute annotations.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>, attrs: RoleAttrs) -> Self {
        self.direct_roles
            .entry(role.into())
            .or_default()
            .merge(&attrs);
        self
    }

    #[must_use]
    pub fn dataset<I, S>(mut self, name: impl Into<String>, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.direct_datasets
            .entry(name.into())
            .or_default()
            .extend(attrs.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn json_datasets<I, S>(mut self, datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.json_datasets = Some(datasets.into_iter().map(Into::into).collect());
        self
    }

    /// Register a named predicate granting `roles`. The model answers it in
    /// [`crate::RoleModel::check_role`].
    #[must_use]
    pub fn role_check<I, S>(mut self, name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_checks
            .entry(name.into())
            .or_default()
            .extend(roles.into_iter().map(Into::into));
        self
    }

    /// Merge roles and datasets loaded from configuration.
    #[must_use]
    pub fn apply_config(mut self, config: &ModelRolesConfig) -> Self {
        for (role, attrs) in &config.roles {
            self.direct_roles
                .entry(role.clone())
                .or_default()
                .merge(attrs);
        }
        for (name, attrs) in &config.datasets {
            self.direct_datasets
                .entry(name.clone())
                .or_default()
                .extend(attrs.iter().cloned());
        }
        if !config.json_datasets.is_empty() {
            self.json_datasets = Some(config.json_datasets.clone());
        }
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role configuration collected so far, if a sweep has run.
    #[must_use]
    pub fn class_roles(&self) -> Option<&ClassRoles> {
        self.working.as_ref()
    }

    /// Attributes visible from this class: own body first, then bases in
    /// MRO order. Shadowed names are skipped.
    fn visible_attributes(&self) -> Vec<&Attribute> {
        let mut names = BTreeSet::new();
        let own = self.attributes.iter();
        let inherited = self
            .base_mro()
            .into_iter()
            .flat_map(|class| class.attributes.iter());
        own.chain(inherited)
            .filter(|attr| names.insert(attr.name()))
            .collect()
    }

    fn base_mro(&self) -> Vec<&ModelClass> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for base in &self.bases {
            base.collect_mro(&mut seen, &mut out);
        }
        out
    }

    fn kind_of(&self, name: &str) -> Option<AttributeKind> {
        self.visible_attributes()
            .into_iter()
            .find(|attr| attr.name() == name)
            .map(Attribute::kind)
    }

    /// Claim the annotations recorded for every attribute not yet processed
    /// and merge them into this class's own role map. Returns how many
    /// attributes contributed facts. Running it again is a no-op.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when an annotation is malformed.
    pub fn sweep(&mut self, registry: &AnnotationRegistry) -> Result<usize, ConfigError> {
        let mut working = match self.working.take() {
            Some(working) => working,
            None => {
                let mut seeded = ClassRoles::default();
                for base in &self.bases {
                    seeded.merge(&base.roles);
                }
                seeded
            }
        };

        let mut declared = Vec::new();
        let mut newly_processed = Vec::new();
        for attr in self.visible_attributes() {
            if self.processed.contains(attr.name()) {
                continue;
            }
            newly_processed.push(attr.name().to_owned());
            if let Some(facts) = claim(registry, attr) {
                declared.push(DeclaredFacts {
                    name: attr.name().to_owned(),
                    kind: attr.kind(),
                    facts,
                });
            }
        }

        let result = working.apply_declared(&self.name, &declared);
        self.working = Some(working);
        result?;
        self.processed.extend(newly_processed);
        tracing::debug!(
            class = %self.name,
            attributes = declared.len(),
            "Swept attribute annotations"
        );
        Ok(declared.len())
    }

    /// Sweep, merge direct declarations, validate and freeze.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for malformed annotations or direct
    /// declarations naming unknown grant sources.
    pub fn finish(mut self, registry: &AnnotationRegistry) -> Result<Arc<ModelClass>, ConfigError> {
        self.sweep(registry)?;
        let mut roles = self.working.take().unwrap_or_default();
        for (role, attrs) in &self.direct_roles {
            roles.declare_role(role, attrs)?;
        }
        for (name, attrs) in &self.direct_datasets {
            roles.declare_dataset(name, attrs.iter().cloned())?;
        }
        for (name, granted) in &self.role_checks {
            roles.declare_role_check(name, granted.iter().cloned())?;
        }
        roles.validate_sources(&self.name, |name| self.kind_of(name))?;

        let json_datasets = match self.json_datasets.take() {
            Some(datasets) => datasets,
            None => self
                .bases
                .iter()
                .map(|base| base.json_datasets.clone())
                .find(|datasets| !datasets.is_empty())
                .unwrap_or_default(),
        };
        for dataset in &json_datasets {
            if roles.dataset(dataset).is_none() {
                return Err(ConfigError::InvalidDataset(dataset.clone()));
            }
        }

        tracing::debug!(
            class = %self.name,
            roles = roles.roles().len(),
            datasets = roles.datasets().len(),
            "Class roles configured"
        );
        Ok(Arc::new(ModelClass {
            name: self.name,
            bases: self.bases,
            attributes: self.attributes,
            roles,
            json_datasets,
        }))
    }
}

/// Registry entry by token, then by name for sealed descriptors, then the
/// facts stamped on the descriptor.
fn claim(registry: &AnnotationRegistry, attr: &Attribute) -> Option<Vec<AnnotationFact>> {
    if let Some(token) = attr.token()
        && let Some(facts) = registry.drain(&AnnotationKey::Token(token))
    {
        return Some(facts);
    }
    if attr.is_sealed()
        && let Some(facts) = registry.drain(&AnnotationKey::Name(attr.name().to_owned()))
    {
        return Some(facts);
    }
    (!attr.stamped().is_empty()).then(|| attr.stamped().to_vec())
}
