//! Lazily evaluated role sets.
//!
//! A [`LazyRoleSet`] starts with the base roles and discovers the rest on
//! demand. Each role is evaluated at most once per set; the outcome is cached
//! as present or not present. Sets hold interior caches and are neither
//! `Sync` nor meant to outlive the request that built them.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::RoleError;
use crate::grants::roles_via_relation;
use crate::identity::{Anchor, Identity};
use crate::model::{ModelRef, resolve_path};

pub struct LazyRoleSet {
    obj: ModelRef,
    actor: Option<Identity>,
    anchors: Vec<Anchor>,
    present: RefCell<BTreeSet<String>>,
    not_present: RefCell<BTreeSet<String>>,
    scanned_granted_by: RefCell<BTreeSet<String>>,
    fully_evaluated: Cell<bool>,
}

impl LazyRoleSet {
    #[must_use]
    pub fn new<I, S>(obj: ModelRef, actor: Option<Identity>, anchors: Vec<Anchor>, initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            obj,
            actor,
            anchors,
            present: RefCell::new(initial.into_iter().map(Into::into).collect()),
            not_present: RefCell::new(BTreeSet::new()),
            scanned_granted_by: RefCell::new(BTreeSet::new()),
            fully_evaluated: Cell::new(false),
        }
    }

    #[must_use]
    pub fn obj(&self) -> &ModelRef {
        &self.obj
    }

    #[must_use]
    pub fn actor(&self) -> Option<&Identity> {
        self.actor.as_ref()
    }

    #[must_use]
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Is `role` granted? Evaluates and caches on first use.
    ///
    /// # Errors
    /// Returns a [`RoleError`] when a `granted_by` or `granted_via` path does
    /// not resolve on the object.
    pub fn contains(&self, role: &str) -> Result<bool, RoleError> {
        if self.present.borrow().contains(role) {
            return Ok(true);
        }
        if self.not_present.borrow().contains(role) {
            return Ok(false);
        }
        let found = self.evaluate(role)?;
        tracing::trace!(
            class = %self.obj.model_class().name(),
            role,
            found,
            "Evaluated role"
        );
        if found {
            self.mark_present(role);
        } else {
            self.not_present.borrow_mut().insert(role.to_owned());
        }
        Ok(found)
    }

    /// True at the first role found, in iteration order. Later roles are not
    /// evaluated.
    ///
    /// # Errors
    /// Same as [`Self::contains`].
    pub fn has_any<I, S>(&self, roles: I) -> Result<bool, RoleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for role in roles {
            if self.contains(role.as_ref())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn add(&mut self, role: impl Into<String>) {
        let role = role.into();
        self.not_present.get_mut().remove(&role);
        self.present.get_mut().insert(role);
    }

    pub fn discard(&mut self, role: &str) {
        self.present.get_mut().remove(role);
        self.not_present.get_mut().insert(role.to_owned());
    }

    /// Roles confirmed present so far.
    #[must_use]
    pub fn present(&self) -> BTreeSet<String> {
        self.present.borrow().clone()
    }

    /// Evaluate every role the class declares and return the present ones.
    ///
    /// # Errors
    /// Same as [`Self::contains`].
    pub fn evaluate_all(&self) -> Result<BTreeSet<String>, RoleError> {
        if !self.fully_evaluated.get() {
            let class = std::sync::Arc::clone(self.obj.model_class());
            for role in class.roles().role_names() {
                self.contains(role)?;
            }
            self.fully_evaluated.set(true);
        }
        Ok(self.present())
    }

    /// # Errors
    /// Same as [`Self::contains`].
    pub fn is_empty(&self) -> Result<bool, RoleError> {
        if !self.present.borrow().is_empty() {
            return Ok(false);
        }
        Ok(self.evaluate_all()?.is_empty())
    }

    /// Present roles plus everything in `other`.
    #[must_use]
    pub fn union(&self, other: &BTreeSet<String>) -> BTreeSet<String> {
        let mut out = self.present();
        out.extend(other.iter().cloned());
        out
    }

    /// Roles of `other` that are present here. Each is evaluated.
    ///
    /// # Errors
    /// Same as [`Self::contains`].
    pub fn intersection(&self, other: &BTreeSet<String>) -> Result<BTreeSet<String>, RoleError> {
        let mut out = BTreeSet::new();
        for role in other {
            if self.contains(role)? {
                out.insert(role.clone());
            }
        }
        Ok(out)
    }

    /// Present roles not in `other`. Only the cached state is considered.
    #[must_use]
    pub fn difference(&self, other: &BTreeSet<String>) -> BTreeSet<String> {
        self.present.borrow().difference(other).cloned().collect()
    }

    /// Every role of `other` is present.
    ///
    /// # Errors
    /// Same as [`Self::contains`].
    pub fn is_superset(&self, other: &BTreeSet<String>) -> Result<bool, RoleError> {
        for role in other {
            if !self.contains(role)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Every role known to be present is in `other`. Roles of `other` are
    /// evaluated first; roles never asked about do not count.
    ///
    /// # Errors
    /// Same as [`Self::contains`].
    pub fn is_subset(&self, other: &BTreeSet<String>) -> Result<bool, RoleError> {
        self.intersection(other)?;
        Ok(self.present.borrow().is_subset(other))
    }

    /// Set equality with minimal evaluation: each role of `other` is tested,
    /// then the cached present roles must match exactly. A role that is
    /// grantable but was never tested and is not in `other` does not make the
    /// sets unequal.
    ///
    /// # Errors
    /// Same as [`Self::contains`].
    pub fn eq_set(&self, other: &BTreeSet<String>) -> Result<bool, RoleError> {
        Ok(self.is_superset(other)? && *self.present.borrow() == *other)
    }

    fn mark_present(&self, role: &str) {
        self.not_present.borrow_mut().remove(role);
        self.present.borrow_mut().insert(role.to_owned());
    }

    fn evaluate(&self, role: &str) -> Result<bool, RoleError> {
        let class = std::sync::Arc::clone(self.obj.model_class());
        let Some(attrs) = class.roles().get(role) else {
            return Ok(false);
        };
        let roles = class.class_roles();

        for source in &attrs.granted_by {
            if self.scanned_granted_by.borrow().contains(source) {
                continue;
            }
            let granted = if roles.is_role_check(source) {
                self.obj
                    .check_role(source, self.actor.as_ref(), &self.anchors)
            } else if let Some(actor) = &self.actor {
                resolve_path(&self.obj, source)?.is_some_and(|relation| relation.refers_to(actor))
            } else {
                false
            };
            if granted {
                // Every role granted by the same source is present too.
                for (other, other_attrs) in class.roles().iter() {
                    if other_attrs.granted_by.contains(source) {
                        self.mark_present(other);
                    }
                }
                return Ok(true);
            }
            self.scanned_granted_by.borrow_mut().insert(source.clone());
        }

        for (path, actor_attr) in &attrs.granted_via {
            let Some(relation) = resolve_path(&self.obj, path)? else {
                continue;
            };
            let mut wanted = BTreeSet::from([role.to_owned()]);
            if actor_attr.is_some() {
                // Siblings reached through the same record come for free.
                for (other, other_attrs) in class.roles().iter() {
                    if other_attrs.granted_via.get(path) == Some(actor_attr) {
                        wanted.insert(other.clone());
                    }
                }
            }
            tracing::debug!(
                class = %class.name(),
                role,
                path = %path,
                "Resolving roles through relationship"
            );
            let granted = roles_via_relation(
                &relation,
                actor_attr.as_deref(),
                &wanted,
                roles.offer_map(path),
                self.actor.as_ref(),
                &self.anchors,
            )?;
            for other in &granted {
                self.mark_present(other);
            }
            if granted.contains(role) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Clone for LazyRoleSet {
    fn clone(&self) -> Self {
        Self {
            obj: std::sync::Arc::clone(&self.obj),
            actor: self.actor.clone(),
            anchors: self.anchors.clone(),
            present: RefCell::new(self.present.borrow().clone()),
            not_present: RefCell::new(self.not_present.borrow().clone()),
            scanned_granted_by: RefCell::new(self.scanned_granted_by.borrow().clone()),
            fully_evaluated: Cell::new(self.fully_evaluated.get()),
        }
    }
}

impl fmt::Debug for LazyRoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRoleSet")
            .field("class", &self.obj.model_class().name())
            .field("actor", &self.actor)
            .field("present", &self.present.borrow())
            .field("not_present", &self.not_present.borrow())
            .finish_non_exhaustive()
    }
}
