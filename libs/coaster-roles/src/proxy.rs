//! Role-filtered views over model objects.
//!
//! | operation | requires |
//! |-----------|----------|
//! | [`RoleAccessProxy::get`] | read or call |
//! | [`RoleAccessProxy::get_item`] | read, and membership in the active dataset |
//! | [`RoleAccessProxy::set`] / [`RoleAccessProxy::set_item`] | write |
//! | [`RoleAccessProxy::call`] | call |
//!
//! Datasets only narrow enumeration ([`RoleAccessProxy::keys`],
//! [`RoleAccessProxy::to_json`]) and item access. Each nested proxy takes the
//! next dataset name in the list; when the list runs out nested proxies
//! enumerate nothing, which stops recursive serialization.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::access::ModelAccess;
use crate::attribute::AttributeKind;
use crate::error::{AccessError, RoleError};
use crate::lazy_set::LazyRoleSet;
use crate::model::{AttrValue, ModelRef, Relation};
use crate::role_map::Action;

/// Where a proxy's roles come from.
#[derive(Debug, Clone)]
pub enum RoleSource {
    /// Roles of an actor, resolved on demand. Nested proxies resolve the
    /// related object's own roles for the same actor.
    Lazy(LazyRoleSet),
    /// An explicit role set, carried unchanged into nested proxies.
    Fixed(BTreeSet<String>),
}

impl RoleSource {
    /// # Errors
    /// Returns a [`RoleError`] if lazy resolution fails.
    pub fn contains(&self, role: &str) -> Result<bool, RoleError> {
        match self {
            Self::Lazy(roles) => roles.contains(role),
            Self::Fixed(roles) => Ok(roles.contains(role)),
        }
    }

    /// # Errors
    /// Returns a [`RoleError`] if lazy resolution fails.
    pub fn has_any<'a, I>(&self, roles: I) -> Result<bool, RoleError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            Self::Lazy(set) => set.has_any(roles),
            Self::Fixed(set) => Ok(roles.into_iter().any(|role| set.contains(role))),
        }
    }
}

/// Value read through a proxy. Relationships come back wrapped.
#[derive(Debug)]
pub enum ProxyValue {
    Value(Value),
    Object(Box<RoleAccessProxy>),
    List(Vec<RoleAccessProxy>),
    Map(BTreeMap<String, RoleAccessProxy>),
    /// A method the caller may invoke with [`RoleAccessProxy::call`].
    Callable(String),
}

impl ProxyValue {
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&RoleAccessProxy> {
        match self {
            Self::Object(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// # Errors
    /// Propagates errors from nested proxies.
    pub fn to_json(&self) -> Result<Value, AccessError> {
        Ok(match self {
            Self::Value(value) => value.clone(),
            Self::Object(proxy) => proxy.to_json()?,
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(RoleAccessProxy::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            Self::Map(items) => {
                let mut out = Map::new();
                for (key, proxy) in items {
                    out.insert(key.clone(), proxy.to_json()?);
                }
                Value::Object(out)
            }
            Self::Callable(_) => Value::Null,
        })
    }
}

#[derive(Default)]
struct AccessCache {
    allowed: BTreeSet<(Action, String)>,
    denied: BTreeSet<(Action, String)>,
}

pub struct RoleAccessProxy {
    obj: ModelRef,
    roles: RoleSource,
    path: String,
    datasets: Option<Vec<String>>,
    dataset_attrs: Option<BTreeSet<String>>,
    cache: RefCell<AccessCache>,
}

impl RoleAccessProxy {
    /// # Errors
    /// Returns [`AccessError::MissingDataset`] if the first dataset is not
    /// declared on the object's class.
    pub(crate) fn new(
        obj: ModelRef,
        roles: RoleSource,
        datasets: Option<Vec<String>>,
        path: String,
    ) -> Result<Self, AccessError> {
        let (dataset_attrs, remaining) = match datasets {
            None => (None, None),
            Some(list) => match list.split_first() {
                None => (Some(BTreeSet::new()), Some(Vec::new())),
                Some((first, rest)) => {
                    let class = obj.model_class();
                    let attrs = class.dataset(first).cloned().ok_or_else(|| {
                        AccessError::MissingDataset {
                            dataset: first.clone(),
                            class: class.name().to_owned(),
                            path: path.clone(),
                        }
                    })?;
                    (Some(attrs), Some(rest.to_vec()))
                }
            },
        };
        Ok(Self {
            obj,
            roles,
            path,
            datasets: remaining,
            dataset_attrs,
            cache: RefCell::new(AccessCache::default()),
        })
    }

    #[must_use]
    pub fn obj(&self) -> &ModelRef {
        &self.obj
    }

    #[must_use]
    pub fn roles(&self) -> &RoleSource {
        &self.roles
    }

    /// Attribute path from the root proxy, used in error messages.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn class_name(&self) -> &str {
        self.obj.model_class().name()
    }

    fn no_attribute(&self, attr: &str) -> AccessError {
        AccessError::NoAttribute {
            class: self.class_name().to_owned(),
            attr: attr.to_owned(),
        }
    }

    fn allowed(&self, action: Action, attr: &str) -> Result<bool, AccessError> {
        let key = (action, attr.to_owned());
        {
            let cache = self.cache.borrow();
            if cache.allowed.contains(&key) {
                return Ok(true);
            }
            if cache.denied.contains(&key) {
                return Ok(false);
            }
        }
        let class = Arc::clone(self.obj.model_class());
        let granting = class.roles().roles_allowing(action, attr);
        let ok = !granting.is_empty() && self.roles.has_any(granting)?;
        let mut cache = self.cache.borrow_mut();
        if ok {
            cache.allowed.insert(key);
        } else {
            cache.denied.insert(key);
        }
        Ok(ok)
    }

    /// # Errors
    /// Returns a [`RoleError`] (wrapped) if lazy role resolution fails.
    pub fn can_read(&self, attr: &str) -> Result<bool, AccessError> {
        self.allowed(Action::Read, attr)
    }

    /// # Errors
    /// Same as [`Self::can_read`].
    pub fn can_write(&self, attr: &str) -> Result<bool, AccessError> {
        self.allowed(Action::Write, attr)
    }

    /// # Errors
    /// Same as [`Self::can_read`].
    pub fn can_call(&self, attr: &str) -> Result<bool, AccessError> {
        self.allowed(Action::Call, attr)
    }

    /// Is `attr` visible through this proxy (read or call)?
    ///
    /// # Errors
    /// Same as [`Self::can_read`].
    pub fn contains(&self, attr: &str) -> Result<bool, AccessError> {
        Ok(self.can_read(attr)? || self.can_call(attr)?)
    }

    /// Read an attribute.
    ///
    /// # Errors
    /// [`AccessError::NoAttribute`] if no held role may read or call it, or
    /// it does not exist.
    pub fn get(&self, attr: &str) -> Result<ProxyValue, AccessError> {
        if !self.contains(attr)? {
            return Err(self.no_attribute(attr));
        }
        self.fetch(attr).ok_or_else(|| self.no_attribute(attr))?
    }

    /// Read an attribute as a dictionary item. Only attributes in the active
    /// dataset are available.
    ///
    /// # Errors
    /// [`AccessError::NoKey`] if the attribute is not readable or outside the
    /// active dataset.
    pub fn get_item(&self, key: &str) -> Result<ProxyValue, AccessError> {
        let no_key = || AccessError::NoKey {
            class: self.class_name().to_owned(),
            key: key.to_owned(),
        };
        let in_dataset = self
            .dataset_attrs
            .as_ref()
            .is_none_or(|attrs| attrs.contains(key));
        if !in_dataset || !self.can_read(key)? {
            return Err(no_key());
        }
        self.fetch(key).ok_or_else(no_key)?
    }

    /// Write an attribute. Write access does not imply read access.
    ///
    /// # Errors
    /// [`AccessError::NoAttribute`] without write access, or the model's
    /// error if the write fails.
    pub fn set(&self, attr: &str, value: Value) -> Result<(), AccessError> {
        if !self.can_write(attr)? {
            return Err(self.no_attribute(attr));
        }
        self.obj.set_attr(attr, value)?;
        Ok(())
    }

    /// Dictionary-style write.
    ///
    /// # Errors
    /// [`AccessError::NoKey`] without write access, or the model's error if
    /// the write fails.
    pub fn set_item(&self, key: &str, value: Value) -> Result<(), AccessError> {
        if !self.can_write(key)? {
            return Err(AccessError::NoKey {
                class: self.class_name().to_owned(),
                key: key.to_owned(),
            });
        }
        self.obj.set_attr(key, value)?;
        Ok(())
    }

    /// Invoke a method.
    ///
    /// # Errors
    /// [`AccessError::NoAttribute`] without call access, or the model's
    /// error if the call fails.
    pub fn call(&self, method: &str, args: Value) -> Result<Value, AccessError> {
        if !self.can_call(method)? {
            return Err(self.no_attribute(method));
        }
        Ok(self.obj.call(method, args)?)
    }

    /// Enumerable attributes: readable and in the active dataset.
    ///
    /// # Errors
    /// Propagates role resolution errors.
    pub fn keys(&self) -> Result<BTreeSet<String>, AccessError> {
        let class = Arc::clone(self.obj.model_class());
        let candidates: BTreeSet<&String> = class
            .roles()
            .iter()
            .flat_map(|(_, attrs)| attrs.read.iter())
            .filter(|attr| {
                self.dataset_attrs
                    .as_ref()
                    .is_none_or(|attrs| attrs.contains(*attr))
            })
            .collect();
        let mut keys = BTreeSet::new();
        for attr in candidates {
            if self.can_read(attr)? {
                keys.insert(attr.clone());
            }
        }
        Ok(keys)
    }

    /// # Errors
    /// Same as [`Self::keys`].
    pub fn len(&self) -> Result<usize, AccessError> {
        Ok(self.keys()?.len())
    }

    /// # Errors
    /// Same as [`Self::keys`].
    pub fn is_empty(&self) -> Result<bool, AccessError> {
        Ok(self.keys()?.is_empty())
    }

    /// Render enumerable attributes as a JSON object. Without explicit
    /// datasets the class's JSON datasets apply.
    ///
    /// # Errors
    /// Propagates access and dataset errors from nested proxies.
    pub fn to_json(&self) -> Result<Value, AccessError> {
        let class = Arc::clone(self.obj.model_class());
        if self.dataset_attrs.is_none() && !class.json_datasets().is_empty() {
            let scoped = Self::new(
                Arc::clone(&self.obj),
                self.roles.clone(),
                Some(class.json_datasets().to_vec()),
                self.path.clone(),
            )?;
            return scoped.to_json();
        }
        let mut out = Map::new();
        for key in self.keys()? {
            let value = self.get_item(&key)?.to_json()?;
            out.insert(key, value);
        }
        Ok(Value::Object(out))
    }

    fn fetch(&self, attr: &str) -> Option<Result<ProxyValue, AccessError>> {
        let class = self.obj.model_class();
        if class
            .attribute(attr)
            .is_some_and(|a| a.kind() == AttributeKind::Method)
        {
            return Some(Ok(ProxyValue::Callable(attr.to_owned())));
        }
        let value = self.obj.attr(attr)?;
        Some(self.wrap(attr, value))
    }

    fn wrap(&self, attr: &str, value: AttrValue) -> Result<ProxyValue, AccessError> {
        let relation = match value {
            AttrValue::Value(value) => return Ok(ProxyValue::Value(value)),
            AttrValue::Relation(relation) => relation,
        };
        let path = format!("{}.{attr}", self.path);
        Ok(match relation {
            Relation::Scalar(None) => ProxyValue::Value(Value::Null),
            Relation::Scalar(Some(obj)) => ProxyValue::Object(Box::new(self.nested(obj, path)?)),
            Relation::Sequence(items) => ProxyValue::List(self.nested_list(items, &path)?),
            Relation::Query(query) => ProxyValue::List(self.nested_list(query.fetch(), &path)?),
            Relation::Mapping(items) => {
                let mut out = BTreeMap::new();
                for (key, obj) in items {
                    let nested = self.nested(obj, format!("{path}[{key}]"))?;
                    out.insert(key, nested);
                }
                ProxyValue::Map(out)
            }
        })
    }

    fn nested_list(&self, items: Vec<ModelRef>, path: &str) -> Result<Vec<Self>, AccessError> {
        items
            .into_iter()
            .enumerate()
            .map(|(index, obj)| self.nested(obj, format!("{path}[{index}]")))
            .collect()
    }

    fn nested(&self, obj: ModelRef, path: String) -> Result<Self, AccessError> {
        let roles = match &self.roles {
            RoleSource::Lazy(set) => RoleSource::Lazy(obj.roles_for(set.actor(), set.anchors())),
            RoleSource::Fixed(set) => RoleSource::Fixed(set.clone()),
        };
        Self::new(obj, roles, self.datasets.clone(), path)
    }
}

impl fmt::Debug for RoleAccessProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleAccessProxy")
            .field("class", &self.class_name())
            .field("path", &self.path)
            .field("roles", &self.roles)
            .field("datasets", &self.datasets)
            .finish_non_exhaustive()
    }
}

impl PartialEq<Map<String, Value>> for RoleAccessProxy {
    fn eq(&self, other: &Map<String, Value>) -> bool {
        matches!(self.to_json(), Ok(Value::Object(map)) if map == *other)
    }
}

impl Serialize for RoleAccessProxy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}
