//! Enumerations of state values with display labels.
//!
//! ```rust,ignore
//! let post_state = StateEnum::builder()
//!     .value("DRAFT", 0, Label::new("Draft"))
//!     .value("PENDING", 1, Label::named("pending", "Pending"))
//!     .value("PUBLISHED", 2, Label::new("Published"))
//!     .group("UNPUBLISHED", [0, 1])
//!     .build()?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;

use serde::Serialize;

use crate::error::StateConfigError;

/// A value a state column can hold.
pub trait StateValue: Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static {
    /// Literal form used when rendering conditions.
    fn sql_literal(&self) -> String;
}

macro_rules! integer_state_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StateValue for $ty {
                fn sql_literal(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

integer_state_value!(i8, i16, i32, i64, u8, u16, u32, u64);

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl StateValue for &'static str {
    fn sql_literal(&self) -> String {
        quote(self)
    }
}

impl StateValue for String {
    fn sql_literal(&self) -> String {
        quote(self)
    }
}

/// Display label of a state: a title, optionally with a machine name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub name: Option<String>,
    pub title: String,
}

impl Label {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            name: None,
            title: title.into(),
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            title: title.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry<V> {
    pub name: String,
    pub value: V,
    pub label: Label,
}

/// Ordered named values with labels, plus named groups of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEnum<V: StateValue> {
    entries: Vec<EnumEntry<V>>,
    groups: Vec<(String, BTreeSet<V>)>,
    by_value: BTreeMap<V, usize>,
}

impl<V: StateValue> StateEnum<V> {
    #[must_use]
    pub fn builder() -> StateEnumBuilder<V> {
        StateEnumBuilder {
            entries: Vec::new(),
            groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, value: &V) -> bool {
        self.by_value.contains_key(value)
    }

    #[must_use]
    pub fn label(&self, value: &V) -> Option<&Label> {
        self.by_value.get(value).map(|&i| &self.entries[i].label)
    }

    #[must_use]
    pub fn value_for(&self, name: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.value)
    }

    /// Values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|entry| &entry.value)
    }

    #[must_use]
    pub fn entries(&self) -> &[EnumEntry<V>] {
        &self.entries
    }

    #[must_use]
    pub fn groups(&self) -> &[(String, BTreeSet<V>)] {
        &self.groups
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct StateEnumBuilder<V> {
    entries: Vec<EnumEntry<V>>,
    groups: Vec<(String, Vec<V>)>,
}

impl<V: StateValue> StateEnumBuilder<V> {
    #[must_use]
    pub fn value(mut self, name: impl Into<String>, value: V, label: Label) -> Self {
        self.entries.push(EnumEntry {
            name: name.into(),
            value,
            label,
        });
        self
    }

    /// Name a set of already declared values. Groups carry no label.
    #[must_use]
    pub fn group(mut self, name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.groups.push((name.into(), values.into_iter().collect()));
        self
    }

    /// # Errors
    /// [`StateConfigError::DuplicateName`] or
    /// [`StateConfigError::DuplicateValue`] for repeated declarations,
    /// [`StateConfigError::EmptyGroup`] and
    /// [`StateConfigError::UnknownValue`] for bad groups.
    pub fn build(self) -> Result<StateEnum<V>, StateConfigError> {
        let mut names = BTreeSet::new();
        let mut by_value = BTreeMap::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if !names.insert(entry.name.clone()) {
                return Err(StateConfigError::DuplicateName(entry.name.clone()));
            }
            if by_value.insert(entry.value.clone(), index).is_some() {
                return Err(StateConfigError::DuplicateValue(entry.value.sql_literal()));
            }
        }
        let mut groups = Vec::with_capacity(self.groups.len());
        for (name, values) in self.groups {
            if !names.insert(name.clone()) {
                return Err(StateConfigError::DuplicateName(name));
            }
            if values.is_empty() {
                return Err(StateConfigError::EmptyGroup(name));
            }
            if let Some(unknown) = values.iter().find(|v| !by_value.contains_key(*v)) {
                return Err(StateConfigError::UnknownValue {
                    group: name,
                    value: unknown.sql_literal(),
                });
            }
            groups.push((name, values.into_iter().collect()));
        }
        Ok(StateEnum {
            entries: self.entries,
            groups,
            by_value,
        })
    }
}
