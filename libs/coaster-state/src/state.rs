use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::condition::Condition;
use crate::labeled_enum::{Label, StateValue};

pub(crate) type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
pub(crate) type ClassCondition = Arc<dyn Fn() -> Condition + Send + Sync>;

/// The stored value(s) a state stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateMatch<V> {
    Single(V),
    /// An enum group.
    Many(BTreeSet<V>),
}

impl<V: StateValue> StateMatch<V> {
    #[must_use]
    pub fn matches(&self, value: &V) -> bool {
        match self {
            Self::Single(v) => v == value,
            Self::Many(values) => values.contains(value),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        let (single, many) = match self {
            Self::Single(v) => (Some(v), None),
            Self::Many(values) => (None, Some(values.iter())),
        };
        single.into_iter().chain(many.into_iter().flatten())
    }

    fn condition(&self, column: &str) -> Condition {
        match self {
            Self::Single(v) => Condition::equals(column, v),
            Self::Many(values) => Condition::is_in(column, values),
        }
    }
}

/// A named state: an enum value, an enum group, or a conditional refinement
/// of either.
pub struct ManagedState<T, V> {
    pub(crate) name: String,
    pub(crate) value: StateMatch<V>,
    pub(crate) label: Option<Label>,
    pub(crate) validator: Option<Validator<T>>,
    pub(crate) class_condition: Option<ClassCondition>,
}

impl<T, V: StateValue> ManagedState<T, V> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &StateMatch<V> {
        &self.value
    }

    #[must_use]
    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.validator.is_some()
    }

    /// Not an enum group.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self.value, StateMatch::Single(_))
    }

    /// A plain enum value: the only kind of state a transition may enter.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_scalar() && !self.is_conditional()
    }

    /// Stored value matches, and the condition holds if there is one.
    pub(crate) fn is_current(&self, value: &V, obj: &T) -> bool {
        self.value.matches(value) && self.validator.as_ref().is_none_or(|check| check(obj))
    }

    /// `None` when the state is conditional without a class-level condition.
    pub(crate) fn condition(&self, column: &str) -> Option<Condition> {
        let matched = self.value.condition(column);
        match (&self.validator, &self.class_condition) {
            (None, _) => Some(matched),
            (Some(_), Some(extra)) => Some(matched.and(extra())),
            (Some(_), None) => None,
        }
    }
}

impl<T, V: fmt::Debug> fmt::Debug for ManagedState<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedState")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("label", &self.label)
            .field("conditional", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

/// A named union of managed states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedStateGroup {
    pub(crate) name: String,
    pub(crate) members: Vec<String>,
}

impl ManagedStateGroup {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }
}

/// A state or group looked up by name.
#[derive(Debug)]
pub enum StateRef<'a, T, V> {
    State(&'a ManagedState<T, V>),
    Group(&'a ManagedStateGroup),
}

impl<'a, T, V: StateValue> StateRef<'a, T, V> {
    #[must_use]
    pub fn name(&self) -> &'a str {
        match self {
            Self::State(state) => state.name(),
            Self::Group(group) => group.name(),
        }
    }
}
