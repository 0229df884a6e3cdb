//! State managers: typed views over one state column of a host type.
//!
//! | state kind | built from | may be a transition target |
//! |------------|------------|----------------------------|
//! | static | an enum value | yes |
//! | enum group | an enum group | no |
//! | conditional | a static state or enum group plus a predicate | no |
//! | state group | [`StateManagerBuilder::group`] | no |
//!
//! The manager never owns the host's storage. It reads and writes through the
//! accessors given to [`StateManager::builder`]; writes take `&T`, so hosts
//! keep the column behind interior mutability.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::condition::{self, Condition};
use crate::error::{StateConfigError, StateError};
use crate::labeled_enum::{Label, StateEnum, StateValue};
use crate::state::{ClassCondition, ManagedState, ManagedStateGroup, StateMatch, StateRef, Validator};
use crate::transition::TransitionInfo;

type Getter<T, V> = Arc<dyn Fn(&T) -> V + Send + Sync>;
type Setter<T, V> = Arc<dyn Fn(&T, V) + Send + Sync>;

/// Output of [`StateManager::group`]: each scalar state with its items.
pub type StateBuckets<'m, 'a, T, V> = Vec<(&'m ManagedState<T, V>, Vec<&'a T>)>;

enum Entry<T, V> {
    State(ManagedState<T, V>),
    Group(ManagedStateGroup),
}

struct Registered<T> {
    name: String,
    transition: Weak<dyn TransitionInfo<T>>,
}

/// A conditional state: a base state refined by a predicate on the host.
pub struct Conditional<T> {
    name: String,
    base: String,
    validator: Validator<T>,
    class_condition: Option<ClassCondition>,
    label: Option<Label>,
}

impl<T> Conditional<T> {
    #[must_use]
    pub fn new<F>(name: impl Into<String>, base: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            base: base.into(),
            validator: Arc::new(validator),
            class_condition: None,
            label: None,
        }
    }

    /// Expression ANDed with the base state in [`StateManager::condition`].
    #[must_use]
    pub fn class_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn() -> Condition + Send + Sync + 'static,
    {
        self.class_condition = Some(Arc::new(condition));
        self
    }

    #[must_use]
    pub fn label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }
}

enum Addition<T> {
    Conditional(Conditional<T>),
    Group(String, Vec<String>),
}

pub struct StateManagerBuilder<T, V: StateValue> {
    name: String,
    propname: String,
    lenum: StateEnum<V>,
    getter: Getter<T, V>,
    setter: Setter<T, V>,
    readonly: bool,
    additions: Vec<Addition<T>>,
}

impl<T, V: StateValue> StateManagerBuilder<T, V> {
    /// Allow direct writes through [`StateManager::set_value`].
    #[must_use]
    pub fn writable(mut self) -> Self {
        self.readonly = false;
        self
    }

    #[must_use]
    pub fn conditional(mut self, state: Conditional<T>) -> Self {
        self.additions.push(Addition::Conditional(state));
        self
    }

    /// Group existing states. A conditional state cannot share a group with
    /// its own base.
    #[must_use]
    pub fn group<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additions.push(Addition::Group(
            name.into(),
            members.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// # Errors
    /// Returns a [`StateConfigError`] for duplicate names, unknown bases or
    /// members, and redundant group members.
    pub fn build(self) -> Result<Arc<StateManager<T, V>>, StateConfigError> {
        let mut manager = StateManager {
            name: self.name,
            propname: self.propname,
            lenum: self.lenum,
            readonly: self.readonly,
            getter: self.getter,
            setter: self.setter,
            entries: Vec::new(),
            index: BTreeMap::new(),
            by_value: BTreeMap::new(),
            transitions: RwLock::new(Vec::new()),
        };

        let statics: Vec<_> = manager
            .lenum
            .entries()
            .iter()
            .map(|entry| ManagedState {
                name: entry.name.clone(),
                value: StateMatch::Single(entry.value.clone()),
                label: Some(entry.label.clone()),
                validator: None,
                class_condition: None,
            })
            .collect();
        let groups: Vec<_> = manager
            .lenum
            .groups()
            .iter()
            .map(|(name, values)| ManagedState {
                name: name.clone(),
                value: StateMatch::Many(values.clone()),
                label: None,
                validator: None,
                class_condition: None,
            })
            .collect();
        for state in statics.into_iter().chain(groups) {
            manager.push(Entry::State(state))?;
        }

        for addition in self.additions {
            let entry = match addition {
                Addition::Conditional(state) => Entry::State(manager.conditional(state)?),
                Addition::Group(name, members) => Entry::Group(manager.state_group(name, members)?),
            };
            manager.push(entry)?;
        }

        tracing::debug!(
            manager = %manager.name,
            column = %manager.propname,
            states = manager.entries.len(),
            "State manager configured"
        );
        Ok(Arc::new(manager))
    }
}

/// Guards one state column of `T`.
pub struct StateManager<T, V: StateValue> {
    name: String,
    propname: String,
    lenum: StateEnum<V>,
    readonly: bool,
    getter: Getter<T, V>,
    setter: Setter<T, V>,
    entries: Vec<Entry<T, V>>,
    index: BTreeMap<String, usize>,
    /// Scalar states per value, most recently added first so conditional
    /// refinements are tried before their base.
    by_value: BTreeMap<V, Vec<usize>>,
    transitions: RwLock<Vec<Registered<T>>>,
}

impl<T, V: StateValue> StateManager<T, V> {
    /// Start a manager named `name` for the column `propname`. It is
    /// read-only unless [`StateManagerBuilder::writable`] is called.
    #[must_use]
    pub fn builder<G, S>(
        name: impl Into<String>,
        propname: impl Into<String>,
        lenum: StateEnum<V>,
        getter: G,
        setter: S,
    ) -> StateManagerBuilder<T, V>
    where
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&T, V) + Send + Sync + 'static,
    {
        StateManagerBuilder {
            name: name.into(),
            propname: propname.into(),
            lenum,
            getter: Arc::new(getter),
            setter: Arc::new(setter),
            readonly: true,
            additions: Vec::new(),
        }
    }

    fn push(&mut self, entry: Entry<T, V>) -> Result<(), StateConfigError> {
        let name = match &entry {
            Entry::State(state) => state.name.clone(),
            Entry::Group(group) => group.name.clone(),
        };
        if self.index.contains_key(&name) {
            return Err(StateConfigError::DuplicateName(name));
        }
        let position = self.entries.len();
        if let Entry::State(ManagedState {
            value: StateMatch::Single(value),
            ..
        }) = &entry
        {
            self.by_value.entry(value.clone()).or_default().insert(0, position);
        }
        self.index.insert(name, position);
        self.entries.push(entry);
        Ok(())
    }

    fn lookup_state(&self, name: &str) -> Result<(usize, &ManagedState<T, V>), StateConfigError> {
        match self.index.get(name).map(|&i| (i, &self.entries[i])) {
            Some((i, Entry::State(state))) => Ok((i, state)),
            Some((_, Entry::Group(_))) => Err(StateConfigError::NotAManagedState {
                manager: self.name.clone(),
                state: name.to_owned(),
            }),
            None => Err(StateConfigError::UnknownState {
                manager: self.name.clone(),
                state: name.to_owned(),
            }),
        }
    }

    fn conditional(&self, state: Conditional<T>) -> Result<ManagedState<T, V>, StateConfigError> {
        let (_, base) = self.lookup_state(&state.base)?;
        Ok(ManagedState {
            name: state.name,
            value: base.value.clone(),
            label: state.label,
            validator: Some(state.validator),
            class_condition: state.class_condition,
        })
    }

    fn state_group(
        &self,
        name: String,
        members: Vec<String>,
    ) -> Result<ManagedStateGroup, StateConfigError> {
        if members.is_empty() {
            return Err(StateConfigError::EmptyGroup(name));
        }
        let mut resolved = Vec::with_capacity(members.len());
        for member in &members {
            resolved.push(self.lookup_state(member)?.1);
        }
        let mut covered: BTreeSet<&V> = resolved
            .iter()
            .filter(|state| !state.is_conditional())
            .flat_map(|state| state.value.values())
            .collect();
        for state in resolved.iter().filter(|state| state.is_conditional()) {
            if state.value.values().any(|value| covered.contains(value)) {
                return Err(StateConfigError::RedundantGroupMember {
                    group: name,
                    state: state.name.clone(),
                });
            }
            covered.extend(state.value.values());
        }
        Ok(ManagedStateGroup { name, members })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the underlying storage column.
    #[must_use]
    pub fn propname(&self) -> &str {
        &self.propname
    }

    #[must_use]
    pub fn lenum(&self) -> &StateEnum<V> {
        &self.lenum
    }

    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// The stored value.
    #[must_use]
    pub fn value(&self, obj: &T) -> V {
        (self.getter)(obj)
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<StateRef<'_, T, V>> {
        self.index.get(name).map(|&i| match &self.entries[i] {
            Entry::State(state) => StateRef::State(state),
            Entry::Group(group) => StateRef::Group(group),
        })
    }

    /// States and groups in declaration order: enum values, enum groups,
    /// then additions.
    pub fn states(&self) -> impl Iterator<Item = StateRef<'_, T, V>> {
        self.entries.iter().map(|entry| match entry {
            Entry::State(state) => StateRef::State(state),
            Entry::Group(group) => StateRef::Group(group),
        })
    }

    fn unknown_state(&self, name: &str) -> StateError {
        StateError::UnknownState {
            manager: self.name.clone(),
            state: name.to_owned(),
        }
    }

    fn not_governed(&self, value: &V) -> StateError {
        StateError::NotGoverned {
            manager: self.name.clone(),
            value: value.sql_literal(),
        }
    }

    fn member_states<'a>(
        &'a self,
        group: &'a ManagedStateGroup,
    ) -> impl Iterator<Item = &'a ManagedState<T, V>> {
        group
            .members
            .iter()
            .filter_map(|member| match self.state(member) {
                Some(StateRef::State(state)) => Some(state),
                _ => None,
            })
    }

    fn is_current(&self, entry: &Entry<T, V>, value: &V, obj: &T) -> bool {
        match entry {
            Entry::State(state) => state.is_current(value, obj),
            Entry::Group(group) => self
                .member_states(group)
                .any(|state| state.is_current(value, obj)),
        }
    }

    /// Is `obj` currently in the named state or group?
    ///
    /// # Errors
    /// [`StateError::UnknownState`] if the name is not defined.
    pub fn is(&self, obj: &T, name: &str) -> Result<bool, StateError> {
        let &i = self.index.get(name).ok_or_else(|| self.unknown_state(name))?;
        Ok(self.is_current(&self.entries[i], &self.value(obj), obj))
    }

    /// The most specific scalar state that currently holds: a conditional
    /// state when its predicate passes, otherwise the plain value.
    ///
    /// # Errors
    /// [`StateError::NotGoverned`] if the stored value is not in the enum.
    pub fn bestmatch(&self, obj: &T) -> Result<&ManagedState<T, V>, StateError> {
        let value = self.value(obj);
        self.by_value
            .get(&value)
            .into_iter()
            .flatten()
            .find_map(|&i| match &self.entries[i] {
                Entry::State(state) if state.is_current(&value, obj) => Some(state),
                _ => None,
            })
            .ok_or_else(|| self.not_governed(&value))
    }

    /// Label of the best match.
    ///
    /// # Errors
    /// Same as [`Self::bestmatch`].
    pub fn label(&self, obj: &T) -> Result<Option<&Label>, StateError> {
        Ok(self.bestmatch(obj)?.label())
    }

    /// Names of every state and group that currently holds.
    #[must_use]
    pub fn current(&self, obj: &T) -> Vec<&str> {
        let value = self.value(obj);
        self.entries
            .iter()
            .filter(|entry| self.is_current(entry, &value, obj))
            .map(|entry| match entry {
                Entry::State(state) => state.name(),
                Entry::Group(group) => group.name(),
            })
            .collect()
    }

    /// Write the column directly.
    ///
    /// # Errors
    /// [`StateError::ReadOnly`] unless the manager is writable,
    /// [`StateError::InvalidValue`] if `value` is not in the enum.
    pub fn set_value(&self, obj: &T, value: V) -> Result<(), StateError> {
        if self.readonly {
            return Err(StateError::ReadOnly {
                manager: self.name.clone(),
            });
        }
        self.force_set(obj, value)
    }

    /// Write bypassing the read-only flag. Used when a transition commits.
    pub(crate) fn force_set(&self, obj: &T, value: V) -> Result<(), StateError> {
        if !self.lenum.contains(&value) {
            return Err(StateError::InvalidValue {
                manager: self.name.clone(),
                value: value.sql_literal(),
            });
        }
        tracing::trace!(manager = %self.name, value = ?value, "Setting state");
        (self.setter)(obj, value);
        Ok(())
    }

    /// Human-readable title of a stored value, for error messages.
    pub(crate) fn title_of(&self, value: &V) -> String {
        self.lenum
            .label(value)
            .map_or_else(|| value.sql_literal(), |label| label.title.clone())
    }

    /// Indexes of the scalar or grouped states a `from` list accepts.
    pub(crate) fn resolve_from(&self, names: &[String]) -> Result<Vec<usize>, StateConfigError> {
        let mut out = Vec::new();
        for name in names {
            match self.index.get(name.as_str()).map(|&i| (i, &self.entries[i])) {
                Some((i, Entry::State(_))) => out.push(i),
                Some((_, Entry::Group(group))) => {
                    for member in &group.members {
                        out.push(self.lookup_state(member)?.0);
                    }
                }
                None => {
                    return Err(StateConfigError::UnknownState {
                        manager: self.name.clone(),
                        state: name.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// A transition target must be a plain enum value.
    pub(crate) fn resolve_to(&self, transition: &str, name: &str) -> Result<V, StateConfigError> {
        let invalid = |reason| StateConfigError::InvalidToState {
            transition: transition.to_owned(),
            state: name.to_owned(),
            reason,
        };
        match self.index.get(name).map(|&i| &self.entries[i]) {
            None => Err(StateConfigError::UnknownState {
                manager: self.name.clone(),
                state: name.to_owned(),
            }),
            Some(Entry::Group(_)) => Err(invalid("a state group")),
            Some(Entry::State(state)) if state.is_conditional() => Err(invalid("a conditional state")),
            Some(Entry::State(ManagedState {
                value: StateMatch::Single(value),
                ..
            })) => Ok(value.clone()),
            Some(Entry::State(_)) => Err(invalid("an enum group")),
        }
    }

    pub(crate) fn accepts(&self, states: &[usize], obj: &T) -> bool {
        let value = self.value(obj);
        states.iter().any(|&i| self.is_current(&self.entries[i], &value, obj))
    }

    pub(crate) fn has_transition(&self, name: &str) -> bool {
        self.transitions
            .read()
            .iter()
            .any(|registered| registered.name == name && registered.transition.strong_count() > 0)
    }

    pub(crate) fn register_transition(&self, name: &str, transition: Weak<dyn TransitionInfo<T>>) {
        let mut transitions = self.transitions.write();
        transitions.retain(|registered| registered.transition.strong_count() > 0);
        transitions.push(Registered {
            name: name.to_owned(),
            transition,
        });
    }

    /// Transitions with a leg on this manager, in definition order. With
    /// `current` only those whose guards pass for `obj` are returned.
    #[must_use]
    pub fn transitions(&self, obj: &T, current: bool) -> Vec<Arc<dyn TransitionInfo<T>>> {
        self.transitions
            .read()
            .iter()
            .filter_map(|registered| registered.transition.upgrade())
            .filter(|transition| !current || transition.is_available(obj))
            .collect()
    }

    /// Bucket `items` by best matching scalar state, in declaration order.
    /// Empty buckets are dropped unless `keep_empty` is set.
    ///
    /// # Errors
    /// [`StateError::NotGoverned`] if an item's value is not in the enum.
    pub fn group<'a, I>(&self, items: I, keep_empty: bool) -> Result<StateBuckets<'_, 'a, T, V>, StateError>
    where
        I: IntoIterator<Item = &'a T>,
    {
        let mut buckets: StateBuckets<'_, 'a, T, V> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::State(state) if state.is_scalar() => Some((state, Vec::new())),
                _ => None,
            })
            .collect();
        for item in items {
            let best = self.bestmatch(item)?;
            let slot = buckets.iter_mut().find(|(state, _)| std::ptr::eq(*state, best));
            if let Some((_, bucket)) = slot {
                bucket.push(item);
            }
        }
        if !keep_empty {
            buckets.retain(|(_, bucket)| !bucket.is_empty());
        }
        Ok(buckets)
    }

    /// Class-level expression testing the named state or group.
    ///
    /// # Errors
    /// [`StateError::UnknownState`] for an undefined name,
    /// [`StateError::NoClassCondition`] for a conditional state declared
    /// without [`Conditional::class_condition`].
    pub fn condition(&self, name: &str) -> Result<Condition, StateError> {
        let &i = self.index.get(name).ok_or_else(|| self.unknown_state(name))?;
        match &self.entries[i] {
            Entry::State(state) => self.state_condition(state),
            Entry::Group(group) => {
                let parts = self
                    .member_states(group)
                    .map(|state| self.state_condition(state))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Condition::any_of(parts))
            }
        }
    }

    fn state_condition(&self, state: &ManagedState<T, V>) -> Result<Condition, StateError> {
        state
            .condition(&self.propname)
            .ok_or_else(|| StateError::NoClassCondition {
                manager: self.name.clone(),
                state: state.name.clone(),
            })
    }

    /// CHECK constraint for this manager's column.
    #[must_use]
    pub fn constraint(&self) -> Condition {
        condition::check_constraint(&self.propname, &self.lenum)
    }

    /// CHECK constraint admitting exactly the values of `lenum`.
    #[must_use]
    pub fn check_constraint(column: &str, lenum: &StateEnum<V>) -> Condition {
        condition::check_constraint(column, lenum)
    }
}

impl<T, V: StateValue> fmt::Debug for StateManager<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("name", &self.name)
            .field("propname", &self.propname)
            .field("readonly", &self.readonly)
            .field("states", &self.index.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
