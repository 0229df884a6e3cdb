//! Guarded transitions across one or more state managers.
//!
//! A transition is built with one leg per state manager it touches. Every
//! leg's `from` states and every [`TransitionBuilder::when`] predicate are
//! checked before the body runs; the first rejection stops the call. The
//! body returns `Ok` to commit every leg's target state, or an
//! [`Interrupt`]: [`Interrupt::Abort`] returns a value without touching
//! state, [`Interrupt::Failed`] propagates as [`TransitionError::Failed`].
//!
//! Side effects the body performed before aborting are not undone; only the
//! state write is skipped.
//!
//! ```rust,ignore
//! let submit = Transition::builder("submit")
//!     .title("Submit")
//!     .on(&state, "DRAFT", "PENDING")
//!     .requires(&reviewstate, "UNSUBMITTED")
//!     .build(|post: &Post, (): ()| Ok(()))?;
//!
//! submit.call(&post, ())?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{StateConfigError, StateError, TransitionError};
use crate::labeled_enum::StateValue;
use crate::manager::StateManager;

const RESERVED_NAME: &str = "name";
const TITLE: &str = "title";
const MESSAGE: &str = "message";

/// States a leg accepts as its starting point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FromStates {
    /// Ignore the current state.
    Any,
    States(Vec<String>),
}

impl From<&str> for FromStates {
    fn from(state: &str) -> Self {
        Self::States(vec![state.to_owned()])
    }
}

impl<const N: usize> From<[&str; N]> for FromStates {
    fn from(states: [&str; N]) -> Self {
        Self::States(states.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl From<Vec<String>> for FromStates {
    fn from(states: Vec<String>) -> Self {
        Self::States(states)
    }
}

/// How a transition body leaves without committing.
#[derive(Debug)]
pub enum Interrupt<R> {
    /// Skip the state change and hand the value back to the caller.
    Abort(Option<R>),
    Failed(anyhow::Error),
}

impl<R> Interrupt<R> {
    #[must_use]
    pub fn abort() -> Self {
        Self::Abort(None)
    }

    #[must_use]
    pub fn abort_with(value: R) -> Self {
        Self::Abort(Some(value))
    }

    #[must_use]
    pub fn fail(error: impl Into<anyhow::Error>) -> Self {
        Self::Failed(error.into())
    }
}

impl<R, E> From<E> for Interrupt<R>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Failed(anyhow::Error::new(error))
    }
}

/// Outcome of a transition that did not fail.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult<R> {
    /// The body returned and every target state was written.
    Applied(R),
    /// The body aborted; state is unchanged.
    Aborted(Option<R>),
}

impl<R> TransitionResult<R> {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    #[must_use]
    pub fn into_value(self) -> Option<R> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Aborted(value) => value,
        }
    }
}

/// Type-erased view of a transition, as listed by
/// [`StateManager::transitions`].
pub trait TransitionInfo<T>: Send + Sync {
    fn name(&self) -> &str;

    /// Metadata including `name` and, when set, `title` and `message`.
    fn data(&self) -> &BTreeMap<String, String>;

    fn title(&self) -> Option<&str> {
        self.data().get(TITLE).map(String::as_str)
    }

    /// Would the guards pass right now? Does not run the body.
    fn is_available(&self, obj: &T) -> bool;

    /// Names of the state managers with a leg on this transition.
    fn managers(&self) -> Vec<&str>;
}

enum Rejection {
    State { manager: String, label: String },
    Condition,
}

/// One state manager's part in a transition.
trait Guard<T>: Send + Sync {
    fn manager_name(&self) -> &str;
    fn check(&self, obj: &T) -> Result<(), Rejection>;
    fn commit(&self, obj: &T) -> Result<(), StateError>;
    fn has_transition(&self, name: &str) -> bool;
    fn register(&self, name: &str, transition: Weak<dyn TransitionInfo<T>>);
}

struct Leg<T, V: StateValue> {
    manager: Arc<StateManager<T, V>>,
    /// `None` accepts any state.
    from: Option<Vec<usize>>,
    /// `None` for a leg that only requires a state.
    to: Option<V>,
}

impl<T, V: StateValue> Guard<T> for Leg<T, V> {
    fn manager_name(&self) -> &str {
        self.manager.name()
    }

    fn check(&self, obj: &T) -> Result<(), Rejection> {
        match &self.from {
            Some(states) if !self.manager.accepts(states, obj) => Err(Rejection::State {
                manager: self.manager.name().to_owned(),
                label: self.manager.title_of(&self.manager.value(obj)),
            }),
            _ => Ok(()),
        }
    }

    fn commit(&self, obj: &T) -> Result<(), StateError> {
        match &self.to {
            Some(to) => self.manager.force_set(obj, to.clone()),
            None => Ok(()),
        }
    }

    fn has_transition(&self, name: &str) -> bool {
        self.manager.has_transition(name)
    }

    fn register(&self, name: &str, transition: Weak<dyn TransitionInfo<T>>) {
        self.manager.register_transition(name, transition);
    }
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Every leg and predicate must pass before any leg commits.
struct CompositeGuard<T> {
    legs: Vec<Box<dyn Guard<T>>>,
    predicates: Vec<Predicate<T>>,
}

impl<T> CompositeGuard<T> {
    fn check(&self, obj: &T) -> Result<(), Rejection> {
        for leg in &self.legs {
            leg.check(obj)?;
        }
        if self.predicates.iter().all(|predicate| predicate(obj)) {
            Ok(())
        } else {
            Err(Rejection::Condition)
        }
    }

    fn commit(&self, obj: &T) -> Result<(), StateError> {
        for leg in &self.legs {
            leg.commit(obj)?;
        }
        Ok(())
    }

    fn managers(&self) -> Vec<&str> {
        self.legs.iter().map(|leg| leg.manager_name()).collect()
    }
}

type Body<T, A, R> = Box<dyn Fn(&T, A) -> Result<R, Interrupt<R>> + Send + Sync>;

/// A guarded operation on `T` taking `A` and returning `R`.
pub struct Transition<T, A = (), R = ()> {
    name: String,
    data: BTreeMap<String, String>,
    guard: CompositeGuard<T>,
    body: Body<T, A, R>,
}

impl<T> Transition<T> {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TransitionBuilder<T> {
        TransitionBuilder::new(name)
    }
}

impl<T, A, R> Transition<T, A, R> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.data.get(TITLE).map(String::as_str)
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.data.get(MESSAGE).map(String::as_str)
    }

    #[must_use]
    pub fn is_available(&self, obj: &T) -> bool {
        self.guard.check(obj).is_ok()
    }

    fn check(&self, obj: &T) -> Result<(), TransitionError> {
        match self.guard.check(obj) {
            Ok(()) => Ok(()),
            Err(Rejection::State { manager, label }) => {
                tracing::warn!(
                    transition = %self.name,
                    manager = %manager,
                    state = %label,
                    "Transition rejected by state"
                );
                Err(TransitionError::InvalidState {
                    transition: self.name.clone(),
                    manager,
                    label,
                })
            }
            Err(Rejection::Condition) => {
                tracing::warn!(transition = %self.name, "Transition rejected by condition");
                Err(TransitionError::ConditionFailed {
                    transition: self.name.clone(),
                })
            }
        }
    }

    /// Check the guards, run the body, and commit on success.
    ///
    /// # Errors
    /// [`TransitionError::InvalidState`] or
    /// [`TransitionError::ConditionFailed`] when a guard rejects the call,
    /// [`TransitionError::Failed`] when the body fails. State is unchanged
    /// in every error case.
    pub fn call(&self, obj: &T, args: A) -> Result<TransitionResult<R>, TransitionError> {
        self.check(obj)?;
        tracing::debug!(transition = %self.name, "Running transition");
        match (self.body)(obj, args) {
            Ok(value) => {
                self.guard.commit(obj)?;
                tracing::debug!(transition = %self.name, "Transition applied");
                Ok(TransitionResult::Applied(value))
            }
            Err(Interrupt::Abort(value)) => {
                tracing::debug!(transition = %self.name, "Transition aborted");
                Ok(TransitionResult::Aborted(value))
            }
            Err(Interrupt::Failed(source)) => {
                tracing::warn!(transition = %self.name, error = %source, "Transition failed");
                Err(TransitionError::Failed {
                    transition: self.name.clone(),
                    source,
                })
            }
        }
    }
}

impl<T, A, R> TransitionInfo<T> for Transition<T, A, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    fn is_available(&self, obj: &T) -> bool {
        self.guard.check(obj).is_ok()
    }

    fn managers(&self) -> Vec<&str> {
        self.guard.managers()
    }
}

impl<T, A, R> fmt::Debug for Transition<T, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("managers", &self.guard.managers())
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for dyn TransitionInfo<T> + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionInfo")
            .field("name", &self.name())
            .field("managers", &self.managers())
            .finish_non_exhaustive()
    }
}

/// Collects legs and metadata; the first definition error is reported by
/// [`TransitionBuilder::build`].
pub struct TransitionBuilder<T> {
    name: String,
    data: BTreeMap<String, String>,
    legs: Vec<Box<dyn Guard<T>>>,
    predicates: Vec<Predicate<T>>,
    error: Option<StateConfigError>,
}

impl<T> TransitionBuilder<T> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let data = BTreeMap::from([(RESERVED_NAME.to_owned(), name.clone())]);
        Self {
            name,
            data,
            legs: Vec::new(),
            predicates: Vec::new(),
            error: None,
        }
    }

    fn fail(&mut self, error: StateConfigError) {
        self.error.get_or_insert(error);
    }

    #[must_use]
    pub fn title(self, title: impl Into<String>) -> Self {
        self.data(TITLE, title)
    }

    #[must_use]
    pub fn message(self, message: impl Into<String>) -> Self {
        self.data(MESSAGE, message)
    }

    /// Attach metadata. The key `name` is reserved.
    #[must_use]
    pub fn data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key == RESERVED_NAME {
            self.fail(StateConfigError::ReservedDataKey(key));
        } else {
            self.data.insert(key, value.into());
        }
        self
    }

    /// Only callable while `predicate` holds.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Box::new(predicate));
        self
    }
}

impl<T: 'static> TransitionBuilder<T> {
    /// Move `manager` from any of `from` to the plain state `to`.
    #[must_use]
    pub fn on<V: StateValue>(
        self,
        manager: &Arc<StateManager<T, V>>,
        from: impl Into<FromStates>,
        to: &str,
    ) -> Self {
        self.leg(manager, from.into(), Some(to))
    }

    /// Require `manager` to be in one of `from` without changing it.
    #[must_use]
    pub fn requires<V: StateValue>(
        self,
        manager: &Arc<StateManager<T, V>>,
        from: impl Into<FromStates>,
    ) -> Self {
        self.leg(manager, from.into(), None)
    }

    fn leg<V: StateValue>(
        mut self,
        manager: &Arc<StateManager<T, V>>,
        from: FromStates,
        to: Option<&str>,
    ) -> Self {
        if self.legs.iter().any(|leg| leg.manager_name() == manager.name()) {
            let error = StateConfigError::DuplicateManager {
                transition: self.name.clone(),
                manager: manager.name().to_owned(),
            };
            self.fail(error);
            return self;
        }
        let from = match from {
            FromStates::Any => Ok(None),
            FromStates::States(names) => manager.resolve_from(&names).map(Some),
        };
        let to = to.map(|name| manager.resolve_to(&self.name, name)).transpose();
        match (from, to) {
            (Ok(from), Ok(to)) => self.legs.push(Box::new(Leg {
                manager: Arc::clone(manager),
                from,
                to,
            })),
            (Err(error), _) | (_, Err(error)) => self.fail(error),
        }
        self
    }

    /// Validate, register with every manager and return the transition.
    ///
    /// # Errors
    /// The first definition error recorded while building,
    /// [`StateConfigError::NoManager`] without any leg, and
    /// [`StateConfigError::DuplicateTransition`] if a manager already has a
    /// transition with this name.
    pub fn build<A, R, F>(self, body: F) -> Result<Arc<Transition<T, A, R>>, StateConfigError>
    where
        A: 'static,
        R: 'static,
        F: Fn(&T, A) -> Result<R, Interrupt<R>> + Send + Sync + 'static,
    {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.legs.is_empty() {
            return Err(StateConfigError::NoManager(self.name));
        }
        if let Some(leg) = self.legs.iter().find(|leg| leg.has_transition(&self.name)) {
            return Err(StateConfigError::DuplicateTransition {
                manager: leg.manager_name().to_owned(),
                transition: self.name,
            });
        }

        let transition = Arc::new(Transition {
            name: self.name,
            data: self.data,
            guard: CompositeGuard {
                legs: self.legs,
                predicates: self.predicates,
            },
            body: Box::new(body),
        });
        let info: Arc<dyn TransitionInfo<T>> = transition.clone();
        for leg in &transition.guard.legs {
            leg.register(&transition.name, Arc::downgrade(&info));
        }
        tracing::debug!(
            transition = %transition.name,
            managers = ?transition.guard.managers(),
            "Transition defined"
        );
        Ok(transition)
    }
}
