#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! State managers for model objects.
//!
//! A [`StateEnum`] names the values a state column can hold. A
//! [`StateManager`] wraps one column of a host type and adds conditional
//! states (a value plus a predicate) and state groups. [`Transition`]s move
//! one or more managers between states, checking every guard before the
//! body runs and writing every target state only when it succeeds.
//!
//! Transitions are gated by roles through [`Transition::call_via`] and
//! [`StateManager::transitions_for`], which consult a
//! [`coaster_roles::RoleAccessProxy`].

pub mod condition;
pub mod error;
pub mod labeled_enum;
pub mod manager;
mod roles;
pub mod state;
pub mod transition;

pub use condition::{Condition, check_constraint};
pub use error::{StateConfigError, StateError, TransitionError};
pub use labeled_enum::{EnumEntry, Label, StateEnum, StateEnumBuilder, StateValue};
pub use manager::{Conditional, StateBuckets, StateManager, StateManagerBuilder};
pub use state::{ManagedState, ManagedStateGroup, StateMatch, StateRef};
pub use transition::{
    FromStates, Interrupt, Transition, TransitionBuilder, TransitionInfo, TransitionResult,
};
