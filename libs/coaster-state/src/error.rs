use coaster_roles::AccessError;
use thiserror::Error;

/// Mistakes in enum, state manager or transition definitions.
#[derive(Debug, Error)]
pub enum StateConfigError {
    #[error("duplicate state name `{0}`")]
    DuplicateName(String),

    #[error("duplicate state value {0}")]
    DuplicateValue(String),

    #[error("state group `{0}` is empty")]
    EmptyGroup(String),

    #[error("state group `{group}` names unknown value {value}")]
    UnknownValue { group: String, value: String },

    #[error("{manager}: unknown state `{state}`")]
    UnknownState { manager: String, state: String },

    #[error("{manager}: `{state}` is a state group, not a managed state")]
    NotAManagedState { manager: String, state: String },

    #[error("state group `{group}` already covers the value of `{state}`")]
    RedundantGroupMember { group: String, state: String },

    #[error("transition `{transition}`: invalid target state `{state}`: {reason}")]
    InvalidToState {
        transition: String,
        state: String,
        reason: &'static str,
    },

    #[error("transition `{transition}` declares `{manager}` more than once")]
    DuplicateManager { transition: String, manager: String },

    #[error("`{manager}` already has a transition named `{transition}`")]
    DuplicateTransition { manager: String, transition: String },

    #[error("transition data key `{0}` is reserved")]
    ReservedDataKey(String),

    #[error("transition `{0}` has no state manager")]
    NoManager(String),
}

/// Failures reading or writing a managed state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("{manager} is read-only; use a transition")]
    ReadOnly { manager: String },

    #[error("{manager}: not a valid value: {value}")]
    InvalidValue { manager: String, value: String },

    #[error("{manager}: unknown state `{state}`")]
    UnknownState { manager: String, state: String },

    #[error("{manager}: stored value {value} is not governed by this manager")]
    NotGoverned { manager: String, value: String },

    #[error("{manager}: conditional state `{state}` has no class-level condition")]
    NoClassCondition { manager: String, state: String },
}

/// Failures calling a transition.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// A state guard rejected the call. `label` is the title of the
    /// current state.
    #[error("invalid state for transition {transition}: {manager} = {label}")]
    InvalidState {
        transition: String,
        manager: String,
        label: String,
    },

    #[error("transition {transition}: precondition not met")]
    ConditionFailed { transition: String },

    #[error("transition {transition} failed")]
    Failed {
        transition: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Access(#[from] AccessError),
}
