use thiserror::Error;

/// Declaration-time mistakes. These surface while a class is being
/// finalized or configured and are never caught internally.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{class}.{attr}: grants_via requires a relationship attribute")]
    GrantsViaOnNonRelationship { class: String, attr: String },

    #[error("{class}.{attr}: grants_via declares an empty role set")]
    EmptyGrantsVia { class: String, attr: String },

    #[error("{class}: role `{role}` is granted by unknown source `{source_name}`")]
    UnknownGrantSource {
        class: String,
        role: String,
        source_name: String,
    },

    #[error("malformed relationship path `{0}`")]
    MalformedPath(String),

    #[error("invalid role name `{0}`")]
    InvalidRoleName(String),

    #[error("invalid dataset `{0}`")]
    InvalidDataset(String),

    #[error("explicit roles cannot be combined with an actor or anchors")]
    RolesWithActor,

    #[error("configuration could not be loaded: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// Failures while resolving roles on a live object.
#[derive(Debug, Error)]
pub enum RoleError {
    #[error("{class}: `{path}` does not name a relationship")]
    UnknownRelation { class: String, path: String },

    #[error("{class}: cannot traverse `{segment}` in `{path}`, only scalar relationships can appear mid-path")]
    NotTraversable {
        class: String,
        path: String,
        segment: String,
    },
}

/// Errors reported by a [`crate::RoleModel`] when an attribute write or
/// method call fails on the underlying object.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("attribute `{0}` cannot be written")]
    ReadOnly(String),

    #[error("no such method `{0}`")]
    NoMethod(String),

    #[error("invalid value for `{attr}`: {reason}")]
    InvalidValue { attr: String, reason: String },

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised through a [`crate::RoleAccessProxy`].
///
/// A denied attribute and an absent attribute produce the same
/// [`AccessError::NoAttribute`] so callers cannot probe for hidden fields.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("{class}.{attr}: no such attribute")]
    NoAttribute { class: String, attr: String },

    #[error("{class}[{key}]: no such key")]
    NoKey { class: String, key: String },

    #[error("missing dataset `{dataset}` on {class} at `{path}`")]
    MissingDataset {
        dataset: String,
        class: String,
        path: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Role(#[from] RoleError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        Self::Load(Box::new(value))
    }
}
