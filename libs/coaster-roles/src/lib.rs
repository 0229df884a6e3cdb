#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Declarative role-based access control for model objects.
//!
//! Attributes are declared with the roles that may read, write or call them
//! ([`Attribute::with_roles`]). When a class is finished its annotations are
//! swept into a [`ModelClass`] role map. At request time
//! [`ModelAccess::roles_for`] builds a [`LazyRoleSet`] that discovers roles
//! through relationships only when asked, and [`ModelAccess::access_for`]
//! wraps the object in a [`RoleAccessProxy`] that enforces the map.

pub mod access;
pub mod annotations;
pub mod attribute;
pub mod class;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
mod grants;
pub mod identity;
pub mod lazy_set;
pub mod model;
pub mod proxy;
pub mod registry;
pub mod role_map;

pub use access::{AccessRequest, ModelAccess};
pub use annotations::{AnnotationFact, ColumnAnnotations, GrantsVia, WithRoles};
pub use attribute::{Attribute, AttributeKind, RelationKind};
pub use class::{ClassDefinition, ModelClass};
pub use config::{ModelRolesConfig, RolesConfig};
pub use context::AuthContext;
pub use error::{AccessError, ConfigError, ModelError, RoleError};
pub use identity::{Anchor, Identity};
pub use lazy_set::LazyRoleSet;
pub use model::{AttrValue, LazyQuery, ModelRef, Relation, RoleModel};
pub use proxy::{ProxyValue, RoleAccessProxy, RoleSource};
pub use registry::{AnnotationKey, AnnotationRegistry, AnnotationToken};
pub use role_map::{Action, ClassRoles, DeclaredFacts, RoleAttrs, RoleMap, RoleOfferMap, finalize};
