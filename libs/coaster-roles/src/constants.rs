/// Granted to every caller, authenticated or not.
pub const ROLE_ALL: &str = "all";
/// Granted when no actor is present.
pub const ROLE_ANON: &str = "anon";
/// Granted when an actor is present.
pub const ROLE_AUTH: &str = "auth";

/// Reserved role name that [`crate::RolesConfig`] refuses to redefine.
pub(crate) const BUILTIN_ROLES: [&str; 3] = [ROLE_ALL, ROLE_ANON, ROLE_AUTH];
