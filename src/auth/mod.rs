/*!
 * # Authentication and Authorization Module
 *
 * Resolves who the current user is and what they may do.
 *
 * - [`session`]: session resolution (local cache, then identity provider)
 * - [`permissions`]: typed permissions, legacy token aliases and role defaults
 */

pub mod permissions;
pub mod session;

pub use permissions::{
    default_tokens, Action, Module, Permission, PermissionSet, PermissionToken, LEGACY_ALIASES,
};
pub use session::{DirectoryIdentityProvider, IdentityProvider, Session, SessionManager};
