//! Database, auth, permission and upload services used by handlers.

pub mod auth;
mod crud;
pub mod perm;
pub mod upload;
pub mod validation;

pub use auth::{CurrentUser, PasswordHasher};
pub use crud::{stored_files, CrudService, PgRowSource};
pub use perm::{check_perm, MembershipLookup, PermRule, PgMembership};
pub use upload::{UploadStore, UploadedFile};
