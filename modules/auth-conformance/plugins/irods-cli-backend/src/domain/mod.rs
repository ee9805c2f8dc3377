//! Domain layer for the iRODS command-line backend.

pub mod executor;
pub mod iadmin;
pub mod os_release;
pub mod package_manager;

#[cfg(test)]
pub(crate) mod test_support;

pub use executor::{Privilege, ProcessCommandExecutor};
pub use iadmin::IadminIdentityStore;
pub use os_release::OsReleaseProvider;
pub use package_manager::NativePackageManager;
