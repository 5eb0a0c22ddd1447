pub mod backup;
pub mod conflict;
pub mod error;
pub mod filter;
pub mod installer;
pub mod manifest;
pub mod registry;
pub mod scanner;
pub mod skill_index;
pub mod status;
pub mod uninstall;

pub use error::InstallError;
