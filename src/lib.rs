pub mod config;
pub mod db;
pub mod error;
pub mod permission;
pub mod registry;

pub use error::AppError;
pub use permission::{Authority, Decision, Permission};
pub use registry::RegistryService;
