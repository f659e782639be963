pub mod app_context;
pub mod common;
pub mod config;
pub mod errors;
pub mod trajectory;
pub mod trend;

pub mod database;
#[cfg(feature = "server")]
pub mod server;
pub mod services;

pub use app_context::{AppContext, Collaborators};
pub use errors::{EngineError, EngineResult};
