pub mod config;
mod error;
pub mod format;
pub mod log;
pub mod models;
mod setup;

pub use error::Error;
pub use setup::{load_catalog, setup_manager};
