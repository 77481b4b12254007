pub mod config;
pub mod error;
pub mod executor;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use executor::OrderExecutor;
pub use types::*;
