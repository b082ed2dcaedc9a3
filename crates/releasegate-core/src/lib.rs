pub mod access;
pub mod audit;
pub mod config;
pub mod deploy;
pub mod error;
pub mod github;
pub mod pages;
pub mod status;
pub mod types;

pub use error::{GateError, Result};
