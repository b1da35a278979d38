//! Shared types for the SignStation signing workspace
//!
//! `Secret` keeps client secrets and bearer tokens out of logs; `Error` covers
//! configuration loading for the proxy service.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
