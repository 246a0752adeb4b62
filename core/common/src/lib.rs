//! Common utilities and types shared across foldersync modules.
//!
//! This module provides the error type and the relative path type used by
//! every stage of a sync pass, so that source and replica trees are always
//! addressed the same way.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::RelativePath;
