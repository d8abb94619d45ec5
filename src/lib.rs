//! Idempotent uploader of specimen observations to iNaturalist.
//!
//! Rows from a CSV sheet become observations with their photos attached.
//! Progress lives in a JSON state file so interrupted runs can be repeated
//! without creating duplicates.

pub mod config;
pub mod error;
pub mod geo;
pub mod logging;
pub mod records;
pub mod remote;
pub mod scanner;
pub mod state;
pub mod upload;

/// Environment variable holding the iNaturalist API token.
pub const TOKEN_ENV: &str = "INATURALIST_ACCESS_TOKEN";

/// Older name of [`TOKEN_ENV`], still read when the current one is unset.
pub const LEGACY_TOKEN_ENV: &str = "INATURALIST_ACCESS_TOKEN_TODAY";

pub use error::{Result, UploadError};
