//! Platform-independent pieces of the droidvk loader: error kinds,
//! configuration, and system-property handling.

pub mod config;
pub mod error;
pub mod properties;

pub use error::{LoaderError, WindowError};
