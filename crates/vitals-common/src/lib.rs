//! Vitals Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the vitals workspace members:
//!
//! - **Error Handling**: [`VitalsError`] and the [`Result`] alias used by
//!   configuration, logging and the command line shell
//! - **Logging**: structured `tracing` setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use vitals_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> vitals_common::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{Result, VitalsError};
