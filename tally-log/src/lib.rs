//! Logging facade for Tally.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be obtained from configuration files. This requires the
//! `init` feature.
//!
//! ```
//! # #[cfg(feature = "init")] {
//! use tally_log::{LogConfig, LogFormat};
//!
//! let log_config = LogConfig {
//!     format: LogFormat::Json,
//!     ..LogConfig::default()
//! };
//!
//! tally_log::init(&log_config).ok();
//! # }
//! ```
//!
//! # Logging
//!
//! The basic use of the facade is through the five logging macros: [`error!`], [`warn!`],
//! [`info!`], [`debug!`] and [`trace!`] where `error!` represents the highest-priority log messages
//! and `trace!` the lowest. The log messages are filtered by configuring the log level to exclude
//! messages with a lower priority. Each of these macros accept format strings similarly to
//! [`println!`], as well as structured fields.
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer short and precise log
//! messages over verbose text, and put variable data into fields. Choose the log level according
//! to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior, such as input that had to be skipped.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging.
//! - [`trace!`] for full auxiliary information.
//!
//! ## Examples
//!
//! ```
//! tally_log::info!("startup complete");
//! tally_log::debug!(metric = "requests", "dropped out-of-order sample");
//! ```
//!
//! ## Logging Error Types
//!
//! To log errors including their full chain of sources, use the [`LogError`] wrapper.
//!
//! ```
//! use std::io::Error;
//! use tally_log::LogError;
//!
//! let custom_error = Error::other("oh no!");
//! tally_log::error!("operation failed: {}", LogError(&custom_error));
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`] that should be called
//! at the beginning of test method. It enables test mode of the logger and customizes log levels
//! for the current crate. This requires the `test` feature.
//!
//! ```
//! #[cfg(test)]
//! mod tests {
//!     #[test]
//!     fn test_something() {
//!         tally_log::init_test!();
//!     }
//! }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
mod test;
#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
