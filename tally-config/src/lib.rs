//! Configuration for the Tally CLI.
//!
//! The configuration lives in a `config.yml` file inside a config folder. All values are optional
//! and fall back to their defaults, so a missing file is equivalent to an empty one:
//!
//! ```yaml
//! logging:
//!   level: debug
//! conversion:
//!   baseline: suppress
//!   ttl:
//!     max_age: 600
//! ```
//!
//! Individual values can be overridden from the command line or the environment through
//! [`OverridableConfig`].

#![warn(missing_docs)]

mod config;

pub use self::config::*;
