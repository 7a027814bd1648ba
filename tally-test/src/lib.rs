//! Helpers for testing Tally's crates.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output is
//!    captured by the test runner. All logs emitted with [`tally_log`] will show up for test
//!    failures or when run with `--nocapture`.
//!  - To assert on emitted logs, wrap the code under test in [`capture_logs`].
//!
//! # Example
//!
//! ```no_run
//! #[test]
//! fn my_test() {
//!     tally_test::setup();
//!
//!     tally_log::debug!("hello, world!");
//! }
//! ```

pub use tally_log::capture_logs;

/// Setup the test environment.
///
///  - Initializes logs: The logger captures logs from all of Tally's crates and mutes all other
///    logs.
pub fn setup() {
    tally_log::init_test!("tally");
}
