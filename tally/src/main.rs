//! The Tally binary.
//!
//! Tally reads metric batches as JSON lines, converts cumulative series into deltas and writes
//! the converted data points to stdout. All state lives in one converter for the lifetime of the
//! process, so deltas are computed across batches.
//!
//! ```text
//! tally convert metrics.jsonl
//! tally --baseline suppress convert < metrics.jsonl
//! tally config init
//! tally config show
//! ```

mod cli;
mod convert;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            tally_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
