//! Static screening of submitted scene code and caller-supplied filenames.
//!
//! Screening is pattern-based and deliberately conservative. It is a first
//! gate, not a sandbox: anything that passes still runs inside the external
//! renderer under a hard timeout.

mod code;
mod filename;

pub use code::{CodeSafetyValidator, MAX_CODE_LENGTH, MIN_CODE_LENGTH};
pub use filename::{MAX_FILENAME_LENGTH, validate_filename};
