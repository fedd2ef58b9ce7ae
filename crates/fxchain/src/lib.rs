//! Chain files (`.xfc`) list effects to run one after another over the same
//! image:
//!
//! ```text
//! # warm the image, then soften it
//! tint amount=20 warm=true
//! blur radius=2.5 label="soft edges"
//! ```
//!
//! `ChainProgram::parse` turns the text into steps and `apply_chain` runs
//! them. A chain either succeeds as a whole or leaves the image untouched.
mod interpreter;
mod parser;

pub use interpreter::apply_chain;
pub use parser::{parse_param, ChainProgram, ChainStep};

use effects::PackError;
use engine::EngineError;
use thiserror::Error;

/// Step numbers are 1-based, counting steps rather than source lines.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("step {step}: unknown effect '{effect}'")]
    UnknownEffect { step: usize, effect: String },

    #[error("step {step}: failed to load effect '{effect}'")]
    Load {
        step: usize,
        effect: String,
        #[source]
        source: PackError,
    },

    #[error("step {step}: effect '{effect}' failed")]
    Step {
        step: usize,
        effect: String,
        #[source]
        source: EngineError,
    },
}
