use std::time::Duration;

use effects::PackError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pack(#[from] PackError),

    #[error("preload '{file}' of effect '{effect}' failed: {message}")]
    Preload {
        effect: String,
        file: String,
        message: String,
    },

    #[error("effect '{effect}' failed to compile: {message}")]
    Compile { effect: String, message: String },

    #[error("effect '{effect}' failed at pixel ({x}, {y}): {message}")]
    Evaluation {
        effect: String,
        x: u32,
        y: u32,
        message: String,
    },

    #[error("effect '{effect}' returned an invalid value at pixel ({x}, {y}): {reason}")]
    InvalidReturn {
        effect: String,
        x: u32,
        y: u32,
        reason: String,
    },

    #[error("effect '{effect}' cancelled after exceeding its {budget:?} budget")]
    Cancelled { effect: String, budget: Duration },
}
