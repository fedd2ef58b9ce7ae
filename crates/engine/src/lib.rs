mod context;
mod error;
mod evaluator;
mod grid;
mod marshal;
mod params;

pub use context::{ExecutionContext, PreparedEffect};
pub use error::EngineError;
pub use evaluator::{apply_effect, Deadline, EvalOptions};
pub use grid::{CodecError, PixelGrid, Rgba};
pub use marshal::narrow_channel;
pub use params::{ParamValue, Params, RESERVED_BINDINGS};
