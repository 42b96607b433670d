mod log;
mod token;

pub use log::DeltaLog;
pub use token::{DeltaToken, FieldDelta, FieldMap, ParseDeltaError, RecordKind};
