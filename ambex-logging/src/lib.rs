pub mod field;
pub mod logger;

pub use field::Field;
pub use logger::{AsyncCsvLogger, FlushHandle, LoggerError};
