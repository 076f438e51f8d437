pub mod console;
pub mod file;
pub mod postgres;

pub use console::ConsoleSink;
pub use file::FileLogSink;
pub use postgres::{CleanupReport, PostgresLogSink, PostgresSinkError};
