mod error;

pub use error::{ErrorKind, ExitCode, JotError, JotResult};
