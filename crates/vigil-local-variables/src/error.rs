use thiserror::Error;

use crate::debugger::DebuggerError;

#[derive(Error, Debug)]
pub enum LocalVariablesError {
    #[error("Failed to resume debugger: {0}")]
    Resume(#[from] DebuggerError),
}
