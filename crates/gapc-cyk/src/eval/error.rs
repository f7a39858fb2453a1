use smol_str::SmolStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EvalError {
    #[error("undefined variable \"{0}\"")]
    Undefined(SmolStr),
    #[error("unknown input sequence \"{0}\"")]
    UnknownSequence(SmolStr),
    #[error("unknown function \"{0}\"")]
    UnknownFunction(SmolStr),
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    #[error("division by zero in \"{0}\"")]
    DivisionByZero(String),
    #[error("shared lock released without being held")]
    UnlockWithoutLock,
    #[error("procedure finished holding {0} shared locks")]
    UnbalancedLock(usize),
    #[error("evaluation exceeded {0} steps")]
    StepLimitExceeded(u64),
    #[error("{lengths} sequence lengths given for an axiom with {tracks} tracks")]
    LengthMismatch { lengths: usize, tracks: usize },
}
