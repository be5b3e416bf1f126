use std::error::Error;
use std::fmt;

/// Failure kinds of the detector
///
/// Every one of these is non-fatal to the host: a failing hook drops its
/// event and the application's mutex call runs with its normal semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorError {
    /// Out-of-range vertex index; the operation did not mutate anything
    InvalidParameter,
    /// The graph already holds `MAX_VERTICES` vertices; the event is dropped
    CapacityExhausted,
    /// Installing a vertex payload failed; the reserved index was rolled back
    AllocationFailed,
    /// Bootstrap could not resolve a real primitive by name; the detector is
    /// disabled for the remainder of the process
    SymbolResolution(&'static str),
    /// The detector has not been initialized yet
    NotReady,
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorError::InvalidParameter => write!(f, "invalid vertex index or payload"),
            DetectorError::CapacityExhausted => {
                write!(f, "vertex capacity exhausted")
            }
            DetectorError::AllocationFailed => write!(f, "vertex payload allocation failed"),
            DetectorError::SymbolResolution(symbol) => {
                write!(f, "failed to resolve real symbol `{symbol}`")
            }
            DetectorError::NotReady => write!(f, "detector is not initialized"),
        }
    }
}

impl Error for DetectorError {}
