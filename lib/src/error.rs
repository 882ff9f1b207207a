use std::sync::Arc;

use thiserror::Error;

use crate::time::Epoch;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown body: {0}")]
    UnknownBody(Arc<str>),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("{0} has no orbit")]
    NoOrbit(Arc<str>),

    #[error("no requested body is present in the catalog")]
    EmptyBodySet,

    #[error("body {0} appears more than once in the catalog")]
    DuplicateBody(Arc<str>),

    #[error("catalog has no primary body")]
    NoPrimary,

    #[error("catalog has more than one primary body: {0} and {1}")]
    MultiplePrimaries(Arc<str>, Arc<str>),

    #[error("{body} names unknown parent {parent}")]
    UnknownParent { body: Arc<str>, parent: Arc<str> },

    #[error("parent chain of {0} does not terminate at the primary")]
    CyclicHierarchy(Arc<str>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("time step overflows the representable epoch range")]
    TimeOverflow,

    #[error("degenerate orbit for {0}: zero or non-finite state")]
    DegenerateOrbit(Arc<str>),

    #[error("propagation of {body} to {epoch} failed to converge after {iter} iterations")]
    PropagationFailed {
        body: Arc<str>,
        epoch: Epoch,
        iter: u64,
    },

    #[error("{epoch} lies outside the ephemeris window [{start}, {end}]")]
    EphemerisOutOfRange {
        epoch: Epoch,
        start: Epoch,
        end: Epoch,
    },

    #[error("catalog parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("time parse error: {0}")]
    Time(#[from] time::error::Parse),
}
