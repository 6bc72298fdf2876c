use thiserror::Error;

use crate::message::comm::Tag;
use crate::reduce::Builtin;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/**
 * Errors raised by the message substrate, the operation layer, and the
 * scheduler. Transport failures are propagated as-is: nothing in this crate
 * retries or recovers from them.
 */
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid rank {rank} for a group of size {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("peer {0} is disconnected")]
    Disconnected(usize),

    #[error("the inbound channel is closed")]
    InboxClosed,

    #[error("failed to encode payload: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("the operation completed but its result is unusable: {0}")]
    Assembly(String),

    #[error("no message from rank {0} was received")]
    MissingPart(usize),

    #[error("the root must supply a value")]
    MissingRootValue,

    #[error("buffer holds {len} elements but {needed} are needed")]
    InvalidCount { len: usize, needed: usize },

    #[error("operands have different lengths ({0} and {1})")]
    LengthMismatch(usize, usize),

    #[error("operator {0:?} is not defined for this type")]
    Unsupported(Builtin),

    #[error("synchronous sends need a user tag, got {0:?}")]
    InvalidTag(Tag),

    #[error("worker {0} has no active assignment")]
    InactivePromise(usize),

    #[error("worker {worker} is still busy with subtask {subtask}")]
    WorkerBusy { worker: usize, subtask: usize },

    #[error("unknown task kind {0}")]
    UnknownTask(u32),

    #[error("only the manager (rank 0) may do this")]
    NotManager,

    #[error("the scheduler has already been shut down")]
    ShutDown,

    #[error("the process group has no workers")]
    NoWorkers,
}
