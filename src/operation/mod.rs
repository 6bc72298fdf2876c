//! Non-blocking operations. An `Operation` is one in-flight action issued
//! against a process group: it can be polled, waited on, or cancelled, and
//! once it has completed (or been cancelled) it stays that way.
//!
//! `Transfer` is the bare in-flight handle. `Reply` decorates a transfer
//! with a value it owns and decodes on completion; `Request` decorates a
//! transfer with a caller-owned buffer that is overwritten on completion.
//! The `batch` functions test or wait on mixed collections of operations
//! through `&mut dyn Operation`.

pub mod batch;
mod reply;
mod request;
mod transfer;

pub use batch::Batch;
pub use reply::Reply;
pub use request::Request;
pub use transfer::Transfer;

pub(crate) use request::Fill;
pub(crate) use transfer::part;

use crate::error::Result;

/// Messages gathered by a transfer, indexed by source rank.
pub(crate) type Parts = Vec<Option<Vec<u8>>>;

/// Turns the gathered messages into a value.
pub(crate) type Assemble<'c, T> = Box<dyn FnOnce(Parts) -> Result<T> + 'c>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Completed,
    Cancelled,
}

/// The common contract of every in-flight action.
pub trait Operation {
    /// Return `true` if the operation has completed or was cancelled. Never
    /// blocks.
    fn poll(&mut self) -> Result<bool>;

    /// Block until the operation has completed. Returns immediately if it
    /// was cancelled.
    fn wait(&mut self) -> Result<()>;

    /// Stop waiting for the operation, if it is still pending. Data already
    /// in flight may still arrive; any buffer associated with a cancelled
    /// operation is left in an unspecified state.
    fn cancel(&mut self) -> Result<()>;

    fn status(&self) -> Status;
}
