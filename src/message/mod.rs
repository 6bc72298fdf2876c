//! This module exports a minimal message-passing API, which is encapsulated
//! by a `Communicator` trait. Implementors only need to write `post` (hand an
//! envelope to the transport) and expose a `Mailbox` fed by the inbound side
//! of that transport. The trait then provides matched point-to-point receives
//! and default implementations for broadcast, reduce, all-reduce, and
//! barrier. An in-process transport (`local`) and a pure-Rust TCP transport
//! (`tcp`) are included.
//!

mod backoff;
pub mod codec;
pub mod comm;
pub mod local;
pub mod mailbox;
pub mod tcp;
pub mod util;

pub(crate) use backoff::ExponentialBackoff;
