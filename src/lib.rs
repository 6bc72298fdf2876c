//! Taskfarm lets a fixed-size group of cooperating processes exchange data
//! and farm out work. Every send, receive and collective has a blocking form
//! and a non-blocking form; the non-blocking forms return operations that
//! can be polled, waited on, or cancelled, either one at a time or in
//! batches of mixed payload types. On top of these sits a manager/worker
//! scheduler: rank 0 splits a task into subtasks and hands them to idle
//! workers, and the results are assembled in subtask order.
//!
//! All concurrency within a process is single-threaded cooperative polling.
//! Processes are connected by a `Communicator`; an in-process group (one
//! thread per rank) and a TCP group are included.

pub mod endpoint;
pub mod error;
pub mod group;
pub mod message;
pub mod operation;
pub mod reduce;
pub mod scheduler;

pub use endpoint::{Duplex, Receiver, Sender};
pub use error::{Error, Result};
pub use group::Group;
pub use message::comm::{Communicator, Comparison};
pub use operation::{Operation, Reply, Request, Status, Transfer};
pub use reduce::{Builtin, Loc, Op, Reducible};
pub use scheduler::{Scheduler, Task, TaskSet, WorkerTask};
