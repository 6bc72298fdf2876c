use crate::endpoint::{Receiver, Sender};
use crate::error::Result;
use crate::group::Group;
use crate::message::codec::Payload;
use crate::operation::Reply;

/// The part of a task that runs on every process. Workers only ever see
/// this half: they reconstruct the task from its wire tag (see [`TaskSet`])
/// and are then handed one subtask at a time.
///
pub trait WorkerTask {
    /// Called once on the manager and on every worker before the first
    /// subtask is dispatched.
    fn prepare(&mut self, _group: &Group, _is_worker: bool) -> Result<()> {
        Ok(())
    }

    /// Worker side of one subtask. This method must be implemented to
    /// receive the subtask input from the manager through `from`, compute,
    /// and send the result back through `to`. It is invoked once for every
    /// subtask the worker is handed.
    fn execute_subtask(&mut self, from: &Receiver, to: &Sender) -> Result<()>;

    /// Mirror of `prepare`, called once on every process after all subtasks
    /// were collected.
    fn clean(&mut self, _group: &Group, _is_worker: bool) -> Result<()> {
        Ok(())
    }
}

/// A unit of work that decomposes into subtasks, identified by strictly
/// increasing integers starting at 0. The manager walks the subtask cursor
/// and sends each subtask to an idle worker; results may come back in any
/// order, and each is stored at the identifier it was dispatched under.
///
pub trait Task: WorkerTask {
    /// The wire tag of this task kind. The worker side must be able to
    /// rebuild the task from it through [`TaskSet::from_tag`].
    const KIND: u32;

    /// The type of the result of one subtask.
    type Subresult: Payload;

    /// The type of the assembled result of the whole task.
    type Output;

    /// Return `true` once every subtask has been dispatched (not necessarily
    /// completed).
    fn is_finished(&self) -> bool;

    /// Return the identifier of the next subtask to dispatch.
    fn next_subtask_id(&self) -> usize;

    /// Move the cursor past the subtask just dispatched.
    fn advance(&mut self);

    /// Manager side of one subtask: send the input of subtask `id` to the
    /// worker through `to`, and return a reply on `from` that will yield the
    /// worker's result. Only the send may block; this method must not wait
    /// for the result.
    fn direct_subtask<'c>(
        &mut self,
        from: &Receiver<'c>,
        to: &Sender<'c>,
        id: usize,
    ) -> Result<Reply<'c, Self::Subresult>>;

    /// Record the result of subtask `id`.
    fn store_result(&mut self, id: usize, value: Self::Subresult);

    /// Return the assembled result, once every subtask was stored.
    fn into_output(self) -> Self::Output;
}

/// The closed set of task kinds a worker can run. This is typically an enum
/// with one variant per task kind, which forwards the `WorkerTask` methods to
/// the variant and maps each `Task::KIND` to its variant.
///
pub trait TaskSet: WorkerTask + Sized {
    /// Build the worker side of the task with the given wire tag. Unknown
    /// tags must return `Error::UnknownTask`.
    fn from_tag(kind: u32) -> Result<Self>;
}
