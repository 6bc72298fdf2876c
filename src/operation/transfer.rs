use log::warn;

use super::{Operation, Parts, Status};
use crate::error::{Error, Result};
use crate::message::comm::{Communicator, Tag};

/// The in-flight handle behind every non-blocking primitive. Whatever a
/// primitive needs to send is sent when the transfer is created; the transfer
/// then waits for one message on `tag` from each of a set of sources (the
/// set may be empty, in which case it is complete from the start).
pub struct Transfer<'c> {
    comm: &'c dyn Communicator,
    tag: Tag,
    waiting: Vec<usize>,
    parts: Parts,
    status: Status,
}

impl<'c> Transfer<'c> {
    /// A transfer with nothing left to wait for.
    pub(crate) fn done(comm: &'c dyn Communicator) -> Self {
        Self::expecting(comm, Tag::Control, Vec::new())
    }

    /// A transfer that completes once a message on `tag` has arrived from
    /// each of `sources`.
    pub(crate) fn expecting(comm: &'c dyn Communicator, tag: Tag, sources: Vec<usize>) -> Self {
        let status = if sources.is_empty() {
            Status::Completed
        } else {
            Status::Pending
        };
        Self {
            comm,
            tag,
            waiting: sources,
            parts: vec![None; comm.size()],
            status,
        }
    }

    /// Record this process's own contribution, so it is assembled together
    /// with the received parts.
    pub(crate) fn with_local(mut self, bytes: Vec<u8>) -> Self {
        let rank = self.comm.rank();
        self.parts[rank] = Some(bytes);
        self
    }

    pub(crate) fn take_parts(&mut self) -> Parts {
        std::mem::take(&mut self.parts)
    }
}

impl<'c> Operation for Transfer<'c> {
    fn poll(&mut self) -> Result<bool> {
        if self.status != Status::Pending {
            return Ok(true);
        }
        let mut i = 0;
        while i != self.waiting.len() {
            let source = self.waiting[i];

            if let Some(bytes) = self.comm.try_recv(source, self.tag)? {
                self.parts[source] = Some(bytes);
                self.waiting.remove(i);
            } else {
                i += 1
            }
        }
        if self.waiting.is_empty() {
            self.status = Status::Completed;
        }
        Ok(self.status != Status::Pending)
    }

    fn wait(&mut self) -> Result<()> {
        if self.status != Status::Pending {
            return Ok(());
        }
        while let Some(&source) = self.waiting.first() {
            self.parts[source] = Some(self.comm.recv(source, self.tag)?);
            self.waiting.remove(0);
        }
        self.status = Status::Completed;
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        if self.status == Status::Pending {
            self.waiting.clear();
            self.status = Status::Cancelled;
        }
        Ok(())
    }

    fn status(&self) -> Status {
        self.status
    }
}

impl<'c> Drop for Transfer<'c> {
    fn drop(&mut self) {
        if self.status == Status::Pending {
            warn!(
                "Dropping a pending transfer on {:?} still waiting for ranks {:?}",
                self.tag, self.waiting
            );
        }
    }
}

/// Return the part received from `rank`.
pub(crate) fn part(parts: &Parts, rank: usize) -> Result<&[u8]> {
    parts
        .get(rank)
        .and_then(Option::as_deref)
        .ok_or(Error::MissingPart(rank))
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::message::local;

    #[test]
    fn poll_is_idempotent_once_complete() {
        let comms = local::group(2);
        let mut transfer = Transfer::expecting(&comms[0], Tag::User(0), vec![1]);
        assert!(!transfer.poll().unwrap());
        assert_eq!(transfer.status(), Status::Pending);

        comms[1].send(0, Tag::User(0), vec![1, 2]).unwrap();
        assert!(transfer.poll().unwrap());
        assert!(transfer.poll().unwrap());
        assert!(transfer.poll().unwrap());
        assert_eq!(transfer.status(), Status::Completed);
        assert_eq!(part(&transfer.take_parts(), 1).unwrap(), &[1, 2]);
    }

    #[test]
    fn an_empty_transfer_is_complete_from_the_start() {
        let comms = local::group(1);
        let mut transfer = Transfer::done(&comms[0]);
        assert_eq!(transfer.status(), Status::Completed);
        assert!(transfer.poll().unwrap());
        transfer.wait().unwrap();
    }

    #[test]
    fn cancel_only_affects_pending_transfers() {
        let comms = local::group(2);
        let mut pending = Transfer::expecting(&comms[0], Tag::User(0), vec![1]);
        pending.cancel().unwrap();
        assert_eq!(pending.status(), Status::Cancelled);
        assert!(pending.poll().unwrap());
        pending.wait().unwrap();

        let mut finished = Transfer::done(&comms[0]);
        finished.cancel().unwrap();
        assert_eq!(finished.status(), Status::Completed);
    }

    #[test]
    fn parts_are_collected_from_every_source() {
        let comms = local::group(3);
        comms[2].send(0, Tag::User(4), vec![2]).unwrap();
        comms[1].send(0, Tag::User(4), vec![1]).unwrap();

        let mut transfer =
            Transfer::expecting(&comms[0], Tag::User(4), vec![1, 2]).with_local(vec![0]);
        transfer.wait().unwrap();
        let parts = transfer.take_parts();
        assert_eq!(parts, vec![Some(vec![0]), Some(vec![1]), Some(vec![2])]);
        assert!(matches!(part(&vec![None], 0), Err(Error::MissingPart(0))));
    }
}
