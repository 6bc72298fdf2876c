use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{mailbox::Mailbox, util};
use crate::error::{Error, Result};

/// Identifies a stream of messages between an ordered pair of processes.
/// Messages are matched on `(source, tag)`, and delivered in the order they
/// were sent within each stream.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Application point-to-point traffic.
    User(u32),
    /// Scheduler control flags.
    Control,
    /// One collective call; the number is the caller's collective sequence.
    Collective(u64),
    /// Acknowledges that a synchronous send on `User(n)` was taken.
    Ack(u32),
}

impl Default for Tag {
    fn default() -> Self {
        Tag::User(0)
    }
}

/// The unit handed to a transport.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source: usize,
    pub tag: Tag,
    pub sync: bool,
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn new(source: usize, tag: Tag, data: Vec<u8>) -> Self {
        Self {
            source,
            tag,
            sync: false,
            data,
        }
    }
}

/// Result of comparing two process groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Same context and the same members in the same order.
    Identical,
    /// Same members in the same order, but a different context.
    Congruent,
    /// Same members in a different order.
    Similar,
    Unequal,
}

/// Interface for a group of processes that can exchange messages over a
/// network. The underlying transport can in principle be TCP, in-process
/// channels, or a higher level abstraction like MPI.
///
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peers processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to return a human readable name for the group.
    fn name(&self) -> &str;

    /// Must be implemented to return a number distinguishing this group from
    /// other groups over the same members.
    fn context(&self) -> u64;

    /// Must be implemented to return an identity for every member, in rank
    /// order.
    fn members(&self) -> Vec<String>;

    /// Must be implemented to hand an envelope to the transport. This method
    /// must return immediately, in other words it is not allowed to block
    /// until a matching receive is posted.
    fn post(&self, rank: usize, envelope: Envelope) -> Result<()>;

    /// Must be implemented to return the mailbox fed by the inbound side of
    /// the transport.
    fn mailbox(&self) -> &Mailbox;

    /// Send a message to a peer without waiting for it to be received.
    fn send(&self, rank: usize, tag: Tag, message: Vec<u8>) -> Result<()> {
        check_rank(rank, self.size())?;
        self.post(rank, Envelope::new(self.rank(), tag, message))
    }

    /// Post a synchronous envelope; the receiver acknowledges it on
    /// `Tag::Ack` when the message is taken. The acknowledgement is not
    /// awaited here.
    fn post_synchronous(&self, rank: usize, tag: Tag, message: Vec<u8>) -> Result<Tag> {
        let ack = match tag {
            Tag::User(n) => Tag::Ack(n),
            other => return Err(Error::InvalidTag(other)),
        };
        check_rank(rank, self.size())?;
        let mut envelope = Envelope::new(self.rank(), tag, message);
        envelope.sync = true;
        self.post(rank, envelope)?;
        Ok(ack)
    }

    /// Send a message and block until the receiver has taken it.
    fn send_synchronous(&self, rank: usize, tag: Tag, message: Vec<u8>) -> Result<()> {
        let ack = self.post_synchronous(rank, tag, message)?;
        self.mailbox().take(rank, ack).map(|_| ())
    }

    /// Receive the next message on `(rank, tag)` if one has arrived.
    fn try_recv(&self, rank: usize, tag: Tag) -> Result<Option<Vec<u8>>> {
        check_rank(rank, self.size())?;
        match self.mailbox().try_take(rank, tag)? {
            Some(envelope) => open(self, envelope).map(Some),
            None => Ok(None),
        }
    }

    /// Receive the next message on `(rank, tag)`. This method blocks until
    /// the message is ready to be received.
    fn recv(&self, rank: usize, tag: Tag) -> Result<Vec<u8>> {
        check_rank(rank, self.size())?;
        let envelope = self.mailbox().take(rank, tag)?;
        open(self, envelope)
    }

    /// Draw the tag for the next collective call. Every process must issue
    /// its collectives in the same order.
    fn collective_tag(&self) -> Tag {
        Tag::Collective(self.mailbox().next_sequence())
    }

    /// Implements a binomial tree broadcast from the root node. The message
    /// buffer must be `Some` if this is the root node, and it is ignored
    /// otherwise.
    ///
    fn broadcast(&self, root: usize, value: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let p = self.size();
        check_rank(root, p)?;
        let tag = self.collective_tag();
        let r = (self.rank() + p - root) % p;

        let value = if r == 0 {
            value.ok_or(Error::MissingRootValue)?
        } else {
            let parent = r - (r & r.wrapping_neg());
            self.recv((parent + root) % p, tag)?
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 && r + one < p {
                self.send((r + one + root) % p, tag, value.clone())?
            }
        }
        Ok(value)
    }

    /// Implements a binomial tree reduce toward rank 0. All ranks return
    /// `None` except for rank 0. Partial results are always combined as
    /// `f(lower ranks, higher ranks)`, so the operator needs to be
    /// associative but not commutative.
    ///
    fn reduce(
        &self,
        f: &dyn Fn(Vec<u8>, Vec<u8>) -> Result<Vec<u8>>,
        mut value: Vec<u8>,
    ) -> Result<Option<Vec<u8>>> {
        let r = self.rank();
        let p = self.size();
        let tag = self.collective_tag();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv(r + one, tag)?)?
                }
            } else {
                self.send(r - one, tag, value)?;
                return Ok(None);
            }
        }
        Ok(Some(value))
    }

    /// Implements an all-reduce (symmetric fold) operation over an
    /// associative binary operator.
    ///
    fn all_reduce(
        &self,
        f: &dyn Fn(Vec<u8>, Vec<u8>) -> Result<Vec<u8>>,
        value: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let reduced = self.reduce(f, value)?;
        self.broadcast(0, reduced)
    }

    /// Block until every process in the group has entered the barrier.
    fn barrier(&self) -> Result<()> {
        self.all_reduce(&|a, _| Ok(a), Vec::new()).map(|_| ())
    }
}

/// Deliver a taken envelope, acknowledging it first if the sender asked for
/// a synchronous send.
fn open<C: Communicator + ?Sized>(comm: &C, envelope: Envelope) -> Result<Vec<u8>> {
    if envelope.sync {
        if let Tag::User(n) = envelope.tag {
            comm.send(envelope.source, Tag::Ack(n), Vec::new())?;
        }
    }
    Ok(envelope.data)
}

pub(crate) fn check_rank(rank: usize, size: usize) -> Result<()> {
    if rank < size {
        Ok(())
    } else {
        Err(Error::InvalidRank { rank, size })
    }
}

/// Compare two process groups by context and membership.
pub fn compare(a: &dyn Communicator, b: &dyn Communicator) -> Comparison {
    compare_members(a.context(), &a.members(), b.context(), &b.members())
}

fn compare_members(ca: u64, ma: &[String], cb: u64, mb: &[String]) -> Comparison {
    if ma == mb {
        if ca == cb {
            Comparison::Identical
        } else {
            Comparison::Congruent
        }
    } else if ma.len() == mb.len()
        && ma.iter().collect::<HashSet<_>>() == mb.iter().collect::<HashSet<_>>()
    {
        Comparison::Similar
    } else {
        Comparison::Unequal
    }
}
