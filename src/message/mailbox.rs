use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
};

use crossbeam_channel::{Receiver, TryRecvError};
use log::debug;

use super::comm::{Envelope, Tag};
use crate::error::{Error, Result};

/// The mailbox matches incoming envelopes to receives by `(source, tag)`.
/// Envelopes that arrive before a matching receive is posted are kept in a
/// stash until they are asked for; within one `(source, tag)` stream they are
/// handed out in arrival order. A mailbox belongs to exactly one process and
/// is not shared between threads.
pub struct Mailbox {
    inbound: Receiver<Envelope>,
    stash: RefCell<HashMap<(usize, Tag), VecDeque<Envelope>>>,
    sequence: Cell<u64>,
}

impl Mailbox {
    pub fn new(inbound: Receiver<Envelope>) -> Self {
        Self {
            inbound,
            stash: RefCell::new(HashMap::new()),
            sequence: Cell::new(0),
        }
    }

    /// Return the next collective sequence number of this process.
    pub fn next_sequence(&self) -> u64 {
        let n = self.sequence.get();
        self.sequence.set(n + 1);
        n
    }

    /// Return the number of envelopes that arrived but were not yet taken.
    pub fn stashed(&self) -> usize {
        self.stash.borrow().values().map(VecDeque::len).sum::<usize>() + self.inbound.len()
    }

    /// Take the next envelope on `(source, tag)` if it has arrived. Never
    /// blocks.
    pub fn try_take(&self, source: usize, tag: Tag) -> Result<Option<Envelope>> {
        if let Some(envelope) = self.pop(source, tag) {
            return Ok(Some(envelope));
        }
        loop {
            match self.inbound.try_recv() {
                Ok(envelope) if envelope.source == source && envelope.tag == tag => {
                    return Ok(Some(envelope))
                }
                Ok(envelope) => self.keep(envelope),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(None),
            }
        }
    }

    /// Take the next envelope on `(source, tag)`, blocking until it arrives.
    pub fn take(&self, source: usize, tag: Tag) -> Result<Envelope> {
        if let Some(envelope) = self.pop(source, tag) {
            return Ok(envelope);
        }
        loop {
            let envelope = self.inbound.recv().map_err(|_| Error::InboxClosed)?;

            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope);
            }
            self.keep(envelope)
        }
    }

    fn pop(&self, source: usize, tag: Tag) -> Option<Envelope> {
        let mut stash = self.stash.borrow_mut();
        let queue = stash.get_mut(&(source, tag))?;
        let envelope = queue.pop_front();

        if queue.is_empty() {
            stash.remove(&(source, tag));
        }
        envelope
    }

    fn keep(&self, envelope: Envelope) {
        debug!(
            "Message from {} on {:?} arrived early, buffering",
            envelope.source, envelope.tag
        );
        self.stash
            .borrow_mut()
            .entry((envelope.source, envelope.tag))
            .or_insert_with(VecDeque::new)
            .push_back(envelope)
    }
}
