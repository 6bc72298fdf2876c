//! An in-process process group. Each rank is a `LocalCommunicator` that can
//! be moved onto its own thread; messages travel over crossbeam channels.
//! This is the transport used by the tests and the demos, and it is a
//! faithful stand-in for a multi-process launch: ranks share nothing but the
//! channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::Sender;

use super::comm::{check_rank, Communicator, Envelope};
use super::mailbox::Mailbox;
use crate::error::{Error, Result};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

pub struct LocalCommunicator {
    rank: usize,
    context: u64,
    peers: Vec<Sender<Envelope>>,
    mailbox: Mailbox,
}

/// Create a group of `size` connected communicators, in rank order.
///
pub fn group(size: usize) -> Vec<LocalCommunicator> {
    let context = NEXT_CONTEXT.fetch_add(1, Ordering::SeqCst);
    let (sinks, sources): (Vec<_>, Vec<_>) = (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

    sources
        .into_iter()
        .enumerate()
        .map(|(rank, source)| LocalCommunicator {
            rank,
            context,
            peers: sinks.clone(),
            mailbox: Mailbox::new(source),
        })
        .collect()
}

/// Run `f` once per rank of a fresh group of `size`, each on its own thread,
/// and return the results in rank order. A panic on any rank is resumed on
/// the calling thread.
///
pub fn launch<F, R>(size: usize, f: F) -> Vec<R>
where
    F: Fn(LocalCommunicator) -> R + Sync,
    R: Send,
{
    let f = &f;
    thread::scope(|scope| {
        let procs: Vec<_> = group(size)
            .into_iter()
            .map(|comm| scope.spawn(move || f(comm)))
            .collect();

        procs
            .into_iter()
            .map(|process| process.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn name(&self) -> &str {
        "local"
    }

    fn context(&self) -> u64 {
        self.context
    }

    fn members(&self) -> Vec<String> {
        (0..self.size())
            .map(|rank| format!("local:{}:{}", self.context, rank))
            .collect()
    }

    fn post(&self, rank: usize, envelope: Envelope) -> Result<()> {
        check_rank(rank, self.size())?;
        self.peers[rank]
            .send(envelope)
            .map_err(|_| Error::Disconnected(rank))
    }

    fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}
