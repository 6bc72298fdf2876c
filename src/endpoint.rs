//! Typed endpoints of a process group. A `Sender` addresses one destination
//! rank and a `Receiver` one source rank; the rooted collectives hang off
//! whichever side names the root (gather and reduce flow toward a
//! destination, broadcast and scatter flow from a source).
//!
//! Every primitive comes in four forms: blocking, blocking into a caller
//! buffer (`*_into`), non-blocking returning a `Reply` (`i*`), and
//! non-blocking writing a caller buffer (`i*_into`). The blocking broadcast
//! and reduce run over binomial trees; the other blocking forms are the
//! non-blocking form followed by a wait. Blocking and non-blocking
//! collectives do not match each other, so every rank must use the same form
//! of a given collective.

use crate::error::{Error, Result};
use crate::message::codec::{decode, encode, Payload};
use crate::message::comm::{check_rank, Communicator, Tag};
use crate::operation::{part, Fill, Operation, Parts, Reply, Request, Transfer};
use crate::reduce::{Op, Reducible};

/// Sends to `dest`, and roots gather and reduce at `dest`.
#[derive(Clone, Copy)]
pub struct Sender<'c> {
    comm: &'c dyn Communicator,
    dest: usize,
    tag: Tag,
}

impl<'c> Sender<'c> {
    pub(crate) fn new(comm: &'c dyn Communicator, dest: usize) -> Self {
        Self {
            comm,
            dest,
            tag: Tag::default(),
        }
    }

    /// Use the point-to-point tag `tag` instead of 0. Collectives ignore it.
    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = Tag::User(tag);
        self
    }

    pub fn dest(&self) -> usize {
        self.dest
    }

    /// Point-to-point traffic on the control tag, kept apart from every user
    /// tag.
    pub(crate) fn control(mut self) -> Self {
        self.tag = Tag::Control;
        self
    }

    /// Standard-mode send. Returns once the message is handed to the
    /// transport.
    pub fn send<T: Payload>(&self, value: &T) -> Result<()> {
        self.send_bytes(encode(value)?)
    }

    fn send_bytes(&self, bytes: Vec<u8>) -> Result<()> {
        self.comm.send(self.dest, self.tag, bytes)
    }

    /// Synchronous-mode send. Returns once the receiver has taken the
    /// message.
    pub fn ssend<T: Payload>(&self, value: &T) -> Result<()> {
        self.comm.send_synchronous(self.dest, self.tag, encode(value)?)
    }

    /// Ready-mode send. The transports here never need a posted receive, so
    /// this is a standard send.
    pub fn rsend<T: Payload>(&self, value: &T) -> Result<()> {
        self.send(value)
    }

    pub fn isend<T: Payload>(&self, value: &T) -> Result<Transfer<'c>> {
        self.send(value)?;
        Ok(Transfer::done(self.comm))
    }

    /// Non-blocking synchronous send. The transfer completes when the
    /// receiver has taken the message.
    pub fn issend<T: Payload>(&self, value: &T) -> Result<Transfer<'c>> {
        let ack = self.comm.post_synchronous(self.dest, self.tag, encode(value)?)?;
        Ok(Transfer::expecting(self.comm, ack, vec![self.dest]))
    }

    pub fn irsend<T: Payload>(&self, value: &T) -> Result<Transfer<'c>> {
        self.isend(value)
    }

    /// Gather one value from every rank at `dest`. The root gets `Some` of
    /// the values in rank order; every other rank gets `None`.
    pub fn gather<T: Payload>(&self, value: &T) -> Result<Option<Vec<T>>> {
        self.igather(value)?.into_value()
    }

    /// Gather into `buffer`, which is only written at the root.
    pub fn gather_into<T: Payload>(&self, value: &T, buffer: &mut Vec<T>) -> Result<()> {
        self.igather_into(value, buffer)?.wait()
    }

    pub fn igather<T: Payload>(&self, value: &T) -> Result<Reply<'c, Option<Vec<T>>>> {
        let is_root = self.is_root();
        let transfer = self.gather_transfer(value)?;
        Ok(Reply::new(
            transfer,
            Box::new(move |parts| is_root.then(|| decode_all(&parts)).transpose()),
        ))
    }

    pub fn igather_into<'b, T: Payload>(
        &self,
        value: &T,
        buffer: &'b mut Vec<T>,
    ) -> Result<Request<'c, 'b, Vec<T>>> {
        let is_root = self.is_root();
        let transfer = self.gather_transfer(value)?;
        let fill: Fill<'c, Vec<T>> = Box::new(move |parts: Parts, buffer: &mut Vec<T>| {
            if is_root {
                *buffer = decode_all(&parts)?;
            }
            Ok(())
        });
        Ok(Request::new(transfer, fill, buffer))
    }

    /// Reduce one value from every rank with `op`, folding in rank order.
    /// The root gets `Some` of the result; every other rank gets `None`.
    pub fn reduce<T: Payload + Reducible>(&self, value: &T, op: Op<T>) -> Result<Option<T>> {
        let comm = self.comm;
        check_rank(self.dest, comm.size())?;

        let combine = combine_bytes(op);
        let reduced = comm.reduce(&combine, encode(value)?)?;
        let reduced = if self.dest == 0 {
            reduced
        } else {
            self.hand_to_root(reduced)?
        };
        reduced.map(|bytes| decode(&bytes)).transpose()
    }

    /// Reduce into `buffer`, which is only written at the root.
    pub fn reduce_into<T: Payload + Reducible>(
        &self,
        value: &T,
        op: Op<T>,
        buffer: &mut T,
    ) -> Result<()> {
        if let Some(result) = self.reduce(value, op)? {
            *buffer = result
        }
        Ok(())
    }

    pub fn ireduce<T: Payload + Reducible>(
        &self,
        value: &T,
        op: Op<T>,
    ) -> Result<Reply<'c, Option<T>>> {
        let is_root = self.is_root();
        let transfer = self.gather_transfer(value)?;
        Ok(Reply::new(
            transfer,
            Box::new(move |parts| is_root.then(|| fold(op, &parts)).transpose()),
        ))
    }

    pub fn ireduce_into<'b, T: Payload + Reducible>(
        &self,
        value: &T,
        op: Op<T>,
        buffer: &'b mut T,
    ) -> Result<Request<'c, 'b, T>> {
        let is_root = self.is_root();
        let transfer = self.gather_transfer(value)?;
        let fill: Fill<'c, T> = Box::new(move |parts: Parts, buffer: &mut T| {
            if is_root {
                *buffer = fold(op, &parts)?;
            }
            Ok(())
        });
        Ok(Request::new(transfer, fill, buffer))
    }

    fn is_root(&self) -> bool {
        self.comm.rank() == self.dest
    }

    /// Every rank sends its value to the root, which keeps its own.
    fn gather_transfer<T: Payload>(&self, value: &T) -> Result<Transfer<'c>> {
        let comm = self.comm;
        check_rank(self.dest, comm.size())?;
        let tag = comm.collective_tag();
        let bytes = encode(value)?;

        if self.is_root() {
            Ok(Transfer::expecting(comm, tag, others(comm)).with_local(bytes))
        } else {
            comm.send(self.dest, tag, bytes)?;
            Ok(Transfer::done(comm))
        }
    }

    /// The tree reduce ends at rank 0; forward the result to a different
    /// root.
    fn hand_to_root(&self, reduced: Option<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        let comm = self.comm;
        let tag = comm.collective_tag();

        if comm.rank() == 0 {
            comm.send(self.dest, tag, reduced.ok_or(Error::MissingPart(0))?)?;
            Ok(None)
        } else if self.is_root() {
            comm.recv(0, tag).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Receives from `source`, and roots broadcast and scatter at `source`.
#[derive(Clone, Copy)]
pub struct Receiver<'c> {
    comm: &'c dyn Communicator,
    source: usize,
    tag: Tag,
}

impl<'c> Receiver<'c> {
    pub(crate) fn new(comm: &'c dyn Communicator, source: usize) -> Self {
        Self {
            comm,
            source,
            tag: Tag::default(),
        }
    }

    /// Use the point-to-point tag `tag` instead of 0. Collectives ignore it.
    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = Tag::User(tag);
        self
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub(crate) fn control(mut self) -> Self {
        self.tag = Tag::Control;
        self
    }

    pub fn recv<T: Payload>(&self) -> Result<T> {
        decode(&self.comm.recv(self.source, self.tag)?)
    }

    pub fn recv_into<T: Payload>(&self, buffer: &mut T) -> Result<()> {
        *buffer = self.recv()?;
        Ok(())
    }

    pub fn irecv<T: Payload>(&self) -> Result<Reply<'c, T>> {
        let source = self.source;
        let transfer = self.recv_transfer()?;
        Ok(Reply::new(
            transfer,
            Box::new(move |parts| decode(part(&parts, source)?)),
        ))
    }

    pub fn irecv_into<'b, T: Payload>(&self, buffer: &'b mut T) -> Result<Request<'c, 'b, T>> {
        let source = self.source;
        let transfer = self.recv_transfer()?;
        Ok(Request::replacing(
            transfer,
            move |parts| decode(part(&parts, source)?),
            buffer,
        ))
    }

    /// Broadcast from `source`. The root passes `Some(value)`, every other
    /// rank passes `None`; every rank returns the root's value.
    pub fn broadcast<T: Payload>(&self, value: Option<&T>) -> Result<T> {
        let bytes = if self.is_root() {
            Some(encode(value.ok_or(Error::MissingRootValue)?)?)
        } else {
            None
        };
        decode(&self.comm.broadcast(self.source, bytes)?)
    }

    /// Broadcast the root's `buffer` into every other rank's `buffer`.
    pub fn broadcast_into<T: Payload>(&self, buffer: &mut T) -> Result<()> {
        let value = self.broadcast(self.is_root().then(|| &*buffer))?;
        *buffer = value;
        Ok(())
    }

    pub fn ibroadcast<T: Payload>(&self, value: Option<&T>) -> Result<Reply<'c, T>> {
        let source = self.source;
        let transfer = self.broadcast_transfer(value)?;
        Ok(Reply::new(
            transfer,
            Box::new(move |parts| decode(part(&parts, source)?)),
        ))
    }

    pub fn ibroadcast_into<'b, T: Payload>(
        &self,
        buffer: &'b mut T,
    ) -> Result<Request<'c, 'b, T>> {
        let source = self.source;
        let transfer = self.broadcast_transfer(self.is_root().then(|| &*buffer))?;
        Ok(Request::replacing(
            transfer,
            move |parts| decode(part(&parts, source)?),
            buffer,
        ))
    }

    /// Scatter consecutive chunks of `chunk_size` elements from the root's
    /// `values`, one chunk per rank in rank order. Only the root passes
    /// `Some`, and its slice must hold `chunk_size * size` elements.
    pub fn scatter<T: Payload>(&self, values: Option<&[T]>, chunk_size: usize) -> Result<Vec<T>> {
        self.iscatter(values, chunk_size)?.into_value()
    }

    pub fn scatter_into<T: Payload>(
        &self,
        values: Option<&[T]>,
        chunk_size: usize,
        buffer: &mut Vec<T>,
    ) -> Result<()> {
        self.iscatter_into(values, chunk_size, buffer)?.wait()
    }

    pub fn iscatter<T: Payload>(
        &self,
        values: Option<&[T]>,
        chunk_size: usize,
    ) -> Result<Reply<'c, Vec<T>>> {
        let source = self.source;
        let transfer = self.scatter_transfer(values, chunk_size)?;
        Ok(Reply::new(
            transfer,
            Box::new(move |parts| decode(part(&parts, source)?)),
        ))
    }

    pub fn iscatter_into<'b, T: Payload>(
        &self,
        values: Option<&[T]>,
        chunk_size: usize,
        buffer: &'b mut Vec<T>,
    ) -> Result<Request<'c, 'b, Vec<T>>> {
        let source = self.source;
        let transfer = self.scatter_transfer(values, chunk_size)?;
        Ok(Request::replacing(
            transfer,
            move |parts| decode(part(&parts, source)?),
            buffer,
        ))
    }

    fn is_root(&self) -> bool {
        self.comm.rank() == self.source
    }

    fn recv_transfer(&self) -> Result<Transfer<'c>> {
        check_rank(self.source, self.comm.size())?;
        Ok(Transfer::expecting(self.comm, self.tag, vec![self.source]))
    }

    fn broadcast_transfer<T: Payload>(&self, value: Option<&T>) -> Result<Transfer<'c>> {
        let comm = self.comm;
        check_rank(self.source, comm.size())?;
        let tag = comm.collective_tag();

        if !self.is_root() {
            return Ok(Transfer::expecting(comm, tag, vec![self.source]));
        }
        let bytes = encode(value.ok_or(Error::MissingRootValue)?)?;

        for rank in others(comm) {
            comm.send(rank, tag, bytes.clone())?;
        }
        Ok(Transfer::done(comm).with_local(bytes))
    }

    fn scatter_transfer<T: Payload>(
        &self,
        values: Option<&[T]>,
        chunk_size: usize,
    ) -> Result<Transfer<'c>> {
        let comm = self.comm;
        check_rank(self.source, comm.size())?;
        let tag = comm.collective_tag();

        if !self.is_root() {
            return Ok(Transfer::expecting(comm, tag, vec![self.source]));
        }
        let values = values.ok_or(Error::MissingRootValue)?;
        check_count(values.len(), chunk_size, comm.size())?;
        let mut own = Vec::new();

        for rank in 0..comm.size() {
            let chunk = encode(&values[rank * chunk_size..(rank + 1) * chunk_size])?;

            if rank == comm.rank() {
                own = chunk
            } else {
                comm.send(rank, tag, chunk)?
            }
        }
        Ok(Transfer::done(comm).with_local(own))
    }
}

/// Sends to one rank and receives from another as a single exchange. The
/// receive is posted before the send, so a ring of duplex exchanges cannot
/// deadlock.
#[derive(Clone, Copy)]
pub struct Duplex<'c> {
    from: Receiver<'c>,
    to: Sender<'c>,
}

impl<'c> Duplex<'c> {
    pub(crate) fn new(from: Receiver<'c>, to: Sender<'c>) -> Self {
        Self { from, to }
    }

    /// Use the point-to-point tag `tag`, in both directions, instead of 0.
    pub fn with_tag(self, tag: u32) -> Self {
        Self::new(self.from.with_tag(tag), self.to.with_tag(tag))
    }

    pub fn source(&self) -> usize {
        self.from.source()
    }

    pub fn dest(&self) -> usize {
        self.to.dest()
    }

    /// Send `value` and return what the source sent. The two payload types
    /// are independent.
    pub fn sendrecv<S: Payload, R: Payload>(&self, value: &S) -> Result<R> {
        self.isendrecv(value)?.into_value()
    }

    pub fn sendrecv_into<S: Payload, R: Payload>(&self, value: &S, buffer: &mut R) -> Result<()> {
        self.isendrecv_into(value, buffer)?.wait()
    }

    pub fn isendrecv<S: Payload, R: Payload>(&self, value: &S) -> Result<Reply<'c, R>> {
        let reply = self.from.irecv()?;
        self.to.send(value)?;
        Ok(reply)
    }

    pub fn isendrecv_into<'b, S: Payload, R: Payload>(
        &self,
        value: &S,
        buffer: &'b mut R,
    ) -> Result<Request<'c, 'b, R>> {
        let bytes = encode(value)?;
        let request = self.from.irecv_into(buffer)?;
        self.to.send_bytes(bytes)?;
        Ok(request)
    }

    /// Send the contents of `buffer` and overwrite it with what the source
    /// sent.
    pub fn sendrecv_replace<T: Payload>(&self, buffer: &mut T) -> Result<()> {
        self.isendrecv_replace(buffer)?.wait()
    }

    pub fn isendrecv_replace<'b, T: Payload>(
        &self,
        buffer: &'b mut T,
    ) -> Result<Request<'c, 'b, T>> {
        let bytes = encode(&*buffer)?;
        let request = self.from.irecv_into(buffer)?;
        self.to.send_bytes(bytes)?;
        Ok(request)
    }
}

/// Fail unless `len` covers one chunk of `chunk_size` per rank.
pub(crate) fn check_count(len: usize, chunk_size: usize, size: usize) -> Result<()> {
    let needed = chunk_size.checked_mul(size).unwrap_or(usize::MAX);

    if len < needed {
        return Err(Error::InvalidCount { len, needed });
    }
    Ok(())
}

/// Every rank of the group but this one.
pub(crate) fn others(comm: &dyn Communicator) -> Vec<usize> {
    (0..comm.size()).filter(|&r| r != comm.rank()).collect()
}

/// Decode the part of every rank, in rank order.
pub(crate) fn decode_all<T: Payload>(parts: &Parts) -> Result<Vec<T>> {
    (0..parts.len()).map(|rank| decode(part(parts, rank)?)).collect()
}

/// Decode the part of every rank and fold them in rank order.
pub(crate) fn fold<T: Payload + Reducible>(op: Op<T>, parts: &Parts) -> Result<T> {
    let mut values = decode_all::<T>(parts)?.into_iter();
    let first = values.next().ok_or(Error::MissingPart(0))?;
    values.try_fold(first, |acc, value| op.apply(&acc, &value))
}

/// Lift `op` to the encoded representation used by the tree collectives.
pub(crate) fn combine_bytes<T: Payload + Reducible>(
    op: Op<T>,
) -> impl Fn(Vec<u8>, Vec<u8>) -> Result<Vec<u8>> {
    move |a, b| encode(&op.apply(&decode(&a)?, &decode(&b)?)?)
}
