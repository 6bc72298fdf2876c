use crate::endpoint::{
    check_count, combine_bytes, decode_all, fold, others, Duplex, Receiver, Sender,
};
use crate::error::Result;
use crate::message::codec::{decode, encode, Payload};
use crate::message::comm::{self, Communicator, Comparison};
use crate::operation::{Operation, Parts, Reply, Request, Transfer};
use crate::reduce::{Op, Reducible};

/// A typed view of a process group. Point-to-point traffic and rooted
/// collectives go through the `Sender` and `Receiver` returned by `dest` and
/// `source`; the collectives without a root live here.
#[derive(Clone, Copy)]
pub struct Group<'c> {
    comm: &'c dyn Communicator,
}

impl<'c> Group<'c> {
    pub fn new(comm: &'c dyn Communicator) -> Self {
        Self { comm }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn name(&self) -> &'c str {
        self.comm.name()
    }

    pub fn communicator(&self) -> &'c dyn Communicator {
        self.comm
    }

    pub fn compare(&self, other: &Group) -> Comparison {
        comm::compare(self.comm, other.comm)
    }

    pub fn dest(&self, rank: usize) -> Sender<'c> {
        Sender::new(self.comm, rank)
    }

    pub fn source(&self, rank: usize) -> Receiver<'c> {
        Receiver::new(self.comm, rank)
    }

    /// A handle that sends to `dest` and receives from `source` in one
    /// exchange.
    pub fn duplex(&self, source: usize, dest: usize) -> Duplex<'c> {
        Duplex::new(self.source(source), self.dest(dest))
    }

    /// Gather one value from every rank at every rank, in rank order.
    pub fn all_gather<T: Payload>(&self, value: &T) -> Result<Vec<T>> {
        self.iall_gather(value)?.into_value()
    }

    pub fn all_gather_into<T: Payload>(&self, value: &T, buffer: &mut Vec<T>) -> Result<()> {
        self.iall_gather_into(value, buffer)?.wait()
    }

    pub fn iall_gather<T: Payload>(&self, value: &T) -> Result<Reply<'c, Vec<T>>> {
        let transfer = self.exchange(encode(value)?)?;
        Ok(Reply::new(transfer, Box::new(|parts| decode_all(&parts))))
    }

    pub fn iall_gather_into<'b, T: Payload>(
        &self,
        value: &T,
        buffer: &'b mut Vec<T>,
    ) -> Result<Request<'c, 'b, Vec<T>>> {
        let transfer = self.exchange(encode(value)?)?;
        Ok(Request::replacing(transfer, |parts| decode_all(&parts), buffer))
    }

    /// Send the `r`-th chunk of `chunk_size` consecutive values to each rank
    /// `r`, and return the chunks addressed to this rank, concatenated in
    /// rank order. `values` must hold at least `chunk_size * size` elements.
    pub fn all_to_all<T: Payload>(&self, values: &[T], chunk_size: usize) -> Result<Vec<T>> {
        self.iall_to_all(values, chunk_size)?.into_value()
    }

    pub fn all_to_all_into<T: Payload>(
        &self,
        values: &[T],
        chunk_size: usize,
        buffer: &mut Vec<T>,
    ) -> Result<()> {
        self.iall_to_all_into(values, chunk_size, buffer)?.wait()
    }

    pub fn iall_to_all<T: Payload>(
        &self,
        values: &[T],
        chunk_size: usize,
    ) -> Result<Reply<'c, Vec<T>>> {
        let transfer = self.scatter_to_all(values, chunk_size)?;
        Ok(Reply::new(transfer, Box::new(|parts| concat_all(&parts))))
    }

    pub fn iall_to_all_into<'b, T: Payload>(
        &self,
        values: &[T],
        chunk_size: usize,
        buffer: &'b mut Vec<T>,
    ) -> Result<Request<'c, 'b, Vec<T>>> {
        let transfer = self.scatter_to_all(values, chunk_size)?;
        Ok(Request::replacing(transfer, |parts| concat_all(&parts), buffer))
    }

    /// Reduce one value from every rank with `op`, folding in rank order, and
    /// return the result on every rank.
    pub fn all_reduce<T: Payload + Reducible>(&self, value: &T, op: Op<T>) -> Result<T> {
        let combine = combine_bytes(op);
        decode(&self.comm.all_reduce(&combine, encode(value)?)?)
    }

    pub fn all_reduce_into<T: Payload + Reducible>(
        &self,
        value: &T,
        op: Op<T>,
        buffer: &mut T,
    ) -> Result<()> {
        *buffer = self.all_reduce(value, op)?;
        Ok(())
    }

    pub fn iall_reduce<T: Payload + Reducible>(&self, value: &T, op: Op<T>) -> Result<Reply<'c, T>> {
        let transfer = self.exchange(encode(value)?)?;
        Ok(Reply::new(transfer, Box::new(move |parts| fold(op, &parts))))
    }

    pub fn iall_reduce_into<'b, T: Payload + Reducible>(
        &self,
        value: &T,
        op: Op<T>,
        buffer: &'b mut T,
    ) -> Result<Request<'c, 'b, T>> {
        let transfer = self.exchange(encode(value)?)?;
        Ok(Request::replacing(transfer, move |parts| fold(op, &parts), buffer))
    }

    /// Block until every rank has entered the barrier.
    pub fn barrier(&self) -> Result<()> {
        self.comm.barrier()
    }

    /// Enter the barrier. The transfer completes once every rank has
    /// entered.
    pub fn ibarrier(&self) -> Result<Transfer<'c>> {
        self.exchange(Vec::new())
    }

    /// Send the same bytes to every other rank and expect bytes from each.
    fn exchange(&self, bytes: Vec<u8>) -> Result<Transfer<'c>> {
        let comm = self.comm;
        let tag = comm.collective_tag();

        for rank in others(comm) {
            comm.send(rank, tag, bytes.clone())?;
        }
        Ok(Transfer::expecting(comm, tag, others(comm)).with_local(bytes))
    }

    fn scatter_to_all<T: Payload>(&self, values: &[T], chunk_size: usize) -> Result<Transfer<'c>> {
        let comm = self.comm;
        let tag = comm.collective_tag();
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
        Ok(Transfer::expecting(comm, tag, others(comm)).with_local(own))
    }
}

fn concat_all<T: Payload>(parts: &Parts) -> Result<Vec<T>> {
    Ok(decode_all::<Vec<T>>(parts)?.into_iter().flatten().collect())
}
