//! Completion functions over groups of outstanding operations. The free
//! functions take operations of any payload type through `&mut dyn
//! Operation`, so a receive of a `String` and a gather of `Vec<f64>` can be
//! tested together. `Batch` is the owning form: an arena of boxed operations
//! for when the caller does not need the typed handles back.
//!
//! A pass over the batch polls every operation once, so every status is
//! refreshed together. Operations count as complete when they completed or
//! were cancelled.

use std::thread;
use std::time::Duration;

use super::{Operation, Status};
use crate::error::Result;
use crate::message::ExponentialBackoff;

const WAIT_POLL_START: Duration = Duration::from_micros(50);
const WAIT_POLL_MAX: Duration = Duration::from_millis(5);

fn is_done(op: &dyn Operation) -> bool {
    op.status() != Status::Pending
}

/// Return `true` if every operation has completed.
pub fn test_all(ops: &mut [&mut dyn Operation]) -> Result<bool> {
    let mut all = true;
    for op in ops.iter_mut() {
        all &= op.poll()?;
    }
    Ok(all)
}

/// Return the index of one completed operation, if any. The result holds at
/// most one index, and may be empty even if an operation is about to
/// complete.
pub fn test_any(ops: &mut [&mut dyn Operation]) -> Result<Vec<usize>> {
    for (i, op) in ops.iter_mut().enumerate() {
        if op.poll()? {
            return Ok(vec![i]);
        }
    }
    Ok(Vec::new())
}

/// Return the indices of every operation found complete in one pass.
pub fn test_some(ops: &mut [&mut dyn Operation]) -> Result<Vec<usize>> {
    let mut done = Vec::new();
    for (i, op) in ops.iter_mut().enumerate() {
        if op.poll()? {
            done.push(i);
        }
    }
    Ok(done)
}

/// Block until every operation has completed.
pub fn wait_all(ops: &mut [&mut dyn Operation]) -> Result<()> {
    for op in ops.iter_mut() {
        op.wait()?;
    }
    Ok(())
}

/// Block until at least one operation has completed, and return its index.
/// Returns an empty list for an empty batch.
pub fn wait_any(ops: &mut [&mut dyn Operation]) -> Result<Vec<usize>> {
    wait_until(ops, test_any)
}

/// Block until at least one operation has completed, and return the indices
/// of all operations complete at that moment.
pub fn wait_some(ops: &mut [&mut dyn Operation]) -> Result<Vec<usize>> {
    wait_until(ops, test_some)
}

fn wait_until(
    ops: &mut [&mut dyn Operation],
    test: fn(&mut [&mut dyn Operation]) -> Result<Vec<usize>>,
) -> Result<Vec<usize>> {
    if ops.is_empty() {
        return Ok(Vec::new());
    }
    let mut backoff = ExponentialBackoff::new(WAIT_POLL_START, WAIT_POLL_MAX, 2);
    loop {
        let done = test(ops)?;

        if !done.is_empty() {
            return Ok(done);
        }
        if let Some(delay) = backoff.next() {
            thread::sleep(delay)
        }
    }
}

/// An owning collection of operations of mixed payload types.
#[derive(Default)]
pub struct Batch<'a> {
    ops: Vec<Box<dyn Operation + 'a>>,
}

impl<'a> Batch<'a> {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Add an operation and return its index within the batch.
    pub fn push<O: Operation + 'a>(&mut self, op: O) -> usize {
        self.ops.push(Box::new(op));
        self.ops.len() - 1
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn status(&self, index: usize) -> Option<Status> {
        self.ops.get(index).map(|op| op.status())
    }

    /// Return the number of operations that have not yet completed.
    pub fn pending(&self) -> usize {
        self.ops.iter().filter(|op| !is_done(op.as_ref())).count()
    }

    pub fn test_all(&mut self) -> Result<bool> {
        test_all(&mut self.borrowed())
    }

    pub fn test_any(&mut self) -> Result<Vec<usize>> {
        test_any(&mut self.borrowed())
    }

    pub fn test_some(&mut self) -> Result<Vec<usize>> {
        test_some(&mut self.borrowed())
    }

    pub fn wait_all(&mut self) -> Result<()> {
        wait_all(&mut self.borrowed())
    }

    pub fn wait_any(&mut self) -> Result<Vec<usize>> {
        wait_any(&mut self.borrowed())
    }

    pub fn wait_some(&mut self) -> Result<Vec<usize>> {
        wait_some(&mut self.borrowed())
    }

    /// Cancel every operation that is still pending.
    pub fn cancel_all(&mut self) -> Result<()> {
        for op in self.ops.iter_mut() {
            op.cancel()?;
        }
        Ok(())
    }

    fn borrowed(&mut self) -> Vec<&mut dyn Operation> {
        self.ops.iter_mut().map(|op| op.as_mut() as &mut dyn Operation).collect()
    }
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::group::Group;
    use crate::message::local;

    #[test]
    fn test_some_reports_exactly_the_completed_operations() {
        let comms = local::group(4);
        let (me, peers) = comms.split_first().unwrap();
        let group = Group::new(me);

        let mut a = group.source(1).irecv::<i32>().unwrap();
        let mut b = group.source(2).irecv::<String>().unwrap();
        let mut c = group.source(3).irecv::<Vec<u8>>().unwrap();
        let mut d = group.source(1).with_tag(9).irecv::<f64>().unwrap();

        Group::new(&peers[0]).dest(0).send(&7i32).unwrap();
        Group::new(&peers[2]).dest(0).send(&vec![1u8, 2]).unwrap();

        {
            let mut ops: Vec<&mut dyn Operation> = vec![&mut a, &mut b, &mut c, &mut d];
            assert!(!test_all(&mut ops).unwrap());
            assert_eq!(test_some(&mut ops).unwrap(), vec![0, 2]);
            assert_eq!(test_any(&mut ops).unwrap(), vec![0]);
        }
        assert_eq!(b.status(), Status::Pending);
        assert_eq!(d.status(), Status::Pending);

        Group::new(&peers[1]).dest(0).send(&"late".to_string()).unwrap();
        Group::new(&peers[0]).dest(0).with_tag(9).send(&1.5f64).unwrap();
        {
            let mut ops: Vec<&mut dyn Operation> = vec![&mut a, &mut b, &mut c, &mut d];
            wait_all(&mut ops).unwrap();
            assert!(test_all(&mut ops).unwrap());
        }
        assert_eq!(a.get().unwrap(), 7);
        assert_eq!(b.get().unwrap(), "late");
        assert_eq!(c.get().unwrap(), vec![1, 2]);
        assert_eq!(d.get().unwrap(), 1.5);
    }

    #[test]
    fn wait_any_returns_once_one_operation_completes() {
        let results = local::launch(3, |comm| {
            let group = Group::new(&comm);
            match group.rank() {
                0 => {
                    let mut from_one = group.source(1).irecv::<u32>().unwrap();
                    let mut from_two = group.source(2).irecv::<u32>().unwrap();
                    let first = {
                        let mut ops: Vec<&mut dyn Operation> = vec![&mut from_one, &mut from_two];
                        wait_any(&mut ops).unwrap()
                    };
                    group.dest(1).send(&0u32).unwrap();
                    from_one.wait().unwrap();
                    let rest = {
                        let mut ops: Vec<&mut dyn Operation> = vec![&mut from_one, &mut from_two];
                        wait_some(&mut ops).unwrap()
                    };
                    vec![first, rest]
                }
                1 => {
                    group.source(0).recv::<u32>().unwrap();
                    group.dest(0).send(&1u32).unwrap();
                    Vec::new()
                }
                _ => {
                    group.dest(0).send(&2u32).unwrap();
                    Vec::new()
                }
            }
        });
        assert_eq!(results[0], vec![vec![1], vec![0, 1]]);
    }

    #[test]
    fn a_batch_owns_mixed_operations() {
        let comms = local::group(2);
        let (a, b) = (Group::new(&comms[0]), Group::new(&comms[1]));
        let mut batch = Batch::new();
        assert!(batch.wait_any().unwrap().is_empty());

        batch.push(a.source(1).irecv::<String>().unwrap());
        batch.push(a.source(1).with_tag(1).irecv::<Vec<i64>>().unwrap());
        batch.push(a.dest(1).isend(&3u8).unwrap());
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.pending(), 2);

        b.dest(0).with_tag(1).send(&vec![1i64]).unwrap();
        assert_eq!(batch.wait_some().unwrap(), vec![1, 2]);
        assert_eq!(batch.status(0), Some(Status::Pending));

        batch.cancel_all().unwrap();
        assert!(batch.test_all().unwrap());
        assert_eq!(batch.status(0), Some(Status::Cancelled));
        assert_eq!(batch.status(1), Some(Status::Completed));
        assert_eq!(b.source(0).recv::<u8>().unwrap(), 3);
    }
}
