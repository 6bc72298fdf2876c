use crate::error::{Error, Result};
use crate::operation::{Operation, Reply};

/// One worker's slot on the manager. A slot is either inactive, or active
/// with exactly one outstanding subtask and the reply that will carry its
/// result; there is no pipelining.
pub(crate) struct Promise<'c, R> {
    worker: usize,
    subtask: usize,
    reply: Option<Reply<'c, R>>,
}

impl<'c, R> Promise<'c, R> {
    pub(crate) fn new(worker: usize) -> Self {
        Self {
            worker,
            subtask: 0,
            reply: None,
        }
    }

    pub(crate) fn worker(&self) -> usize {
        self.worker
    }

    pub(crate) fn is_active(&self) -> bool {
        self.reply.is_some()
    }

    pub(crate) fn activate(&mut self, subtask: usize, reply: Reply<'c, R>) -> Result<()> {
        if self.is_active() {
            return Err(Error::WorkerBusy {
                worker: self.worker,
                subtask: self.subtask,
            });
        }
        self.subtask = subtask;
        self.reply = Some(reply);
        Ok(())
    }

    pub(crate) fn poll(&mut self) -> Result<bool> {
        self.active()?.poll()
    }

    pub(crate) fn wait(&mut self) -> Result<()> {
        self.active()?.wait()
    }

    /// Take the result and the subtask it belongs to, blocking if it has not
    /// arrived yet. The slot becomes inactive.
    pub(crate) fn collect(&mut self) -> Result<(usize, R)> {
        self.wait()?;
        let reply = self.reply.take().ok_or(Error::InactivePromise(self.worker))?;
        Ok((self.subtask, reply.into_value()?))
    }

    fn active(&mut self) -> Result<&mut Reply<'c, R>> {
        self.reply.as_mut().ok_or(Error::InactivePromise(self.worker))
    }
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::group::Group;
    use crate::message::local;

    #[test]
    fn a_slot_holds_one_assignment_at_a_time() {
        let comms = local::group(2);
        let (manager, worker) = (Group::new(&comms[0]), Group::new(&comms[1]));
        let mut slot = Promise::new(1);
        assert!(!slot.is_active());

        slot.activate(0, manager.source(1).irecv::<i32>().unwrap()).unwrap();
        assert!(matches!(
            slot.activate(1, manager.source(1).irecv::<i32>().unwrap()),
            Err(Error::WorkerBusy { worker: 1, subtask: 0 })
        ));
        assert!(!slot.poll().unwrap());

        worker.dest(0).send(&5).unwrap();
        slot.wait().unwrap();
        assert_eq!(slot.collect().unwrap(), (0, 5));
        assert!(!slot.is_active());
        assert_eq!(slot.worker(), 1);
    }

    #[test]
    fn an_inactive_slot_cannot_be_waited_on() {
        let mut slot = Promise::<i32>::new(3);
        assert!(matches!(slot.wait(), Err(Error::InactivePromise(3))));
        assert!(matches!(slot.poll(), Err(Error::InactivePromise(3))));
        assert!(matches!(slot.collect(), Err(Error::InactivePromise(3))));
    }
}
