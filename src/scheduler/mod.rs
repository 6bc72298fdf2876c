//! A manager/worker task farm. Rank 0 is the manager: it splits a [`Task`]
//! into subtasks and hands them, one at a time, to whichever worker is idle.
//! Every other rank is a worker and spends its life in [`Scheduler::run`],
//! executing whatever it is handed until the manager shuts the farm down.
//!
//! The manager never blocks on a result. It scans the worker slots, offers
//! work to every idle worker, polls every busy one, and sleeps for a fixed
//! resolution between scans. Results are stored by subtask identifier, so
//! the output does not depend on which worker finishes first.
//!
//! Control traffic is a pair of small enums sent through control-tagged
//! endpoints: a `Signal` (start a task of some kind, or shut down) ahead of
//! each task, and a `Directive` (work on one more subtask, or finish the
//! task) ahead of each subtask.

mod promise;
mod task;

use std::marker::PhantomData;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::group::Group;
use crate::message::codec::Payload;
use crate::message::comm::Communicator;
use promise::Promise;

pub use task::{Task, TaskSet, WorkerTask};

/// Time the manager sleeps between two scans of the worker slots.
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(500);

const MANAGER: usize = 0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Shutdown,
    Task(u32),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Work,
    Finish,
}

/// Runs tasks over the process group `C`. `S` is the set of task kinds the
/// workers are able to rebuild.
///
/// Every process constructs the scheduler and calls `run`, which returns
/// right away on the manager. The manager then calls `execute` any number of
/// times, and finally `shutdown`, which releases the workers from `run`.
pub struct Scheduler<C: Communicator, S: TaskSet> {
    comm: C,
    resolution: Duration,
    is_shut_down: bool,
    kinds: PhantomData<fn() -> S>,
}

impl<C: Communicator, S: TaskSet> Scheduler<C, S> {
    pub fn new(comm: C) -> Self {
        Self::with_resolution(comm, DEFAULT_RESOLUTION)
    }

    pub fn with_resolution(comm: C, resolution: Duration) -> Self {
        Self {
            comm,
            resolution,
            is_shut_down: false,
            kinds: PhantomData,
        }
    }

    pub fn is_manager(&self) -> bool {
        self.comm.rank() == MANAGER
    }

    pub fn is_worker(&self) -> bool {
        !self.is_manager()
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// Run `task` to completion over the workers and return its assembled
    /// output. Only the manager may call this.
    pub fn execute<T: Task>(&self, mut task: T) -> Result<T::Output> {
        if self.is_worker() {
            return Err(Error::NotManager);
        }
        if self.is_shut_down {
            return Err(Error::ShutDown);
        }
        S::from_tag(T::KIND)?;

        let group = Group::new(&self.comm);
        let workers: Vec<usize> = (0..group.size()).filter(|&r| r != MANAGER).collect();

        if workers.is_empty() && !task.is_finished() {
            return Err(Error::NoWorkers);
        }
        info!("Starting task of kind {} on {} workers", T::KIND, workers.len());

        for &worker in &workers {
            self.send(worker, &Signal::Task(T::KIND))?;
        }
        task.prepare(&group, false)?;

        let mut slots: Vec<Promise<T::Subresult>> =
            workers.iter().map(|&w| Promise::new(w)).collect();

        loop {
            for slot in slots.iter_mut().filter(|slot| !slot.is_active()) {
                if task.is_finished() {
                    break;
                }
                let (worker, id) = (slot.worker(), task.next_subtask_id());
                self.send(worker, &Directive::Work)?;

                let reply = task.direct_subtask(&group.source(worker), &group.dest(worker), id)?;
                slot.activate(id, reply)?;
                task.advance();
                debug!("Dispatched subtask {} to worker {}", id, worker);
            }

            for slot in slots.iter_mut().filter(|slot| slot.is_active()) {
                if slot.poll()? {
                    let (id, value) = slot.collect()?;
                    task.store_result(id, value);
                    debug!("Collected subtask {} from worker {}", id, slot.worker());
                }
            }

            if task.is_finished() && slots.iter().all(|slot| !slot.is_active()) {
                break;
            }
            thread::sleep(self.resolution);
        }

        for &worker in &workers {
            self.send(worker, &Directive::Finish)?;
        }
        task.clean(&group, false)?;
        info!("Task of kind {} complete", T::KIND);

        Ok(task.into_output())
    }

    /// Serve tasks until the manager shuts down. Returns immediately on the
    /// manager.
    pub fn run(&self) -> Result<()> {
        if self.is_manager() {
            return Ok(());
        }
        let group = Group::new(&self.comm);
        let (from, to) = (group.source(MANAGER), group.dest(MANAGER));

        loop {
            match self.receive::<Signal>()? {
                Signal::Shutdown => {
                    info!("Worker {} shutting down", group.rank());
                    return Ok(());
                }
                Signal::Task(kind) => {
                    debug!("Worker {} starting task of kind {}", group.rank(), kind);
                    let mut task = S::from_tag(kind)?;
                    task.prepare(&group, true)?;

                    while self.receive::<Directive>()? == Directive::Work {
                        task.execute_subtask(&from, &to)?;
                    }
                    task.clean(&group, true)?;
                }
            }
        }
    }

    /// Release every worker from `run`. Each worker is signalled exactly
    /// once; later calls do nothing, as does calling this on a worker.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.is_worker() || self.is_shut_down {
            return Ok(());
        }
        self.is_shut_down = true;

        let group = Group::new(&self.comm);

        for worker in (0..group.size()).filter(|&r| r != MANAGER) {
            self.send(worker, &Signal::Shutdown)?;
        }
        info!("Scheduler shut down");
        Ok(())
    }

    fn send<M: Payload>(&self, worker: usize, message: &M) -> Result<()> {
        Group::new(&self.comm).dest(worker).control().send(message)
    }

    fn receive<M: Payload>(&self) -> Result<M> {
        Group::new(&self.comm).source(MANAGER).control().irecv()?.into_value()
    }
}

impl<C: Communicator, S: TaskSet> Drop for Scheduler<C, S> {
    fn drop(&mut self) {
        if self.is_manager() && !self.is_shut_down && self.comm.size() > 1 {
            warn!("Scheduler dropped without shutdown; workers are still waiting")
        }
    }
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::endpoint::{Receiver, Sender};
    use crate::message::local::{self, LocalCommunicator};
    use crate::operation::Reply;

    /// Adds 42 to each input. Workers sleep longer on smaller inputs, so
    /// later subtasks tend to come back first.
    #[derive(Default)]
    struct AddFortyTwo {
        inputs: Vec<i32>,
        results: Vec<i32>,
        cursor: usize,
        prepared: bool,
    }

    impl AddFortyTwo {
        fn new(inputs: Vec<i32>) -> Self {
            Self {
                results: vec![0; inputs.len()],
                inputs,
                ..Default::default()
            }
        }
    }

    impl WorkerTask for AddFortyTwo {
        fn prepare(&mut self, _group: &Group, _is_worker: bool) -> Result<()> {
            self.prepared = true;
            Ok(())
        }

        fn execute_subtask(&mut self, from: &Receiver, to: &Sender) -> Result<()> {
            assert!(self.prepared);
            let input: i32 = from.recv()?;
            thread::sleep(Duration::from_millis(((10000 - input) / 100) as u64));
            to.send(&(input + 42))
        }
    }

    impl Task for AddFortyTwo {
        const KIND: u32 = 1;
        type Subresult = i32;
        type Output = Vec<i32>;

        fn is_finished(&self) -> bool {
            self.cursor >= self.inputs.len()
        }

        fn next_subtask_id(&self) -> usize {
            self.cursor
        }

        fn advance(&mut self) {
            self.cursor += 1
        }

        fn direct_subtask<'c>(
            &mut self,
            from: &Receiver<'c>,
            to: &Sender<'c>,
            id: usize,
        ) -> Result<Reply<'c, i32>> {
            to.send(&self.inputs[id])?;
            from.irecv()
        }

        fn store_result(&mut self, id: usize, value: i32) {
            self.results[id] = value
        }

        fn into_output(self) -> Vec<i32> {
            self.results
        }
    }

    /// A task kind the workers do not know about.
    struct Unregistered;

    impl WorkerTask for Unregistered {
        fn execute_subtask(&mut self, _from: &Receiver, _to: &Sender) -> Result<()> {
            Ok(())
        }
    }

    impl Task for Unregistered {
        const KIND: u32 = 99;
        type Subresult = ();
        type Output = ();

        fn is_finished(&self) -> bool {
            true
        }

        fn next_subtask_id(&self) -> usize {
            0
        }

        fn advance(&mut self) {}

        fn direct_subtask<'c>(
            &mut self,
            from: &Receiver<'c>,
            _to: &Sender<'c>,
            _id: usize,
        ) -> Result<Reply<'c, ()>> {
            from.irecv()
        }

        fn store_result(&mut self, _id: usize, _value: ()) {}

        fn into_output(self) {}
    }

    enum Kinds {
        AddFortyTwo(AddFortyTwo),
    }

    impl WorkerTask for Kinds {
        fn prepare(&mut self, group: &Group, is_worker: bool) -> Result<()> {
            match self {
                Kinds::AddFortyTwo(task) => task.prepare(group, is_worker),
            }
        }

        fn execute_subtask(&mut self, from: &Receiver, to: &Sender) -> Result<()> {
            match self {
                Kinds::AddFortyTwo(task) => task.execute_subtask(from, to),
            }
        }
    }

    impl TaskSet for Kinds {
        fn from_tag(kind: u32) -> Result<Self> {
            match kind {
                AddFortyTwo::KIND => Ok(Kinds::AddFortyTwo(AddFortyTwo::default())),
                other => Err(Error::UnknownTask(other)),
            }
        }
    }

    fn farm(comm: LocalCommunicator) -> Scheduler<LocalCommunicator, Kinds> {
        Scheduler::with_resolution(comm, Duration::from_millis(10))
    }

    #[test]
    fn results_follow_dispatch_order_not_completion_order() {
        let results = local::launch(3, |comm| {
            let mut scheduler = farm(comm);
            scheduler.run().unwrap();

            let output = if scheduler.is_manager() {
                let task = AddFortyTwo::new(vec![4000, 7000, 9000, 5000, 8000]);
                Some(scheduler.execute(task).unwrap())
            } else {
                None
            };
            scheduler.shutdown().unwrap();
            output
        });
        assert_eq!(results[0], Some(vec![4042, 7042, 9042, 5042, 8042]));
        assert_eq!(results[1], None);
    }

    #[test]
    fn tasks_can_be_executed_back_to_back() {
        let results = local::launch(4, |comm| {
            let mut scheduler = farm(comm);
            scheduler.run().unwrap();

            let mut outputs = Vec::new();
            if scheduler.is_manager() {
                outputs.push(scheduler.execute(AddFortyTwo::new(vec![9900; 7])).unwrap());
                outputs.push(scheduler.execute(AddFortyTwo::new(Vec::new())).unwrap());
                outputs.push(scheduler.execute(AddFortyTwo::new(vec![9958])).unwrap());
            }
            scheduler.shutdown().unwrap();
            outputs
        });
        assert_eq!(results[0], vec![vec![9942; 7], vec![], vec![10000]]);
    }

    #[test]
    fn each_worker_is_shut_down_exactly_once() {
        for with_task in [false, true] {
            let results = local::launch(3, |comm| {
                let mut scheduler = farm(comm);
                let returned = scheduler.run().is_ok();

                if scheduler.is_manager() {
                    if with_task {
                        scheduler.execute(AddFortyTwo::new(vec![9990, 9990])).unwrap();
                    }
                    scheduler.shutdown().unwrap();
                    scheduler.shutdown().unwrap();
                }
                Group::new(scheduler.communicator()).barrier().unwrap();
                (returned, scheduler.communicator().mailbox().stashed())
            });
            assert!(results.iter().all(|&(returned, stashed)| returned && stashed == 0));
        }
    }

    #[test]
    fn execute_is_refused_off_the_manager_and_after_shutdown() {
        let mut comms = local::group(2).into_iter();
        let mut manager = farm(comms.next().unwrap());
        let worker = farm(comms.next().unwrap());
        assert!(manager.is_manager() && worker.is_worker());
        assert!(matches!(
            worker.execute(AddFortyTwo::new(vec![1])),
            Err(Error::NotManager)
        ));

        manager.shutdown().unwrap();
        assert!(matches!(
            manager.execute(AddFortyTwo::new(vec![1])),
            Err(Error::ShutDown)
        ));
        worker.run().unwrap();
    }

    #[test]
    fn a_manager_alone_cannot_run_subtasks() {
        let mut scheduler = farm(local::group(1).pop().unwrap());
        assert!(matches!(
            scheduler.execute(AddFortyTwo::new(vec![1])),
            Err(Error::NoWorkers)
        ));
        assert_eq!(scheduler.execute(AddFortyTwo::new(Vec::new())).unwrap(), Vec::<i32>::new());
        assert_eq!(scheduler.resolution(), Duration::from_millis(10));
        scheduler.shutdown().unwrap();
    }

    #[test]
    fn unknown_task_kinds_are_rejected() {
        let results = local::launch(2, |comm| {
            let mut scheduler = farm(comm);
            let rejected = if scheduler.is_manager() {
                let refused = matches!(scheduler.execute(Unregistered), Err(Error::UnknownTask(99)));
                scheduler.send(1, &Signal::Task(99)).unwrap();
                scheduler.shutdown().unwrap();
                refused
            } else {
                matches!(scheduler.run(), Err(Error::UnknownTask(99)))
            };
            Group::new(scheduler.communicator()).barrier().unwrap();
            rejected
        });
        assert_eq!(results, vec![true, true]);
    }
}
