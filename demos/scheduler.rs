use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use taskfarm::message::local;
use taskfarm::{Error, Group, Receiver, Reply, Result, Scheduler, Sender, Task, TaskSet, WorkerTask};

#[derive(Debug, Parser)]
#[clap(version = "1.0", author = "J. Zrake <jzrake@clemson.edu>")]
struct Opts {
    #[clap(short = 'w', long, default_value = "4")]
    workers: usize,

    #[clap(short = 'n', long, default_value = "37")]
    subtasks: usize,

    #[clap(short = 'r', long, default_value = "50")]
    resolution_ms: u64,

    #[clap(short = 'l', long, default_value = "info")]
    log_level: LevelFilter,
}

/// Each subtask is a number of milliseconds to sleep; the worker sleeps that
/// long and answers with the number plus 42.
#[derive(Default)]
struct Nap {
    naps: Vec<u64>,
    results: Vec<u64>,
    cursor: usize,
}

impl Nap {
    fn new(naps: Vec<u64>) -> Self {
        Self {
            results: vec![0; naps.len()],
            naps,
            cursor: 0,
        }
    }
}

impl WorkerTask for Nap {
    fn prepare(&mut self, group: &Group, is_worker: bool) -> Result<()> {
        if !is_worker {
            info!("preparing {} naps on {} processes", self.naps.len(), group.size());
        }
        Ok(())
    }

    fn execute_subtask(&mut self, from: &Receiver, to: &Sender) -> Result<()> {
        let nap: u64 = from.recv()?;
        thread::sleep(Duration::from_millis(nap));
        to.send(&(nap + 42))
    }
}

impl Task for Nap {
    const KIND: u32 = 0;
    type Subresult = u64;
    type Output = Vec<u64>;

    fn is_finished(&self) -> bool {
        self.cursor >= self.naps.len()
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
    ) -> Result<Reply<'c, u64>> {
        to.send(&self.naps[id])?;
        from.irecv()
    }

    fn store_result(&mut self, id: usize, value: u64) {
        self.results[id] = value
    }

    fn into_output(self) -> Vec<u64> {
        self.results
    }
}

enum Demo {
    Nap(Nap),
}

impl WorkerTask for Demo {
    fn prepare(&mut self, group: &Group, is_worker: bool) -> Result<()> {
        match self {
            Demo::Nap(task) => task.prepare(group, is_worker),
        }
    }

    fn execute_subtask(&mut self, from: &Receiver, to: &Sender) -> Result<()> {
        match self {
            Demo::Nap(task) => task.execute_subtask(from, to),
        }
    }
}

impl TaskSet for Demo {
    fn from_tag(kind: u32) -> Result<Self> {
        match kind {
            Nap::KIND => Ok(Demo::Nap(Nap::default())),
            other => Err(Error::UnknownTask(other)),
        }
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();
    SimpleLogger::new().with_level(opts.log_level).init()?;
    println!("{:?}", opts);

    let naps: Vec<u64> = (0..opts.subtasks as u64).map(|n| 40 + (n * 37) % 90).collect();
    let start = Instant::now();

    let outcomes = local::launch(opts.workers + 1, |comm| -> Result<Option<bool>> {
        let mut scheduler = Scheduler::<_, Demo>::with_resolution(
            comm,
            Duration::from_millis(opts.resolution_ms),
        );
        scheduler.run()?;

        let checked = if scheduler.is_manager() {
            let result = scheduler.execute(Nap::new(naps.clone()))?;
            Some(naps.iter().zip(&result).all(|(nap, r)| nap + 42 == *r))
        } else {
            None
        };
        scheduler.shutdown()?;
        Ok(checked)
    });

    for outcome in outcomes {
        if let Some(correct) = outcome? {
            println!("results correct ........ {}", correct);
        }
    }
    println!("total .................. {:.3}s", start.elapsed().as_secs_f64());
    println!(
        "serial ................. {:.3}s",
        naps.iter().sum::<u64>() as f64 * 1e-3
    );
    Ok(())
}
