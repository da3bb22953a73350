//! Background worker loop
//!
//! Each worker repeatedly picks a random key and either adds it to or
//! removes it from the shared tree. Loop start and every iteration are
//! routed through the dispatcher's before/after advice.

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::any::Any;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use crate::advice::Dispatcher;
use crate::config::WorkerConfig;
use crate::tree::InstrumentedTree;

/// What one iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add { key: u32, inserted: bool },
    Remove { key: u32, removed: bool },
}

/// One worker thread's loop state
pub struct Worker {
    id: usize,
    tree: Arc<InstrumentedTree<u32>>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    /// Fails with `InvalidInput` when `config.key_space` is 0.
    pub fn new(
        id: usize,
        tree: Arc<InstrumentedTree<u32>>,
        config: WorkerConfig,
        shutdown: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        if config.key_space == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "key_space must be > 0"));
        }
        Ok(Self {
            id,
            tree,
            config,
            shutdown,
        })
    }

    fn dispatcher(&self) -> &Dispatcher {
        self.tree.dispatcher()
    }

    /// Run the before-start advice, then spawn the loop.
    ///
    /// The thread returns the number of iterations it completed.
    pub fn start_thread(self) -> io::Result<JoinHandle<u64>> {
        self.dispatcher().before_start_thread();

        thread::Builder::new()
            .name(format!("worker-{}", self.id))
            .spawn(move || self.run())
    }

    /// Loop until shutdown or the configured iteration count
    pub fn run(&self) -> u64 {
        let mut rng = rand::rng();
        let interval = self.config.interval();
        let mut completed = 0;

        info!(worker = self.id, "Worker loop started");
        while !self.shutdown.load(Ordering::Relaxed)
            && (self.config.iterations == 0 || completed < self.config.iterations)
        {
            let op = self
                .dispatcher()
                .after_server_operation(|| self.server_operation(&mut rng));
            completed += 1;
            debug!(worker = self.id, ?op, "Iteration complete");

            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        info!(worker = self.id, completed, "Worker loop stopped");

        completed
    }

    /// One iteration: add or remove a random key with equal odds
    pub fn server_operation<R: Rng>(&self, rng: &mut R) -> Operation {
        let key = rng.random_range(0..self.config.key_space);
        if rng.random_bool(0.5) {
            Operation::Add {
                key,
                inserted: self.tree.add(key),
            }
        } else {
            Operation::Remove {
                key,
                removed: self.tree.remove(&key).is_some(),
            }
        }
    }
}

/// Start `config.effective_workers()` workers on one shared tree
pub fn spawn_workers(
    tree: Arc<InstrumentedTree<u32>>,
    config: &WorkerConfig,
    shutdown: Arc<AtomicBool>,
) -> io::Result<Vec<JoinHandle<u64>>> {
    (0..config.effective_workers())
        .map(|id| Worker::new(id, tree.clone(), config.clone(), shutdown.clone())?.start_thread())
        .collect()
}

/// Wait for every worker and sum their completed iterations.
///
/// A panicked worker is logged and contributes nothing to the total.
pub fn join_workers(handles: Vec<JoinHandle<u64>>) -> u64 {
    handles
        .into_iter()
        .map(|handle| {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            match handle.join() {
                Ok(completed) => completed,
                Err(payload) => {
                    error!(worker = %name, panic = panic_message(payload.as_ref()), "Worker thread panicked");
                    0
                }
            }
        })
        .sum()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic payload"
    }
}
