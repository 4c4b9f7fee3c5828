//! Ordered batch production, inline or on a pool of worker threads

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Builds one batch from the dataset indices assigned to it
pub(crate) type Producer<T> = Arc<dyn Fn(&[usize], &mut StdRng) -> Result<T> + Send + Sync>;

enum Mode<T> {
    Inline {
        producer: Producer<T>,
        rng: StdRng,
    },
    Workers {
        receivers: Vec<Receiver<Result<T>>>,
        handles: Vec<JoinHandle<()>>,
    },
}

/// One epoch of batches, yielded in plan order.
///
/// With workers, batch `i` is produced by worker `i % num_workers`, each
/// worker pushing into its own bounded queue, so the consumer reads the
/// queues round-robin and blocks only on the batch it needs next. Dropping
/// the stream disconnects the queues and joins the workers; in-flight
/// batches are discarded.
///
/// Iteration stops after the first error.
pub struct BatchStream<T> {
    plan: Vec<Vec<usize>>,
    next: usize,
    done: bool,
    mode: Mode<T>,
}

impl<T: Send + 'static> BatchStream<T> {
    /// Produce batches on the calling thread
    pub(crate) fn inline(plan: Vec<Vec<usize>>, producer: Producer<T>, rng: StdRng) -> Self {
        Self {
            plan,
            next: 0,
            done: false,
            mode: Mode::Inline { producer, rng },
        }
    }

    /// Produce batches on `num_workers` threads, each allowed to run
    /// `prefetch` batches ahead of the consumer.
    pub(crate) fn spawn(
        plan: Vec<Vec<usize>>,
        num_workers: usize,
        prefetch: usize,
        producer: Producer<T>,
        mut worker_rng: impl FnMut(usize) -> StdRng,
    ) -> Result<Self> {
        let mut receivers = Vec::with_capacity(num_workers);
        let mut handles = Vec::with_capacity(num_workers);

        for worker in 0..num_workers {
            let assigned: Vec<Vec<usize>> = plan
                .iter()
                .skip(worker)
                .step_by(num_workers)
                .cloned()
                .collect();
            let (sender, receiver) = bounded(prefetch);
            let producer = Arc::clone(&producer);
            let mut rng = worker_rng(worker);

            let handle = thread::Builder::new()
                .name(format!("episode-loader-{}", worker))
                .spawn(move || {
                    for indices in assigned {
                        let item = producer(&indices, &mut rng);
                        let failed = item.is_err();
                        // A send error means the consumer is gone
                        if sender.send(item).is_err() || failed {
                            break;
                        }
                    }
                })?;

            receivers.push(receiver);
            handles.push(handle);
        }

        debug!("Spawned {} loader workers for {} batches", num_workers, plan.len());

        Ok(Self {
            plan,
            next: 0,
            done: false,
            mode: Mode::Workers { receivers, handles },
        })
    }
}

impl<T> BatchStream<T> {
    /// Number of batches in the epoch
    pub fn num_batches(&self) -> usize {
        self.plan.len()
    }

    /// Dataset indices of every batch, in order
    pub fn plan(&self) -> &[Vec<usize>] {
        &self.plan
    }
}

impl<T> Iterator for BatchStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next >= self.plan.len() {
            return None;
        }
        let batch_idx = self.next;
        self.next += 1;

        let item = match &mut self.mode {
            Mode::Inline { producer, rng } => producer(&self.plan[batch_idx], rng),
            Mode::Workers { receivers, .. } => {
                let worker = batch_idx % receivers.len();
                receivers[worker].recv().unwrap_or_else(|_| {
                    Err(Error::WorkerPanicked(format!(
                        "worker {} exited before producing batch {}",
                        worker, batch_idx
                    )))
                })
            }
        };

        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.done { 0 } else { self.plan.len() - self.next };
        (0, Some(remaining))
    }
}

impl<T> Drop for BatchStream<T> {
    fn drop(&mut self) {
        if let Mode::Workers { receivers, handles } = &mut self.mode {
            receivers.clear();
            for handle in handles.drain(..) {
                if handle.join().is_err() {
                    warn!("Loader worker panicked");
                }
            }
        }
    }
}
