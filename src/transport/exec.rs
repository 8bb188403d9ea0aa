// Asynchronous execution pool
//
// A fixed number of worker threads draining boxed closures from an unbounded
// channel. The transport schedules inbound request handlers and response
// callbacks here so the receive loop never blocks on user code.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct ExecPool {
    tx: Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl ExecPool {
    pub fn new(size: usize, name: &str) -> ExecPool {
        assert!(size > 0, "execution pool needs at least one thread");
        let (tx, rx) = unbounded::<Task>();
        let workers = (0..size)
            .map(|i| {
                let rx: Receiver<Task> = rx.clone();
                thread::Builder::new()
                    .name(format!("{}-{}", name, i))
                    .spawn(move || {
                        for task in rx.iter() {
                            task();
                        }
                    })
                    .expect("failed to spawn pool thread")
            })
            .collect();
        ExecPool { tx, workers }
    }

    pub fn execute(&self, task: impl FnOnce() + Send + 'static) {
        // The channel only disconnects at shutdown; a send past that point
        // is a lifecycle bug.
        self.tx
            .send(Box::new(task))
            .expect("execution pool is shut down");
    }

    /// Drain and join. Tasks already queued still run.
    pub fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_all_tasks() {
        let pool = ExecPool::new(4, "test-exec");
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_shutdown_idles_cleanly() {
        let pool = ExecPool::new(2, "test-exec");
        pool.shutdown();
    }
}
