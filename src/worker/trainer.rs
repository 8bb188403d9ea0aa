// Reference training loop
//
// Sparse logistic regression over a shared text file. Each minibatch runs
// four strictly sequenced phases: gather the touched key set, pull those
// keys from the servers, accumulate gradients with the training pool, push
// the averaged gradients back. The pull and push barriers are the only
// synchronization between workers and servers.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::error::{PsError, Result};
use crate::lr::{parse_instance, Instance};
use crate::router::HashRouter;
use crate::transport::Transport;
use crate::worker::cache::LocalParamCache;
use crate::worker::pull::PullAccess;
use crate::worker::push::PushAccess;

pub struct Trainer {
    pull: PullAccess,
    push: PushAccess,
    cache: Arc<LocalParamCache>,
    minibatch: usize,
    nthreads: usize,
}

impl Trainer {
    pub fn new(transport: Arc<Transport>, num_servers: usize, config: &WorkerConfig) -> Trainer {
        let router = HashRouter::new(num_servers);
        Trainer {
            pull: PullAccess::new(Arc::clone(&transport), router),
            push: PushAccess::new(transport, router),
            cache: Arc::new(LocalParamCache::new()),
            minibatch: config.minibatch,
            nthreads: config.nthreads,
        }
    }

    pub fn cache(&self) -> &Arc<LocalParamCache> {
        &self.cache
    }

    /// Train one pass over `path`.
    pub fn train(&self, path: &Path) -> Result<()> {
        let all_keys = self.scan_keys(path)?;
        info!(keys = all_keys.len(), "initializing local parameter cache");
        self.cache.init_keys(all_keys);

        let file = File::open(path)?;
        let reader = Mutex::new(BufReader::new(file));
        let mut rounds = 0usize;

        loop {
            let start = reader.lock().stream_position()?;

            // Phase 1: collect the key set this minibatch will touch.
            let keys = Mutex::new(HashSet::new());
            let consumed = scan_lines(&reader, self.minibatch, self.nthreads, |instance| {
                keys.lock().extend(instance.keys.iter().copied());
            })?;
            if consumed == 0 {
                break;
            }
            let keys = keys.into_inner();

            // Phase 2: stage current parameters locally.
            self.pull.pull_with_barrier(&keys, &self.cache)?;

            // Phase 3: replay exactly the gathered lines and accumulate.
            reader.lock().seek(SeekFrom::Start(start))?;
            let trained = AtomicUsize::new(0);
            let squared_error = Mutex::new(0.0f64);
            scan_lines(&reader, consumed, self.nthreads, |instance| {
                if instance.keys.is_empty() {
                    return;
                }
                let error = learn_instance(&self.cache, &instance);
                trained.fetch_add(1, Ordering::Relaxed);
                *squared_error.lock() += f64::from(error * error);
            })?;

            // Phase 4: submit averaged gradients.
            self.push.push_with_barrier(&keys, &self.cache)?;

            rounds += 1;
            debug!(
                round = rounds,
                lines = consumed,
                trained = trained.into_inner(),
                squared_error = squared_error.into_inner(),
                "minibatch complete"
            );
        }

        info!(rounds, "training finished");
        Ok(())
    }

    /// Full single-threaded scan collecting every key in the file, so the
    /// cache never misses in the hot path.
    fn scan_keys(&self, path: &Path) -> Result<HashSet<u64>> {
        let file = File::open(path)?;
        let mut keys = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            keys.extend(parse_instance(&line)?.keys);
        }
        Ok(keys)
    }
}

/// One SGD step against the staged parameters; gradient contributions go
/// into the cache's accumulators. Features are binary, so the per-feature
/// gradient is the prediction error itself. Returns the error.
fn learn_instance(cache: &LocalParamCache, instance: &Instance) -> f32 {
    cache.with_view(|view| {
        let mut dot = 0.0f32;
        for &key in &instance.keys {
            dot += view.param(key);
        }
        let predict = 1.0 / (1.0 + (-dot).exp());
        let error = instance.target - predict;
        for &key in &instance.keys {
            view.accumulate(key, error);
        }
        error
    })
}

/// Drain up to `budget` lines from the shared reader with `nthreads`
/// threads, invoking `each` per parsed instance. A thread reserves a line
/// slot before taking a line, so a call consumes at most `budget` lines.
/// Returns the number of lines actually read.
fn scan_lines(
    reader: &Mutex<BufReader<File>>,
    budget: usize,
    nthreads: usize,
    each: impl Fn(Instance) + Sync,
) -> Result<usize> {
    let slots = AtomicUsize::new(0);
    let consumed = AtomicUsize::new(0);
    let first_err: Mutex<Option<PsError>> = Mutex::new(None);

    thread::scope(|scope| {
        for _ in 0..nthreads {
            scope.spawn(|| loop {
                if slots.fetch_add(1, Ordering::Relaxed) >= budget {
                    break;
                }
                let mut line = String::new();
                let read = { reader.lock().read_line(&mut line) };
                match read {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        first_err.lock().get_or_insert(e.into());
                        break;
                    }
                }
                consumed.fetch_add(1, Ordering::Relaxed);
                if line.trim().is_empty() {
                    continue;
                }
                match parse_instance(&line) {
                    Ok(instance) => each(instance),
                    Err(e) => {
                        first_err.lock().get_or_insert(e);
                        break;
                    }
                }
            });
        }
    });

    if let Some(e) = first_err.lock().take() {
        return Err(e);
    }
    Ok(consumed.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn data_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_scan_lines_respects_budget() {
        let file = data_file(&["1 1", "0 2", "1 3", "0 4", "1 5"]);
        let reader = Mutex::new(BufReader::new(File::open(file.path()).unwrap()));

        let seen = Mutex::new(Vec::new());
        let consumed = scan_lines(&reader, 3, 2, |instance| {
            seen.lock().push(instance.keys[0]);
        })
        .unwrap();

        assert_eq!(consumed, 3);
        let mut seen = seen.into_inner();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_scan_lines_stops_at_eof() {
        let file = data_file(&["1 1", "0 2"]);
        let reader = Mutex::new(BufReader::new(File::open(file.path()).unwrap()));

        let consumed = scan_lines(&reader, 100, 4, |_| {}).unwrap();
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_scan_lines_surfaces_parse_errors() {
        let file = data_file(&["1 1", "not-a-target 2"]);
        let reader = Mutex::new(BufReader::new(File::open(file.path()).unwrap()));

        assert!(scan_lines(&reader, 10, 1, |_| {}).is_err());
    }

    #[test]
    fn test_learn_instance_accumulates_error() {
        let cache = LocalParamCache::new();
        cache.init_keys([1, 2]);

        // Zero weights: predict = 0.5, error = target - 0.5.
        let instance = Instance {
            target: 1.0,
            keys: vec![1, 2],
        };
        let error = learn_instance(&cache, &instance);
        assert!((error - 0.5).abs() < 1e-6);

        cache.with_view(|view| {
            assert_eq!(view.drain(1), Some(error));
            assert_eq!(view.drain(2), Some(error));
        });
    }
}
