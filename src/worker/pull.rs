// Pull access
//
// Partitions a key set by owning server, issues one batched PULL request per
// destination, and blocks on a completion barrier while response callbacks
// install the returned values into the local cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::router::HashRouter;
use crate::transport::{NodeId, Request, Transport, WORKER_PULL_REQUEST};
use crate::worker::barrier::CompletionBarrier;
use crate::worker::cache::LocalParamCache;

pub struct PullAccess {
    transport: Arc<Transport>,
    router: HashRouter,
}

impl PullAccess {
    pub fn new(transport: Arc<Transport>, router: HashRouter) -> PullAccess {
        PullAccess { transport, router }
    }

    /// Fetch the current value of every key in `keys` into `cache`. Returns
    /// once every destination server has answered; afterwards the cache
    /// holds the server's projection for each key and its gradient is zero.
    pub fn pull_with_barrier(&self, keys: &HashSet<u64>, cache: &Arc<LocalParamCache>) -> Result<()> {
        let mut buckets: HashMap<NodeId, Vec<u64>> = HashMap::new();
        for &key in keys {
            buckets.entry(self.router.node_of(key)).or_default().push(key);
        }
        if buckets.is_empty() {
            return Ok(());
        }

        let barrier = Arc::new(CompletionBarrier::new(buckets.len()));
        trace!(keys = keys.len(), requests = buckets.len(), "pull batch");

        for (node, bucket) in buckets {
            let mut request = Request::new(WORKER_PULL_REQUEST);
            for &key in &bucket {
                request.cont.put_u64(key);
                // Placeholder value; the server overwrites it in the response.
                request.cont.put_f32(0.0);
            }

            let cache = Arc::clone(cache);
            let barrier = Arc::clone(&barrier);
            self.transport.send(
                request,
                node,
                Box::new(move |mut response: Request| {
                    let mut pairs = Vec::with_capacity(response.cont.remaining() / 12);
                    while !response.cont.read_finished() {
                        let key = response.cont.get_u64();
                        let value = response.cont.get_f32();
                        pairs.push((key, value));
                    }
                    cache.install(pairs);
                    barrier.arrive();
                }),
            )?;
        }

        barrier.wait();
        Ok(())
    }
}
