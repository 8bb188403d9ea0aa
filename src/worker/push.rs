// Push access
//
// Drains accumulated gradients out of the local cache, partitions them by
// owning server, and submits one batched PUSH request per destination.
// Averaging is a serialization concern: the drained value is `sum / count`,
// and keys with a zero count are not sent at all.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::router::HashRouter;
use crate::transport::{NodeId, Request, Transport, WORKER_PUSH_REQUEST};
use crate::worker::barrier::CompletionBarrier;
use crate::worker::cache::LocalParamCache;

pub struct PushAccess {
    transport: Arc<Transport>,
    router: HashRouter,
}

impl PushAccess {
    pub fn new(transport: Arc<Transport>, router: HashRouter) -> PushAccess {
        PushAccess { transport, router }
    }

    /// Submit the averaged gradient of every key in `keys`, resetting each
    /// accumulator as it is drained. Returns once every destination server
    /// has acknowledged. Keys with no accumulated gradient are skipped; a
    /// batch that drains nothing returns without blocking.
    pub fn push_with_barrier(&self, keys: &HashSet<u64>, cache: &Arc<LocalParamCache>) -> Result<()> {
        let mut buckets: HashMap<NodeId, Vec<(u64, f32)>> = HashMap::new();
        cache.with_view(|view| {
            for &key in keys {
                if let Some(average) = view.drain(key) {
                    buckets
                        .entry(self.router.node_of(key))
                        .or_default()
                        .push((key, average));
                }
            }
        });
        if buckets.is_empty() {
            return Ok(());
        }

        let barrier = Arc::new(CompletionBarrier::new(buckets.len()));
        trace!(requests = buckets.len(), "push batch");

        for (node, pairs) in buckets {
            let mut request = Request::new(WORKER_PUSH_REQUEST);
            for &(key, grad) in &pairs {
                request.cont.put_u64(key);
                request.cont.put_f32(grad);
            }

            let barrier = Arc::clone(&barrier);
            self.transport.send(
                request,
                node,
                Box::new(move |_response: Request| {
                    barrier.arrive();
                }),
            )?;
        }

        barrier.wait();
        Ok(())
    }
}
