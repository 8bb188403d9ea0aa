// Server service
//
// Registers the pull/push handlers on the transport and owns the node's
// table. Handler registration happens in the constructor, before the
// transport's receive loop starts.

use std::sync::Arc;

use tracing::{info, trace};

use crate::server::agent::{PullAccessAgent, PushAccessAgent};
use crate::server::policy::AccessPolicy;
use crate::table::SparseTable;
use crate::transport::{Request, Transport, WORKER_PULL_REQUEST, WORKER_PUSH_REQUEST};

pub struct ServerNode<P: AccessPolicy> {
    transport: Arc<Transport>,
    table: Arc<SparseTable<P::Param>>,
}

impl<P: AccessPolicy> ServerNode<P> {
    pub fn new(transport: Arc<Transport>, shard_num: usize, policy: P) -> ServerNode<P> {
        let table = Arc::new(SparseTable::new(shard_num));
        let policy = Arc::new(policy);

        let pull = PullAccessAgent::new(Arc::clone(&table), Arc::clone(&policy));
        transport.register(WORKER_PULL_REQUEST, move |mut req: Request, rsp: &mut Request| {
            let mut served = 0usize;
            while !req.cont.read_finished() {
                let key = req.cont.get_u64();
                let _placeholder = req.cont.get_f32();
                rsp.cont.put_u64(key);
                rsp.cont.put_f32(pull.pull_value(key));
                served += 1;
            }
            trace!(keys = served, client = req.meta.client_id, "served pull");
        });

        let push = PushAccessAgent::new(Arc::clone(&table), policy);
        transport.register(WORKER_PUSH_REQUEST, move |mut req: Request, rsp: &mut Request| {
            let mut applied = 0u32;
            while !req.cont.read_finished() {
                let key = req.cont.get_u64();
                let grad = req.cont.get_f32();
                push.apply_grad(key, grad);
                applied += 1;
            }
            // Push acknowledgements carry the applied count so the response
            // is never empty (empty content would defer the reply).
            rsp.cont.put_u32(applied);
            trace!(applied, client = req.meta.client_id, "applied push");
        });

        ServerNode { transport, table }
    }

    pub fn start(&self) -> crate::Result<()> {
        self.transport.start()?;
        info!(
            node = self.transport.local_id(),
            shards = self.table.shard_num(),
            "parameter server node started"
        );
        Ok(())
    }

    pub fn stop(&self) -> crate::Result<()> {
        info!(
            node = self.transport.local_id(),
            keys = self.table.len(),
            "parameter server node stopping"
        );
        self.transport.stop()
    }

    pub fn table(&self) -> &Arc<SparseTable<P::Param>> {
        &self.table
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }
}
