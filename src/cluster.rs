// Cluster bootstrap
//
// Node identity and lifecycle. The node set is fixed at startup: servers
// occupy node ids `0..servers.len()`, workers follow. Transport, route,
// table and cache are owned by the handles built here and threaded through;
// there is no ambient global state.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::{PsError, Result};
use crate::lr::{LrParam, LrPolicy};
use crate::server::ServerNode;
use crate::table::SparseTable;
use crate::transport::{NodeId, Route, Transport};
use crate::worker::Trainer;

pub fn server_node_id(index: usize) -> NodeId {
    index
}

pub fn worker_node_id(config: &Config, index: usize) -> NodeId {
    config.cluster.servers.len() + index
}

fn build_transport(config: &Config, local_id: NodeId) -> Result<Arc<Transport>> {
    let route = Arc::new(Route::new(
        local_id,
        &config.cluster.servers,
        &config.cluster.workers,
    )?);
    Ok(Arc::new(Transport::new(route, config.transport.nthreads)))
}

pub struct ServerHandle {
    node: ServerNode<LrPolicy>,
}

impl ServerHandle {
    pub fn table(&self) -> &Arc<SparseTable<LrParam>> {
        self.node.table()
    }

    pub fn transport(&self) -> &Arc<Transport> {
        self.node.transport()
    }

    pub fn stop(&self) -> Result<()> {
        self.node.stop()
    }
}

/// Start server `index` of the configured cluster on this process.
pub fn start_server(config: &Config, index: usize) -> Result<ServerHandle> {
    config.validate()?;
    if index >= config.cluster.servers.len() {
        return Err(PsError::Cluster(format!(
            "server index {} out of range ({} servers configured)",
            index,
            config.cluster.servers.len()
        )));
    }
    let transport = build_transport(config, server_node_id(index))?;
    let node = ServerNode::new(
        transport,
        config.server.shard_num,
        LrPolicy::new(config.server.initial_learning_rate),
    );
    node.start()?;
    Ok(ServerHandle { node })
}

pub struct WorkerHandle {
    transport: Arc<Transport>,
    trainer: Trainer,
}

impl WorkerHandle {
    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn stop(&self) -> Result<()> {
        self.transport.stop()
    }
}

/// Start worker `index` of the configured cluster on this process.
pub fn start_worker(config: &Config, index: usize) -> Result<WorkerHandle> {
    config.validate()?;
    if index >= config.cluster.workers.len() {
        return Err(PsError::Cluster(format!(
            "worker index {} out of range ({} workers configured)",
            index,
            config.cluster.workers.len()
        )));
    }
    let transport = build_transport(config, worker_node_id(config, index))?;
    transport.start()?;
    info!(node = transport.local_id(), "worker node started");
    let trainer = Trainer::new(
        Arc::clone(&transport),
        config.cluster.servers.len(),
        &config.worker,
    );
    Ok(WorkerHandle { transport, trainer })
}
