// Runtime configuration
//
// One JSON file describes the whole cluster; every node loads the same file
// and picks its own role out of it. Missing sections and fields fall back to
// defaults, so a minimal file only needs `cluster`.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PsError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub transport: TransportConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Number of table shards per server.
    pub shard_num: usize,
    /// AdaGrad learning rate of the reference update rule.
    pub initial_learning_rate: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shard_num: 8,
            initial_learning_rate: 0.01,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Lines per minibatch.
    pub minibatch: usize,
    /// Training pool size.
    pub nthreads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            minibatch: 1000,
            nthreads: num_cpus::get(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Execution pool size for inbound handlers and response callbacks.
    pub nthreads: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { nthreads: 4 }
    }
}

/// The node set is fixed for the run. Servers come first in the node-id
/// space (`0..servers.len()`), workers follow.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Ordered server endpoints, e.g. `"10.0.0.1:7000"`.
    pub servers: Vec<String>,
    /// Ordered worker endpoints; responses are routed back through these.
    pub workers: Vec<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.shard_num == 0 {
            return Err(PsError::Config("server.shard_num must be positive".into()));
        }
        if self.worker.minibatch == 0 {
            return Err(PsError::Config("worker.minibatch must be positive".into()));
        }
        if self.worker.nthreads == 0 {
            return Err(PsError::Config("worker.nthreads must be positive".into()));
        }
        if self.transport.nthreads == 0 {
            return Err(PsError::Config("transport.nthreads must be positive".into()));
        }
        if self.cluster.servers.is_empty() {
            return Err(PsError::Config("cluster.servers must not be empty".into()));
        }
        Ok(())
    }
}
