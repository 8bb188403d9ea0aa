// Route table
//
// Fixed node-id -> endpoint mapping, constructed at startup. Servers occupy
// ids `0..num_servers`, workers follow. Each destination owns a mutex that
// serializes writes to that endpoint, which is what makes the two-part
// (metadata, content) message atomic with respect to other senders.

use std::io::Write;
use std::net::{Shutdown, TcpStream};

use parking_lot::Mutex;

use crate::error::{PsError, Result};

pub type NodeId = usize;

struct Destination {
    addr: String,
    /// Connection established lazily on first send.
    conn: Mutex<Option<TcpStream>>,
}

pub struct Route {
    local_id: NodeId,
    num_servers: usize,
    destinations: Vec<Destination>,
}

impl Route {
    pub fn new(local_id: NodeId, servers: &[String], workers: &[String]) -> Result<Route> {
        let destinations: Vec<Destination> = servers
            .iter()
            .chain(workers.iter())
            .map(|addr| Destination {
                addr: addr.clone(),
                conn: Mutex::new(None),
            })
            .collect();
        if local_id >= destinations.len() {
            return Err(PsError::Cluster(format!(
                "local node id {} outside the route ({} nodes)",
                local_id,
                destinations.len()
            )));
        }
        Ok(Route {
            local_id,
            num_servers: servers.len(),
            destinations,
        })
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn local_addr(&self) -> &str {
        &self.destinations[self.local_id].addr
    }

    pub fn num_nodes(&self) -> usize {
        self.destinations.len()
    }

    pub fn num_servers(&self) -> usize {
        self.num_servers
    }

    /// Transmit one pre-assembled frame to `to`, connecting on first use.
    /// The frame goes out in a single `write_all` under the destination
    /// lock, so concurrent senders can never interleave frame parts.
    pub fn send_frame(&self, to: NodeId, frame: &[u8]) -> Result<()> {
        let dest = self.destinations.get(to).ok_or_else(|| {
            PsError::Transport(format!("no node {} in the route", to))
        })?;

        let mut conn = dest.conn.lock();
        if conn.is_none() {
            let stream = TcpStream::connect(&dest.addr)?;
            stream.set_nodelay(true)?;
            *conn = Some(stream);
        }
        if let Some(stream) = conn.as_mut() {
            stream.write_all(frame)?;
        }
        Ok(())
    }

    /// Shut down every outbound connection. Peers observe EOF at a frame
    /// boundary and retire the reader for this node.
    pub fn close_all(&self) {
        for dest in &self.destinations {
            if let Some(stream) = dest.conn.lock().take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }
}
