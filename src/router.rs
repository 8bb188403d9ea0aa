// Hash-fragment router
//
// Stable key -> server-node mapping. Any worker can decide which server owns
// a key without coordination, so the hash must be deterministic across
// processes and implementations: CRC32 (IEEE) over the key's little-endian
// bytes, reduced modulo the server count.
//
// Shard selection inside a server table uses a different mix (splitmix64
// finalizer). With a single hash, every key on server `i` satisfies
// `h = i (mod nodes)`, and `h mod shards` would leave shards empty whenever
// the node and shard counts share a factor.

use crate::transport::NodeId;

/// CRC32 of the key's little-endian bytes.
#[inline]
pub fn key_hash(key: u64) -> u32 {
    crc32fast::hash(&key.to_le_bytes())
}

/// splitmix64 finalizer, used for shard selection.
#[inline]
pub(crate) fn shard_hash(key: u64) -> u64 {
    let mut z = key.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Maps keys onto the ordered server list. Server node ids are `0..num_servers`.
#[derive(Debug, Clone, Copy)]
pub struct HashRouter {
    num_servers: usize,
}

impl HashRouter {
    pub fn new(num_servers: usize) -> HashRouter {
        assert!(num_servers > 0, "router needs at least one server");
        HashRouter { num_servers }
    }

    #[inline]
    pub fn node_of(&self, key: u64) -> NodeId {
        key_hash(key) as usize % self.num_servers
    }

    pub fn num_servers(&self) -> usize {
        self.num_servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_is_stable() {
        let router = HashRouter::new(4);
        for key in [0u64, 1, 42, u64::MAX] {
            let first = router.node_of(key);
            for _ in 0..100 {
                assert_eq!(router.node_of(key), first);
            }
            assert!(first < 4);
        }
    }

    #[test]
    fn test_routing_covers_all_nodes() {
        let router = HashRouter::new(4);
        let mut seen = [false; 4];
        for key in 0u64..1000 {
            seen[router.node_of(key)] = true;
        }
        assert!(seen.iter().all(|&s| s), "1000 keys left a node unused");
    }

    #[test]
    fn test_node_and_shard_hashes_are_uncorrelated() {
        // Keys routed to one of two nodes must still land in all four shards.
        let router = HashRouter::new(2);
        let mut shards_hit = [false; 4];
        for key in 0u64..1000 {
            if router.node_of(key) == 0 {
                shards_hit[(shard_hash(key) % 4) as usize] = true;
            }
        }
        assert!(shards_hit.iter().all(|&s| s));
    }
}
