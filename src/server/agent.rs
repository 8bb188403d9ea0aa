// Access agents
//
// Per-key glue between the sharded table and the access policy.

use std::sync::Arc;

use crate::server::policy::AccessPolicy;
use crate::table::SparseTable;

pub struct PullAccessAgent<P: AccessPolicy> {
    table: Arc<SparseTable<P::Param>>,
    policy: Arc<P>,
}

impl<P: AccessPolicy> PullAccessAgent<P> {
    pub fn new(table: Arc<SparseTable<P::Param>>, policy: Arc<P>) -> PullAccessAgent<P> {
        PullAccessAgent { table, policy }
    }

    /// Resolve one pulled key: lazily initialize on first touch, then
    /// project the stored parameter into the wire value.
    pub fn pull_value(&self, key: u64) -> f32 {
        let param = self
            .table
            .get_or_insert_with(key, || self.policy.init_param(key));
        self.policy.project(key, &param)
    }
}

pub struct PushAccessAgent<P: AccessPolicy> {
    table: Arc<SparseTable<P::Param>>,
    policy: Arc<P>,
}

impl<P: AccessPolicy> PushAccessAgent<P> {
    pub fn new(table: Arc<SparseTable<P::Param>>, policy: Arc<P>) -> PushAccessAgent<P> {
        PushAccessAgent { table, policy }
    }

    /// Apply one averaged gradient under the shard's write lock. A key that
    /// was never pulled is a protocol violation: pull precedes push.
    pub fn apply_grad(&self, key: u64, grad: f32) {
        let applied = self
            .table
            .update(key, |param| self.policy.apply(key, param, grad));
        assert!(applied, "push for key {} that was never pulled", key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPolicy;

    impl AccessPolicy for CountingPolicy {
        type Param = (f32, u32);

        fn init_param(&self, key: u64) -> (f32, u32) {
            (key as f32, 0)
        }

        fn project(&self, _key: u64, param: &(f32, u32)) -> f32 {
            param.0
        }

        fn apply(&self, _key: u64, param: &mut (f32, u32), grad: f32) {
            param.0 += grad;
            param.1 += 1;
        }
    }

    fn agents() -> (PullAccessAgent<CountingPolicy>, PushAccessAgent<CountingPolicy>) {
        let table = Arc::new(SparseTable::new(4));
        let policy = Arc::new(CountingPolicy);
        (
            PullAccessAgent::new(Arc::clone(&table), Arc::clone(&policy)),
            PushAccessAgent::new(table, policy),
        )
    }

    #[test]
    fn test_pull_initializes_lazily_and_stays_stable() {
        let (pull, _push) = agents();
        assert_eq!(pull.pull_value(10), 10.0);
        assert_eq!(pull.pull_value(10), 10.0);
    }

    #[test]
    fn test_push_applies_through_policy() {
        let (pull, push) = agents();
        let before = pull.pull_value(3);
        push.apply_grad(3, 2.5);
        assert_eq!(pull.pull_value(3), before + 2.5);
    }

    #[test]
    #[should_panic(expected = "never pulled")]
    fn test_push_before_pull_is_fatal() {
        let (_pull, push) = agents();
        push.apply_grad(99, 1.0);
    }
}
