/// The pluggable learning rule. This is the only place where update
/// semantics enter the server; the table and the agents are policy-free.
pub trait AccessPolicy: Send + Sync + 'static {
    /// Authoritative per-key state, including whatever accumulators the
    /// update rule needs.
    type Param: Clone + Send + Sync + 'static;

    /// Called at most once per key, on the first pull that touches it.
    fn init_param(&self, key: u64) -> Self::Param;

    /// The projection of the stored parameter shipped in a pull response.
    fn project(&self, key: u64, param: &Self::Param) -> f32;

    /// Fold one averaged gradient into the stored parameter.
    fn apply(&self, key: u64, param: &mut Self::Param, grad: f32);
}
