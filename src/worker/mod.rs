// Worker node
//
// The local parameter cache, the pull/push access paths with their
// completion barriers, and the reference training loop.

pub mod barrier;
pub mod cache;
pub mod pull;
pub mod push;
pub mod trainer;

pub use barrier::CompletionBarrier;
pub use cache::{LocalGrad, LocalParamCache};
pub use pull::PullAccess;
pub use push::PushAccess;
pub use trainer::Trainer;
