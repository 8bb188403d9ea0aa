// Server node
//
// The sharded table plus the access agents that parameterize it with the
// learning rule, wired to the transport's pull/push message classes.

pub mod agent;
pub mod policy;
pub mod service;

pub use agent::{PullAccessAgent, PushAccessAgent};
pub use policy::AccessPolicy;
pub use service::ServerNode;
