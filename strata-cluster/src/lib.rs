pub mod adapter;
pub mod cluster;
pub mod fsm;
mod server;

pub use adapter::{Adapter, AssembledRoute, ListenerRoutes, ListenerSpec};
pub use cluster::{ListenerCluster, ServerConfig, Snapshot};
pub use fsm::{ClusterState, ClusterStateError, ClusterStatus};
