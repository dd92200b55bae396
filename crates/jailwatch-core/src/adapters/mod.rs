//! Live collaborator adapters.
//!
//! - [`RpcStateClient`]: Tendermint RPC + wallet JSON-RPC over HTTP
//! - [`ContainerFaultInjector`]: Docker / Podman CLI

pub mod container;
pub mod rpc;

pub use container::{ContainerFaultInjector, ContainerRuntime, parse_ps_output};
pub use rpc::RpcStateClient;
