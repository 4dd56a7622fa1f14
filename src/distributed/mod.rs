//! Distributed mode implementation
//!
//! # Architecture
//!
//! Distributed mode splits a run over three kinds of process:
//!
//! - **Controller**: runs the turn loop and talks to a single broker
//! - **Broker**: partitions each turn over its pool of workers and combines results
//! - **Worker**: computes the rows it is asked for and nothing else
//!
//! # Modules
//!
//! - `protocol`: message definitions and framing
//! - `server`: accept loop and request dispatch shared by broker and worker
//! - `client`: RPC connection plus the controller-side coordinator and counter
//! - `broker`: worker pool and per-turn fan-out/join
//! - `worker_service`: partition computation service

pub mod broker;
pub mod client;
pub mod protocol;
pub mod server;
pub mod worker_service;

pub use broker::Broker;
pub use client::{BrokerClient, RemoteCounter, RpcClient};
pub use protocol::{Message, MessageKind, Params, PROTOCOL_VERSION};
pub use server::{RequestHandler, Server, ShutdownHandle};
pub use worker_service::WorkerService;
