//! RPC clients
//!
//! `RpcClient` is one TCP connection carrying framed request/reply pairs. On top of
//! it sit the controller-side pieces: `BrokerClient`, the `TurnCoordinator` that
//! delegates every turn to a broker, and `RemoteCounter`, the `AliveCounter` the
//! status poller uses over its own connection so it never waits behind a turn.

use super::protocol::*;
use crate::control::AliveCounter;
use crate::coordinator::{TurnCoordinator, TurnOutcome};
use crate::grid::Grid;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use tokio::net::TcpStream;

pub struct RpcClient {
    addr: String,
    stream: TcpStream,
}

impl RpcClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to {}", addr))?;
        stream.set_nodelay(true).ok();
        debug!("Connected to {}", addr);
        Ok(Self {
            addr: addr.to_string(),
            stream,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and wait for its reply. `Message::Error` becomes `Err`.
    pub async fn call(&mut self, request: &Message) -> Result<Message> {
        write_message(&mut self.stream, request)
            .await
            .with_context(|| format!("{} to {} failed", request.name(), self.addr))?;
        let reply = read_message(&mut self.stream)
            .await
            .with_context(|| format!("No reply to {} from {}", request.name(), self.addr))?;

        if let Message::Error(err) = reply {
            bail!("{} failed on {}: {}", request.name(), err.node_id, err.error);
        }
        Ok(reply)
    }

    pub async fn compute_turn(&mut self, grid: Grid, params: Params) -> Result<TurnResponse> {
        let request = Message::TurnRequest(TurnRequest {
            protocol_version: PROTOCOL_VERSION,
            grid,
            params,
        });
        match self.call(&request).await? {
            Message::TurnResponse(response) => Ok(response),
            other => bail!("Expected TurnResponse from {}, got {}", self.addr, other.name()),
        }
    }

    pub async fn compute_partition(&mut self, request: PartitionRequest) -> Result<PartitionResponse> {
        match self.call(&Message::PartitionRequest(request)).await? {
            Message::PartitionResponse(response) => Ok(response),
            other => bail!(
                "Expected PartitionResponse from {}, got {}",
                self.addr,
                other.name()
            ),
        }
    }

    pub async fn alive_count(&mut self, grid: Grid, params: Params) -> Result<usize> {
        let request = Message::AliveCountRequest(AliveCountRequest {
            protocol_version: PROTOCOL_VERSION,
            grid,
            params,
        });
        match self.call(&request).await? {
            Message::AliveCountResponse(response) => Ok(response.alive_count),
            other => bail!(
                "Expected AliveCountResponse from {}, got {}",
                self.addr,
                other.name()
            ),
        }
    }

    pub async fn shutdown(&mut self) -> Result<ShutdownResponse> {
        let request = Message::ShutdownRequest(ShutdownRequest::default());
        match self.call(&request).await? {
            Message::ShutdownResponse(response) => Ok(response),
            other => bail!(
                "Expected ShutdownResponse from {}, got {}",
                self.addr,
                other.name()
            ),
        }
    }
}

/// Turn coordinator backed by a remote broker
pub struct BrokerClient {
    rpc: RpcClient,
    params: Params,
}

impl BrokerClient {
    pub async fn connect(addr: &str, params: Params) -> Result<Self> {
        let rpc = RpcClient::connect(addr)
            .await
            .context("Failed to reach broker")?;
        info!("Controller connected to broker at {}", addr);
        Ok(Self { rpc, params })
    }
}

impl TurnCoordinator for BrokerClient {
    async fn compute_turn(&mut self, grid: &Grid) -> Result<TurnOutcome> {
        let response = self.rpc.compute_turn(grid.clone(), self.params).await?;
        if (response.grid.width(), response.grid.height()) != (grid.width(), grid.height()) {
            bail!(
                "Broker returned a {}x{} grid for a {}x{} turn",
                response.grid.width(),
                response.grid.height(),
                grid.width(),
                grid.height()
            );
        }

        let flipped = grid.diff(&response.grid);
        Ok(TurnOutcome {
            grid: response.grid,
            flipped,
            missing_partitions: response.missing_partitions,
        })
    }

    async fn shutdown(&mut self) -> Result<()> {
        let response = self.rpc.shutdown().await?;
        if !response.complete {
            bail!("Broker did not confirm shutdown");
        }
        info!("Broker and workers shut down");
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Alive counter that asks the broker
pub struct RemoteCounter {
    rpc: RpcClient,
    params: Params,
}

impl RemoteCounter {
    pub async fn connect(addr: &str, params: Params) -> Result<Self> {
        let rpc = RpcClient::connect(addr)
            .await
            .context("Failed to open status connection to broker")?;
        Ok(Self { rpc, params })
    }
}

impl AliveCounter for RemoteCounter {
    async fn count_alive(&mut self, grid: &Grid) -> Result<usize> {
        self.rpc.alive_count(grid.clone(), self.params).await
    }
}
