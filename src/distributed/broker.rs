//! Broker (remote coordinator)
//!
//! The broker sits between the controller and the remote workers. It owns a fixed
//! pool of worker connections made at startup; addresses that cannot be reached
//! are logged and skipped, so the pool may be smaller than requested.
//!
//! # Turn Flow
//!
//! 1. Clamp the worker count to `min(params.threads, pool size, grid height)`
//! 2. Partition the rows and send each worker the full grid plus its row bounds
//! 3. Join every call in partition order; a failed call leaves its slot empty
//! 4. Combine with the configured `FailurePolicy`
//!
//! Calls are never cancelled or retried: the turn waits for every worker to
//! answer or fail.

use super::client::RpcClient;
use super::protocol::*;
use super::server::RequestHandler;
use crate::engine::{combine, partition_rows, Combined, FailurePolicy, RowRange};
use crate::grid::{Cell, Grid};
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Pooled connection to one remote worker
pub struct WorkerHandle {
    index: usize,
    client: RpcClient,
}

/// Request for one partition; the grid is shared, not copied
fn partition_request(
    grid: Arc<Grid>,
    params: Params,
    range: RowRange,
    client_id: String,
) -> PartitionRequest {
    let width = grid.width();
    PartitionRequest {
        protocol_version: PROTOCOL_VERSION,
        grid,
        params,
        x1: 0,
        x2: width,
        y1: range.start,
        y2: range.end,
        client_id,
    }
}

impl WorkerHandle {
    pub fn addr(&self) -> &str {
        self.client.addr()
    }

    async fn compute(
        &mut self,
        grid: Arc<Grid>,
        params: Params,
        range: RowRange,
        client_id: String,
    ) -> Result<Vec<Cell>> {
        let request = partition_request(grid, params, range, client_id);
        let response = self.client.compute_partition(request).await?;
        if !response.complete {
            bail!("Worker {} reported an incomplete partition", self.addr());
        }
        Ok(response.rows)
    }
}

pub struct Broker {
    node_id: String,
    policy: FailurePolicy,
    pool: Mutex<Vec<WorkerHandle>>,
}

impl Broker {
    /// Connect to every address, skipping the ones that fail
    pub async fn connect(addresses: &[String], policy: FailurePolicy) -> Self {
        let mut pool = Vec::with_capacity(addresses.len());
        for addr in addresses {
            match RpcClient::connect(addr).await {
                Ok(client) => {
                    info!("Broker connected to worker {}", addr);
                    pool.push(WorkerHandle {
                        index: pool.len(),
                        client,
                    });
                }
                Err(e) => warn!("Skipping worker {}: {:#}", addr, e),
            }
        }

        if pool.is_empty() {
            warn!("Broker has no workers; every turn will fail");
        } else {
            info!(
                "Broker pool ready: {} of {} workers connected",
                pool.len(),
                addresses.len()
            );
        }

        Self {
            node_id: local_node_id("broker"),
            policy,
            pool: Mutex::new(pool),
        }
    }

    pub async fn pool_size(&self) -> usize {
        self.pool.lock().await.len()
    }

    pub async fn worker_addresses(&self) -> Vec<String> {
        self.pool
            .lock()
            .await
            .iter()
            .map(|w| w.addr().to_string())
            .collect()
    }

    /// Fan one turn out over the pool and combine the results
    pub async fn compute_turn(&self, grid: Grid, params: Params) -> Result<Combined> {
        let mut pool = self.pool.lock().await;
        if pool.is_empty() {
            bail!("No workers connected to the broker");
        }

        let workers = params.threads.max(1).min(pool.len());
        let ranges = partition_rows(grid.height(), workers);
        debug!(
            "Turn over {} partitions of a {}x{} grid",
            ranges.len(),
            grid.width(),
            grid.height()
        );

        let grid = Arc::new(grid);
        let busy: Vec<WorkerHandle> = pool.drain(..ranges.len()).collect();
        let mut tasks = Vec::with_capacity(ranges.len());
        for (mut handle, range) in busy.into_iter().zip(ranges.iter().copied()) {
            let grid = grid.clone();
            let client_id = self.node_id.clone();
            tasks.push(tokio::spawn(async move {
                let result = handle
                    .compute(grid, params, range, client_id)
                    .await;
                (handle, result)
            }));
        }

        let mut parts = Vec::with_capacity(tasks.len());
        let mut returned = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.into_iter().enumerate() {
            match task.await {
                Ok((handle, Ok(rows))) => {
                    returned.push(handle);
                    parts.push(Some(rows));
                }
                Ok((handle, Err(e))) => {
                    warn!("Partition {} on {} failed: {:#}", i, handle.addr(), e);
                    returned.push(handle);
                    parts.push(None);
                }
                Err(e) => {
                    warn!("Partition {} task failed: {}", i, e);
                    parts.push(None);
                }
            }
        }

        // keep the pool in connection order
        returned.append(&mut *pool);
        returned.sort_by_key(|w| w.index);
        *pool = returned;
        drop(pool);

        let combined = combine(&grid, &ranges, parts, self.policy)?;
        if !combined.is_complete() {
            warn!(
                "Turn incomplete: partitions {:?} kept their prior rows",
                combined.missing
            );
        }
        Ok(combined)
    }

    /// Send a shutdown to every worker and empty the pool
    pub async fn shutdown_workers(&self) -> usize {
        let mut pool = self.pool.lock().await;
        let mut stopped = 0;
        for mut worker in pool.drain(..) {
            match worker.client.shutdown().await {
                Ok(_) => {
                    info!("Worker {} shut down", worker.addr());
                    stopped += 1;
                }
                Err(e) => warn!("Failed to shut down worker {}: {:#}", worker.addr(), e),
            }
        }
        stopped
    }
}

impl RequestHandler for Broker {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn handle(&self, request: Message) -> Result<Message> {
        match request {
            Message::TurnRequest(req) => {
                let combined = self
                    .compute_turn(req.grid, req.params)
                    .await
                    .context("Turn failed")?;
                Ok(Message::TurnResponse(TurnResponse {
                    complete: combined.is_complete(),
                    grid: combined.grid,
                    missing_partitions: combined.missing,
                }))
            }
            Message::AliveCountRequest(req) => Ok(Message::AliveCountResponse(AliveCountResponse {
                alive_count: req.grid.alive_count(),
            })),
            Message::ShutdownRequest(_) => {
                let stopped = self.shutdown_workers().await;
                info!("Shutdown cascade reached {} workers", stopped);
                Ok(Message::ShutdownResponse(ShutdownResponse { complete: true }))
            }
            other => bail!("Broker does not handle {}", other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_requests_share_the_grid() {
        let grid = Arc::new(Grid::random(6, 9, 0.4, 2).unwrap());
        let params = Params {
            turns: 1,
            threads: 3,
            image_width: 6,
            image_height: 9,
        };

        let requests: Vec<PartitionRequest> = partition_rows(9, 3)
            .into_iter()
            .map(|range| partition_request(grid.clone(), params, range, "broker".to_string()))
            .collect();

        for (req, range) in requests.iter().zip(partition_rows(9, 3)) {
            assert!(Arc::ptr_eq(&req.grid, &grid));
            assert_eq!((req.x1, req.x2), (0, 6));
            assert_eq!((req.y1, req.y2), (range.start, range.end));
        }
        assert_eq!(Arc::strong_count(&grid), 4);
    }
}
