//! Remote worker service
//!
//! Runs on each worker host. It answers `PartitionCompute` requests by stepping
//! the requested rows of the full grid it was sent, and stops after acknowledging
//! a `Shutdown`. Workers never open connections of their own.

use super::protocol::*;
use super::server::{RequestHandler, Server};
use crate::engine::{step_rows, RowRange};
use anyhow::{bail, Context, Result};
use log::debug;

pub struct WorkerService {
    node_id: String,
}

impl WorkerService {
    pub fn new() -> Self {
        Self {
            node_id: local_node_id("worker"),
        }
    }

    /// Bind a worker server on `addr`
    pub async fn bind(addr: &str) -> Result<Server<Self>> {
        Server::bind(addr, Self::new()).await
    }

    async fn compute_partition(&self, req: PartitionRequest) -> Result<PartitionResponse> {
        let (width, height) = (req.grid.width(), req.grid.height());
        if req.x1 != 0 || req.x2 != width {
            bail!(
                "Column bounds {}..{} must span the full width {}",
                req.x1,
                req.x2,
                width
            );
        }
        if req.y1 >= req.y2 || req.y2 > height {
            bail!("Row bounds {}..{} are invalid for height {}", req.y1, req.y2, height);
        }

        debug!(
            "{}: rows {}..{} for {}",
            self.node_id, req.y1, req.y2, req.client_id
        );

        let range = RowRange::new(req.y1, req.y2);
        let grid = req.grid;
        let output = tokio::task::spawn_blocking(move || step_rows(&grid, range))
            .await
            .context("Partition computation panicked")?;

        Ok(PartitionResponse {
            rows: output.cells,
            complete: true,
        })
    }
}

impl Default for WorkerService {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHandler for WorkerService {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn handle(&self, request: Message) -> Result<Message> {
        match request {
            Message::PartitionRequest(req) => {
                Ok(Message::PartitionResponse(self.compute_partition(req).await?))
            }
            Message::ShutdownRequest(_) => {
                Ok(Message::ShutdownResponse(ShutdownResponse { complete: true }))
            }
            other => bail!("Worker does not handle {}", other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::step_grid;
    use crate::grid::Grid;
    use std::sync::Arc;

    fn request(grid: Grid, y1: usize, y2: usize) -> PartitionRequest {
        PartitionRequest {
            protocol_version: PROTOCOL_VERSION,
            params: Params {
                turns: 1,
                threads: 1,
                image_width: grid.width(),
                image_height: grid.height(),
            },
            x1: 0,
            x2: grid.width(),
            y1,
            y2,
            client_id: "test".to_string(),
            grid: Arc::new(grid),
        }
    }

    #[tokio::test]
    async fn test_partition_rows_match_full_step() {
        let grid = Grid::random(10, 12, 0.4, 21).unwrap();
        let expected = step_grid(&grid).unwrap();
        let service = WorkerService::new();

        let response = service.compute_partition(request(grid, 3, 9)).await.unwrap();
        assert!(response.complete);
        assert_eq!(response.rows, expected.rows(3, 9));
    }

    #[tokio::test]
    async fn test_rejects_bad_bounds() {
        let grid = Grid::new(4, 4).unwrap();
        let service = WorkerService::new();
        assert!(service.compute_partition(request(grid.clone(), 2, 2)).await.is_err());
        assert!(service.compute_partition(request(grid.clone(), 0, 5)).await.is_err());

        let mut narrow = request(grid, 0, 4);
        narrow.x2 = 2;
        assert!(service.compute_partition(narrow).await.is_err());
    }

    #[tokio::test]
    async fn test_refuses_turn_requests() {
        let service = WorkerService::new();
        let turn = Message::TurnRequest(TurnRequest {
            protocol_version: PROTOCOL_VERSION,
            grid: Grid::new(2, 2).unwrap(),
            params: Params {
                turns: 1,
                threads: 1,
                image_width: 2,
                image_height: 2,
            },
        });
        assert!(service.handle(turn).await.is_err());
    }
}
