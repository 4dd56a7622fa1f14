//! Request/response server
//!
//! Shared accept loop for the broker and the remote worker. Each accepted
//! connection gets its own task that reads framed requests, dispatches them on
//! their `MessageKind` through a `RequestHandler` and writes one reply per
//! request. A connection may carry any number of requests.
//!
//! A successful `Shutdown` request is acknowledged first; the server then stops
//! accepting, drops its listener and ends the remaining connection tasks.
//! A failed `accept` is logged and the loop keeps going after a short pause.

use super::protocol::{read_message, write_message, Message, MessageKind, PROTOCOL_VERSION};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Pause after a failed accept, e.g. when the process is out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub trait RequestHandler: Send + Sync + 'static {
    /// Identifier reported in `Message::Error` replies
    fn node_id(&self) -> &str;

    /// Handle one request whose version has already been checked
    fn handle(&self, request: Message) -> impl Future<Output = Result<Message>> + Send;
}

/// Stops a running server from outside
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

pub struct Server<H> {
    listener: TcpListener,
    handler: Arc<H>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<H: RequestHandler> Server<H> {
    /// Bind the listener. Bind failure is fatal for the service.
    pub async fn bind(addr: &str, handler: H) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            listener,
            handler: Arc::new(handler),
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Serve until a shutdown request is acknowledged
    pub async fn run(self) -> Result<()> {
        let mut stop = self.shutdown.subscribe();
        let mut connections = JoinSet::new();

        loop {
            let stopping = *stop.borrow_and_update();
            if stopping {
                break;
            }
            tokio::select! {
                _ = stop.changed() => continue,
                accepted = self.listener.accept() => {
                    let Some((stream, peer)) =
                        accepted_connection(self.handler.node_id(), accepted)
                    else {
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    };
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        self.handler.clone(),
                        self.shutdown.clone(),
                    ));
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!("{}: connection task failed: {}", self.handler.node_id(), e);
                    }
                }
            }
        }

        info!("{}: shutting down", self.handler.node_id());
        drop(self.listener);
        connections.shutdown().await;
        Ok(())
    }
}

/// Unwrap an accept result; errors are per-connection and never stop the server
fn accepted_connection(
    node_id: &str,
    accepted: io::Result<(TcpStream, SocketAddr)>,
) -> Option<(TcpStream, SocketAddr)> {
    match accepted {
        Ok((stream, peer)) => {
            debug!("{}: connection from {}", node_id, peer);
            Some((stream, peer))
        }
        Err(e) => {
            warn!("{}: failed to accept connection: {}", node_id, e);
            None
        }
    }
}

async fn serve_connection<H: RequestHandler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    shutdown: Arc<watch::Sender<bool>>,
) {
    loop {
        let request = match read_message(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                debug!("{}: connection from {} closed: {:#}", handler.node_id(), peer, e);
                return;
            }
        };

        let kind = request.kind();
        let reply = dispatch(handler.as_ref(), request).await;
        let acknowledged_shutdown =
            kind == Some(MessageKind::Shutdown) && matches!(reply, Message::ShutdownResponse(_));

        if let Err(e) = write_message(&mut stream, &reply).await {
            warn!("{}: failed to reply to {}: {:#}", handler.node_id(), peer, e);
            return;
        }

        if acknowledged_shutdown {
            shutdown.send_replace(true);
            return;
        }
    }
}

async fn dispatch<H: RequestHandler>(handler: &H, request: Message) -> Message {
    let Some(kind) = request.kind() else {
        return Message::error(
            handler.node_id(),
            format!("Expected a request, got {}", request.name()),
        );
    };

    match request.protocol_version() {
        Some(PROTOCOL_VERSION) => {}
        other => {
            return Message::error(
                handler.node_id(),
                format!(
                    "Protocol version mismatch: expected {}, got {:?}",
                    PROTOCOL_VERSION, other
                ),
            );
        }
    }

    match handler.handle(request).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("{}: {} failed: {:#}", handler.node_id(), kind, e);
            Message::error(handler.node_id(), format!("{:#}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::protocol::{AliveCountResponse, ShutdownRequest, ShutdownResponse};
    use crate::distributed::protocol::{AliveCountRequest, Params};
    use crate::grid::Grid;

    struct Echo;

    impl RequestHandler for Echo {
        fn node_id(&self) -> &str {
            "echo"
        }

        async fn handle(&self, request: Message) -> Result<Message> {
            match request {
                Message::AliveCountRequest(req) => {
                    Ok(Message::AliveCountResponse(AliveCountResponse {
                        alive_count: req.grid.alive_count(),
                    }))
                }
                Message::ShutdownRequest(_) => {
                    Ok(Message::ShutdownResponse(ShutdownResponse { complete: true }))
                }
                other => anyhow::bail!("unsupported {}", other.name()),
            }
        }
    }

    fn count_request(version: u32) -> Message {
        Message::AliveCountRequest(AliveCountRequest {
            protocol_version: version,
            grid: Grid::new(2, 2).unwrap(),
            params: Params {
                turns: 0,
                threads: 1,
                image_width: 2,
                image_height: 2,
            },
        })
    }

    #[tokio::test]
    async fn test_dispatch_checks_version() {
        let reply = dispatch(&Echo, count_request(PROTOCOL_VERSION + 1)).await;
        assert!(matches!(reply, Message::Error(ref e) if e.error.contains("version")));

        let reply = dispatch(&Echo, count_request(PROTOCOL_VERSION)).await;
        assert_eq!(
            reply,
            Message::AliveCountResponse(AliveCountResponse { alive_count: 0 })
        );

        let reply = dispatch(&Echo, Message::ShutdownResponse(ShutdownResponse { complete: true })).await;
        assert!(matches!(reply, Message::Error(_)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_server() {
        let server = Server::bind("127.0.0.1:0", Echo).await.unwrap();
        let addr = server.local_addr().unwrap();
        let running = tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_message(&mut stream, &count_request(PROTOCOL_VERSION)).await.unwrap();
        assert!(matches!(
            read_message(&mut stream).await.unwrap(),
            Message::AliveCountResponse(_)
        ));

        write_message(&mut stream, &Message::ShutdownRequest(ShutdownRequest::default()))
            .await
            .unwrap();
        assert_eq!(
            read_message(&mut stream).await.unwrap(),
            Message::ShutdownResponse(ShutdownResponse { complete: true })
        );

        running.await.unwrap().unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_accept_errors_are_skipped() {
        let too_many_files = io::Error::from_raw_os_error(24);
        assert!(accepted_connection("echo", Err(too_many_files)).is_none());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (_, peer) = accepted_connection("echo", listener.accept().await).unwrap();
        assert_eq!(peer.ip(), addr.ip());
    }

    #[tokio::test]
    async fn test_server_keeps_serving_after_dropped_client() {
        let server = Server::bind("127.0.0.1:0", Echo).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let running = tokio::spawn(server.run());

        // a client that connects and vanishes at once must not end the loop
        drop(TcpStream::connect(addr).await.unwrap());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_message(&mut stream, &count_request(PROTOCOL_VERSION)).await.unwrap();
        assert!(matches!(
            read_message(&mut stream).await.unwrap(),
            Message::AliveCountResponse(_)
        ));

        handle.shutdown();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_handle() {
        let server = Server::bind("127.0.0.1:0", Echo).await.unwrap();
        let handle = server.shutdown_handle();
        let running = tokio::spawn(server.run());
        handle.shutdown();
        running.await.unwrap().unwrap();
    }
}
