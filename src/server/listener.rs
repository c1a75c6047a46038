//! MJPEG server listener
//!
//! Handles the TCP accept loop and spawns one session task per client. The
//! accept task owns the client tasks through a `JoinSet`, so aborting it on
//! sink release tears every client down with it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::sink::entry::Worker;
use crate::sink::Sink;

use super::config::StreamServerConfig;
use super::mjpeg;

/// Bind the listening socket synchronously so failures reach the caller
pub(crate) fn bind(address: &str, port: u16) -> Result<std::net::TcpListener> {
    let host = if address.is_empty() { "0.0.0.0" } else { address };
    let listener = std::net::TcpListener::bind((host, port)).map_err(|e| {
        Error::ResourceNotAvailable(format!("failed to bind {}:{}: {}", host, port, e))
    })?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Accept loop of one MJPEG server sink
struct MjpegServer {
    config: StreamServerConfig,
    sink: Weak<Sink>,
    next_client_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

/// Start serving `listener` for `sink` on `runtime`
pub(crate) fn start(
    listener: std::net::TcpListener,
    sink: &Arc<Sink>,
    config: StreamServerConfig,
    runtime: &RuntimeHandle,
) -> Result<SocketAddr> {
    let _guard = runtime.enter();
    let listener = TcpListener::from_std(listener)?;
    let local_addr = listener.local_addr()?;

    let connection_semaphore = if config.max_connections > 0 {
        Some(Arc::new(Semaphore::new(config.max_connections)))
    } else {
        None
    };
    let server = MjpegServer {
        config,
        sink: Arc::downgrade(sink),
        next_client_id: AtomicU64::new(1),
        connection_semaphore,
    };

    tracing::info!(sink = %sink.handle(), addr = %local_addr, "MJPEG server listening");
    let task = runtime.spawn(async move { server.run(listener).await });
    sink.set_worker(Worker::Task(task));
    Ok(local_addr)
}

impl MjpegServer {
    async fn run(self, listener: TcpListener) {
        let mut clients = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        self.handle_connection(&mut clients, socket, peer_addr);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
                Some(_) = clients.join_next(), if !clients.is_empty() => {}
            }
        }
    }

    fn handle_connection(&self, clients: &mut JoinSet<()>, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(client_id = client_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let sink = Weak::clone(&self.sink);
        clients.spawn(async move {
            let _permit = permit;
            if let Err(e) = mjpeg::serve(sink, socket, &config).await {
                tracing::debug!(client_id = client_id, error = %e, "Connection error");
            }
            tracing::debug!(client_id = client_id, "Connection closed");
        });
    }
}
