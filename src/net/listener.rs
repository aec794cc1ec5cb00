//! Accept loops for the two listening channels
//!
//! Each loop owns a [`JoinSet`] of connection tasks. On shutdown the loop
//! stops accepting, gives open connections `shutdown_grace` to finish and
//! aborts whatever is left.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, NetworkError};
use crate::net::handler::ConnectionHandler;
use crate::AppState;

/// Which listener a connection arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Client,
    WorldServer,
}

impl Channel {
    fn name(&self) -> &'static str {
        match self {
            Channel::Client => "client",
            Channel::WorldServer => "world",
        }
    }
}

/// Accept incoming player connections until shutdown
pub async fn accept_clients(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_rx: broadcast::Receiver<()>,
) {
    accept_connections(listener, state, shutdown_rx, Channel::Client).await
}

/// Accept incoming world server links until shutdown
pub async fn accept_world_servers(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_rx: broadcast::Receiver<()>,
) {
    accept_connections(listener, state, shutdown_rx, Channel::WorldServer).await
}

async fn accept_connections(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown_rx: broadcast::Receiver<()>,
    channel: Channel,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(channel = channel.name(), "New connection from: {}", addr);
                        spawn_connection(&mut connections, &state, stream, addr, channel);
                    }
                    Err(e) => {
                        error!(channel = channel.name(), "Failed to accept connection: {}", e);
                    }
                }
            }
            // Reap finished tasks so the set does not grow without bound
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.recv() => {
                info!(channel = channel.name(), "Connection acceptor shutting down");
                break;
            }
        }
    }

    drop(listener);
    drain(connections, &state, channel).await;
}

fn spawn_connection(
    connections: &mut JoinSet<()>,
    state: &Arc<AppState>,
    stream: TcpStream,
    addr: SocketAddr,
    channel: Channel,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(address = %addr, "Failed to set TCP_NODELAY: {}", e);
    }

    let handler = ConnectionHandler::new(state.clone());
    let shutdown_rx = state.shutdown_tx.subscribe();

    connections.spawn(async move {
        let result = match channel {
            Channel::Client => handler.handle_client(stream, addr, shutdown_rx).await,
            Channel::WorldServer => handler.handle_world_server(stream, addr, shutdown_rx).await,
        };

        match result {
            Ok(()) => {}
            Err(GatewayError::Network(NetworkError::TooManyConnections(_))) => {
                warn!(address = %addr, "Refusing connection: per-address limit reached");
            }
            Err(e) => {
                debug!(channel = channel.name(), address = %addr, "Connection ended with error: {}", e);
            }
        }
    });
}

async fn drain(mut connections: JoinSet<()>, state: &AppState, channel: Channel) {
    if connections.is_empty() {
        return;
    }

    let grace = state.config.shutdown_grace();
    info!(
        channel = channel.name(),
        open = connections.len(),
        "Waiting up to {:?} for connections to close",
        grace
    );

    let finished = timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if finished.is_err() {
        warn!(
            channel = channel.name(),
            remaining = connections.len(),
            "Grace period elapsed, aborting connections"
        );
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
}
