//! Connection handler module
//!
//! Drives the lifecycle of a single connection on either channel:
//! - Player login channel: clear-text Init, then Blowfish-framed requests
//!   answered by the login state machine
//! - World link: clear-text key exchange, then rolling-key XOR frames
//!
//! Requests on one connection are processed strictly in order. The task ends
//! when the peer goes away, a frame cannot be decoded, the registry evicts
//! the session, or the gateway shuts down.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::crypto::{generate_world_key, CryptoContext};
use crate::error::{GatewayError, NetworkError, Result};
use crate::net::buffer::split_body;
use crate::net::transport::FrameTransport;
use crate::protocol::login::ClientSession;
use crate::protocol::packets::{ClientPacket, ServerPacket};
use crate::protocol::world::{WorldRequest, WorldResponse};
use crate::world::RegisterFailReason;
use crate::AppState;

/// Why a connection loop stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Evicted,
    Shutdown,
}

/// Connection handler for both listening channels
pub struct ConnectionHandler {
    /// Shared application state
    state: Arc<AppState>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handle a player connection on the login channel
    pub async fn handle_client<S>(
        &self,
        stream: S,
        addr: SocketAddr,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let session = self.state.sessions.register(addr)?;
        let key = session.key();
        debug!(session = %key, address = %addr, "Starting client handler");

        let mut transport = FrameTransport::new(stream, self.state.config.deadlines());
        let mut client = ClientSession::new(session.clone());

        let result = self
            .process_client(&mut transport, &mut client, &mut shutdown_rx)
            .await;

        match &result {
            Ok(Exit::Evicted) => debug!(session = %key, "Session evicted"),
            Ok(Exit::Shutdown) => debug!(session = %key, "Closing for shutdown"),
            Err(GatewayError::Network(NetworkError::ConnectionClosed)) => {
                debug!(session = %key, "Client disconnected")
            }
            Err(e) => warn!(session = %key, address = %addr, "Client connection error: {}", e),
        }

        self.state.sessions.evict(&key);
        if let Err(e) = transport.shutdown().await {
            trace!(session = %key, error = %e, "Error during transport shutdown");
        }

        match result {
            Ok(_) | Err(GatewayError::Network(NetworkError::ConnectionClosed)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn process_client<S>(
        &self,
        transport: &mut FrameTransport<S>,
        client: &mut ClientSession,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<Exit>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut crypto = CryptoContext::new();
        let protocol = self.state.login_protocol();
        let session = client.handle().clone();

        // Init goes out before the login key is installed
        transport
            .write_frame(&crypto.login.encrypt(&ServerPacket::init().encode()))
            .await?;
        crypto
            .login
            .initialize(self.state.config.blowfish_key.as_bytes())?;

        loop {
            let body = tokio::select! {
                frame = transport.read_frame() => frame?,
                _ = session.closed() => return Ok(Exit::Evicted),
                _ = shutdown_rx.recv() => return Ok(Exit::Shutdown),
            };

            let plain = crypto.login.decrypt(&body)?;
            let (opcode, payload) = split_body(&plain)?;
            let packet = ClientPacket::decode(opcode, &payload)?;
            trace!(session = %client.key(), opcode = packet.opcode(), "Received packet");

            if let Some(response) = protocol.handle(client, packet).await {
                trace!(session = %client.key(), response = ?response.opcode(), "Sending packet");
                transport
                    .write_frame(&crypto.login.encrypt(&response.encode()))
                    .await?;
            }
        }
    }

    /// Handle a world server connection on the registration channel
    pub async fn handle_world_server<S>(
        &self,
        stream: S,
        addr: SocketAddr,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(address = %addr, "Starting world link handler");
        let mut transport = FrameTransport::new(stream, self.state.config.deadlines());
        let mut registered = None;

        let result = self
            .process_world_server(&mut transport, addr, &mut registered, &mut shutdown_rx)
            .await;

        if let Some(server_id) = registered {
            self.state.worlds.unregister(server_id);
            debug!(server_id, address = %addr, "Released world server registration");
        }
        if let Err(e) = transport.shutdown().await {
            trace!(address = %addr, error = %e, "Error during transport shutdown");
        }

        match result {
            Ok(_) | Err(GatewayError::Network(NetworkError::ConnectionClosed)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn process_world_server<S>(
        &self,
        transport: &mut FrameTransport<S>,
        addr: SocketAddr,
        registered: &mut Option<u8>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<Exit>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut crypto = CryptoContext::new();
        let key = generate_world_key();

        transport
            .write_frame(&WorldResponse::InitLink { key }.encode())
            .await?;
        crypto.world.initialize(&key)?;

        loop {
            let mut body = tokio::select! {
                frame = transport.read_frame() => frame?,
                _ = shutdown_rx.recv() => return Ok(Exit::Shutdown),
            };

            crypto.world.decrypt(&mut body)?;
            let (opcode, payload) = split_body(&body)?;

            let response = match WorldRequest::decode(opcode, &payload)? {
                WorldRequest::Register {
                    server_id,
                    max_players,
                } => {
                    let result = match *registered {
                        Some(_) => Err(RegisterFailReason::AlreadyRegistered),
                        None => self.state.worlds.register(server_id, max_players),
                    };
                    match result {
                        Ok(()) => {
                            info!(server_id, max_players, address = %addr, "World server registered");
                            *registered = Some(server_id);
                            Some(WorldResponse::RegisterOk { server_id })
                        }
                        Err(reason) => {
                            warn!(server_id, address = %addr, ?reason, "World server registration refused");
                            Some(WorldResponse::RegisterFail { reason })
                        }
                    }
                }
                WorldRequest::Status { current_players } => {
                    match *registered {
                        Some(server_id) => {
                            self.state.worlds.set_population(server_id, current_players);
                            trace!(server_id, current_players, "World population update");
                        }
                        None => warn!(address = %addr, "Status update before registration"),
                    }
                    None
                }
                WorldRequest::Unknown { opcode } => {
                    warn!(
                        address = %addr,
                        opcode = format_args!("0x{:02x}", opcode),
                        "Unknown world link packet, ignoring"
                    );
                    None
                }
            };

            if let Some(response) = response {
                let mut out = response.encode();
                crypto.world.encrypt(&mut out)?;
                transport.write_frame(&out).await?;
            }
        }
    }
}
