//! World server link packets
//!
//! A separate namespace from the player protocol. The gateway opens the
//! link by sending the world cipher key in clear text; everything after that
//! is encrypted with the rolling-key cipher.

use crate::crypto::WORLD_KEY_SIZE;
use crate::error::ProtocolError;
use crate::net::buffer::PacketBuffer;
use crate::world::RegisterFailReason;

type DecodeResult<T> = std::result::Result<T, ProtocolError>;

/// World server -> gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldRequest {
    /// Announce which realm this server hosts
    Register { server_id: u8, max_players: u16 },
    /// Report the current population
    Status { current_players: u16 },
    Unknown { opcode: u8 },
}

impl WorldRequest {
    pub const REGISTER: u8 = 0x00;
    pub const STATUS: u8 = 0x01;

    pub fn decode(opcode: u8, payload: &[u8]) -> DecodeResult<Self> {
        let mut buf = PacketBuffer::from_bytes(payload);
        let request = match opcode {
            Self::REGISTER => WorldRequest::Register {
                server_id: buf.read_u8()?,
                max_players: buf.read_u16()?,
            },
            Self::STATUS => WorldRequest::Status {
                current_players: buf.read_u16()?,
            },
            other => WorldRequest::Unknown { opcode: other },
        };
        Ok(request)
    }

    /// Encode the request body, as a world server would
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = PacketBuffer::with_capacity(8);
        match self {
            WorldRequest::Register {
                server_id,
                max_players,
            } => {
                buf.write_u8(Self::REGISTER);
                buf.write_u8(*server_id);
                buf.write_u16(*max_players);
            }
            WorldRequest::Status { current_players } => {
                buf.write_u8(Self::STATUS);
                buf.write_u16(*current_players);
            }
            WorldRequest::Unknown { opcode } => buf.write_u8(*opcode),
        }
        buf.into_vec()
    }
}

/// Gateway -> world server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldResponse {
    /// Clear-text key exchange, first packet on the link
    InitLink { key: [u8; WORLD_KEY_SIZE] },
    RegisterOk { server_id: u8 },
    RegisterFail { reason: RegisterFailReason },
}

impl WorldResponse {
    pub const INIT_LINK: u8 = 0x00;
    pub const REGISTER_OK: u8 = 0x01;
    pub const REGISTER_FAIL: u8 = 0x02;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = PacketBuffer::with_capacity(16);
        match self {
            WorldResponse::InitLink { key } => {
                buf.write_u8(Self::INIT_LINK);
                buf.write_bytes(key);
            }
            WorldResponse::RegisterOk { server_id } => {
                buf.write_u8(Self::REGISTER_OK);
                buf.write_u8(*server_id);
            }
            WorldResponse::RegisterFail { reason } => {
                buf.write_u8(Self::REGISTER_FAIL);
                buf.write_u8(*reason as u8);
            }
        }
        buf.into_vec()
    }

    /// Decode a response body, as a world server would
    pub fn decode(opcode: u8, payload: &[u8]) -> DecodeResult<Self> {
        let mut buf = PacketBuffer::from_bytes(payload);
        match opcode {
            Self::INIT_LINK => Ok(WorldResponse::InitLink {
                key: buf.read_array()?,
            }),
            Self::REGISTER_OK => Ok(WorldResponse::RegisterOk {
                server_id: buf.read_u8()?,
            }),
            Self::REGISTER_FAIL => {
                let reason = match buf.read_u8()? {
                    1 => RegisterFailReason::UnknownServer,
                    2 => RegisterFailReason::AlreadyRegistered,
                    other => {
                        return Err(ProtocolError::MalformedPacket(format!(
                            "unknown register failure {}",
                            other
                        )))
                    }
                };
                Ok(WorldResponse::RegisterFail { reason })
            }
            other => Err(ProtocolError::MalformedPacket(format!(
                "unknown world opcode 0x{:02x}",
                other
            ))),
        }
    }
}
