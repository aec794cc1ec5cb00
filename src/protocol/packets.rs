//! Login channel packet definitions
//!
//! Client requests and gateway responses are closed enums. Decoding a
//! request is an exhaustive match on the opcode; anything unrecognised
//! becomes [`ClientPacket::Unknown`] so the state machine can log it and
//! carry on.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::{FailureReason, ProtocolError};
use crate::net::buffer::PacketBuffer;
use crate::net::session::{SessionKey, SESSION_KEY_LEN, SESSION_PREFIX_LEN};
use crate::world::WorldServerEntry;

/// Protocol revision announced in the init packet
pub const PROTOCOL_REVISION: u32 = 0x0000_c621;

type DecodeResult<T> = std::result::Result<T, ProtocolError>;

/// Client -> gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientOpcode {
    RequestAuthLogin = 0x00,
    RequestPlay = 0x02,
    RequestServerList = 0x05,
}

impl ClientOpcode {
    /// Convert a u8 to a ClientOpcode
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::RequestAuthLogin),
            0x02 => Some(Self::RequestPlay),
            0x05 => Some(Self::RequestServerList),
            _ => None,
        }
    }

    /// Get the opcode value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get the name of this opcode
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestAuthLogin => "RequestAuthLogin",
            Self::RequestPlay => "RequestPlay",
            Self::RequestServerList => "RequestServerList",
        }
    }
}

impl fmt::Display for ClientOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02x})", self.name(), self.as_u8())
    }
}

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    RequestAuthLogin {
        username: String,
        password: String,
    },
    RequestPlay {
        session_prefix: [u8; SESSION_PREFIX_LEN],
        server_id: u8,
    },
    RequestServerList {
        session_prefix: [u8; SESSION_PREFIX_LEN],
    },
    Unknown {
        opcode: u8,
        payload: Vec<u8>,
    },
}

impl ClientPacket {
    /// Decode a request body. Trailing bytes (cipher padding) are ignored.
    pub fn decode(opcode: u8, payload: &[u8]) -> DecodeResult<Self> {
        let mut buf = PacketBuffer::from_bytes(payload);

        let Some(known) = ClientOpcode::from_u8(opcode) else {
            return Ok(ClientPacket::Unknown {
                opcode,
                payload: payload.to_vec(),
            });
        };

        let packet = match known {
            ClientOpcode::RequestAuthLogin => ClientPacket::RequestAuthLogin {
                username: buf.read_string()?,
                password: buf.read_string()?,
            },
            ClientOpcode::RequestPlay => ClientPacket::RequestPlay {
                session_prefix: buf.read_array()?,
                server_id: buf.read_u8()?,
            },
            ClientOpcode::RequestServerList => ClientPacket::RequestServerList {
                session_prefix: buf.read_array()?,
            },
        };

        Ok(packet)
    }

    /// Get the opcode of this request
    pub fn opcode(&self) -> u8 {
        match self {
            ClientPacket::RequestAuthLogin { .. } => ClientOpcode::RequestAuthLogin.as_u8(),
            ClientPacket::RequestPlay { .. } => ClientOpcode::RequestPlay.as_u8(),
            ClientPacket::RequestServerList { .. } => ClientOpcode::RequestServerList.as_u8(),
            ClientPacket::Unknown { opcode, .. } => *opcode,
        }
    }

    /// Encode the request body (opcode followed by payload), as a client would
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = PacketBuffer::with_capacity(64);
        buf.write_u8(self.opcode());

        match self {
            ClientPacket::RequestAuthLogin { username, password } => {
                buf.write_string(username);
                buf.write_string(password);
            }
            ClientPacket::RequestPlay {
                session_prefix,
                server_id,
            } => {
                buf.write_bytes(session_prefix);
                buf.write_u8(*server_id);
            }
            ClientPacket::RequestServerList { session_prefix } => {
                buf.write_bytes(session_prefix);
            }
            ClientPacket::Unknown { payload, .. } => {
                buf.write_bytes(payload);
            }
        }

        buf.into_vec()
    }
}

/// Gateway -> client opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerOpcode {
    Init = 0x00,
    LoginFail = 0x01,
    LoginOk = 0x03,
    ServerList = 0x04,
    PlayFail = 0x06,
    PlayOk = 0x07,
}

impl ServerOpcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Init),
            0x01 => Some(Self::LoginFail),
            0x03 => Some(Self::LoginOk),
            0x04 => Some(Self::ServerList),
            0x06 => Some(Self::PlayFail),
            0x07 => Some(Self::PlayOk),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One realm as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerListEntry {
    pub id: u8,
    pub address: Ipv4Addr,
    pub port: u16,
    pub age_limit: u8,
    pub pvp: bool,
    pub current_players: u16,
    pub max_players: u16,
    pub online: bool,
    pub server_type: u32,
    pub brackets: bool,
}

impl ServerListEntry {
    /// Build the entry a particular requester should see
    pub fn for_requester(entry: &WorldServerEntry, requester: IpAddr) -> Self {
        Self {
            id: entry.id,
            address: entry.address_for(requester),
            port: entry.port,
            age_limit: entry.age_limit,
            pvp: entry.pvp,
            current_players: entry.current_players,
            max_players: entry.max_players,
            online: entry.online,
            server_type: entry.server_type,
            brackets: entry.brackets,
        }
    }

    fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_u8(self.id);
        buf.write_bytes(&self.address.octets());
        buf.write_u32(self.port as u32);
        buf.write_u8(self.age_limit);
        buf.write_u8(self.pvp as u8);
        buf.write_u16(self.current_players);
        buf.write_u16(self.max_players);
        buf.write_u8(self.online as u8);
        buf.write_u32(self.server_type);
        buf.write_u8(self.brackets as u8);
    }

    fn decode(buf: &mut PacketBuffer) -> DecodeResult<Self> {
        Ok(Self {
            id: buf.read_u8()?,
            address: Ipv4Addr::from(buf.read_array::<4>()?),
            port: buf.read_u32()? as u16,
            age_limit: buf.read_u8()?,
            pvp: buf.read_u8()? != 0,
            current_players: buf.read_u16()?,
            max_players: buf.read_u16()?,
            online: buf.read_u8()? != 0,
            server_type: buf.read_u32()?,
            brackets: buf.read_u8()? != 0,
        })
    }
}

/// A gateway response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    /// Sent in clear text right after accept
    Init { revision: u32 },
    LoginFail { reason: FailureReason },
    LoginOk { session_key: SessionKey },
    ServerList { servers: Vec<ServerListEntry> },
    PlayFail { reason: FailureReason },
    /// Carries the half of the session key the world server will check
    PlayOk { play_key: [u8; 8], server_id: u8 },
}

impl ServerPacket {
    /// Handshake packet
    pub fn init() -> Self {
        ServerPacket::Init {
            revision: PROTOCOL_REVISION,
        }
    }

    /// Server list with addresses resolved for the requester
    pub fn server_list(entries: &[WorldServerEntry], requester: IpAddr) -> Self {
        ServerPacket::ServerList {
            servers: entries
                .iter()
                .map(|entry| ServerListEntry::for_requester(entry, requester))
                .collect(),
        }
    }

    pub fn opcode(&self) -> ServerOpcode {
        match self {
            ServerPacket::Init { .. } => ServerOpcode::Init,
            ServerPacket::LoginFail { .. } => ServerOpcode::LoginFail,
            ServerPacket::LoginOk { .. } => ServerOpcode::LoginOk,
            ServerPacket::ServerList { .. } => ServerOpcode::ServerList,
            ServerPacket::PlayFail { .. } => ServerOpcode::PlayFail,
            ServerPacket::PlayOk { .. } => ServerOpcode::PlayOk,
        }
    }

    /// Encode the response body (opcode followed by payload)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = PacketBuffer::with_capacity(64);
        buf.write_u8(self.opcode().as_u8());

        match self {
            ServerPacket::Init { revision } => buf.write_u32(*revision),
            ServerPacket::LoginFail { reason } | ServerPacket::PlayFail { reason } => {
                buf.write_u32(reason.as_u32())
            }
            ServerPacket::LoginOk { session_key } => buf.write_bytes(session_key.as_bytes()),
            ServerPacket::ServerList { servers } => {
                buf.write_u8(servers.len() as u8);
                // Last server the account played on; not tracked
                buf.write_u8(0);
                for server in servers {
                    server.encode(&mut buf);
                }
            }
            ServerPacket::PlayOk {
                play_key,
                server_id,
            } => {
                buf.write_bytes(play_key);
                buf.write_u8(*server_id);
            }
        }

        buf.into_vec()
    }

    /// Decode a response body, as a client would
    pub fn decode(opcode: u8, payload: &[u8]) -> DecodeResult<Self> {
        let mut buf = PacketBuffer::from_bytes(payload);
        let opcode = ServerOpcode::from_u8(opcode).ok_or_else(|| {
            ProtocolError::MalformedPacket(format!("unknown server opcode 0x{:02x}", opcode))
        })?;

        let read_reason = |buf: &mut PacketBuffer| -> DecodeResult<FailureReason> {
            let code = buf.read_u32()?;
            FailureReason::from_u32(code).ok_or_else(|| {
                ProtocolError::MalformedPacket(format!("unknown failure reason 0x{:02x}", code))
            })
        };

        let packet = match opcode {
            ServerOpcode::Init => ServerPacket::Init {
                revision: buf.read_u32()?,
            },
            ServerOpcode::LoginFail => ServerPacket::LoginFail {
                reason: read_reason(&mut buf)?,
            },
            ServerOpcode::LoginOk => ServerPacket::LoginOk {
                session_key: SessionKey::from_bytes(buf.read_array::<SESSION_KEY_LEN>()?),
            },
            ServerOpcode::ServerList => {
                let count = buf.read_u8()?;
                let _last_server = buf.read_u8()?;
                let servers = (0..count)
                    .map(|_| ServerListEntry::decode(&mut buf))
                    .collect::<DecodeResult<Vec<_>>>()?;
                ServerPacket::ServerList { servers }
            }
            ServerOpcode::PlayFail => ServerPacket::PlayFail {
                reason: read_reason(&mut buf)?,
            },
            ServerOpcode::PlayOk => ServerPacket::PlayOk {
                play_key: buf.read_array()?,
                server_id: buf.read_u8()?,
            },
        };

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::buffer::split_body;
    use pretty_assertions::assert_eq;

    fn entry(id: u8) -> WorldServerEntry {
        WorldServerEntry {
            id,
            host: Ipv4Addr::new(203, 0, 113, 5),
            internal_host: Some(Ipv4Addr::new(10, 0, 0, 5)),
            port: 7777,
            max_players: 1000,
            current_players: 12,
            testing: false,
            pvp: true,
            age_limit: 15,
            server_type: 1,
            brackets: false,
            online: true,
            linked: false,
        }
    }

    #[test]
    fn test_client_opcode_from_u8() {
        assert_eq!(ClientOpcode::from_u8(0x00), Some(ClientOpcode::RequestAuthLogin));
        assert_eq!(ClientOpcode::from_u8(0x02), Some(ClientOpcode::RequestPlay));
        assert_eq!(ClientOpcode::from_u8(0x05), Some(ClientOpcode::RequestServerList));
        assert_eq!(ClientOpcode::from_u8(0x07), None);
        assert_eq!(
            ClientOpcode::RequestPlay.to_string(),
            "RequestPlay(0x02)"
        );
    }

    #[test]
    fn test_decode_auth_login() {
        let mut buf = PacketBuffer::new();
        buf.write_string("Bob");
        buf.write_string("secret");
        // Blowfish padding
        buf.write_bytes(&[0, 0, 0]);

        let packet = ClientPacket::decode(0x00, buf.as_bytes()).unwrap();
        assert_eq!(
            packet,
            ClientPacket::RequestAuthLogin {
                username: "Bob".to_string(),
                password: "secret".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_play_request() {
        let payload = [1, 2, 3, 4, 5, 6, 7, 8, 3, 0, 0, 0, 0, 0, 0];
        let packet = ClientPacket::decode(0x02, &payload).unwrap();
        assert_eq!(
            packet,
            ClientPacket::RequestPlay {
                session_prefix: [1, 2, 3, 4, 5, 6, 7, 8],
                server_id: 3,
            }
        );
    }

    #[test]
    fn test_decode_truncated_request_fails() {
        assert!(matches!(
            ClientPacket::decode(0x02, &[1, 2, 3, 4, 5, 6, 7, 8]),
            Err(ProtocolError::InsufficientData { .. })
        ));
        assert!(matches!(
            ClientPacket::decode(0x05, &[1, 2, 3]),
            Err(ProtocolError::InsufficientData { .. })
        ));
        assert_eq!(
            ClientPacket::decode(0x00, &[b'b', 0, b'o']),
            Err(ProtocolError::UnterminatedString)
        );
    }

    #[test]
    fn test_unknown_opcode() {
        let packet = ClientPacket::decode(0x42, &[9, 9]).unwrap();
        assert_eq!(
            packet,
            ClientPacket::Unknown {
                opcode: 0x42,
                payload: vec![9, 9]
            }
        );
        assert_eq!(packet.opcode(), 0x42);
    }

    #[test]
    fn test_client_encode_matches_decode() {
        let packet = ClientPacket::RequestServerList {
            session_prefix: [8, 7, 6, 5, 4, 3, 2, 1],
        };
        let body = packet.encode();
        let (opcode, payload) = split_body(&body).unwrap();
        assert_eq!(ClientPacket::decode(opcode, &payload).unwrap(), packet);
    }

    #[test]
    fn test_init_encoding() {
        let body = ServerPacket::init().encode();
        assert_eq!(body, vec![0x00, 0x21, 0xc6, 0x00, 0x00]);
    }

    #[test]
    fn test_failure_encoding() {
        let body = ServerPacket::LoginFail {
            reason: FailureReason::UserOrPassWrong,
        }
        .encode();
        assert_eq!(body, vec![0x01, 0x03, 0x00, 0x00, 0x00]);

        let body = ServerPacket::PlayFail {
            reason: FailureReason::AccessFailed,
        }
        .encode();
        assert_eq!(body, vec![0x06, 0x04, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_login_ok_carries_full_key() {
        let key = SessionKey::generate();
        let body = ServerPacket::LoginOk { session_key: key }.encode();
        assert_eq!(body.len(), 1 + SESSION_KEY_LEN);
        assert_eq!(&body[1..], key.as_bytes());
    }

    #[test]
    fn test_server_list_layout() {
        let requester: IpAddr = "198.51.100.20".parse().unwrap();
        let packet = ServerPacket::server_list(&[entry(1)], requester);
        let body = packet.encode();

        assert_eq!(body[0], 0x04);
        assert_eq!(body[1], 1); // count
        assert_eq!(body[3], 1); // server id
        assert_eq!(&body[4..8], &[203, 0, 113, 5]);
        assert_eq!(&body[8..12], &[0x61, 0x1e, 0, 0]); // 7777
        assert_eq!(body.len(), 3 + 21);

        let (opcode, payload) = split_body(&body).unwrap();
        assert_eq!(ServerPacket::decode(opcode, &payload).unwrap(), packet);
    }

    #[test]
    fn test_server_list_uses_internal_address_for_local_requester() {
        let packet = ServerPacket::server_list(&[entry(1)], "10.0.0.99".parse().unwrap());
        let ServerPacket::ServerList { servers } = packet else {
            panic!("expected server list");
        };
        assert_eq!(servers[0].address, Ipv4Addr::new(10, 0, 0, 5));
    }

    #[test]
    fn test_play_ok_layout() {
        let body = ServerPacket::PlayOk {
            play_key: [1, 2, 3, 4, 5, 6, 7, 8],
            server_id: 2,
        }
        .encode();
        assert_eq!(body, vec![0x07, 1, 2, 3, 4, 5, 6, 7, 8, 2]);
    }
}
