use crate::codec::{to_fixed, PacketReader, WireWrite};
use crate::error::{ProtocolError, ProtocolResult};
use crate::{ids, CHUNK_SIZE};
use log::trace;
use tokio::io::AsyncRead;

/// A player position in block units. The wire carries it at 1/32 resolution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    fn put(&self, buf: &mut Vec<u8>) {
        buf.put_i16(to_fixed(self.x));
        buf.put_i16(to_fixed(self.y));
        buf.put_i16(to_fixed(self.z));
    }

    async fn read<R: AsyncRead + Unpin>(reader: &mut PacketReader<R>) -> ProtocolResult<Self> {
        Ok(Self {
            x: reader.read_fixed().await?,
            y: reader.read_fixed().await?,
            z: reader.read_fixed().await?,
        })
    }
}

/// The mode byte of an inbound block edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Destroy,
    Create,
}

impl BlockMode {
    pub fn from_byte(value: u8) -> Self {
        // anything other than 0x00 places the held block
        if value == 0x00 {
            BlockMode::Destroy
        } else {
            BlockMode::Create
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            BlockMode::Destroy => 0x00,
            BlockMode::Create => 0x01,
        }
    }
}

/// Packets sent by a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    Identification {
        protocol_version: u8,
        username: String,
        verification_key: String,
        magic: u8,
    },
    SetBlock {
        x: i16,
        y: i16,
        z: i16,
        mode: BlockMode,
        block: u8,
    },
    Position {
        player_id: i8,
        position: Position,
        yaw: u8,
        pitch: u8,
    },
    Message {
        long_message: u8,
        text: String,
    },
    ExtInfo {
        app_name: String,
        extension_count: i16,
    },
    ExtEntry {
        name: String,
        version: i32,
    },
}

impl ClientPacket {
    pub fn id(&self) -> u8 {
        match self {
            ClientPacket::Identification { .. } => ids::IDENTIFICATION,
            ClientPacket::SetBlock { .. } => ids::SET_BLOCK_CLIENT,
            ClientPacket::Position { .. } => ids::POSITION,
            ClientPacket::Message { .. } => ids::MESSAGE,
            ClientPacket::ExtInfo { .. } => ids::EXT_INFO,
            ClientPacket::ExtEntry { .. } => ids::EXT_ENTRY,
        }
    }

    /// Reads one packet: the id byte, then the body for that id.
    ///
    /// An unknown id consumes only the id byte and yields
    /// [`ProtocolError::UnknownPacket`].
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut PacketReader<R>) -> ProtocolResult<Self> {
        let id = reader.read_u8().await?;
        let packet = match id {
            ids::IDENTIFICATION => ClientPacket::Identification {
                protocol_version: reader.read_u8().await?,
                username: reader.read_string(true).await?,
                verification_key: reader.read_string(true).await?,
                magic: reader.read_u8().await?,
            },
            ids::SET_BLOCK_CLIENT => ClientPacket::SetBlock {
                x: reader.read_i16().await?,
                y: reader.read_i16().await?,
                z: reader.read_i16().await?,
                mode: BlockMode::from_byte(reader.read_u8().await?),
                block: reader.read_u8().await?,
            },
            ids::POSITION => ClientPacket::Position {
                player_id: reader.read_i8().await?,
                position: Position::read(reader).await?,
                yaw: reader.read_u8().await?,
                pitch: reader.read_u8().await?,
            },
            ids::MESSAGE => ClientPacket::Message {
                long_message: reader.read_u8().await?,
                text: reader.read_string(true).await?,
            },
            ids::EXT_INFO => ClientPacket::ExtInfo {
                app_name: reader.read_string(true).await?,
                extension_count: reader.read_i16().await?,
            },
            ids::EXT_ENTRY => ClientPacket::ExtEntry {
                name: reader.read_string(true).await?,
                version: reader.read_i32().await?,
            },
            other => return Err(ProtocolError::UnknownPacket(other)),
        };

        trace!("[read] {:?}", packet);
        Ok(packet)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.id());
        match self {
            ClientPacket::Identification {
                protocol_version,
                username,
                verification_key,
                magic,
            } => {
                buf.put_u8(*protocol_version);
                buf.put_string(username);
                buf.put_string(verification_key);
                buf.put_u8(*magic);
            }
            ClientPacket::SetBlock {
                x,
                y,
                z,
                mode,
                block,
            } => {
                buf.put_i16(*x);
                buf.put_i16(*y);
                buf.put_i16(*z);
                buf.put_u8(mode.as_byte());
                buf.put_u8(*block);
            }
            ClientPacket::Position {
                player_id,
                position,
                yaw,
                pitch,
            } => {
                buf.put_i8(*player_id);
                position.put(buf);
                buf.put_u8(*yaw);
                buf.put_u8(*pitch);
            }
            ClientPacket::Message { long_message, text } => {
                buf.put_u8(*long_message);
                buf.put_string(text);
            }
            ClientPacket::ExtInfo {
                app_name,
                extension_count,
            } => {
                buf.put_string(app_name);
                buf.put_i16(*extension_count);
            }
            ClientPacket::ExtEntry { name, version } => {
                buf.put_string(name);
                buf.put_i32(*version);
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Packets sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    ServerIdentification {
        protocol_version: u8,
        name: String,
        motd: String,
        user_type: u8,
    },
    LevelInit,
    LevelDataChunk {
        length: i16,
        data: Box<[u8; CHUNK_SIZE]>,
        percent: u8,
    },
    LevelFinalize {
        x: i16,
        y: i16,
        z: i16,
    },
    SetBlock {
        x: i16,
        y: i16,
        z: i16,
        block: u8,
    },
    SpawnPlayer {
        player_id: i8,
        name: String,
        position: Position,
        yaw: u8,
        pitch: u8,
    },
    Teleport {
        player_id: i8,
        position: Position,
        yaw: u8,
        pitch: u8,
    },
    DespawnPlayer {
        player_id: i8,
    },
    Message {
        player_id: i8,
        text: String,
    },
    Disconnect {
        reason: String,
    },
    ExtInfo {
        app_name: String,
        extension_count: i16,
    },
    ExtEntry {
        name: String,
        version: i32,
    },
}

impl ServerPacket {
    pub fn id(&self) -> u8 {
        match self {
            ServerPacket::ServerIdentification { .. } => ids::IDENTIFICATION,
            ServerPacket::LevelInit => ids::LEVEL_INIT,
            ServerPacket::LevelDataChunk { .. } => ids::LEVEL_DATA_CHUNK,
            ServerPacket::LevelFinalize { .. } => ids::LEVEL_FINALIZE,
            ServerPacket::SetBlock { .. } => ids::SET_BLOCK_SERVER,
            ServerPacket::SpawnPlayer { .. } => ids::SPAWN_PLAYER,
            ServerPacket::Teleport { .. } => ids::POSITION,
            ServerPacket::DespawnPlayer { .. } => ids::DESPAWN_PLAYER,
            ServerPacket::Message { .. } => ids::MESSAGE,
            ServerPacket::Disconnect { .. } => ids::DISCONNECT,
            ServerPacket::ExtInfo { .. } => ids::EXT_INFO,
            ServerPacket::ExtEntry { .. } => ids::EXT_ENTRY,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.id());
        match self {
            ServerPacket::ServerIdentification {
                protocol_version,
                name,
                motd,
                user_type,
            } => {
                buf.put_u8(*protocol_version);
                buf.put_string(name);
                buf.put_string(motd);
                buf.put_u8(*user_type);
            }
            ServerPacket::LevelInit => {}
            ServerPacket::LevelDataChunk {
                length,
                data,
                percent,
            } => {
                buf.put_i16(*length);
                buf.extend_from_slice(&data[..]);
                buf.put_u8(*percent);
            }
            ServerPacket::LevelFinalize { x, y, z } => {
                buf.put_i16(*x);
                buf.put_i16(*y);
                buf.put_i16(*z);
            }
            ServerPacket::SetBlock { x, y, z, block } => {
                buf.put_i16(*x);
                buf.put_i16(*y);
                buf.put_i16(*z);
                buf.put_u8(*block);
            }
            ServerPacket::SpawnPlayer {
                player_id,
                name,
                position,
                yaw,
                pitch,
            } => {
                buf.put_i8(*player_id);
                buf.put_string(name);
                position.put(buf);
                buf.put_u8(*yaw);
                buf.put_u8(*pitch);
            }
            ServerPacket::Teleport {
                player_id,
                position,
                yaw,
                pitch,
            } => {
                buf.put_i8(*player_id);
                position.put(buf);
                buf.put_u8(*yaw);
                buf.put_u8(*pitch);
            }
            ServerPacket::DespawnPlayer { player_id } => buf.put_i8(*player_id),
            ServerPacket::Message { player_id, text } => {
                buf.put_i8(*player_id);
                buf.put_string(text);
            }
            ServerPacket::Disconnect { reason } => buf.put_string(reason),
            ServerPacket::ExtInfo {
                app_name,
                extension_count,
            } => {
                buf.put_string(app_name);
                buf.put_i16(*extension_count);
            }
            ServerPacket::ExtEntry { name, version } => {
                buf.put_string(name);
                buf.put_i32(*version);
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// Reads one server packet, as a client would.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut PacketReader<R>) -> ProtocolResult<Self> {
        let id = reader.read_u8().await?;
        let packet = match id {
            ids::IDENTIFICATION => ServerPacket::ServerIdentification {
                protocol_version: reader.read_u8().await?,
                name: reader.read_string(true).await?,
                motd: reader.read_string(true).await?,
                user_type: reader.read_u8().await?,
            },
            ids::LEVEL_INIT => ServerPacket::LevelInit,
            ids::LEVEL_DATA_CHUNK => {
                let length = reader.read_i16().await?;
                let mut data = Box::new([0u8; CHUNK_SIZE]);
                reader.read_exact(&mut data[..]).await?;
                ServerPacket::LevelDataChunk {
                    length,
                    data,
                    percent: reader.read_u8().await?,
                }
            }
            ids::LEVEL_FINALIZE => ServerPacket::LevelFinalize {
                x: reader.read_i16().await?,
                y: reader.read_i16().await?,
                z: reader.read_i16().await?,
            },
            ids::SET_BLOCK_SERVER => ServerPacket::SetBlock {
                x: reader.read_i16().await?,
                y: reader.read_i16().await?,
                z: reader.read_i16().await?,
                block: reader.read_u8().await?,
            },
            ids::SPAWN_PLAYER => ServerPacket::SpawnPlayer {
                player_id: reader.read_i8().await?,
                name: reader.read_string(true).await?,
                position: Position::read(reader).await?,
                yaw: reader.read_u8().await?,
                pitch: reader.read_u8().await?,
            },
            ids::POSITION => ServerPacket::Teleport {
                player_id: reader.read_i8().await?,
                position: Position::read(reader).await?,
                yaw: reader.read_u8().await?,
                pitch: reader.read_u8().await?,
            },
            ids::DESPAWN_PLAYER => ServerPacket::DespawnPlayer {
                player_id: reader.read_i8().await?,
            },
            ids::MESSAGE => ServerPacket::Message {
                player_id: reader.read_i8().await?,
                text: reader.read_string(true).await?,
            },
            ids::DISCONNECT => ServerPacket::Disconnect {
                reason: reader.read_string(true).await?,
            },
            ids::EXT_INFO => ServerPacket::ExtInfo {
                app_name: reader.read_string(true).await?,
                extension_count: reader.read_i16().await?,
            },
            ids::EXT_ENTRY => ServerPacket::ExtEntry {
                name: reader.read_string(true).await?,
                version: reader.read_i32().await?,
            },
            other => return Err(ProtocolError::UnknownPacket(other)),
        };

        Ok(packet)
    }
}
