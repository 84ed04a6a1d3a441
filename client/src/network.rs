//! TCP connection to a server: handshake, level download and play packets.

use crate::level::{Level, LevelDownload, LevelError};
use log::{debug, info};
use protocol::{
    ids, BlockMode, ClientPacket, PacketReader, Position, ProtocolError, ServerPacket,
    IDENTIFICATION_MAGIC, PROTOCOL_VERSION, SELF_ID,
};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

pub const CLIENT_NAME: &str = "Midnight Client";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("disconnected by server: {0}")]
    Disconnected(String),
    #[error("unexpected packet {0:#04x}")]
    UnexpectedPacket(u8),
    #[error("level download failed: {0}")]
    Level(#[from] LevelError),
}

/// What the server told us about itself during the handshake.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub name: String,
    pub motd: String,
    pub user_type: u8,
    pub app_name: String,
    pub extensions: Vec<(String, i32)>,
}

/// Outbound half of a connection.
pub struct ClientSender {
    writer: OwnedWriteHalf,
}

impl ClientSender {
    pub async fn send(&mut self, packet: &ClientPacket) -> Result<(), ClientError> {
        self.writer.write_all(&packet.to_bytes()).await?;
        Ok(())
    }

    /// Writes bytes as-is, for packets this client has no type for.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    pub async fn set_block(&mut self, x: i16, y: i16, z: i16, mode: BlockMode, block: u8) -> Result<(), ClientError> {
        self.send(&ClientPacket::SetBlock { x, y, z, mode, block }).await
    }

    pub async fn send_position(&mut self, position: Position, yaw: u8, pitch: u8) -> Result<(), ClientError> {
        self.send(&ClientPacket::Position {
            player_id: SELF_ID,
            position,
            yaw,
            pitch,
        })
        .await
    }

    pub async fn send_message(&mut self, text: &str) -> Result<(), ClientError> {
        self.send(&ClientPacket::Message {
            long_message: 0,
            text: text.to_string(),
        })
        .await
    }
}

pub struct Client {
    reader: PacketReader<OwnedReadHalf>,
    sender: ClientSender,
    info: ServerInfo,
}

impl Client {
    /// Connects and completes the handshake up to `ServerIdentification`.
    /// The level (or a disconnect) follows on the stream.
    pub async fn connect(addr: &str, username: &str, mppass: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let mut client = Client {
            reader: PacketReader::new(read_half),
            sender: ClientSender { writer: write_half },
            info: ServerInfo::default(),
        };

        client
            .send(&ClientPacket::Identification {
                protocol_version: PROTOCOL_VERSION,
                username: username.to_string(),
                verification_key: mppass.to_string(),
                magic: IDENTIFICATION_MAGIC,
            })
            .await?;

        client.negotiate_extensions().await?;

        match client.next_packet().await? {
            ServerPacket::ServerIdentification {
                name, motd, user_type, ..
            } => {
                info!("Connected to '{}': {}", name, motd);
                client.info.name = name;
                client.info.motd = motd;
                client.info.user_type = user_type;
            }
            ServerPacket::Disconnect { reason } => return Err(ClientError::Disconnected(reason)),
            other => return Err(ClientError::UnexpectedPacket(other.id())),
        }

        Ok(client)
    }

    async fn negotiate_extensions(&mut self) -> Result<(), ClientError> {
        let count = match self.next_packet().await? {
            ServerPacket::ExtInfo {
                app_name,
                extension_count,
            } => {
                self.info.app_name = app_name;
                extension_count.max(0)
            }
            ServerPacket::Disconnect { reason } => return Err(ClientError::Disconnected(reason)),
            other => return Err(ClientError::UnexpectedPacket(other.id())),
        };

        for _ in 0..count {
            match self.next_packet().await? {
                ServerPacket::ExtEntry { name, version } => self.info.extensions.push((name, version)),
                other => return Err(ClientError::UnexpectedPacket(other.id())),
            }
        }
        debug!("Server extensions: {:?}", self.info.extensions);

        // no extensions are implemented on this side
        self.send(&ClientPacket::ExtInfo {
            app_name: CLIENT_NAME.to_string(),
            extension_count: 0,
        })
        .await
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Reads `LevelInit`, every chunk and `LevelFinalize`.
    pub async fn receive_level(&mut self) -> Result<Level, ClientError> {
        match self.next_packet().await? {
            ServerPacket::LevelInit => {}
            ServerPacket::Disconnect { reason } => return Err(ClientError::Disconnected(reason)),
            other => return Err(ClientError::UnexpectedPacket(other.id())),
        }

        let mut download = LevelDownload::new();
        loop {
            match self.next_packet().await? {
                ServerPacket::LevelDataChunk {
                    length,
                    data,
                    percent,
                } => {
                    download.push_chunk(length, &data, percent)?;
                    debug!("Level {}% ({} chunks)", percent, download.chunks());
                }
                ServerPacket::LevelFinalize { x, y, z } => {
                    let level = download.finish((x, y, z))?;
                    info!("Received level {}x{}x{}", x, y, z);
                    return Ok(level);
                }
                other => return Err(ClientError::UnexpectedPacket(other.id())),
            }
        }
    }

    pub async fn next_packet(&mut self) -> Result<ServerPacket, ClientError> {
        Ok(ServerPacket::read(&mut self.reader).await?)
    }

    /// Reads packets until `matches` accepts one, returning it.
    pub async fn wait_for<F>(&mut self, mut matches: F) -> Result<ServerPacket, ClientError>
    where
        F: FnMut(&ServerPacket) -> bool,
    {
        loop {
            let packet = self.next_packet().await?;
            if matches(&packet) {
                return Ok(packet);
            }
        }
    }

    pub async fn send(&mut self, packet: &ClientPacket) -> Result<(), ClientError> {
        self.sender.send(packet).await
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.sender.send_raw(bytes).await
    }

    pub async fn set_block(&mut self, x: i16, y: i16, z: i16, mode: BlockMode, block: u8) -> Result<(), ClientError> {
        self.sender.set_block(x, y, z, mode, block).await
    }

    pub async fn send_position(&mut self, position: Position, yaw: u8, pitch: u8) -> Result<(), ClientError> {
        self.sender.send_position(position, yaw, pitch).await
    }

    pub async fn send_message(&mut self, text: &str) -> Result<(), ClientError> {
        self.sender.send_message(text).await
    }

    /// Splits into an inbound reader and an outbound sender, so both can be
    /// driven from different tasks.
    pub fn into_split(self) -> (PacketReader<OwnedReadHalf>, ClientSender) {
        (self.reader, self.sender)
    }
}

/// True when `packet` is a `SetBlock` echo for the given cell.
pub fn is_block_echo(packet: &ServerPacket, x: i16, y: i16, z: i16) -> bool {
    matches!(packet, ServerPacket::SetBlock { x: px, y: py, z: pz, .. } if (*px, *py, *pz) == (x, y, z))
}

/// Packet id helper for log lines.
pub fn describe(packet: &ServerPacket) -> &'static str {
    match packet.id() {
        ids::IDENTIFICATION => "identification",
        ids::LEVEL_INIT => "level init",
        ids::LEVEL_DATA_CHUNK => "level chunk",
        ids::LEVEL_FINALIZE => "level finalize",
        ids::SET_BLOCK_SERVER => "set block",
        ids::SPAWN_PLAYER => "spawn player",
        ids::POSITION => "teleport",
        ids::DESPAWN_PLAYER => "despawn player",
        ids::MESSAGE => "message",
        ids::DISCONNECT => "disconnect",
        ids::EXT_INFO => "ext info",
        ids::EXT_ENTRY => "ext entry",
        _ => "unknown",
    }
}
