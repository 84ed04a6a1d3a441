//! Per-connection handshake and play loop.
//!
//! Each accepted connection runs in its own task. The socket is split: this
//! task owns the read half and processes inbound packets strictly in order,
//! while a writer task drains the session's outbound queue into the write
//! half. Anything that ends the session (read error, protocol violation,
//! kick, writer failure) leads to the same teardown.

use crate::broadcast::{Frame, SessionHandle, OUTBOUND_QUEUE_LEN};
use crate::error::SessionError;
use crate::players::PlayerId;
use crate::server::Server;
use crate::world::{WorldError, AIR};
use log::{debug, info, warn};
use protocol::{
    BlockMode, ClientPacket, PacketReader, ProtocolError, ServerPacket, IDENTIFICATION_MAGIC,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;

/// Name the server announces in its extension advertisement.
pub const APP_NAME: &str = "Midnight";

/// Extensions this server implements, with their versions.
pub const SUPPORTED_EXTENSIONS: &[(&str, i32)] = &[("EmoteFix", 1)];

/// How long a closing session waits for its queued frames to reach the
/// peer before the connection is dropped anyway.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Connected,
    IdentitySent,
    ExtensionNegotiated,
    Authenticated,
    Joined,
    Closed,
}

struct Session<R> {
    server: Arc<Server>,
    peer: SocketAddr,
    reader: PacketReader<R>,
    handle: SessionHandle,
    state: HandshakeState,
    player_id: Option<PlayerId>,
    extensions: Vec<(String, i32)>,
    read_timeout: Option<Duration>,
}

/// Drives one connection from accept to teardown.
pub async fn run_session<S>(server: Arc<Server>, stream: S, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    info!("[{}] Connected", peer);

    let (read_half, write_half) = tokio::io::split(stream);
    let (handle, rx) = SessionHandle::new(peer, OUTBOUND_QUEUE_LEN);
    let mut writer = tokio::spawn(write_loop(
        write_half,
        rx,
        server.config().write_timeout(),
        peer,
    ));

    let mut session = Session {
        read_timeout: server.config().read_timeout(),
        server: Arc::clone(&server),
        peer,
        reader: PacketReader::new(read_half),
        handle: handle.clone(),
        state: HandshakeState::Connected,
        player_id: None,
        extensions: Vec::new(),
    };

    let (outcome, writer_done) = tokio::select! {
        result = session.run() => (result, false),
        reason = handle.kicked() => (Err(SessionError::Kicked(reason)), false),
        _ = &mut writer => (Err(SessionError::Io(std::io::ErrorKind::BrokenPipe.into())), true),
    };

    session.close(outcome);
    drop(handle);

    if !writer_done && tokio::time::timeout(DISCONNECT_GRACE, &mut writer).await.is_err() {
        debug!("[{}] Writer still blocked after teardown, dropping the connection", peer);
        writer.abort();
        let _ = writer.await;
    }
}

impl<R: AsyncRead + Unpin> Session<R> {
    async fn run(&mut self) -> Result<(), SessionError> {
        let (username, key) = self.read_identification().await?;
        self.advance(HandshakeState::IdentitySent);

        self.negotiate_extensions().await?;
        self.advance(HandshakeState::ExtensionNegotiated);

        self.handle.send(&ServerPacket::ServerIdentification {
            protocol_version: PROTOCOL_VERSION,
            name: self.server.name().to_string(),
            motd: self.server.config().motd.clone(),
            user_type: self.server.user_type(&username),
        });

        if !self.server.verify_login(&username, &key) {
            warn!("[{}] Rejected login for {}: bad token", self.peer, username);
            return Err(SessionError::AuthenticationFailed { username });
        }
        self.advance(HandshakeState::Authenticated);

        let id = self.server.join(&username, &self.handle)?;
        self.player_id = Some(id);
        self.advance(HandshakeState::Joined);

        self.play(id).await
    }

    fn advance(&mut self, next: HandshakeState) {
        debug!("[{}] {:?} -> {:?}", self.peer, self.state, next);
        self.state = next;
    }

    async fn read_packet(&mut self) -> Result<ClientPacket, SessionError> {
        let read = ClientPacket::read(&mut self.reader);
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| SessionError::TimedOut)?
                .map_err(SessionError::from),
            None => Ok(read.await?),
        }
    }

    async fn read_identification(&mut self) -> Result<(String, String), SessionError> {
        match self.read_packet().await? {
            ClientPacket::Identification {
                protocol_version,
                username,
                verification_key,
                magic,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(ProtocolError::UnsupportedVersion(protocol_version).into());
                }
                if magic != IDENTIFICATION_MAGIC {
                    return Err(ProtocolError::InvalidMagic(magic).into());
                }
                info!("[{}] Identified as {}", self.peer, username);
                Ok((username, verification_key))
            }
            other => Err(ProtocolError::UnexpectedPacket {
                expected: protocol::ids::IDENTIFICATION,
                found: other.id(),
            }
            .into()),
        }
    }

    /// Advertises our extensions, then reads the peer's `ExtInfo` and the
    /// number of `ExtEntry` packets it declares.
    async fn negotiate_extensions(&mut self) -> Result<(), SessionError> {
        self.handle.send(&ServerPacket::ExtInfo {
            app_name: APP_NAME.to_string(),
            extension_count: SUPPORTED_EXTENSIONS.len() as i16,
        });
        for (name, version) in SUPPORTED_EXTENSIONS {
            self.handle.send(&ServerPacket::ExtEntry {
                name: name.to_string(),
                version: *version,
            });
        }

        let count = match self.read_packet().await? {
            ClientPacket::ExtInfo {
                app_name,
                extension_count,
            } => {
                if extension_count < 0 {
                    return Err(ProtocolError::InvalidExtensionCount(extension_count).into());
                }
                debug!(
                    "[{}] Client '{}' declares {} extension(s)",
                    self.peer, app_name, extension_count
                );
                extension_count
            }
            other => {
                return Err(ProtocolError::UnexpectedPacket {
                    expected: protocol::ids::EXT_INFO,
                    found: other.id(),
                }
                .into())
            }
        };

        for _ in 0..count {
            match self.read_packet().await? {
                ClientPacket::ExtEntry { name, version } => self.extensions.push((name, version)),
                other => {
                    return Err(ProtocolError::UnexpectedPacket {
                        expected: protocol::ids::EXT_ENTRY,
                        found: other.id(),
                    }
                    .into())
                }
            }
        }

        if !self.extensions.is_empty() {
            debug!("[{}] Client extensions: {:?}", self.peer, self.extensions);
        }
        Ok(())
    }

    async fn play(&mut self, id: PlayerId) -> Result<(), SessionError> {
        loop {
            match self.read_packet().await {
                Ok(packet) => self.handle_packet(id, packet),
                Err(SessionError::Protocol(ProtocolError::UnknownPacket(packet_id))) => {
                    warn!("[{}] Ignoring unknown packet 0x{:02X}", self.peer, packet_id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn handle_packet(&mut self, id: PlayerId, packet: ClientPacket) {
        match packet {
            ClientPacket::SetBlock {
                x,
                y,
                z,
                mode,
                block,
            } => {
                let block = match mode {
                    BlockMode::Destroy => AIR,
                    BlockMode::Create => block,
                };
                match self.server.set_block(x, y, z, block) {
                    Ok(()) => {}
                    Err(WorldError::OutOfBounds(..)) => {
                        warn!("[{}] Block edit outside the world at ({}, {}, {})", self.peer, x, y, z);
                    }
                    Err(e) => warn!("[{}] Block edit failed: {}", self.peer, e),
                }
            }
            ClientPacket::Position {
                position,
                yaw,
                pitch,
                ..
            } => {
                self.server.update_position(id, position, yaw, pitch);
            }
            ClientPacket::Message { long_message, text } => {
                if long_message != 0 {
                    debug!("[{}] Long-message flag {} relayed as a plain line", self.peer, long_message);
                }
                self.server.chat(id, &text);
            }
            other => {
                warn!("[{}] Unexpected packet 0x{:02X} during play", self.peer, other.id());
            }
        }
    }

    /// Removes the player, tells the peer why when the connection allows
    /// it, and drops this session's sending side.
    fn close(mut self, outcome: Result<(), SessionError>) {
        let reason = match &outcome {
            Ok(()) => None,
            Err(e) => {
                info!("[{}] Session ended: {}", self.peer, e);
                e.disconnect_reason()
            }
        };

        if let Some(id) = self.player_id.take() {
            self.server.leave(id);
        }
        if let Some(reason) = reason {
            self.handle.send(&ServerPacket::Disconnect { reason });
        }

        self.advance(HandshakeState::Closed);
        info!("[{}] Disconnected", self.peer);
    }
}

/// Drains the outbound queue into the socket. Ends when every sender is gone
/// or a write fails.
async fn write_loop<W>(
    mut socket: WriteHalf<W>,
    mut rx: mpsc::Receiver<Frame>,
    timeout: Option<Duration>,
    peer: SocketAddr,
) -> Result<(), SessionError>
where
    W: AsyncWrite,
{
    while let Some(frame) = rx.recv().await {
        let write = socket.write_all(&frame);
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| SessionError::TimedOut)?,
            None => write.await,
        };

        if let Err(e) = result {
            debug!("[{}] Write failed: {}", peer, e);
            return Err(e.into());
        }
    }

    let _ = socket.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::server::login_token;
    use crate::world::World;
    use protocol::ids;
    use tokio::io::DuplexStream;

    fn test_server(verify_login: bool) -> Arc<Server> {
        let mut config = ServerConfig {
            verify_login,
            announce_players: false,
            ..ServerConfig::default()
        };
        config.debug.override_salt = true;
        config.debug.salt = "pepper".to_string();
        Server::with_world(config, World::flat("test", 8, 8, 8).unwrap())
    }

    fn connect(server: &Arc<Server>, port: u16) -> (DuplexStream, tokio::task::JoinHandle<()>) {
        let (client, server_side) = tokio::io::duplex(1 << 20);
        let peer = SocketAddr::from(([127, 0, 0, 1], port));
        let task = tokio::spawn(run_session(Arc::clone(server), server_side, peer));
        (client, task)
    }

    fn identification(username: &str, key: &str, magic: u8) -> Vec<u8> {
        ClientPacket::Identification {
            protocol_version: PROTOCOL_VERSION,
            username: username.to_string(),
            verification_key: key.to_string(),
            magic,
        }
        .to_bytes()
    }

    fn ext_info(count: i16) -> Vec<u8> {
        ClientPacket::ExtInfo {
            app_name: "test".to_string(),
            extension_count: count,
        }
        .to_bytes()
    }

    async fn read_until<F>(reader: &mut PacketReader<DuplexStream>, mut done: F) -> Vec<ServerPacket>
    where
        F: FnMut(&ServerPacket) -> bool,
    {
        let mut packets = Vec::new();
        loop {
            let packet = ServerPacket::read(reader).await.unwrap();
            let stop = done(&packet);
            packets.push(packet);
            if stop {
                return packets;
            }
        }
    }

    #[tokio::test]
    async fn test_handshake_order() {
        let server = test_server(false);
        let (mut client, _task) = connect(&server, 1);

        client.write_all(&identification("alice", "-", IDENTIFICATION_MAGIC)).await.unwrap();
        client.write_all(&ext_info(1)).await.unwrap();
        client
            .write_all(
                &ClientPacket::ExtEntry {
                    name: "EmoteFix".to_string(),
                    version: 1,
                }
                .to_bytes(),
            )
            .await
            .unwrap();

        let mut reader = PacketReader::new(client);
        let packets = read_until(&mut reader, |p| matches!(p, ServerPacket::LevelFinalize { .. })).await;

        let order: Vec<u8> = packets.iter().take(4).map(|p| p.id()).collect();
        assert_eq!(
            order,
            vec![ids::EXT_INFO, ids::EXT_ENTRY, ids::IDENTIFICATION, ids::LEVEL_INIT]
        );
        assert_eq!(
            packets.last(),
            Some(&ServerPacket::LevelFinalize { x: 8, y: 8, z: 8 })
        );
        assert_eq!(server.player_count(), 1);
    }

    #[tokio::test]
    async fn test_bad_magic_closes_without_packet() {
        let server = test_server(false);
        let (mut client, task) = connect(&server, 1);

        client.write_all(&identification("alice", "-", 0x00)).await.unwrap();
        task.await.unwrap();

        let mut rest = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(server.player_count(), 0);
    }

    #[tokio::test]
    async fn test_negative_extension_count_is_violation() {
        let server = test_server(false);
        let (mut client, task) = connect(&server, 1);

        client.write_all(&identification("alice", "-", IDENTIFICATION_MAGIC)).await.unwrap();
        client.write_all(&ext_info(-1)).await.unwrap();
        task.await.unwrap();

        let mut reader = PacketReader::new(client);
        let packets = read_until(&mut reader, |p| matches!(p, ServerPacket::ExtEntry { .. })).await;
        assert_eq!(packets.len(), 2);
        assert!(ServerPacket::read(&mut reader).await.is_err());
        assert_eq!(server.player_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_token_gets_disconnect_reason() {
        let server = test_server(true);
        let (mut client, _task) = connect(&server, 1);

        client.write_all(&identification("alice", "wrong", IDENTIFICATION_MAGIC)).await.unwrap();
        client.write_all(&ext_info(0)).await.unwrap();

        let mut reader = PacketReader::new(client);
        let packets = read_until(&mut reader, |p| matches!(p, ServerPacket::Disconnect { .. })).await;
        assert_eq!(
            packets.last(),
            Some(&ServerPacket::Disconnect {
                reason: "Invalid Mppass. Please authenticate.".to_string()
            })
        );
        assert_eq!(server.player_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_joins() {
        let server = test_server(true);
        let (mut client, _task) = connect(&server, 1);

        let key = login_token("pepper", "alice");
        client.write_all(&identification("alice", &key, IDENTIFICATION_MAGIC)).await.unwrap();
        client.write_all(&ext_info(0)).await.unwrap();

        let mut reader = PacketReader::new(client);
        read_until(&mut reader, |p| matches!(p, ServerPacket::LevelFinalize { .. })).await;
        assert_eq!(server.player_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_packet_is_tolerated_and_eof_tears_down() {
        let server = test_server(false);
        let (mut client, task) = connect(&server, 1);

        client.write_all(&identification("alice", "-", IDENTIFICATION_MAGIC)).await.unwrap();
        client.write_all(&ext_info(0)).await.unwrap();
        client.write_all(&[0x7F]).await.unwrap();
        client
            .write_all(
                &ClientPacket::SetBlock {
                    x: 2,
                    y: 7,
                    z: 2,
                    mode: BlockMode::Create,
                    block: 5,
                }
                .to_bytes(),
            )
            .await
            .unwrap();

        let mut reader = PacketReader::new(client);
        let packets = read_until(&mut reader, |p| matches!(p, ServerPacket::SetBlock { .. })).await;
        assert_eq!(
            packets.last(),
            Some(&ServerPacket::SetBlock { x: 2, y: 7, z: 2, block: 5 })
        );

        drop(reader);
        task.await.unwrap();
        assert_eq!(server.player_count(), 0);
        assert_eq!(server.block_at(2, 7, 2), Some(5));
    }

    #[tokio::test]
    async fn test_kick_sends_reason() {
        let server = test_server(false);
        let (mut client, task) = connect(&server, 1);

        client.write_all(&identification("alice", "-", IDENTIFICATION_MAGIC)).await.unwrap();
        client.write_all(&ext_info(0)).await.unwrap();

        let mut reader = PacketReader::new(client);
        read_until(&mut reader, |p| matches!(p, ServerPacket::LevelFinalize { .. })).await;

        let handle = server.player(1).unwrap().session;
        handle.kick("Bye now");
        drop(handle);

        let packets = read_until(&mut reader, |p| matches!(p, ServerPacket::Disconnect { .. })).await;
        assert_eq!(
            packets.last(),
            Some(&ServerPacket::Disconnect {
                reason: "Bye now".to_string()
            })
        );
        task.await.unwrap();
        assert_eq!(server.player_count(), 0);
    }

    #[tokio::test]
    async fn test_kick_closes_transport_of_stalled_peer() {
        let server = test_server(false);
        let (mut client, server_side) = tokio::io::duplex(256);
        let peer = SocketAddr::from(([127, 0, 0, 1], 1));
        let task = tokio::spawn(run_session(Arc::clone(&server), server_side, peer));

        client.write_all(&identification("alice", "-", IDENTIFICATION_MAGIC)).await.unwrap();
        client.write_all(&ext_info(0)).await.unwrap();

        // The level alone exceeds the pipe, so the writer stalls on a peer
        // that never reads.
        tokio::time::timeout(Duration::from_secs(5), async {
            while server.player_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let handle = server.player(1).unwrap().session;
        handle.kick("Too slow");
        drop(handle);

        tokio::time::timeout(DISCONNECT_GRACE * 5, task).await.unwrap().unwrap();
        assert_eq!(server.player_count(), 0);
        assert!(client.write_all(&[0u8; 16]).await.is_err());
    }
}
