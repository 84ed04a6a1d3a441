//! The shared server context.
//!
//! One [`Server`] owns the world, the player registry and the scheduler. It
//! is handed to every session task and scheduler task as an `Arc`, so several
//! independent servers can live in one process.
//!
//! Lock order is always world, then players. Join and block edits enqueue
//! while still holding the world lock: a newcomer either sees an edit in its
//! level snapshot or receives the echo afterwards, and every session gets
//! edits in the order they were applied. Enqueueing never blocks.
//!
//! Join compresses the whole level under the world read lock, so block
//! edits wait for it. That costs tens of milliseconds for a 256³ level in
//! release builds and grows with how noisy the terrain is.

use crate::broadcast::{deliver, encode, SessionHandle};
use crate::chat::{format_chat, join_notice, leave_notice, online_summary, rewrite_colors, wrap_lines};
use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::players::{PlayerId, PlayerRecord, PlayerRegistry};
use crate::scheduler::Scheduler;
use crate::session::run_session;
use crate::world::{World, WorldError};
use log::{debug, error, info};
use md5::{Digest, Md5};
use parking_lot::RwLock;
use protocol::{Position, ServerPacket, SELF_ID, STRING_LENGTH, USER_TYPE_NORMAL, USER_TYPE_OPERATOR};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const SALT_LENGTH: usize = 16;
pub const ANNOUNCE_TASK: &str = "announce-players";

pub struct Server {
    config: ServerConfig,
    world: RwLock<World>,
    players: RwLock<PlayerRegistry>,
    scheduler: Scheduler,
    salt: String,
}

/// A random alphanumeric secret used to verify logins.
pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

/// Lowercase hex MD5 of `salt + username`, the token clients present.
pub fn login_token(salt: &str, username: &str) -> String {
    let digest = Md5::digest(format!("{}{}", salt, username).as_bytes());
    format!("{:x}", digest)
}

impl Server {
    /// Builds the world described by `config.level` and registers the
    /// periodic tasks.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, WorldError> {
        let level = &config.level;
        let world = World::flat(&level.name, level.width, level.height, level.length)?;
        Ok(Self::with_world(config, world))
    }

    pub fn with_world(config: ServerConfig, world: World) -> Arc<Self> {
        let salt = if config.debug.override_salt {
            config.debug.salt.clone()
        } else {
            generate_salt()
        };

        let server = Arc::new(Self {
            players: RwLock::new(PlayerRegistry::new(config.max_users)),
            world: RwLock::new(world),
            scheduler: Scheduler::new(),
            salt,
            config,
        });
        server.register_default_tasks();
        server
    }

    fn register_default_tasks(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let every = Duration::from_secs(self.config.announce_interval_secs);

        let added = self.scheduler.add_task(ANNOUNCE_TASK, every, true, move || {
            if let Some(server) = weak.upgrade() {
                server.announce_players();
            }
            Ok(())
        });
        if let Err(e) = added {
            error!("Failed to register task: {}", e);
            return;
        }

        if !self.config.announce_players {
            let _ = self.scheduler.disable(ANNOUNCE_TASK);
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn name(&self) -> &str {
        &self.config.server_name
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn is_public(&self) -> bool {
        self.config.public
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn max_users(&self) -> usize {
        self.players.read().max_users()
    }

    pub fn player_count(&self) -> usize {
        self.players.read().len()
    }

    pub fn player_names(&self) -> Vec<String> {
        self.players.read().names()
    }

    pub fn player(&self, id: PlayerId) -> Option<PlayerRecord> {
        self.players.read().get(id).cloned()
    }

    pub fn world_size(&self) -> (i16, i16, i16) {
        self.world.read().size()
    }

    pub fn block_at(&self, x: i16, y: i16, z: i16) -> Option<u8> {
        self.world.read().get_block(x, y, z)
    }

    pub fn user_type(&self, username: &str) -> u8 {
        if self.config.is_operator(username) {
            USER_TYPE_OPERATOR
        } else {
            USER_TYPE_NORMAL
        }
    }

    /// Checks a login token. Always passes when verification is off.
    pub fn verify_login(&self, username: &str, key: &str) -> bool {
        !self.config.verify_login || login_token(&self.salt, username) == key
    }

    /// Admits a session: queues the level, the spawns it needs to see and
    /// announces it to everyone else.
    pub fn join(&self, username: &str, session: &SessionHandle) -> Result<PlayerId, SessionError> {
        let world = self.world.read();
        let mut frame = world.level_sequence()?;
        let spawn = world.spawn();

        let mut players = self.players.write();
        let record = players.admit(username, spawn, session.clone())?;
        let id = record.id;
        let announce = encode(&record.spawn_packet());

        ServerPacket::SpawnPlayer {
            player_id: SELF_ID,
            name: username.to_string(),
            position: spawn,
            yaw: 0,
            pitch: 0,
        }
        .encode(&mut frame);
        for other in players.iter().filter(|other| other.id != id) {
            other.spawn_packet().encode(&mut frame);
        }
        session.send_frame(Arc::from(frame));

        let others = players.recipients(Some(id));
        deliver(&others, &announce);

        let notice = encode(&ServerPacket::Message {
            player_id: SELF_ID,
            text: join_notice(username),
        });
        deliver(&players.recipients(None), &notice);

        info!("{} joined as player {} ({})", username, id, session.peer());
        Ok(id)
    }

    /// Removes a player and tells everyone left. Returns the removed record.
    pub fn leave(&self, id: PlayerId) -> Option<PlayerRecord> {
        let mut players = self.players.write();
        let record = players.remove(id)?;
        let remaining = players.recipients(None);

        deliver(&remaining, &encode(&ServerPacket::DespawnPlayer { player_id: id }));
        deliver(
            &remaining,
            &encode(&ServerPacket::Message {
                player_id: SELF_ID,
                text: leave_notice(&record.name),
            }),
        );
        drop(players);

        info!("{} left the game (player {})", record.name, id);
        Some(record)
    }

    /// Writes one block and echoes it to every joined session.
    pub fn set_block(&self, x: i16, y: i16, z: i16, block: u8) -> Result<(), WorldError> {
        let frame = encode(&ServerPacket::SetBlock { x, y, z, block });

        let mut world = self.world.write();
        world.set_block(x, y, z, block)?;
        let recipients = self.players.read().recipients(None);
        deliver(&recipients, &frame);
        Ok(())
    }

    /// Stores a movement and relays it to everyone but the mover. Returns
    /// false when nothing changed.
    pub fn update_position(&self, id: PlayerId, position: Position, yaw: u8, pitch: u8) -> bool {
        let (packet, recipients) = {
            let mut players = self.players.write();
            let Some(record) = players.update_pose(id, position, yaw, pitch) else {
                return false;
            };
            let packet = record.teleport_packet();
            (packet, players.recipients(Some(id)))
        };

        deliver(&recipients, &encode(&packet));
        true
    }

    /// Broadcasts a player's chat line to everyone, the sender included.
    pub fn chat(&self, id: PlayerId, message: &str) {
        let Some(name) = self.players.read().get(id).map(|record| record.name.clone()) else {
            return;
        };

        let line = format_chat(&name, message);
        info!("[chat] {}", line);
        self.broadcast(
            &ServerPacket::Message {
                player_id: id,
                text: line,
            },
            None,
        );
    }

    /// Sends `packet` to every joined session except `exclude`.
    pub fn broadcast(&self, packet: &ServerPacket, exclude: Option<PlayerId>) -> usize {
        let recipients = self.players.read().recipients(exclude);
        deliver(&recipients, &encode(packet))
    }

    /// Server announcement from the console. Returns the number of lines sent.
    pub fn announce(&self, text: &str) -> usize {
        let lines = wrap_lines(&rewrite_colors(text), STRING_LENGTH);
        for line in &lines {
            info!("[announce] {}", line);
            self.broadcast(
                &ServerPacket::Message {
                    player_id: SELF_ID,
                    text: line.clone(),
                },
                None,
            );
        }
        lines.len()
    }

    fn announce_players(&self) {
        match online_summary(&self.player_names()) {
            Some(summary) => {
                self.announce(&summary);
            }
            None => debug!("Nobody online; skipping player announcement"),
        }
    }

    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        info!("Listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Accept loop. Each connection gets its own session task.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("[{}] Could not set TCP_NODELAY: {}", peer, e);
                    }
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        run_session(server, stream, peer).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    pub fn spawn_scheduler(self: &Arc<Self>) -> JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(async move { server.scheduler.run().await })
    }
}
