//! # Wire Protocol
//!
//! Packet codec shared by the server and the headless client. The protocol is
//! a fixed binary format: every packet starts with a one-byte id followed by a
//! fixed-size body. There is no length prefix, so a reader must know the body
//! layout of every id it accepts.
//!
//! ## Primitive Types
//!
//! - Integers are big-endian (`i16` for coordinates and counts, `i32` for
//!   extension versions).
//! - Strings are always exactly 64 bytes, right-padded with ASCII spaces.
//! - Player positions are `i16` fixed-point values at 1/32 block resolution.
//!
//! ## Module Organization
//!
//! - `codec`: primitive readers/writers, fixed strings and fixed-point maths
//! - `packets`: the [`ClientPacket`] and [`ServerPacket`] variant sets
//! - `level`: splitting a compressed level snapshot into chunk packets

pub mod codec;
pub mod error;
pub mod level;
pub mod packets;

pub use codec::{from_fixed, pad_string, to_fixed, truncate_wire, unpad_string, PacketReader, WireWrite};
pub use error::{ProtocolError, ProtocolResult};
pub use level::{chunk_count, encode_level_sequence, level_chunks, percent_complete};
pub use packets::{BlockMode, ClientPacket, Position, ServerPacket};

/// Protocol version spoken by both ends of the handshake.
pub const PROTOCOL_VERSION: u8 = 0x07;
/// Trailer byte of the Identification packet announcing extension support.
pub const IDENTIFICATION_MAGIC: u8 = 0x42;
/// Length of every string on the wire.
pub const STRING_LENGTH: usize = 64;
/// Payload size of one level data chunk.
pub const CHUNK_SIZE: usize = 1024;
/// Player id meaning "yourself" in spawn packets and "the server" in messages.
pub const SELF_ID: i8 = -1;
pub const USER_TYPE_NORMAL: u8 = 0x00;
pub const USER_TYPE_OPERATOR: u8 = 0x64;

/// Packet ids. Several ids are shared by an inbound and an outbound packet.
pub mod ids {
    pub const IDENTIFICATION: u8 = 0x00;
    pub const LEVEL_INIT: u8 = 0x02;
    pub const LEVEL_DATA_CHUNK: u8 = 0x03;
    pub const LEVEL_FINALIZE: u8 = 0x04;
    pub const SET_BLOCK_CLIENT: u8 = 0x05;
    pub const SET_BLOCK_SERVER: u8 = 0x06;
    pub const SPAWN_PLAYER: u8 = 0x07;
    pub const POSITION: u8 = 0x08;
    pub const DESPAWN_PLAYER: u8 = 0x0C;
    pub const MESSAGE: u8 = 0x0D;
    pub const DISCONNECT: u8 = 0x0E;
    pub const EXT_INFO: u8 = 0x10;
    pub const EXT_ENTRY: u8 = 0x11;
}
