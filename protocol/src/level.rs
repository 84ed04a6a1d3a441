//! Splitting of a compressed level snapshot into `0x03` chunk packets.

use crate::packets::ServerPacket;
use crate::CHUNK_SIZE;

/// Number of chunk packets needed for a compressed payload of `len` bytes.
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(CHUNK_SIZE)
}

/// Percent-complete byte for the chunk at `index` out of `total`.
pub fn percent_complete(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((100.0 * (index + 1) as f64) / total as f64).round() as u8
}

/// Splits `compressed` into 1024-byte `LevelDataChunk` packets. The last
/// chunk is zero-padded on the wire but declares its true length.
pub fn level_chunks(compressed: &[u8]) -> impl Iterator<Item = ServerPacket> + '_ {
    let total = chunk_count(compressed.len());

    compressed
        .chunks(CHUNK_SIZE)
        .enumerate()
        .map(move |(index, slice)| {
            let mut data = Box::new([0u8; CHUNK_SIZE]);
            data[..slice.len()].copy_from_slice(slice);

            ServerPacket::LevelDataChunk {
                length: slice.len() as i16,
                data,
                percent: percent_complete(index, total),
            }
        })
}

/// Encodes the whole `LevelInit`, chunks, `LevelFinalize` sequence into one
/// buffer so it can be queued for a session as a single unit.
pub fn encode_level_sequence(compressed: &[u8], size: (i16, i16, i16)) -> Vec<u8> {
    let total = chunk_count(compressed.len());
    let mut buf = Vec::with_capacity(1 + total * (CHUNK_SIZE + 4) + 7);

    ServerPacket::LevelInit.encode(&mut buf);
    for chunk in level_chunks(compressed) {
        chunk.encode(&mut buf);
    }
    ServerPacket::LevelFinalize {
        x: size.0,
        y: size.1,
        z: size.2,
    }
    .encode(&mut buf);

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared_lengths(payload: &[u8]) -> Vec<(i16, u8)> {
        level_chunks(payload)
            .map(|packet| match packet {
                ServerPacket::LevelDataChunk {
                    length, percent, ..
                } => (length, percent),
                other => panic!("Unexpected packet {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_chunk_count_matches_ceil() {
        for len in [1usize, 1023, 1024, 1025, 2048, 5000, 102_400] {
            let payload = vec![7u8; len];
            let chunks = declared_lengths(&payload);
            assert_eq!(chunks.len(), len.div_ceil(1024));
            assert_eq!(chunks.len(), chunk_count(len));
        }
    }

    #[test]
    fn test_last_chunk_declares_true_length() {
        for len in [1usize, 1000, 1024, 3000, 4096] {
            let payload = vec![1u8; len];
            let chunks = declared_lengths(&payload);
            let expected = if len % 1024 == 0 { 1024 } else { len % 1024 };
            assert_eq!(chunks.last().unwrap().0 as usize, expected);
            assert!(chunks[..chunks.len() - 1].iter().all(|(l, _)| *l == 1024));
        }
    }

    #[test]
    fn test_last_chunk_is_zero_padded() {
        let payload = vec![0xAB; 1030];
        let last = level_chunks(&payload).last().unwrap();
        match last {
            ServerPacket::LevelDataChunk { data, length, .. } => {
                assert_eq!(length, 6);
                assert!(data[..6].iter().all(|&b| b == 0xAB));
                assert!(data[6..].iter().all(|&b| b == 0));
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_percent_increases_to_100() {
        for total in [1usize, 2, 3, 7, 64, 100] {
            let payload = vec![0u8; total * 1024];
            let percents: Vec<u8> = declared_lengths(&payload).iter().map(|c| c.1).collect();
            assert_eq!(*percents.last().unwrap(), 100);
            assert!(percents.windows(2).all(|w| w[0] < w[1]), "total {}", total);
        }
    }

    #[test]
    fn test_percent_rounds() {
        assert_eq!(percent_complete(0, 3), 33);
        assert_eq!(percent_complete(1, 3), 67);
        assert_eq!(percent_complete(2, 3), 100);
    }

    #[test]
    fn test_level_sequence_framing() {
        let payload = vec![5u8; 1500];
        let bytes = encode_level_sequence(&payload, (16, 8, 32));

        assert_eq!(bytes.len(), 1 + 2 * (1 + 2 + 1024 + 1) + 7);
        assert_eq!(bytes[0], crate::ids::LEVEL_INIT);
        assert_eq!(bytes[1], crate::ids::LEVEL_DATA_CHUNK);

        let tail = &bytes[bytes.len() - 7..];
        assert_eq!(tail[0], crate::ids::LEVEL_FINALIZE);
        assert_eq!(&tail[1..3], &16i16.to_be_bytes());
        assert_eq!(&tail[3..5], &8i16.to_be_bytes());
        assert_eq!(&tail[5..7], &32i16.to_be_bytes());
    }
}
