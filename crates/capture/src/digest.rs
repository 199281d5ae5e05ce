use pktbuf::PacketSlot;
use sha2::{Digest, Sha256};

/// A packet slot carrying a hasher that has consumed the first half of its
/// digest input. Produced by [`start`] (the md1 stage), consumed by
/// [`finish`] (the md2 stage) — splitting the hash across two pipeline
/// threads distributes the CPU cost and keeps each stage's working set
/// small, per §4.4.
pub struct PartialDigest {
    pub slot: PacketSlot,
    hasher: Sha256,
}

/// Bytes the digest is computed over: the IP header and payload with the
/// TTL and header checksum zeroed out, since both change hop-to-hop and
/// would defeat content-based deduplication of what is otherwise the same
/// datagram.
fn digestable_bytes(slot: &PacketSlot) -> Vec<u8> {
    let payload = slot.ip_payload();
    if payload.len() < 20 || payload[0] >> 4 != 4 {
        return payload.to_vec();
    }
    let mut buf = Vec::with_capacity(payload.len());
    buf.extend_from_slice(&payload[0..8]);
    buf.push(0); // ttl, volatile
    buf.push(payload[9]); // protocol
    buf.extend_from_slice(&[0, 0]); // header checksum, volatile
    buf.extend_from_slice(&payload[12..]);
    buf
}

fn split_point(len: usize) -> usize {
    len / 2
}

/// md1: hashes the first half of the digestable bytes.
pub fn start(slot: PacketSlot) -> PartialDigest {
    let bytes = digestable_bytes(&slot);
    let split = split_point(bytes.len());
    let mut hasher = Sha256::new();
    hasher.update(&bytes[..split]);
    PartialDigest { slot, hasher }
}

/// md2: hashes the remaining half and writes the truncated digest into the
/// slot's `digest` field.
pub fn finish(partial: PartialDigest) -> PacketSlot {
    let PartialDigest { mut slot, mut hasher } = partial;
    let bytes = digestable_bytes(&slot);
    let split = split_point(bytes.len());
    hasher.update(&bytes[split..]);
    let result = hasher.finalize();
    slot.digest.copy_from_slice(&result[..16]);
    slot
}
