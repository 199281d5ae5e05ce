use crate::driver::{CaptureDriver, DriverStats, NextOutcome, RawPacket};
use crate::error::CaptureError;
use std::collections::VecDeque;

/// DLT_EN10MB, the libpcap link-layer type for Ethernet.
pub const DLT_EN10MB: u16 = 1;

const ETHERNET_HEADER_LEN: usize = 14;

/// Builds one Ethernet + IPv4 + UDP frame carrying `payload`, with no
/// fragmentation. Used by tests to synthesize straight-path traffic.
pub fn udp_frame(ip_id: u16, src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let udp_len = 8 + payload.len();
    let total_len = 20 + udp_len;
    let mut frame = Vec::with_capacity(ETHERNET_HEADER_LEN + total_len);
    frame.extend_from_slice(&[0u8; 12]); // dst/src mac, unused by the pipeline
    frame.extend_from_slice(&0x0800u16.to_be_bytes()); // ethertype IPv4
    frame.extend_from_slice(&ipv4_header(total_len as u16, ip_id, 0, 17, src, dst));
    frame.extend_from_slice(&udp_header(sport, dport, udp_len as u16));
    frame.extend_from_slice(payload);
    frame
}

/// Builds the Ethernet + IPv4 frames for one UDP datagram split into three
/// IP fragments, in arrival order as emitted (callers may shuffle the
/// result to exercise out-of-order reassembly).
pub fn fragmented_udp_frames(
    ip_id: u16,
    src: [u8; 4],
    dst: [u8; 4],
    sport: u16,
    dport: u16,
    payload: &[u8],
) -> Vec<Vec<u8>> {
    let mut datagram = udp_header(sport, dport, (8 + payload.len()) as u16);
    datagram.extend_from_slice(payload);

    let fragment_size = 1400usize; // multiple of 8
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < datagram.len() {
        let end = (offset + fragment_size).min(datagram.len());
        let chunk = &datagram[offset..end];
        let more_fragments = end < datagram.len();
        let flags_frag = (u16::from(more_fragments) << 13) | ((offset / 8) as u16);

        let mut frame = Vec::with_capacity(ETHERNET_HEADER_LEN + 20 + chunk.len());
        frame.extend_from_slice(&[0u8; 12]);
        frame.extend_from_slice(&0x0800u16.to_be_bytes());
        frame.extend_from_slice(&ipv4_header((20 + chunk.len()) as u16, ip_id, flags_frag, 17, src, dst));
        frame.extend_from_slice(chunk);
        frames.push(frame);

        offset = end;
    }
    frames
}

fn ipv4_header(total_length: u16, ident: u16, flags_frag: u16, protocol: u8, src: [u8; 4], dst: [u8; 4]) -> [u8; 20] {
    let mut h = [0u8; 20];
    h[0] = 0x45;
    h[2..4].copy_from_slice(&total_length.to_be_bytes());
    h[4..6].copy_from_slice(&ident.to_be_bytes());
    h[6..8].copy_from_slice(&flags_frag.to_be_bytes());
    h[8] = 64;
    h[9] = protocol;
    h[12..16].copy_from_slice(&src);
    h[16..20].copy_from_slice(&dst);
    h
}

fn udp_header(sport: u16, dport: u16, len: u16) -> [u8; 8] {
    let mut h = [0u8; 8];
    h[0..2].copy_from_slice(&sport.to_be_bytes());
    h[2..4].copy_from_slice(&dport.to_be_bytes());
    h[4..6].copy_from_slice(&len.to_be_bytes());
    h
}

/// A [`CaptureDriver`] fed from a pre-built in-memory frame list, standing
/// in for a live NIC in tests and examples.
pub struct SyntheticDriver {
    frames: VecDeque<(u64, Vec<u8>)>,
    /// Holds the most recently popped frame so `next()` can return a
    /// `RawPacket` borrowing from it, mirroring a real driver's own
    /// single-buffer-per-call contract.
    scratch: Option<(u64, Vec<u8>)>,
    dlt: u16,
    fatal_at_end: bool,
    stats: DriverStats,
}

impl SyntheticDriver {
    pub fn new(frames: Vec<(u64, Vec<u8>)>) -> Self {
        Self {
            frames: frames.into(),
            scratch: None,
            dlt: DLT_EN10MB,
            fatal_at_end: false,
            stats: DriverStats::default(),
        }
    }

    /// When set, `next()` returns [`CaptureError::Fatal`] once all queued
    /// frames are exhausted instead of yielding `Timeout` forever — lets a
    /// test exercise interface-pipeline termination deterministically.
    pub fn terminate_when_drained(mut self) -> Self {
        self.fatal_at_end = true;
        self
    }
}

impl CaptureDriver for SyntheticDriver {
    fn next(&mut self) -> Result<NextOutcome<'_>, CaptureError> {
        match self.frames.pop_front() {
            Some((ts, bytes)) => {
                self.scratch = Some((ts, bytes));
                let (ts, bytes) = self.scratch.as_ref().expect("just set");
                Ok(NextOutcome::Packet(RawPacket {
                    captured_at_us: *ts,
                    wire_len: bytes.len() as u32,
                    bytes,
                }))
            }
            None if self.fatal_at_end => Err(CaptureError::Fatal {
                interface: "synthetic".to_string(),
                message: "frame source exhausted".to_string(),
            }),
            None => Ok(NextOutcome::Timeout),
        }
    }

    fn stats(&self) -> DriverStats {
        self.stats
    }

    fn dlt(&self) -> u16 {
        self.dlt
    }
}
