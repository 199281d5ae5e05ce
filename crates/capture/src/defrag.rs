use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Read-only view over an IPv4 header plus payload, borrowed from a
/// packet slot's `ip_payload()`. Options are not parsed; `ihl_bytes`
/// already accounts for them when locating the payload.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4View<'a> {
    bytes: &'a [u8],
}

impl<'a> Ipv4View<'a> {
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < 20 {
            return None;
        }
        let version = bytes[0] >> 4;
        if version != 4 {
            return None;
        }
        let view = Self { bytes };
        if view.ihl_bytes() < 20 || view.ihl_bytes() > bytes.len() {
            return None;
        }
        Some(view)
    }

    pub fn ihl_bytes(&self) -> usize {
        (self.bytes[0] & 0x0f) as usize * 4
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.bytes[4], self.bytes[5]])
    }

    fn flags_frag(&self) -> u16 {
        u16::from_be_bytes([self.bytes[6], self.bytes[7]])
    }

    pub fn more_fragments(&self) -> bool {
        self.flags_frag() & 0x2000 != 0
    }

    pub fn fragment_offset_bytes(&self) -> usize {
        (self.flags_frag() & 0x1fff) as usize * 8
    }

    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset_bytes() != 0
    }

    pub fn protocol(&self) -> u8 {
        self.bytes[9]
    }

    pub fn src(&self) -> [u8; 4] {
        self.bytes[12..16].try_into().expect("checked length")
    }

    pub fn dst(&self) -> [u8; 4] {
        self.bytes[16..20].try_into().expect("checked length")
    }

    pub fn header(&self) -> &'a [u8] {
        &self.bytes[..self.ihl_bytes()]
    }

    /// Payload beyond the IP header, truncated to the header's own claimed
    /// `total_length` (the capture device may have appended link-layer
    /// padding past the datagram's real end).
    pub fn fragment_payload(&self) -> &'a [u8] {
        let ihl = self.ihl_bytes();
        let end = (self.total_length() as usize).min(self.bytes.len());
        if end <= ihl {
            &[]
        } else {
            &self.bytes[ihl..end]
        }
    }

    pub fn whole_datagram(&self) -> &'a [u8] {
        let end = (self.total_length() as usize).min(self.bytes.len());
        &self.bytes[..end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FragKey {
    src: [u8; 4],
    dst: [u8; 4],
    ip_id: u16,
    protocol: u8,
}

struct Reassembly {
    header: Vec<u8>,
    fragments: BTreeMap<usize, Vec<u8>>,
    total_len: Option<usize>,
    last_touched: Instant,
}

impl Reassembly {
    fn is_complete(&self) -> bool {
        let Some(total_len) = self.total_len else {
            return false;
        };
        let mut covered = 0usize;
        for (&offset, bytes) in &self.fragments {
            if offset != covered {
                return false;
            }
            covered += bytes.len();
        }
        covered == total_len
    }

    fn assemble(&self) -> Vec<u8> {
        let mut out = self.header.clone();
        for bytes in self.fragments.values() {
            out.extend_from_slice(bytes);
        }
        let total_length = (out.len() as u16).to_be_bytes();
        out[2] = total_length[0];
        out[3] = total_length[1];
        out[6] = 0;
        out[7] = 0;
        out
    }
}

/// Reassembles fragmented IPv4 datagrams keyed by (src, dst, ip-id,
/// protocol), with periodic pruning of stale, incomplete reassemblies.
///
/// Non-fragmented packets pass straight through without entering the
/// table at all.
pub struct Defragmenter {
    table: HashMap<FragKey, Reassembly>,
    max_age: Duration,
    last_prune: Instant,
    prune_interval: Duration,
}

impl Defragmenter {
    pub fn new(prune_interval: Duration, max_age: Duration) -> Self {
        Self {
            table: HashMap::new(),
            max_age,
            last_prune: Instant::now(),
            prune_interval,
        }
    }

    /// Feeds one IPv4 datagram view in. Returns the reassembled (or
    /// pass-through) datagram bytes once complete, `None` while a
    /// reassembly is still collecting fragments.
    pub fn process(&mut self, ip: Ipv4View<'_>, now: Instant) -> Option<Vec<u8>> {
        if !ip.is_fragment() {
            return Some(ip.whole_datagram().to_vec());
        }

        let key = FragKey {
            src: ip.src(),
            dst: ip.dst(),
            ip_id: ip.identification(),
            protocol: ip.protocol(),
        };

        let entry = self.table.entry(key).or_insert_with(|| Reassembly {
            header: ip.header().to_vec(),
            fragments: BTreeMap::new(),
            total_len: None,
            last_touched: now,
        });

        if ip.fragment_offset_bytes() == 0 {
            entry.header = ip.header().to_vec();
        }
        entry.fragments.insert(ip.fragment_offset_bytes(), ip.fragment_payload().to_vec());
        entry.last_touched = now;
        if !ip.more_fragments() {
            entry.total_len = Some(ip.fragment_offset_bytes() + ip.fragment_payload().len());
        }

        if entry.is_complete() {
            let assembled = entry.assemble();
            self.table.remove(&key);
            Some(assembled)
        } else {
            None
        }
    }

    /// Drops reassemblies that haven't seen a fragment within `max_age`.
    /// Returns the number dropped, for the caller's drop counters.
    pub fn prune_if_due(&mut self, now: Instant) -> usize {
        if now.duration_since(self.last_prune) < self.prune_interval {
            return 0;
        }
        self.last_prune = now;
        let max_age = self.max_age;
        let before = self.table.len();
        self.table.retain(|_, r| now.duration_since(r.last_touched) < max_age);
        before - self.table.len()
    }

    pub fn pending_count(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_header(total_length: u16, ident: u16, flags_frag: u16) -> Vec<u8> {
        let mut h = vec![0u8; 20];
        h[0] = 0x45;
        h[2..4].copy_from_slice(&total_length.to_be_bytes());
        h[4..6].copy_from_slice(&ident.to_be_bytes());
        h[6..8].copy_from_slice(&flags_frag.to_be_bytes());
        h[8] = 64;
        h[9] = 17;
        h[12..16].copy_from_slice(&[10, 0, 0, 1]);
        h[16..20].copy_from_slice(&[10, 0, 0, 2]);
        h
    }

    #[test]
    fn passthrough_non_fragment() {
        let mut defrag = Defragmenter::new(Duration::from_secs(1), Duration::from_secs(1));
        let mut pkt = ipv4_header(24, 1, 0);
        pkt.extend_from_slice(&[1, 2, 3, 4]);
        let ip = Ipv4View::parse(&pkt).unwrap();
        let out = defrag.process(ip, Instant::now()).unwrap();
        assert_eq!(out, pkt);
    }

    #[test]
    fn reassembles_three_fragments() {
        let mut defrag = Defragmenter::new(Duration::from_secs(1), Duration::from_secs(1));
        let payload: Vec<u8> = (0..24u16).map(|i| i as u8).collect();

        let mut frag0 = ipv4_header(28, 7, 0x2000); // MF set, offset 0
        frag0.extend_from_slice(&payload[0..8]);
        let mut frag1 = ipv4_header(28, 7, 0x2000 | 1); // MF set, offset 8 bytes
        frag1.extend_from_slice(&payload[8..16]);
        let mut frag2 = ipv4_header(28, 7, 2); // MF clear, offset 16 bytes
        frag2.extend_from_slice(&payload[16..24]);

        let now = Instant::now();
        assert!(defrag.process(Ipv4View::parse(&frag1).unwrap(), now).is_none());
        assert!(defrag.process(Ipv4View::parse(&frag0).unwrap(), now).is_none());
        let reassembled = defrag.process(Ipv4View::parse(&frag2).unwrap(), now).unwrap();

        assert_eq!(&reassembled[20..], &payload[..]);
        assert_eq!(defrag.pending_count(), 0);
    }

    #[test]
    fn prunes_stale_incomplete_reassembly() {
        let mut defrag = Defragmenter::new(Duration::from_millis(0), Duration::from_millis(0));
        let mut frag0 = ipv4_header(28, 9, 0x2000);
        frag0.extend_from_slice(&[0u8; 8]);
        defrag.process(Ipv4View::parse(&frag0).unwrap(), Instant::now());
        assert_eq!(defrag.pending_count(), 1);

        std::thread::sleep(Duration::from_millis(1));
        let pruned = defrag.prune_if_due(Instant::now());
        assert_eq!(pruned, 1);
        assert_eq!(defrag.pending_count(), 0);
    }
}
