/// A reusable fixed-capacity buffer holding one captured frame.
///
/// Capacity is fixed at construction time (the configured snap length) and
/// never grows. A slot is owned by exactly one pipeline stage at a time;
/// ownership passes along the pipeline and returns to the pool via
/// [`crate::Pool::release`] when the last consumer is done with it.
#[derive(Debug)]
pub struct PacketSlot {
    /// Wall-clock capture timestamp, microseconds.
    pub captured_at_us: u64,
    /// Original length of the frame on the wire (may exceed `captured_len`
    /// if the capture device truncated it to snaplen).
    pub wire_len: u32,
    /// Number of valid bytes in `data`.
    pub captured_len: u32,
    /// Link-layer type id (libpcap DLT_*).
    pub dlt: u16,
    /// Byte offset of the link-layer payload within `data`.
    pub link_offset: u16,
    /// Content digest, valid only after the md2 stage has run.
    pub digest: [u8; 16],
    data: Box<[u8]>,
}

impl PacketSlot {
    pub(crate) fn new(snaplen: usize) -> Self {
        Self {
            captured_at_us: 0,
            wire_len: 0,
            captured_len: 0,
            dlt: 0,
            link_offset: 0,
            digest: [0u8; 16],
            data: vec![0u8; snaplen].into_boxed_slice(),
        }
    }

    /// Bytes actually captured (`data[..captured_len]`).
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.captured_len as usize]
    }

    /// Full backing storage, writable up to the slot's snaplen capacity.
    #[inline]
    pub fn backing_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Capacity of the backing storage (the configured snap length).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Payload with the link-layer header stripped, using `link_offset`.
    #[inline]
    pub fn ip_payload(&self) -> &[u8] {
        let off = (self.link_offset as usize).min(self.captured_len as usize);
        &self.data[off..self.captured_len as usize]
    }

    /// Clears all metadata so the slot looks freshly allocated. Does not
    /// zero `data` — callers overwrite the bytes they use before reading.
    pub(crate) fn reset(&mut self) {
        self.captured_at_us = 0;
        self.wire_len = 0;
        self.captured_len = 0;
        self.dlt = 0;
        self.link_offset = 0;
        self.digest = [0u8; 16];
    }
}
