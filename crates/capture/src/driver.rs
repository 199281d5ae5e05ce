use crate::error::CaptureError;

/// Driver-reported interface statistics, mirroring libpcap's `pcap_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Packets dropped by the kernel/driver because its own buffer filled.
    pub ps_drop: u64,
    /// Packets dropped by the network interface itself before reaching
    /// the driver.
    pub ps_ifdrop: u64,
}

/// One captured frame, borrowed from the driver's own buffer for the
/// duration of the call. The read stage copies it into a pool-allocated
/// [`pktbuf::PacketSlot`] before the next `next()` call may reuse it.
#[derive(Debug, Clone, Copy)]
pub struct RawPacket<'a> {
    pub captured_at_us: u64,
    /// Original length of the frame on the wire.
    pub wire_len: u32,
    pub bytes: &'a [u8],
}

/// What a driver's `next()` call produced.
#[derive(Debug, Clone, Copy)]
pub enum NextOutcome<'a> {
    Packet(RawPacket<'a>),
    /// No packet arrived within the configured read timeout. Not an
    /// error: the read stage simply loops back and tries again.
    Timeout,
}

/// The capture driver interface (§6 "Capture driver interface
/// (libpcap-shaped)"): `open` happens via the implementing type's own
/// constructor, since its arguments vary by backend (a live NIC handle vs.
/// a synthetic packet source need different setup).
pub trait CaptureDriver: Send {
    fn next(&mut self) -> Result<NextOutcome<'_>, CaptureError>;
    fn stats(&self) -> DriverStats;
    fn dlt(&self) -> u16;
}

/// Lets an orchestrator hold a heterogeneous set of drivers (real NICs
/// alongside synthetic ones in a test harness) behind one trait object
/// per interface.
impl CaptureDriver for Box<dyn CaptureDriver> {
    fn next(&mut self) -> Result<NextOutcome<'_>, CaptureError> {
        (**self).next()
    }

    fn stats(&self) -> DriverStats {
        (**self).stats()
    }

    fn dlt(&self) -> u16 {
        (**self).dlt()
    }
}
