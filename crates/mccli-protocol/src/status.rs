//! Status report returned by repeaters and room servers.

use crate::error::ProtocolError;
use crate::reader::Reader;

/// Decoded payload of a status response push.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusReport {
    /// Battery voltage in millivolts.
    pub battery_mv: u16,
    /// Packets waiting to be transmitted.
    pub tx_queue_len: u16,
    /// Free slots in the packet pool.
    pub free_queue_len: u16,
    /// RSSI of the last received packet.
    pub last_rssi: i16,
    /// Packets received.
    pub packets_recv: u32,
    /// Packets sent.
    pub packets_sent: u32,
    /// Total TX airtime in seconds.
    pub airtime_secs: u32,
    /// Uptime in seconds.
    pub uptime_secs: u32,
    /// Flood packets sent.
    pub sent_flood: u32,
    /// Direct packets sent.
    pub sent_direct: u32,
    /// Flood packets received.
    pub recv_flood: u32,
    /// Direct packets received.
    pub recv_direct: u32,
    /// Number of times the queue was full.
    pub full_events: u16,
    /// SNR of the last received packet, scaled by 4.
    pub last_snr_x4: i16,
    /// Duplicate direct packets dropped.
    pub direct_dups: u16,
    /// Duplicate flood packets dropped.
    pub flood_dups: u16,
}

impl StatusReport {
    /// Size of the report on the wire.
    pub const SIZE: usize = 48;

    /// Decode the data carried by a status response push.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(data);
        Ok(StatusReport {
            battery_mv: r.u16()?,
            tx_queue_len: r.u16()?,
            free_queue_len: r.u16()?,
            last_rssi: r.i16()?,
            packets_recv: r.u32()?,
            packets_sent: r.u32()?,
            airtime_secs: r.u32()?,
            uptime_secs: r.u32()?,
            sent_flood: r.u32()?,
            sent_direct: r.u32()?,
            recv_flood: r.u32()?,
            recv_direct: r.u32()?,
            full_events: r.u16()?,
            last_snr_x4: r.i16()?,
            direct_dups: r.u16()?,
            flood_dups: r.u16()?,
        })
    }

    /// Last SNR in dB.
    pub fn last_snr(&self) -> f32 {
        self.last_snr_x4 as f32 / 4.0
    }
}
