//! Common types used in the protocol.

use crate::constants::*;

/// A 32-byte public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PublicKey(pub [u8; PUB_KEY_SIZE]);

impl PublicKey {
    /// Create from a slice. Returns None if slice is wrong length.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; PUB_KEY_SIZE]>::try_from(slice).ok().map(PublicKey)
    }

    /// The 6-byte prefix used to address messages.
    pub fn prefix(&self) -> PublicKeyPrefix {
        PublicKeyPrefix::from(self)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; PUB_KEY_SIZE] {
        &self.0
    }

    /// Get the bytes as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether the key starts with the given bytes.
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 6-byte public key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PublicKeyPrefix(pub [u8; PUB_KEY_PREFIX_SIZE]);

impl PublicKeyPrefix {
    /// Take the first six bytes of a slice. Returns None if it is shorter.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        slice
            .get(..PUB_KEY_PREFIX_SIZE)
            .and_then(|s| <[u8; PUB_KEY_PREFIX_SIZE]>::try_from(s).ok())
            .map(PublicKeyPrefix)
    }

    /// Parse a hex string of at least six bytes; extra bytes are ignored.
    pub fn from_hex(text: &str) -> Option<Self> {
        hex::decode(text).ok().and_then(|bytes| Self::from_slice(&bytes))
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; PUB_KEY_PREFIX_SIZE] {
        &self.0
    }

    /// Get the bytes as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<&PublicKey> for PublicKeyPrefix {
    fn from(key: &PublicKey) -> Self {
        let mut prefix = [0u8; PUB_KEY_PREFIX_SIZE];
        prefix.copy_from_slice(&key.0[..PUB_KEY_PREFIX_SIZE]);
        PublicKeyPrefix(prefix)
    }
}

/// What kind of node a contact is, from its advert type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    /// Companion / chat node.
    Chat,
    /// Repeater.
    Repeater,
    /// Room server.
    RoomServer,
    /// Anything else.
    Other(u8),
}

impl From<u8> for ContactKind {
    fn from(value: u8) -> Self {
        match value {
            ADV_TYPE_CHAT => ContactKind::Chat,
            ADV_TYPE_REPEATER => ContactKind::Repeater,
            ADV_TYPE_ROOM_SERVER => ContactKind::RoomServer,
            other => ContactKind::Other(other),
        }
    }
}

impl ContactKind {
    /// Short label used when listing contacts.
    pub fn label(&self) -> &'static str {
        match self {
            ContactKind::Chat => "CLI",
            ContactKind::Repeater => "REP",
            ContactKind::RoomServer => "ROOM",
            ContactKind::Other(_) => "?",
        }
    }

    /// Repeaters and room servers take remote CLI commands rather than chat.
    pub fn accepts_commands(&self) -> bool {
        matches!(self, ContactKind::Repeater | ContactKind::RoomServer)
    }
}

/// Contact information stored on the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactInfo {
    /// Contact's public key.
    pub public_key: PublicKey,
    /// Advert type (see `ADV_TYPE_*`).
    pub contact_type: u8,
    /// Contact flags.
    pub flags: u8,
    /// Outbound path length (-1 if unknown/flood).
    pub out_path_len: i8,
    /// Outbound path data.
    pub out_path: [u8; MAX_PATH_SIZE],
    /// Advertised name.
    pub name: String,
    /// Timestamp of last advertisement.
    pub last_advert_timestamp: u32,
    /// GPS latitude (microdegrees).
    pub gps_lat: i32,
    /// GPS longitude (microdegrees).
    pub gps_lon: i32,
    /// Last modification timestamp.
    pub lastmod: u32,
}

impl Default for ContactInfo {
    fn default() -> Self {
        ContactInfo {
            public_key: PublicKey::default(),
            contact_type: ADV_TYPE_CHAT,
            flags: 0,
            out_path_len: -1,
            out_path: [0u8; MAX_PATH_SIZE],
            name: String::new(),
            last_advert_timestamp: 0,
            gps_lat: 0,
            gps_lon: 0,
            lastmod: 0,
        }
    }
}

impl ContactInfo {
    /// Node kind derived from the advert type.
    pub fn kind(&self) -> ContactKind {
        ContactKind::from(self.contact_type)
    }

    /// Get latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.gps_lat as f64 / 1_000_000.0
    }

    /// Get longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.gps_lon as f64 / 1_000_000.0
    }

    /// Check if the contact has a known direct path.
    pub fn has_direct_path(&self) -> bool {
        self.out_path_len >= 0
    }

    /// The known part of the outbound path.
    pub fn path(&self) -> &[u8] {
        let len = (self.out_path_len.max(0) as usize).min(MAX_PATH_SIZE);
        &self.out_path[..len]
    }

    /// Replace the outbound path; an empty path means flood.
    pub fn set_path(&mut self, path: &[u8]) {
        let len = path.len().min(MAX_PATH_SIZE);
        self.out_path = [0u8; MAX_PATH_SIZE];
        self.out_path[..len].copy_from_slice(&path[..len]);
        self.out_path_len = if len == 0 { -1 } else { len as i8 };
    }
}

/// Channel details.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelInfo {
    /// Channel index (0-based).
    pub index: u8,
    /// Channel name.
    pub name: String,
    /// Channel secret key.
    pub secret: [u8; 16],
}

/// Self/node information returned by CMD_APP_START.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelfInfo {
    /// Node advertisement type.
    pub advert_type: u8,
    /// Current TX power in dBm.
    pub tx_power_dbm: u8,
    /// Maximum TX power supported.
    pub max_tx_power_dbm: u8,
    /// Node's public key.
    pub public_key: PublicKey,
    /// GPS latitude (microdegrees).
    pub gps_lat: i32,
    /// GPS longitude (microdegrees).
    pub gps_lon: i32,
    /// Multi-ACK count.
    pub multi_acks: u8,
    /// Advertisement location policy.
    pub advert_loc_policy: u8,
    /// Telemetry modes packed byte.
    pub telemetry_modes: u8,
    /// Manual add contacts flag.
    pub manual_add_contacts: u8,
    /// Radio frequency in kHz.
    pub freq_khz: u32,
    /// Radio bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// Spreading factor.
    pub spreading_factor: u8,
    /// Coding rate.
    pub coding_rate: u8,
    /// Node name.
    pub node_name: String,
}

impl SelfInfo {
    /// Get latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.gps_lat as f64 / 1_000_000.0
    }

    /// Get longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.gps_lon as f64 / 1_000_000.0
    }

    /// Get frequency in MHz.
    pub fn frequency_mhz(&self) -> f64 {
        self.freq_khz as f64 / 1000.0
    }

    /// Get bandwidth in kHz.
    pub fn bandwidth_khz(&self) -> f64 {
        self.bandwidth_hz as f64 / 1000.0
    }
}

/// Device information returned by CMD_DEVICE_QUERY.
///
/// Firmware older than protocol version 3 only reports the version code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    /// Firmware version code.
    pub firmware_version_code: u8,
    /// Maximum contacts / 2.
    pub max_contacts_half: u8,
    /// Maximum group channels.
    pub max_group_channels: u8,
    /// BLE PIN code.
    pub ble_pin: u32,
    /// Firmware build date.
    pub build_date: String,
    /// Manufacturer / model name.
    pub manufacturer: String,
    /// Firmware version string.
    pub firmware_version: String,
}

impl DeviceInfo {
    /// Get the maximum number of contacts supported.
    pub fn max_contacts(&self) -> usize {
        (self.max_contacts_half as usize) * 2
    }
}

/// Radio parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioParams {
    /// Frequency in kHz.
    pub freq_khz: u32,
    /// Bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// Spreading factor (5-12).
    pub spreading_factor: u8,
    /// Coding rate (5-8).
    pub coding_rate: u8,
}

impl RadioParams {
    /// Build from the user-facing units: MHz and kHz.
    pub fn from_mhz(freq_mhz: f64, bandwidth_khz: f64, spreading_factor: u8, coding_rate: u8) -> Self {
        RadioParams {
            freq_khz: (freq_mhz * 1000.0).round() as u32,
            bandwidth_hz: (bandwidth_khz * 1000.0).round() as u32,
            spreading_factor,
            coding_rate,
        }
    }
}

/// Tuning parameters, each scaled by 1000 on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningParams {
    /// RX delay base (scaled by 1000).
    pub rx_delay_base: u32,
    /// Airtime factor (scaled by 1000).
    pub airtime_factor: u32,
}

/// Battery and storage information.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryAndStorage {
    /// Battery voltage in millivolts.
    pub battery_millivolts: u16,
    /// Storage used in KB, when the firmware reports it.
    pub storage_used_kb: Option<u32>,
    /// Total storage in KB, when the firmware reports it.
    pub storage_total_kb: Option<u32>,
}

impl BatteryAndStorage {
    /// Get battery voltage in volts.
    pub fn battery_volts(&self) -> f32 {
        self.battery_millivolts as f32 / 1000.0
    }
}

/// Message type for text messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextType {
    /// Plain text message.
    Plain,
    /// Remote CLI command or reply.
    CliData,
    /// Signed plain text.
    SignedPlain,
    /// Unknown type.
    Unknown(u8),
}

impl From<u8> for TextType {
    fn from(value: u8) -> Self {
        match value {
            TXT_TYPE_PLAIN => TextType::Plain,
            TXT_TYPE_CLI_DATA => TextType::CliData,
            TXT_TYPE_SIGNED_PLAIN => TextType::SignedPlain,
            _ => TextType::Unknown(value),
        }
    }
}

impl From<TextType> for u8 {
    fn from(value: TextType) -> Self {
        match value {
            TextType::Plain => TXT_TYPE_PLAIN,
            TextType::CliData => TXT_TYPE_CLI_DATA,
            TextType::SignedPlain => TXT_TYPE_SIGNED_PLAIN,
            TextType::Unknown(v) => v,
        }
    }
}

/// A text message from a contact, popped from the offline queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedContactMessage {
    /// Sender's public key prefix.
    pub sender_prefix: PublicKeyPrefix,
    /// Path length (0xFF = flood).
    pub path_len: u8,
    /// Message type.
    pub text_type: TextType,
    /// Sender's timestamp.
    pub timestamp: u32,
    /// SNR scaled by 4 (v3+ only).
    pub snr_x4: Option<i8>,
    /// Signature bytes of signed messages.
    pub signature: Vec<u8>,
    /// Message text.
    pub text: String,
}

impl ReceivedContactMessage {
    /// Get the SNR in dB (if available).
    pub fn snr(&self) -> Option<f32> {
        self.snr_x4.map(|s| s as f32 / 4.0)
    }

    /// Check if this was a flood message.
    pub fn is_flood(&self) -> bool {
        self.path_len == 0xFF
    }
}

/// A text message received on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedChannelMessage {
    /// Channel index.
    pub channel_idx: u8,
    /// Path length (0xFF = flood).
    pub path_len: u8,
    /// Message type.
    pub text_type: TextType,
    /// Sender's timestamp.
    pub timestamp: u32,
    /// SNR scaled by 4 (v3+ only).
    pub snr_x4: Option<i8>,
    /// Message text, usually `"<sender>: <text>"`.
    pub text: String,
}

impl ReceivedChannelMessage {
    /// Get the SNR in dB (if available).
    pub fn snr(&self) -> Option<f32> {
        self.snr_x4.map(|s| s as f32 / 4.0)
    }
}
