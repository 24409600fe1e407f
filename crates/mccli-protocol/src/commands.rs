//! Commands that can be sent to the companion device.

use crate::constants::*;
use crate::types::*;

/// Commands that can be sent to the companion device.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Query device information.
    DeviceQuery {
        /// Protocol version the app understands.
        app_version: u8,
    },

    /// Start the app connection and get self info.
    AppStart {
        /// Protocol version the app understands.
        app_version: u8,
        /// App name string.
        app_name: String,
    },

    /// Send a text message (or a remote CLI command) to a contact.
    SendTextMessage {
        /// Message type (plain, CLI data, etc.).
        text_type: TextType,
        /// Retry attempt number.
        attempt: u8,
        /// Message timestamp.
        timestamp: u32,
        /// Recipient's public key prefix.
        recipient_prefix: PublicKeyPrefix,
        /// Message text.
        text: String,
    },

    /// Send a text message to a channel.
    SendChannelTextMessage {
        /// Message type (should be Plain).
        text_type: TextType,
        /// Channel index.
        channel_idx: u8,
        /// Message timestamp.
        timestamp: u32,
        /// Message text.
        text: String,
    },

    /// Get the list of contacts.
    GetContacts {
        /// Only return contacts modified after this time.
        since: Option<u32>,
    },

    /// Get the current device time.
    GetDeviceTime,

    /// Set the device time.
    SetDeviceTime {
        /// Unix timestamp in seconds.
        time_secs: u32,
    },

    /// Send a self-advertisement.
    SendSelfAdvert {
        /// Whether to flood (true) or zero-hop (false).
        flood: bool,
    },

    /// Set the advertisement name.
    SetAdvertName {
        /// New name.
        name: String,
    },

    /// Set advertisement latitude/longitude.
    SetAdvertLatLon {
        /// Latitude in microdegrees.
        lat: i32,
        /// Longitude in microdegrees.
        lon: i32,
        /// Altitude.
        alt: i32,
    },

    /// Add or update a contact.
    AddUpdateContact {
        /// Contact information.
        contact: ContactInfo,
    },

    /// Remove a contact.
    RemoveContact {
        /// Contact's public key.
        public_key: PublicKey,
    },

    /// Reset the path to a contact.
    ResetPath {
        /// Contact's public key.
        public_key: PublicKey,
    },

    /// Share a contact via zero-hop broadcast.
    ShareContact {
        /// Contact's public key.
        public_key: PublicKey,
    },

    /// Export a contact (or self if no key provided).
    ExportContact {
        /// Contact's public key (None = export self).
        public_key: Option<PublicKey>,
    },

    /// Pop the next message from the offline queue.
    SyncNextMessage,

    /// Set radio parameters.
    SetRadioParams {
        /// Radio parameters.
        params: RadioParams,
    },

    /// Set radio TX power.
    SetRadioTxPower {
        /// TX power in dBm.
        power_dbm: u8,
    },

    /// Set tuning parameters.
    SetTuningParams {
        /// Tuning parameters.
        params: TuningParams,
    },

    /// Reboot the device. The device does not answer.
    Reboot,

    /// Get battery and storage info.
    GetBatteryAndStorage,

    /// Log into a repeater or room server.
    SendLogin {
        /// Server's public key.
        public_key: PublicKey,
        /// Password.
        password: String,
    },

    /// Ask a repeater or room server for its status.
    SendStatusRequest {
        /// Server's public key.
        public_key: PublicKey,
    },

    /// Get channel information.
    GetChannel {
        /// Channel index.
        index: u8,
    },

    /// Set BLE PIN.
    SetDevicePin {
        /// PIN code (0 = disabled, otherwise 6 digits).
        pin: u32,
    },
}

impl Command {
    /// The handshake this client sends on connect.
    pub fn app_start(app_name: &str) -> Self {
        Command::AppStart {
            app_version: APP_PROTOCOL_VERSION,
            app_name: app_name.to_string(),
        }
    }

    /// Get the command code for this command.
    pub fn code(&self) -> u8 {
        match self {
            Command::DeviceQuery { .. } => CMD_DEVICE_QUERY,
            Command::AppStart { .. } => CMD_APP_START,
            Command::SendTextMessage { .. } => CMD_SEND_TXT_MSG,
            Command::SendChannelTextMessage { .. } => CMD_SEND_CHANNEL_TXT_MSG,
            Command::GetContacts { .. } => CMD_GET_CONTACTS,
            Command::GetDeviceTime => CMD_GET_DEVICE_TIME,
            Command::SetDeviceTime { .. } => CMD_SET_DEVICE_TIME,
            Command::SendSelfAdvert { .. } => CMD_SEND_SELF_ADVERT,
            Command::SetAdvertName { .. } => CMD_SET_ADVERT_NAME,
            Command::SetAdvertLatLon { .. } => CMD_SET_ADVERT_LATLON,
            Command::AddUpdateContact { .. } => CMD_ADD_UPDATE_CONTACT,
            Command::RemoveContact { .. } => CMD_REMOVE_CONTACT,
            Command::ResetPath { .. } => CMD_RESET_PATH,
            Command::ShareContact { .. } => CMD_SHARE_CONTACT,
            Command::ExportContact { .. } => CMD_EXPORT_CONTACT,
            Command::SyncNextMessage => CMD_SYNC_NEXT_MESSAGE,
            Command::SetRadioParams { .. } => CMD_SET_RADIO_PARAMS,
            Command::SetRadioTxPower { .. } => CMD_SET_RADIO_TX_POWER,
            Command::SetTuningParams { .. } => CMD_SET_TUNING_PARAMS,
            Command::Reboot => CMD_REBOOT,
            Command::GetBatteryAndStorage => CMD_GET_BATT_AND_STORAGE,
            Command::SendLogin { .. } => CMD_SEND_LOGIN,
            Command::SendStatusRequest { .. } => CMD_SEND_STATUS_REQ,
            Command::GetChannel { .. } => CMD_GET_CHANNEL,
            Command::SetDevicePin { .. } => CMD_SET_DEVICE_PIN,
        }
    }

    /// Encode the command payload (without frame header).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
        buf.push(self.code());

        match self {
            Command::DeviceQuery { app_version } => {
                buf.push(*app_version);
            }

            Command::AppStart { app_version, app_name } => {
                buf.push(*app_version);
                buf.extend_from_slice(b"      ");
                buf.extend_from_slice(app_name.as_bytes());
            }

            Command::SendTextMessage {
                text_type,
                attempt,
                timestamp,
                recipient_prefix,
                text,
            } => {
                buf.push((*text_type).into());
                buf.push(*attempt);
                buf.extend_from_slice(&timestamp.to_le_bytes());
                buf.extend_from_slice(recipient_prefix.as_bytes());
                buf.extend_from_slice(text.as_bytes());
            }

            Command::SendChannelTextMessage {
                text_type,
                channel_idx,
                timestamp,
                text,
            } => {
                buf.push((*text_type).into());
                buf.push(*channel_idx);
                buf.extend_from_slice(&timestamp.to_le_bytes());
                buf.extend_from_slice(text.as_bytes());
            }

            Command::GetContacts { since } => {
                if let Some(since) = since {
                    buf.extend_from_slice(&since.to_le_bytes());
                }
            }

            Command::SetDeviceTime { time_secs } => {
                buf.extend_from_slice(&time_secs.to_le_bytes());
            }

            Command::SendSelfAdvert { flood } => {
                if *flood {
                    buf.push(1);
                }
            }

            Command::SetAdvertName { name } => {
                buf.extend_from_slice(name.as_bytes());
            }

            Command::SetAdvertLatLon { lat, lon, alt } => {
                buf.extend_from_slice(&lat.to_le_bytes());
                buf.extend_from_slice(&lon.to_le_bytes());
                buf.extend_from_slice(&alt.to_le_bytes());
            }

            Command::AddUpdateContact { contact } => {
                buf.extend_from_slice(contact.public_key.as_bytes());
                buf.push(contact.contact_type);
                buf.push(contact.flags);
                buf.push(contact.out_path_len as u8);
                buf.extend_from_slice(&contact.out_path);
                let mut name_buf = [0u8; NAME_FIELD_SIZE];
                let name_bytes = contact.name.as_bytes();
                let len = name_bytes.len().min(NAME_FIELD_SIZE - 1);
                name_buf[..len].copy_from_slice(&name_bytes[..len]);
                buf.extend_from_slice(&name_buf);
                buf.extend_from_slice(&contact.last_advert_timestamp.to_le_bytes());
                buf.extend_from_slice(&contact.gps_lat.to_le_bytes());
                buf.extend_from_slice(&contact.gps_lon.to_le_bytes());
                // lastmod left out so the device stamps it with its own clock
            }

            Command::RemoveContact { public_key }
            | Command::ResetPath { public_key }
            | Command::ShareContact { public_key }
            | Command::SendStatusRequest { public_key } => {
                buf.extend_from_slice(public_key.as_bytes());
            }

            Command::ExportContact { public_key } => {
                if let Some(pk) = public_key {
                    buf.extend_from_slice(pk.as_bytes());
                }
            }

            Command::SetRadioParams { params } => {
                buf.extend_from_slice(&params.freq_khz.to_le_bytes());
                buf.extend_from_slice(&params.bandwidth_hz.to_le_bytes());
                buf.push(params.spreading_factor);
                buf.push(params.coding_rate);
            }

            Command::SetRadioTxPower { power_dbm } => {
                buf.push(*power_dbm);
            }

            Command::SetTuningParams { params } => {
                buf.extend_from_slice(&params.rx_delay_base.to_le_bytes());
                buf.extend_from_slice(&params.airtime_factor.to_le_bytes());
                buf.extend_from_slice(&[0, 0]);
            }

            Command::Reboot => {
                buf.extend_from_slice(b"reboot");
            }

            Command::SendLogin { public_key, password } => {
                buf.extend_from_slice(public_key.as_bytes());
                buf.extend_from_slice(password.as_bytes());
            }

            Command::GetChannel { index } => {
                buf.push(*index);
            }

            Command::SetDevicePin { pin } => {
                buf.extend_from_slice(&pin.to_le_bytes());
            }

            Command::GetDeviceTime
            | Command::SyncNextMessage
            | Command::GetBatteryAndStorage => {}
        }

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_app_start() {
        let encoded = Command::app_start("mccli").encode();
        assert_eq!(encoded, b"\x01\x03      mccli");
    }

    #[test]
    fn test_encode_send_text_message() {
        let cmd = Command::SendTextMessage {
            text_type: TextType::Plain,
            attempt: 0,
            timestamp: 0x0102_0304,
            recipient_prefix: PublicKeyPrefix([1, 2, 3, 4, 5, 6]),
            text: "hi".to_string(),
        };
        assert_eq!(
            cmd.encode(),
            vec![CMD_SEND_TXT_MSG, 0, 0, 4, 3, 2, 1, 1, 2, 3, 4, 5, 6, b'h', b'i']
        );
    }

    #[test]
    fn test_encode_cli_command_uses_cli_text_type() {
        let cmd = Command::SendTextMessage {
            text_type: TextType::CliData,
            attempt: 0,
            timestamp: 0,
            recipient_prefix: PublicKeyPrefix::default(),
            text: "ver".to_string(),
        };
        assert_eq!(cmd.encode()[1], TXT_TYPE_CLI_DATA);
    }

    #[test]
    fn test_encode_channel_message() {
        let cmd = Command::SendChannelTextMessage {
            text_type: TextType::Plain,
            channel_idx: 2,
            timestamp: 1,
            text: "yo".to_string(),
        };
        assert_eq!(cmd.encode(), vec![CMD_SEND_CHANNEL_TXT_MSG, 0, 2, 1, 0, 0, 0, b'y', b'o']);
    }

    #[test]
    fn test_encode_reboot() {
        assert_eq!(Command::Reboot.encode(), b"\x13reboot");
    }

    #[test]
    fn test_encode_set_radio_params() {
        let cmd = Command::SetRadioParams {
            params: RadioParams::from_mhz(869.525, 250.0, 11, 5),
        };
        let encoded = cmd.encode();
        assert_eq!(encoded[0], CMD_SET_RADIO_PARAMS);
        assert_eq!(u32::from_le_bytes(encoded[1..5].try_into().unwrap()), 869_525);
        assert_eq!(u32::from_le_bytes(encoded[5..9].try_into().unwrap()), 250_000);
        assert_eq!(&encoded[9..], &[11, 5]);
    }

    #[test]
    fn test_encode_add_update_contact_layout() {
        let mut contact = ContactInfo {
            public_key: PublicKey([7u8; PUB_KEY_SIZE]),
            contact_type: ADV_TYPE_REPEATER,
            name: "relay".to_string(),
            ..Default::default()
        };
        contact.set_path(&[0xAB]);
        let encoded = Command::AddUpdateContact { contact }.encode();
        // code + key + type + flags + path_len + path + name + advert ts + lat + lon
        assert_eq!(encoded.len(), 1 + 32 + 3 + MAX_PATH_SIZE + NAME_FIELD_SIZE + 12);
        assert_eq!(encoded[35], 1);
        assert_eq!(encoded[36], 0xAB);
        assert_eq!(&encoded[100..105], b"relay");
    }

    #[test]
    fn test_encode_export_self_has_no_key() {
        assert_eq!(Command::ExportContact { public_key: None }.encode(), vec![CMD_EXPORT_CONTACT]);
    }
}
