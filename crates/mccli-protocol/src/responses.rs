//! Responses and push notifications from the companion device.

use crate::constants::*;
use crate::error::*;
use crate::reader::Reader;
use crate::types::*;

/// Replies to commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Generic OK response.
    Ok,

    /// Error response from firmware.
    Error(FirmwareErrorCode),

    /// Feature disabled.
    Disabled,

    /// Start of contacts list.
    ContactsStart {
        /// Total number of contacts.
        total_count: u32,
    },

    /// A single contact.
    Contact(ContactInfo),

    /// End of contacts list.
    EndOfContacts {
        /// Most recent lastmod timestamp.
        most_recent_lastmod: u32,
    },

    /// Self info (reply to AppStart).
    SelfInfo(SelfInfo),

    /// Message accepted for sending.
    Sent {
        /// Whether message was sent as flood.
        is_flood: bool,
        /// ACK code the confirmation push will carry.
        expected_ack: u32,
        /// Suggested time to wait for the ACK, in milliseconds.
        est_timeout_ms: u32,
    },

    /// Current time.
    CurrentTime {
        /// Unix timestamp in seconds.
        time_secs: u32,
    },

    /// Offline queue is empty.
    NoMoreMessages,

    /// Exported contact blob.
    ExportedContact {
        /// Raw advert packet.
        data: Vec<u8>,
    },

    /// Battery and storage info.
    BatteryAndStorage(BatteryAndStorage),

    /// Device info.
    DeviceInfo(DeviceInfo),

    /// Contact message popped from the queue.
    ContactMessage(ReceivedContactMessage),

    /// Channel message popped from the queue.
    ChannelMessage(ReceivedChannelMessage),

    /// Channel info.
    ChannelInfo(ChannelInfo),
}

/// Unsolicited notifications from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum PushNotification {
    /// Advertisement received from a known contact.
    Advert {
        /// Advertiser's public key.
        public_key: PublicKey,
    },

    /// Advertisement from an unknown node (when auto-add is disabled).
    NewAdvert(ContactInfo),

    /// Path to a contact was updated.
    PathUpdated {
        /// Contact's public key.
        public_key: PublicKey,
    },

    /// Message delivery confirmed.
    SendConfirmed {
        /// ACK code that was confirmed.
        ack_code: u32,
        /// Round-trip time in milliseconds.
        trip_time_ms: u32,
    },

    /// A message is waiting in the offline queue.
    MessageWaiting,

    /// Raw data received.
    RawData {
        /// SNR (scaled by 4).
        snr_x4: i8,
        /// RSSI.
        rssi: i8,
        /// Payload data.
        payload: Vec<u8>,
    },

    /// Login succeeded.
    LoginSuccess {
        /// Whether the session has admin rights.
        is_admin: bool,
        /// Server's public key prefix.
        server_prefix: PublicKeyPrefix,
    },

    /// Login failed.
    LoginFail {
        /// Server's public key prefix.
        server_prefix: PublicKeyPrefix,
    },

    /// Status report from a repeater or room server.
    StatusResponse {
        /// Server's public key prefix.
        server_prefix: PublicKeyPrefix,
        /// Raw report, decoded with [`crate::StatusReport::decode`].
        data: Vec<u8>,
    },

    /// Raw RX log line.
    LogRxData {
        /// SNR (scaled by 4).
        snr_x4: i8,
        /// RSSI.
        rssi: i8,
        /// Raw packet data.
        raw: Vec<u8>,
    },

    /// A push code this client does not interpret.
    Unknown {
        /// Push code.
        code: u8,
        /// Remaining frame bytes.
        data: Vec<u8>,
    },
}

impl PushNotification {
    /// Short name used in logs and rendered events.
    pub fn name(&self) -> &'static str {
        match self {
            PushNotification::Advert { .. } => "advert",
            PushNotification::NewAdvert(_) => "new_advert",
            PushNotification::PathUpdated { .. } => "path_updated",
            PushNotification::SendConfirmed { .. } => "send_confirmed",
            PushNotification::MessageWaiting => "message_waiting",
            PushNotification::RawData { .. } => "raw_data",
            PushNotification::LoginSuccess { .. } => "login_success",
            PushNotification::LoginFail { .. } => "login_fail",
            PushNotification::StatusResponse { .. } => "status_response",
            PushNotification::LogRxData { .. } => "log_rx_data",
            PushNotification::Unknown { .. } => "unknown",
        }
    }
}

/// Either a response or a push notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A reply to a command.
    Response(Response),
    /// An unsolicited push notification.
    Push(PushNotification),
}

impl Message {
    /// Decode a message from a frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let code = *frame.first().ok_or(ProtocolError::FrameTooShort {
            expected: 1,
            actual: 0,
        })?;

        // Push notifications have the high bit set
        if code & 0x80 != 0 {
            Ok(Message::Push(PushNotification::decode(frame)?))
        } else {
            Ok(Message::Response(Response::decode(frame)?))
        }
    }
}

impl Response {
    /// Decode a response from a frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(frame);
        let code = r.u8()?;

        let response = match code {
            RESP_CODE_OK => Response::Ok,
            RESP_CODE_ERR => Response::Error(FirmwareErrorCode::from(r.u8()?)),
            RESP_CODE_DISABLED => Response::Disabled,
            RESP_CODE_CONTACTS_START => Response::ContactsStart { total_count: r.u32()? },
            RESP_CODE_CONTACT => Response::Contact(decode_contact(&mut r)?),
            RESP_CODE_END_OF_CONTACTS => Response::EndOfContacts {
                most_recent_lastmod: if r.remaining() >= 4 { r.u32()? } else { 0 },
            },
            RESP_CODE_SELF_INFO => Response::SelfInfo(decode_self_info(&mut r)?),
            RESP_CODE_SENT => Response::Sent {
                is_flood: r.u8()? != 0,
                expected_ack: r.u32()?,
                est_timeout_ms: r.u32()?,
            },
            RESP_CODE_CURR_TIME => Response::CurrentTime { time_secs: r.u32()? },
            RESP_CODE_NO_MORE_MESSAGES => Response::NoMoreMessages,
            RESP_CODE_EXPORT_CONTACT => Response::ExportedContact { data: r.rest().to_vec() },
            RESP_CODE_BATT_AND_STORAGE => {
                let battery_millivolts = r.u16()?;
                let (storage_used_kb, storage_total_kb) = if r.remaining() >= 8 {
                    (Some(r.u32()?), Some(r.u32()?))
                } else {
                    (None, None)
                };
                Response::BatteryAndStorage(BatteryAndStorage {
                    battery_millivolts,
                    storage_used_kb,
                    storage_total_kb,
                })
            }
            RESP_CODE_DEVICE_INFO => Response::DeviceInfo(decode_device_info(&mut r)?),
            RESP_CODE_CONTACT_MSG_RECV => Response::ContactMessage(decode_contact_message(&mut r, false)?),
            RESP_CODE_CONTACT_MSG_RECV_V3 => Response::ContactMessage(decode_contact_message(&mut r, true)?),
            RESP_CODE_CHANNEL_MSG_RECV => Response::ChannelMessage(decode_channel_message(&mut r, false)?),
            RESP_CODE_CHANNEL_MSG_RECV_V3 => Response::ChannelMessage(decode_channel_message(&mut r, true)?),
            RESP_CODE_CHANNEL_INFO => Response::ChannelInfo(ChannelInfo {
                index: r.u8()?,
                name: r.padded_str(NAME_FIELD_SIZE)?,
                secret: r.array()?,
            }),
            _ => return Err(ProtocolError::UnknownResponse(code)),
        };

        Ok(response)
    }
}

impl PushNotification {
    /// Decode a push notification from a frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(frame);
        let code = r.u8()?;

        let push = match code {
            PUSH_CODE_ADVERT => PushNotification::Advert {
                public_key: PublicKey(r.array()?),
            },
            PUSH_CODE_NEW_ADVERT => PushNotification::NewAdvert(decode_contact(&mut r)?),
            PUSH_CODE_PATH_UPDATED => PushNotification::PathUpdated {
                public_key: PublicKey(r.array()?),
            },
            PUSH_CODE_SEND_CONFIRMED => PushNotification::SendConfirmed {
                ack_code: r.u32()?,
                trip_time_ms: r.u32()?,
            },
            PUSH_CODE_MSG_WAITING => PushNotification::MessageWaiting,
            PUSH_CODE_RAW_DATA => {
                let snr_x4 = r.i8()?;
                let rssi = r.i8()?;
                r.skip(1)?;
                PushNotification::RawData {
                    snr_x4,
                    rssi,
                    payload: r.rest().to_vec(),
                }
            }
            PUSH_CODE_LOGIN_SUCCESS => PushNotification::LoginSuccess {
                is_admin: r.u8()? != 0,
                server_prefix: PublicKeyPrefix(r.array()?),
            },
            PUSH_CODE_LOGIN_FAIL => {
                r.skip(1)?;
                PushNotification::LoginFail {
                    server_prefix: PublicKeyPrefix(r.array()?),
                }
            }
            PUSH_CODE_STATUS_RESPONSE => {
                r.skip(1)?;
                PushNotification::StatusResponse {
                    server_prefix: PublicKeyPrefix(r.array()?),
                    data: r.rest().to_vec(),
                }
            }
            PUSH_CODE_LOG_RX_DATA => PushNotification::LogRxData {
                snr_x4: r.i8()?,
                rssi: r.i8()?,
                raw: r.rest().to_vec(),
            },
            _ => PushNotification::Unknown {
                code,
                data: r.rest().to_vec(),
            },
        };

        Ok(push)
    }
}

// ============================================================================
// Helper decode functions
// ============================================================================

fn decode_contact(r: &mut Reader<'_>) -> Result<ContactInfo, ProtocolError> {
    let mut contact = ContactInfo {
        public_key: PublicKey(r.array()?),
        contact_type: r.u8()?,
        flags: r.u8()?,
        out_path_len: r.i8()?,
        out_path: r.array()?,
        name: r.padded_str(NAME_FIELD_SIZE)?,
        last_advert_timestamp: r.u32()?,
        ..Default::default()
    };

    if r.remaining() >= 8 {
        contact.gps_lat = r.i32()?;
        contact.gps_lon = r.i32()?;
        if r.remaining() >= 4 {
            contact.lastmod = r.u32()?;
        }
    }

    Ok(contact)
}

fn decode_self_info(r: &mut Reader<'_>) -> Result<SelfInfo, ProtocolError> {
    Ok(SelfInfo {
        advert_type: r.u8()?,
        tx_power_dbm: r.u8()?,
        max_tx_power_dbm: r.u8()?,
        public_key: PublicKey(r.array()?),
        gps_lat: r.i32()?,
        gps_lon: r.i32()?,
        multi_acks: r.u8()?,
        advert_loc_policy: r.u8()?,
        telemetry_modes: r.u8()?,
        manual_add_contacts: r.u8()?,
        freq_khz: r.u32()?,
        bandwidth_hz: r.u32()?,
        spreading_factor: r.u8()?,
        coding_rate: r.u8()?,
        node_name: r.rest_str(),
    })
}

fn decode_device_info(r: &mut Reader<'_>) -> Result<DeviceInfo, ProtocolError> {
    let firmware_version_code = r.u8()?;
    if firmware_version_code < 3 {
        return Ok(DeviceInfo {
            firmware_version_code,
            ..Default::default()
        });
    }

    Ok(DeviceInfo {
        firmware_version_code,
        max_contacts_half: r.u8()?,
        max_group_channels: r.u8()?,
        ble_pin: r.u32()?,
        build_date: r.padded_str(12)?,
        manufacturer: r.padded_str(40)?,
        firmware_version: r.padded_str(20)?,
    })
}

fn decode_contact_message(r: &mut Reader<'_>, v3: bool) -> Result<ReceivedContactMessage, ProtocolError> {
    let snr_x4 = if v3 {
        let snr = r.i8()?;
        r.skip(2)?;
        Some(snr)
    } else {
        None
    };

    let sender_prefix = PublicKeyPrefix(r.array()?);
    let path_len = r.u8()?;
    let text_type = TextType::from(r.u8()?);
    let timestamp = r.u32()?;
    let signature = if text_type == TextType::SignedPlain {
        r.take(4)?.to_vec()
    } else {
        Vec::new()
    };

    Ok(ReceivedContactMessage {
        sender_prefix,
        path_len,
        text_type,
        timestamp,
        snr_x4,
        signature,
        text: r.rest_str(),
    })
}

fn decode_channel_message(r: &mut Reader<'_>, v3: bool) -> Result<ReceivedChannelMessage, ProtocolError> {
    let snr_x4 = if v3 {
        let snr = r.i8()?;
        r.skip(2)?;
        Some(snr)
    } else {
        None
    };

    Ok(ReceivedChannelMessage {
        channel_idx: r.u8()?,
        path_len: r.u8()?,
        text_type: TextType::from(r.u8()?),
        timestamp: r.u32()?,
        snr_x4,
        text: r.rest_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_frame(code: u8, name: &str, kind: u8) -> Vec<u8> {
        let mut frame = vec![code];
        frame.extend_from_slice(&[0xAA; PUB_KEY_SIZE]);
        frame.push(kind);
        frame.push(0);
        frame.push(0xFF); // flood
        frame.extend_from_slice(&[0u8; MAX_PATH_SIZE]);
        let mut name_buf = [0u8; NAME_FIELD_SIZE];
        name_buf[..name.len()].copy_from_slice(name.as_bytes());
        frame.extend_from_slice(&name_buf);
        frame.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        frame.extend_from_slice(&45_500_000i32.to_le_bytes());
        frame.extend_from_slice(&(-73_250_000i32).to_le_bytes());
        frame.extend_from_slice(&1_700_000_100u32.to_le_bytes());
        frame
    }

    #[test]
    fn test_decode_sent() {
        let mut frame = vec![RESP_CODE_SENT, 1];
        frame.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        frame.extend_from_slice(&3500u32.to_le_bytes());
        assert_eq!(
            Response::decode(&frame).unwrap(),
            Response::Sent {
                is_flood: true,
                expected_ack: 0xDEADBEEF,
                est_timeout_ms: 3500
            }
        );
    }

    #[test]
    fn test_decode_sent_truncated() {
        let err = Response::decode(&[RESP_CODE_SENT, 0, 1, 2]).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooShort { .. }));
    }

    #[test]
    fn test_decode_contact() {
        let frame = contact_frame(RESP_CODE_CONTACT, "relay-1", ADV_TYPE_REPEATER);
        let Response::Contact(contact) = Response::decode(&frame).unwrap() else {
            panic!("expected contact");
        };
        assert_eq!(contact.name, "relay-1");
        assert_eq!(contact.kind(), ContactKind::Repeater);
        assert_eq!(contact.out_path_len, -1);
        assert!((contact.latitude() - 45.5).abs() < 1e-9);
        assert!((contact.longitude() + 73.25).abs() < 1e-9);
        assert_eq!(contact.lastmod, 1_700_000_100);
    }

    #[test]
    fn test_decode_new_advert_push() {
        let frame = contact_frame(PUSH_CODE_NEW_ADVERT, "stranger", ADV_TYPE_CHAT);
        match Message::decode(&frame).unwrap() {
            Message::Push(PushNotification::NewAdvert(c)) => assert_eq!(c.name, "stranger"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_contact_message_v3() {
        let mut frame = vec![RESP_CODE_CONTACT_MSG_RECV_V3, (-20i8) as u8, 0, 0];
        frame.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        frame.push(2);
        frame.push(TXT_TYPE_PLAIN);
        frame.extend_from_slice(&42u32.to_le_bytes());
        frame.extend_from_slice(b"hello");

        let Response::ContactMessage(msg) = Response::decode(&frame).unwrap() else {
            panic!("expected contact message");
        };
        assert_eq!(msg.sender_prefix.to_hex(), "010203040506");
        assert_eq!(msg.snr(), Some(-5.0));
        assert_eq!(msg.timestamp, 42);
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn test_decode_signed_contact_message_v2() {
        let mut frame = vec![RESP_CODE_CONTACT_MSG_RECV];
        frame.extend_from_slice(&[9; 6]);
        frame.push(0xFF);
        frame.push(TXT_TYPE_SIGNED_PLAIN);
        frame.extend_from_slice(&7u32.to_le_bytes());
        frame.extend_from_slice(&[0xC0, 0xFF, 0xEE, 0x00]);
        frame.extend_from_slice(b"signed");

        let Response::ContactMessage(msg) = Response::decode(&frame).unwrap() else {
            panic!("expected contact message");
        };
        assert!(msg.is_flood());
        assert_eq!(msg.snr_x4, None);
        assert_eq!(msg.signature, vec![0xC0, 0xFF, 0xEE, 0x00]);
        assert_eq!(msg.text, "signed");
    }

    #[test]
    fn test_decode_channel_message_v3() {
        let mut frame = vec![RESP_CODE_CHANNEL_MSG_RECV_V3, 8, 0, 0, 1, 0, TXT_TYPE_PLAIN];
        frame.extend_from_slice(&99u32.to_le_bytes());
        frame.extend_from_slice(b"bob: hey all");
        let Response::ChannelMessage(msg) = Response::decode(&frame).unwrap() else {
            panic!("expected channel message");
        };
        assert_eq!(msg.channel_idx, 1);
        assert_eq!(msg.snr(), Some(2.0));
        assert_eq!(msg.text, "bob: hey all");
    }

    #[test]
    fn test_decode_battery_with_and_without_storage() {
        let short = Response::decode(&[RESP_CODE_BATT_AND_STORAGE, 0x10, 0x0E]).unwrap();
        assert_eq!(
            short,
            Response::BatteryAndStorage(BatteryAndStorage {
                battery_millivolts: 3600,
                storage_used_kb: None,
                storage_total_kb: None
            })
        );

        let mut frame = vec![RESP_CODE_BATT_AND_STORAGE, 0x10, 0x0E];
        frame.extend_from_slice(&100u32.to_le_bytes());
        frame.extend_from_slice(&400u32.to_le_bytes());
        let Response::BatteryAndStorage(bat) = Response::decode(&frame).unwrap() else {
            panic!("expected battery");
        };
        assert_eq!(bat.storage_used_kb, Some(100));
        assert_eq!(bat.storage_total_kb, Some(400));
    }

    #[test]
    fn test_decode_old_device_info() {
        let Response::DeviceInfo(info) = Response::decode(&[RESP_CODE_DEVICE_INFO, 2]).unwrap() else {
            panic!("expected device info");
        };
        assert_eq!(info.firmware_version_code, 2);
        assert!(info.manufacturer.is_empty());
    }

    #[test]
    fn test_decode_error_and_disabled() {
        assert_eq!(
            Response::decode(&[RESP_CODE_ERR, ERR_CODE_NOT_FOUND]).unwrap(),
            Response::Error(FirmwareErrorCode::NotFound)
        );
        assert_eq!(Response::decode(&[RESP_CODE_DISABLED]).unwrap(), Response::Disabled);
        assert_eq!(
            Response::decode(&[0x7F]).unwrap_err(),
            ProtocolError::UnknownResponse(0x7F)
        );
    }

    #[test]
    fn test_decode_login_pushes() {
        let ok = PushNotification::decode(&[PUSH_CODE_LOGIN_SUCCESS, 1, 1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(
            ok,
            PushNotification::LoginSuccess {
                is_admin: true,
                server_prefix: PublicKeyPrefix([1, 2, 3, 4, 5, 6])
            }
        );
        let fail = PushNotification::decode(&[PUSH_CODE_LOGIN_FAIL, 0, 6, 5, 4, 3, 2, 1]).unwrap();
        assert_eq!(
            fail,
            PushNotification::LoginFail {
                server_prefix: PublicKeyPrefix([6, 5, 4, 3, 2, 1])
            }
        );
    }

    #[test]
    fn test_decode_send_confirmed() {
        let mut frame = vec![PUSH_CODE_SEND_CONFIRMED];
        frame.extend_from_slice(&77u32.to_le_bytes());
        frame.extend_from_slice(&1200u32.to_le_bytes());
        assert_eq!(
            PushNotification::decode(&frame).unwrap(),
            PushNotification::SendConfirmed {
                ack_code: 77,
                trip_time_ms: 1200
            }
        );
    }

    #[test]
    fn test_unknown_push_is_kept() {
        let push = PushNotification::decode(&[0x8C, 1, 2]).unwrap();
        assert_eq!(push, PushNotification::Unknown { code: 0x8C, data: vec![1, 2] });
        assert_eq!(push.name(), "unknown");
    }
}
