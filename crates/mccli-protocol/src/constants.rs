//! Protocol constants
//!
//! Command codes, response codes and the other wire-level values of the
//! companion protocol that this client speaks.

// ============================================================================
// Command Codes (host → device)
// ============================================================================

/// Handshake; the device answers with its self info.
pub const CMD_APP_START: u8 = 1;
/// Send a text message to a contact.
pub const CMD_SEND_TXT_MSG: u8 = 2;
/// Send a text message to a channel.
pub const CMD_SEND_CHANNEL_TXT_MSG: u8 = 3;
/// Get the list of contacts.
pub const CMD_GET_CONTACTS: u8 = 4;
/// Get the current device time.
pub const CMD_GET_DEVICE_TIME: u8 = 5;
/// Set the device time.
pub const CMD_SET_DEVICE_TIME: u8 = 6;
/// Send a self-advertisement packet.
pub const CMD_SEND_SELF_ADVERT: u8 = 7;
/// Set the advertisement name.
pub const CMD_SET_ADVERT_NAME: u8 = 8;
/// Add or update a contact.
pub const CMD_ADD_UPDATE_CONTACT: u8 = 9;
/// Pop the next message from the offline queue.
pub const CMD_SYNC_NEXT_MESSAGE: u8 = 10;
/// Set radio parameters (frequency, bandwidth, SF, CR).
pub const CMD_SET_RADIO_PARAMS: u8 = 11;
/// Set radio TX power.
pub const CMD_SET_RADIO_TX_POWER: u8 = 12;
/// Reset the path to a contact.
pub const CMD_RESET_PATH: u8 = 13;
/// Set advertisement latitude/longitude.
pub const CMD_SET_ADVERT_LATLON: u8 = 14;
/// Remove a contact.
pub const CMD_REMOVE_CONTACT: u8 = 15;
/// Share a contact via zero-hop broadcast.
pub const CMD_SHARE_CONTACT: u8 = 16;
/// Export a contact (or self) as an advert blob.
pub const CMD_EXPORT_CONTACT: u8 = 17;
/// Reboot the device.
pub const CMD_REBOOT: u8 = 19;
/// Get battery voltage and storage info.
pub const CMD_GET_BATT_AND_STORAGE: u8 = 20;
/// Set tuning parameters (RX delay, airtime factor).
pub const CMD_SET_TUNING_PARAMS: u8 = 21;
/// Query device information.
pub const CMD_DEVICE_QUERY: u8 = 22;
/// Send login request to a repeater or room server.
pub const CMD_SEND_LOGIN: u8 = 26;
/// Send status request to a repeater or room server.
pub const CMD_SEND_STATUS_REQ: u8 = 27;
/// Get channel information.
pub const CMD_GET_CHANNEL: u8 = 31;
/// Set BLE PIN code.
pub const CMD_SET_DEVICE_PIN: u8 = 37;

// ============================================================================
// Response Codes (device → host)
// ============================================================================

/// Generic OK response.
pub const RESP_CODE_OK: u8 = 0;
/// Generic error response (followed by error code).
pub const RESP_CODE_ERR: u8 = 1;
/// Start of contacts list.
pub const RESP_CODE_CONTACTS_START: u8 = 2;
/// A single contact entry.
pub const RESP_CODE_CONTACT: u8 = 3;
/// End of contacts list.
pub const RESP_CODE_END_OF_CONTACTS: u8 = 4;
/// Self info (reply to CMD_APP_START).
pub const RESP_CODE_SELF_INFO: u8 = 5;
/// Message accepted for sending (reply to CMD_SEND_TXT_MSG).
pub const RESP_CODE_SENT: u8 = 6;
/// Contact message received (ver < 3).
pub const RESP_CODE_CONTACT_MSG_RECV: u8 = 7;
/// Channel message received (ver < 3).
pub const RESP_CODE_CHANNEL_MSG_RECV: u8 = 8;
/// Current time.
pub const RESP_CODE_CURR_TIME: u8 = 9;
/// Offline queue is empty.
pub const RESP_CODE_NO_MORE_MESSAGES: u8 = 10;
/// Exported contact blob.
pub const RESP_CODE_EXPORT_CONTACT: u8 = 11;
/// Battery and storage info.
pub const RESP_CODE_BATT_AND_STORAGE: u8 = 12;
/// Device info.
pub const RESP_CODE_DEVICE_INFO: u8 = 13;
/// Feature disabled.
pub const RESP_CODE_DISABLED: u8 = 15;
/// Contact message received (ver >= 3).
pub const RESP_CODE_CONTACT_MSG_RECV_V3: u8 = 16;
/// Channel message received (ver >= 3).
pub const RESP_CODE_CHANNEL_MSG_RECV_V3: u8 = 17;
/// Channel info.
pub const RESP_CODE_CHANNEL_INFO: u8 = 18;

// ============================================================================
// Push Codes (unsolicited device → host)
// ============================================================================

/// Advertisement received from a known contact.
pub const PUSH_CODE_ADVERT: u8 = 0x80;
/// Path to a contact was updated.
pub const PUSH_CODE_PATH_UPDATED: u8 = 0x81;
/// Message delivery confirmed (ACK received).
pub const PUSH_CODE_SEND_CONFIRMED: u8 = 0x82;
/// A message is waiting in the offline queue.
pub const PUSH_CODE_MSG_WAITING: u8 = 0x83;
/// Raw data received.
pub const PUSH_CODE_RAW_DATA: u8 = 0x84;
/// Login succeeded.
pub const PUSH_CODE_LOGIN_SUCCESS: u8 = 0x85;
/// Login failed.
pub const PUSH_CODE_LOGIN_FAIL: u8 = 0x86;
/// Status report from a repeater or room server.
pub const PUSH_CODE_STATUS_RESPONSE: u8 = 0x87;
/// Raw RX log line.
pub const PUSH_CODE_LOG_RX_DATA: u8 = 0x88;
/// Advertisement from an unknown node (when auto-add is disabled).
pub const PUSH_CODE_NEW_ADVERT: u8 = 0x8A;

// ============================================================================
// Error Codes
// ============================================================================

/// Unsupported command.
pub const ERR_CODE_UNSUPPORTED_CMD: u8 = 1;
/// Contact/item not found.
pub const ERR_CODE_NOT_FOUND: u8 = 2;
/// Table (contacts, packets, etc.) is full.
pub const ERR_CODE_TABLE_FULL: u8 = 3;
/// Bad state for this operation.
pub const ERR_CODE_BAD_STATE: u8 = 4;
/// File I/O error.
pub const ERR_CODE_FILE_IO_ERROR: u8 = 5;
/// Illegal argument.
pub const ERR_CODE_ILLEGAL_ARG: u8 = 6;

// ============================================================================
// Text Types
// ============================================================================

/// Plain text message.
pub const TXT_TYPE_PLAIN: u8 = 0;
/// Remote CLI command / reply.
pub const TXT_TYPE_CLI_DATA: u8 = 1;
/// Signed plain text message.
pub const TXT_TYPE_SIGNED_PLAIN: u8 = 2;

// ============================================================================
// Advertisement Types
// ============================================================================

/// Chat node.
pub const ADV_TYPE_CHAT: u8 = 1;
/// Repeater.
pub const ADV_TYPE_REPEATER: u8 = 2;
/// Room server.
pub const ADV_TYPE_ROOM_SERVER: u8 = 3;

// ============================================================================
// Sizes
// ============================================================================

/// Size of a public key in bytes.
pub const PUB_KEY_SIZE: usize = 32;
/// Size of the public key prefix used to address messages.
pub const PUB_KEY_PREFIX_SIZE: usize = 6;
/// Maximum path size in bytes.
pub const MAX_PATH_SIZE: usize = 64;
/// Size of the fixed, null-padded name fields.
pub const NAME_FIELD_SIZE: usize = 32;
/// Maximum frame size.
pub const MAX_FRAME_SIZE: usize = 256;
/// Longest message text the firmware accepts, in bytes.
pub const MAX_TEXT_LEN: usize = 160;

/// Protocol version announced in CMD_DEVICE_QUERY and CMD_APP_START.
pub const APP_PROTOCOL_VERSION: u8 = 3;
