//! Scripted in-memory device shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mccli::pipeline::{Pipeline, PipelineOptions};
use mccli::session::DeviceSession;
use mccli::error::{SessionError, SessionResult};
use mccli::wait::WaitCoordinator;
use mccli_protocol::{
    BatteryAndStorage, ChannelInfo, Command, ContactInfo, DeviceInfo, FirmwareErrorCode, PublicKey,
    PublicKeyPrefix, PushNotification, ReceivedContactMessage, Response, SelfInfo, TextType,
    ADV_TYPE_CHAT, ADV_TYPE_REPEATER,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Device clock reported by `GetDeviceTime`.
pub const DEVICE_TIME: u32 = 1_714_570_620;

/// Ack code of the first message sent; later ones count up.
pub const FIRST_ACK: u32 = 0x5EED_0001;

pub struct FakeDevice {
    pub commands: Mutex<Vec<Command>>,
    /// One-shot replies keyed by command code, used before the defaults.
    scripted: Mutex<HashMap<u8, VecDeque<Response>>>,
    pub contacts: Mutex<Vec<ContactInfo>>,
    pub channels: Mutex<Vec<ChannelInfo>>,
    /// Offline message queue popped by `SyncNextMessage`.
    pub queue: Mutex<VecDeque<Response>>,
    /// Every request fails as if the link dropped.
    pub broken: AtomicBool,
    /// Confirm every sent message with its ack right away.
    pub auto_ack: AtomicBool,
    /// Pushed right after a login request is accepted.
    pub login_reply: Mutex<Option<PushNotification>>,
    /// Pushed right after a status request is accepted.
    pub status_reply: Mutex<Option<PushNotification>>,
    next_ack: AtomicU32,
    push_tx: mpsc::UnboundedSender<PushNotification>,
    events: Mutex<Option<mpsc::UnboundedReceiver<PushNotification>>>,
    self_info: SelfInfo,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        Arc::new(FakeDevice {
            commands: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            contacts: Mutex::new(vec![alice(), relay()]),
            channels: Mutex::new(vec![ChannelInfo {
                index: 0,
                name: "Public".into(),
                secret: [0; 16],
            }]),
            queue: Mutex::new(VecDeque::new()),
            broken: AtomicBool::new(false),
            auto_ack: AtomicBool::new(false),
            login_reply: Mutex::new(None),
            status_reply: Mutex::new(None),
            next_ack: AtomicU32::new(FIRST_ACK),
            push_tx,
            events: Mutex::new(Some(push_rx)),
            self_info: SelfInfo {
                node_name: "base".into(),
                public_key: PublicKey([0xBA; 32]),
                tx_power_dbm: 20,
                max_tx_power_dbm: 22,
                freq_khz: 869_525,
                bandwidth_hz: 250_000,
                spreading_factor: 11,
                coding_rate: 5,
                ..Default::default()
            },
        })
    }

    /// Answer the next command with `code` by `response`.
    pub fn script(&self, code: u8, response: Response) {
        self.scripted.lock().entry(code).or_default().push_back(response);
    }

    /// Deliver a push notification.
    pub fn push(&self, event: PushNotification) {
        let _ = self.push_tx.send(event);
    }

    /// Queue an incoming message and announce it.
    pub fn deliver(&self, message: Response) {
        self.queue.lock().push_back(message);
        self.push(PushNotification::MessageWaiting);
    }

    pub fn sent(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    /// Text messages sent so far, with their type.
    pub fn sent_texts(&self) -> Vec<(TextType, String)> {
        self.sent()
            .into_iter()
            .filter_map(|c| match c {
                Command::SendTextMessage { text_type, text, .. } => Some((text_type, text)),
                _ => None,
            })
            .collect()
    }

    fn default_response(&self, command: &Command) -> Response {
        match command {
            Command::AppStart { .. } => Response::SelfInfo(self.self_info.clone()),
            Command::GetDeviceTime => Response::CurrentTime { time_secs: DEVICE_TIME },
            Command::DeviceQuery { .. } => Response::DeviceInfo(DeviceInfo {
                firmware_version_code: 3,
                max_contacts_half: 175,
                max_group_channels: 8,
                build_date: "19 Feb 2025".into(),
                manufacturer: "Heltec V3".into(),
                firmware_version: "v1.2.0".into(),
                ..Default::default()
            }),
            Command::GetBatteryAndStorage => Response::BatteryAndStorage(BatteryAndStorage {
                battery_millivolts: 4_100,
                storage_used_kb: None,
                storage_total_kb: None,
            }),
            Command::SendTextMessage { .. } => {
                let expected_ack = self.next_ack.fetch_add(1, Ordering::SeqCst);
                if self.auto_ack.load(Ordering::SeqCst) {
                    self.push(PushNotification::SendConfirmed {
                        ack_code: expected_ack,
                        trip_time_ms: 420,
                    });
                }
                Response::Sent {
                    is_flood: false,
                    expected_ack,
                    est_timeout_ms: 0,
                }
            }
            Command::SendLogin { .. } => {
                if let Some(reply) = self.login_reply.lock().clone() {
                    self.push(reply);
                }
                sent_flood()
            }
            Command::SendStatusRequest { .. } => {
                if let Some(reply) = self.status_reply.lock().clone() {
                    self.push(reply);
                }
                sent_flood()
            }
            Command::SyncNextMessage => self.queue.lock().pop_front().unwrap_or(Response::NoMoreMessages),
            Command::GetChannel { index } => self
                .channels
                .lock()
                .iter()
                .find(|c| c.index == *index)
                .cloned()
                .map(Response::ChannelInfo)
                .unwrap_or(Response::Error(FirmwareErrorCode::NotFound)),
            Command::ExportContact { .. } => Response::ExportedContact {
                data: vec![0x11, 0x22, 0x33],
            },
            _ => Response::Ok,
        }
    }
}

fn sent_flood() -> Response {
    Response::Sent {
        is_flood: true,
        expected_ack: 0,
        est_timeout_ms: 0,
    }
}

#[async_trait]
impl DeviceSession for FakeDevice {
    async fn request(&self, command: Command) -> SessionResult<Response> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        self.commands.lock().push(command.clone());
        let scripted = self.scripted.lock().get_mut(&command.code()).and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| self.default_response(&command)))
    }

    async fn send_only(&self, command: Command) -> SessionResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        self.commands.lock().push(command);
        Ok(())
    }

    async fn list_contacts(&self) -> SessionResult<Vec<ContactInfo>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        self.commands.lock().push(Command::GetContacts { since: None });
        Ok(self.contacts.lock().clone())
    }

    fn self_info(&self) -> Option<SelfInfo> {
        Some(self.self_info.clone())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PushNotification>> {
        self.events.lock().take()
    }
}

pub fn alice() -> ContactInfo {
    ContactInfo {
        public_key: PublicKey([0xA1; 32]),
        contact_type: ADV_TYPE_CHAT,
        name: "alice".into(),
        out_path_len: -1,
        ..Default::default()
    }
}

pub fn relay() -> ContactInfo {
    ContactInfo {
        public_key: PublicKey([0x3C; 32]),
        contact_type: ADV_TYPE_REPEATER,
        name: "relay-north".into(),
        out_path_len: 1,
        ..Default::default()
    }
}

/// A queued direct message from `contact`.
pub fn message_from(contact: &ContactInfo, text: &str) -> Response {
    Response::ContactMessage(ReceivedContactMessage {
        sender_prefix: PublicKeyPrefix::from(&contact.public_key),
        path_len: 0,
        text_type: TextType::Plain,
        timestamp: DEVICE_TIME - 30,
        snr_x4: Some(26),
        signature: Vec::new(),
        text: text.to_string(),
    })
}

/// A pipeline over `device` with default options.
pub fn pipeline(device: &Arc<FakeDevice>) -> Pipeline {
    let events = device.take_events().expect("push feed");
    let waits = WaitCoordinator::new(events);
    Pipeline::new(device.clone(), waits, PipelineOptions::default())
}

/// Split a command line the way the shell would.
pub fn words(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
