//! Device session
//!
//! The [`DeviceSession`] trait is the seam between command execution and
//! the companion device. [`MeshSession`] implements it on top of a pair of
//! byte channels ([`LinkChannels`]), which the transports in [`tcp`] and
//! [`serial`] feed from a socket or a serial port.
//!
//! Every frame read from the link is decoded once by a demultiplexer task:
//! replies go to whichever request currently owns the exchange, push
//! notifications go to the event feed handed out by
//! [`DeviceSession::take_events`].

pub mod serial;
pub mod tcp;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use mccli_protocol::{
    ChannelInfo, Command, ContactInfo, FrameCodec, Message, PushNotification,
    Response, SelfInfo,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{SessionError, SessionResult, SettingsError};

/// Name announced to the device in the handshake.
pub const APP_NAME: &str = "mccli";

/// Default TCP port of companion bridges.
pub const DEFAULT_TCP_PORT: u16 = 5000;

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Cap on the capacity reserved from a device-reported contact count.
const MAX_CONTACTS_RESERVE: usize = 1024;

// ============================================================================
// Session trait
// ============================================================================

/// A live connection to one companion device.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Send one command and wait for its reply.
    async fn request(&self, command: Command) -> SessionResult<Response>;

    /// Send a command the device does not answer.
    async fn send_only(&self, command: Command) -> SessionResult<()>;

    /// Fetch the full contact list.
    async fn list_contacts(&self) -> SessionResult<Vec<ContactInfo>>;

    /// Fetch configured channels, probing indexes below `max`.
    async fn list_channels(&self, max: u8) -> SessionResult<Vec<ChannelInfo>> {
        let mut channels = Vec::new();
        for index in 0..max {
            match self.request(Command::GetChannel { index }).await? {
                Response::ChannelInfo(info) => {
                    if !info.name.is_empty() {
                        channels.push(info);
                    }
                }
                Response::Error(_) => break,
                other => {
                    return Err(SessionError::UnexpectedReply(format!("{:?}", other)));
                }
            }
        }
        Ok(channels)
    }

    /// Self info captured during the handshake.
    fn self_info(&self) -> Option<SelfInfo>;

    /// The push-notification feed. Handed out once.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PushNotification>>;
}

// ============================================================================
// Link channels
// ============================================================================

/// Byte channels connecting a session to a transport task.
pub struct LinkChannels {
    /// Chunks read from the link.
    pub inbound: mpsc::Receiver<Vec<u8>>,
    /// Chunks to write to the link.
    pub outbound: mpsc::Sender<Vec<u8>>,
}

impl LinkChannels {
    /// Create two connected ends. What one end sends, the other receives.
    pub fn pair() -> (LinkChannels, LinkChannels) {
        let (a_tx, a_rx) = mpsc::channel::<Vec<u8>>(256);
        let (b_tx, b_rx) = mpsc::channel::<Vec<u8>>(256);
        (
            LinkChannels {
                inbound: a_rx,
                outbound: b_tx,
            },
            LinkChannels {
                inbound: b_rx,
                outbound: a_tx,
            },
        )
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Where the companion device is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP bridge.
    Tcp {
        /// Host name or address.
        host: String,
        /// Port.
        port: u16,
    },
    /// Serial port.
    Serial {
        /// Device path.
        path: String,
        /// Baud rate.
        baud: u32,
    },
    /// Bluetooth LE address or name filter.
    Ble {
        /// Address or advertised-name filter.
        target: String,
    },
}

impl Endpoint {
    /// Open the transport and return its byte channels.
    pub async fn open(&self) -> SessionResult<LinkChannels> {
        match self {
            Endpoint::Tcp { host, port } => tcp::connect(host, *port).await,
            Endpoint::Serial { path, baud } => serial::open(path, *baud),
            Endpoint::Ble { target } => Err(SessionError::UnsupportedTransport(format!(
                "BLE ({}); use a TCP bridge or a serial port",
                target
            ))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp:{}:{}", host, port),
            Endpoint::Serial { path, baud } => write!(f, "serial:{}:{}", path, baud),
            Endpoint::Ble { target } => write!(f, "ble:{}", target),
        }
    }
}

impl FromStr for Endpoint {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SettingsError::InvalidEndpoint(s.to_string());
        let (scheme, rest) = s.trim().split_once(':').ok_or_else(invalid)?;
        match scheme {
            "tcp" => {
                let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
                Ok(Endpoint::Tcp {
                    host: host.to_string(),
                    port: port.parse().map_err(|_| invalid())?,
                })
            }
            "serial" => {
                let (path, baud) = rest.rsplit_once(':').ok_or_else(invalid)?;
                Ok(Endpoint::Serial {
                    path: path.to_string(),
                    baud: baud.parse().map_err(|_| invalid())?,
                })
            }
            "ble" if !rest.is_empty() => Ok(Endpoint::Ble {
                target: rest.to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

// ============================================================================
// MeshSession
// ============================================================================

/// [`DeviceSession`] over a framed companion link.
pub struct MeshSession {
    outbound: mpsc::Sender<Vec<u8>>,
    /// Replies from the demultiplexer; holding the lock owns the exchange.
    replies: tokio::sync::Mutex<mpsc::UnboundedReceiver<Response>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<PushNotification>>>,
    self_info: RwLock<Option<SelfInfo>>,
    reply_timeout: Duration,
    demux: JoinHandle<()>,
}

impl MeshSession {
    /// Start the demultiplexer over `link` without talking to the device.
    pub fn start(link: LinkChannels, reply_timeout: Duration) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let demux = tokio::spawn(run_demux(link.inbound, reply_tx, event_tx));

        MeshSession {
            outbound: link.outbound,
            replies: tokio::sync::Mutex::new(reply_rx),
            events: Mutex::new(Some(event_rx)),
            self_info: RwLock::new(None),
            reply_timeout,
            demux,
        }
    }

    /// Start the session and perform the app-start handshake.
    pub async fn connect(link: LinkChannels, reply_timeout: Duration) -> SessionResult<Self> {
        let session = Self::start(link, reply_timeout);
        match session.request(Command::app_start(APP_NAME)).await? {
            Response::SelfInfo(info) => {
                debug!(name = %info.node_name, key = %info.public_key.to_hex(), "connected");
                *session.self_info.write() = Some(info);
                Ok(session)
            }
            other => Err(SessionError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    async fn write(&self, command: &Command) -> SessionResult<()> {
        trace!(code = command.code(), "sending command");
        self.outbound
            .send(FrameCodec::encode(&command.encode()))
            .await
            .map_err(|_| SessionError::Closed)
    }

    async fn next_reply(&self, replies: &mut mpsc::UnboundedReceiver<Response>) -> SessionResult<Response> {
        match tokio::time::timeout(self.reply_timeout, replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::NoReply(self.reply_timeout)),
        }
    }
}

impl Drop for MeshSession {
    fn drop(&mut self) {
        self.demux.abort();
    }
}

#[async_trait]
impl DeviceSession for MeshSession {
    async fn request(&self, command: Command) -> SessionResult<Response> {
        let mut replies = self.replies.lock().await;
        while let Ok(stale) = replies.try_recv() {
            warn!(?stale, "dropping reply nobody waited for");
        }
        self.write(&command).await?;
        self.next_reply(&mut replies).await
    }

    async fn send_only(&self, command: Command) -> SessionResult<()> {
        let _exchange = self.replies.lock().await;
        self.write(&command).await
    }

    async fn list_contacts(&self) -> SessionResult<Vec<ContactInfo>> {
        let mut replies = self.replies.lock().await;
        self.write(&Command::GetContacts { since: None }).await?;

        let mut contacts = Vec::new();
        loop {
            match self.next_reply(&mut replies).await? {
                Response::ContactsStart { total_count } => {
                    contacts.reserve((total_count as usize).min(MAX_CONTACTS_RESERVE));
                }
                Response::Contact(contact) => contacts.push(contact),
                Response::EndOfContacts { .. } => return Ok(contacts),
                other => {
                    return Err(SessionError::UnexpectedReply(format!("{:?}", other)));
                }
            }
        }
    }

    fn self_info(&self) -> Option<SelfInfo> {
        self.self_info.read().clone()
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PushNotification>> {
        self.events.lock().take()
    }
}

/// Split decoded frames into replies and push notifications.
async fn run_demux(
    mut inbound: mpsc::Receiver<Vec<u8>>,
    replies: mpsc::UnboundedSender<Response>,
    events: mpsc::UnboundedSender<PushNotification>,
) {
    let mut codec = FrameCodec::new();
    while let Some(chunk) = inbound.recv().await {
        codec.push(&chunk);
        while let Some(decoded) = codec.next_message() {
            match decoded {
                Ok(Message::Response(reply)) => {
                    trace!(?reply, "reply");
                    let _ = replies.send(reply);
                }
                Ok(Message::Push(push)) => {
                    trace!(event = push.name(), "push notification");
                    let _ = events.send(push);
                }
                Err(e) => warn!("dropping undecodable frame: {}", e),
            }
        }
    }
    debug!("link closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_roundtrip() {
        for text in ["tcp:192.168.1.5:5000", "serial:/dev/ttyUSB0:115200", "ble:C2:2B:A1:D5:3E:B6"] {
            let endpoint: Endpoint = text.parse().unwrap();
            assert_eq!(endpoint.to_string(), text);
        }
    }

    #[test]
    fn test_endpoint_rejects_garbage() {
        assert!("tcp:host".parse::<Endpoint>().is_err());
        assert!("usb:/dev/x".parse::<Endpoint>().is_err());
        assert!("serial:/dev/ttyUSB0:fast".parse::<Endpoint>().is_err());
    }

    #[tokio::test]
    async fn test_ble_is_reported_unsupported() {
        let endpoint = Endpoint::Ble {
            target: "MeshCore-1234".into(),
        };
        match endpoint.open().await {
            Err(SessionError::UnsupportedTransport(msg)) => assert!(msg.contains("MeshCore-1234")),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("BLE should not open"),
        }
    }
}
