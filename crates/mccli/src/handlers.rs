//! Command handlers, one per [`CommandKind`].

use std::str::FromStr;
use std::time::Duration;

use mccli_protocol::{
    BatteryAndStorage, Command, ContactInfo, DeviceInfo, PublicKey, PublicKeyPrefix, PushNotification,
    RadioParams, ReceivedChannelMessage, ReceivedContactMessage, Response, SelfInfo, StatusReport, TextType,
    TuningParams, APP_PROTOCOL_VERSION, MAX_PATH_SIZE, MAX_TEXT_LEN,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::contacts::{contact_by_prefix, ChannelRef, ContactRef, NavTarget, Recipient};
use crate::error::{CommandError, CommandResult, ParseError, SessionError};
use crate::format::OutputRecord;
use crate::pipeline::{ChainStatus, Pipeline, RecordSink, Reply};
use crate::registry::CommandKind;
use crate::segment::{tokenize, Invocation};
use crate::session::APP_NAME;
use crate::wait::{EventFilter, PendingWait, WaitOutcome, WaitSlot};

/// Longest pause or message window a command may ask for.
const MAX_WAIT: Duration = Duration::from_secs(7 * 24 * 3600);

fn done(value: Value) -> Reply {
    Reply::Done(value)
}

fn arg(inv: &Invocation, index: usize) -> &str {
    inv.args.get(index).map(String::as_str).unwrap_or("")
}

fn invalid(inv: &Invocation, what: &str, value: &str) -> CommandError {
    ParseError::InvalidArgument {
        command: inv.name.to_string(),
        what: what.to_string(),
        value: value.to_string(),
    }
    .into()
}

fn parse_str<T: FromStr>(inv: &Invocation, value: &str, what: &str) -> CommandResult<T> {
    value.trim().parse().map_err(|_| invalid(inv, what, value))
}

fn parse<T: FromStr>(inv: &Invocation, index: usize, what: &str) -> CommandResult<T> {
    parse_str(inv, arg(inv, index), what)
}

fn unexpected(response: Response) -> CommandError {
    CommandError::Unexpected(format!("{:?}", response))
}

fn host_time() -> u32 {
    chrono::Utc::now().timestamp().max(0) as u32
}

fn microdegrees(degrees: f64) -> i32 {
    (degrees * 1e6).round() as i32
}

/// Map how a wait ended onto the handler result; `None` is a timeout.
fn settle(outcome: WaitOutcome) -> CommandResult<Option<PushNotification>> {
    match outcome {
        WaitOutcome::Fulfilled(event) => Ok(Some(event)),
        WaitOutcome::TimedOut => Ok(None),
        WaitOutcome::Superseded | WaitOutcome::Cancelled => Err(CommandError::Cancelled),
        WaitOutcome::Closed => Err(CommandError::Transport(SessionError::Closed)),
    }
}

fn check_text(inv: &Invocation, text: &str) -> CommandResult<()> {
    if text.len() > MAX_TEXT_LEN {
        return Err(invalid(inv, "message text", &format!("{} bytes, at most {}", text.len(), MAX_TEXT_LEN)));
    }
    Ok(())
}

fn radio_params(inv: &Invocation, parts: &[&str]) -> CommandResult<RadioParams> {
    if parts.len() != 4 {
        return Err(invalid(inv, "radio parameters", &parts.join(",")));
    }
    Ok(RadioParams::from_mhz(
        parse_str(inv, parts[0], "frequency")?,
        parse_str(inv, parts[1], "bandwidth")?,
        parse_str(inv, parts[2], "spreading factor")?,
        parse_str(inv, parts[3], "coding rate")?,
    ))
}

// ============================================================================
// JSON views of protocol types
// ============================================================================

fn self_info_json(info: &SelfInfo) -> Value {
    json!({
        "name": info.node_name,
        "public_key": info.public_key.to_hex(),
        "adv_type": info.advert_type,
        "tx_power": info.tx_power_dbm,
        "max_tx_power": info.max_tx_power_dbm,
        "adv_lat": info.latitude(),
        "adv_lon": info.longitude(),
        "radio_freq": info.frequency_mhz(),
        "radio_bw": info.bandwidth_khz(),
        "radio_sf": info.spreading_factor,
        "radio_cr": info.coding_rate,
        "multi_acks": info.multi_acks,
        "manual_add_contacts": info.manual_add_contacts != 0,
    })
}

fn device_info_json(info: &DeviceInfo) -> Value {
    let mut fields = Map::new();
    fields.insert("fw_version_code".into(), json!(info.firmware_version_code));
    if info.firmware_version_code >= 3 {
        fields.insert("max_contacts".into(), json!(info.max_contacts()));
        fields.insert("max_channels".into(), json!(info.max_group_channels));
        fields.insert("ble_pin".into(), json!(info.ble_pin));
        fields.insert("fw_build".into(), json!(info.build_date));
        fields.insert("model".into(), json!(info.manufacturer));
        fields.insert("version".into(), json!(info.firmware_version));
    }
    Value::Object(fields)
}

fn battery_json(battery: &BatteryAndStorage) -> Value {
    let mut fields = Map::new();
    fields.insert("battery_mv".into(), json!(battery.battery_millivolts));
    if let (Some(used), Some(total)) = (battery.storage_used_kb, battery.storage_total_kb) {
        fields.insert("storage_used_kb".into(), json!(used));
        fields.insert("storage_total_kb".into(), json!(total));
    }
    Value::Object(fields)
}

fn contact_json(contact: &ContactInfo) -> Value {
    let path = if contact.has_direct_path() {
        hex::encode(contact.path())
    } else {
        "flood".to_string()
    };
    json!({
        "name": contact.name,
        "type": contact.kind().label(),
        "public_key": contact.public_key.to_hex(),
        "path": path,
        "path_len": contact.out_path_len,
        "lat": contact.latitude(),
        "lon": contact.longitude(),
        "last_advert": contact.last_advert_timestamp,
    })
}

fn status_json(server: &PublicKeyPrefix, report: &StatusReport) -> Value {
    json!({
        "server": server.to_hex(),
        "battery_mv": report.battery_mv,
        "tx_queue_len": report.tx_queue_len,
        "free_queue_len": report.free_queue_len,
        "last_rssi": report.last_rssi,
        "last_snr": report.last_snr(),
        "packets_recv": report.packets_recv,
        "packets_sent": report.packets_sent,
        "airtime_secs": report.airtime_secs,
        "uptime_secs": report.uptime_secs,
        "sent_flood": report.sent_flood,
        "sent_direct": report.sent_direct,
        "recv_flood": report.recv_flood,
        "recv_direct": report.recv_direct,
        "full_events": report.full_events,
        "direct_dups": report.direct_dups,
        "flood_dups": report.flood_dups,
    })
}

// ============================================================================
// Handlers
// ============================================================================

impl Pipeline {
    pub(crate) async fn dispatch(&mut self, inv: &Invocation, sink: &mut RecordSink<'_>) -> CommandResult<Reply> {
        use CommandKind as K;

        match inv.kind {
            K::Infos => self.infos().await,
            K::Query => match self
                .request(Command::DeviceQuery {
                    app_version: APP_PROTOCOL_VERSION,
                })
                .await?
            {
                Response::DeviceInfo(info) => Ok(done(device_info_json(&info))),
                other => Err(unexpected(other)),
            },
            K::Clock if arg(inv, 0) == "sync" => self.set_time(host_time()).await,
            K::Clock => Ok(done(json!(self.device_time().await?))),
            K::SyncTime => self.set_time(host_time()).await,
            K::SetTime => {
                let time_secs = parse(inv, 0, "epoch")?;
                self.set_time(time_secs).await
            }
            K::SetTxPower => {
                let power_dbm = parse(inv, 0, "tx power")?;
                self.request_ok(Command::SetRadioTxPower { power_dbm }).await
            }
            K::SetRadio => {
                let parts: Vec<&str> = inv.args.iter().map(String::as_str).collect();
                let params = radio_params(inv, &parts)?;
                self.request_ok(Command::SetRadioParams { params }).await
            }
            K::SetTuning => {
                let rx_delay: f64 = parse(inv, 0, "rx delay")?;
                let airtime_factor: f64 = parse(inv, 1, "airtime factor")?;
                let params = TuningParams {
                    rx_delay_base: (rx_delay * 1000.0).round() as u32,
                    airtime_factor: (airtime_factor * 1000.0).round() as u32,
                };
                self.request_ok(Command::SetTuningParams { params }).await
            }
            K::SetName => {
                self.request_ok(Command::SetAdvertName {
                    name: arg(inv, 0).to_string(),
                })
                .await
            }
            K::Set => self.set_param(inv).await,
            K::GetBattery => match self.request(Command::GetBatteryAndStorage).await? {
                Response::BatteryAndStorage(battery) => Ok(done(battery_json(&battery))),
                other => Err(unexpected(other)),
            },
            K::Reboot => {
                self.session.send_only(Command::Reboot).await?;
                Ok(done(Value::Null))
            }
            K::Send => {
                check_text(inv, arg(inv, 1))?;
                let prefix =
                    PublicKeyPrefix::from_hex(arg(inv, 0)).ok_or_else(|| invalid(inv, "public key", arg(inv, 0)))?;
                self.send_text(prefix, arg(inv, 1), TextType::Plain, true).await
            }
            K::Msg => {
                check_text(inv, arg(inv, 1))?;
                let contact = self.contact(arg(inv, 0)).await?;
                self.send_text(contact.public_key.prefix(), arg(inv, 1), TextType::Plain, true)
                    .await
            }
            K::Cmd => {
                check_text(inv, arg(inv, 1))?;
                let contact = self.contact(arg(inv, 0)).await?;
                self.send_text(contact.public_key.prefix(), arg(inv, 1), TextType::CliData, false)
                    .await
            }
            K::ChanMsg => {
                check_text(inv, arg(inv, 1))?;
                let channel = self.channel(arg(inv, 0)).await?;
                self.send_channel(channel, arg(inv, 1)).await
            }
            K::DefChanMsg => {
                check_text(inv, arg(inv, 0))?;
                let channel = ChannelRef {
                    index: 0,
                    name: String::new(),
                };
                self.send_channel(channel, arg(inv, 0)).await
            }
            K::Login => {
                let contact = self.contact(arg(inv, 0)).await?;
                let wait = self
                    .waits
                    .arm(WaitSlot::Login, EventFilter::Login, Some(self.options.login_timeout));
                let command = Command::SendLogin {
                    public_key: contact.public_key,
                    password: arg(inv, 1).to_string(),
                };
                self.request_armed(command, wait).await
            }
            K::WaitLogin => {
                let timeout = self.options.login_timeout;
                let mut wait = self.armed_or(WaitSlot::Login, EventFilter::Login, Some(timeout));
                match settle(wait.outcome().await)? {
                    Some(PushNotification::LoginSuccess { is_admin, server_prefix }) => Ok(done(json!({
                        "login": "success",
                        "is_admin": is_admin,
                        "server": server_prefix.to_hex(),
                    }))),
                    Some(PushNotification::LoginFail { server_prefix }) => Err(CommandError::Rejected(format!(
                        "login refused by {}",
                        server_prefix.to_hex()
                    ))),
                    Some(other) => Err(CommandError::Unexpected(other.name().to_string())),
                    None => Ok(Reply::TimedOut(WaitSlot::Login)),
                }
            }
            K::ReqStatus => {
                let contact = self.contact(arg(inv, 0)).await?;
                let wait = self
                    .waits
                    .arm(WaitSlot::Status, EventFilter::Status, Some(self.options.status_timeout));
                let command = Command::SendStatusRequest {
                    public_key: contact.public_key,
                };
                self.request_armed(command, wait).await
            }
            K::WaitStatus => {
                let timeout = self.options.status_timeout;
                let mut wait = self.armed_or(WaitSlot::Status, EventFilter::Status, Some(timeout));
                match settle(wait.outcome().await)? {
                    Some(PushNotification::StatusResponse { server_prefix, data }) => {
                        let report = StatusReport::decode(&data)
                            .map_err(|e| CommandError::Unexpected(format!("status report: {}", e)))?;
                        Ok(done(status_json(&server_prefix, &report)))
                    }
                    Some(other) => Err(CommandError::Unexpected(other.name().to_string())),
                    None => Ok(Reply::TimedOut(WaitSlot::Status)),
                }
            }
            K::Contacts => {
                let contacts = self.session.list_contacts().await?;
                let rows = contacts.iter().map(contact_json).collect();
                self.contacts = Some(contacts);
                Ok(done(Value::Array(rows)))
            }
            K::Channels => {
                let channels = self.session.list_channels(self.options.max_channels).await?;
                let rows = channels
                    .iter()
                    .map(|c| json!({"index": c.index, "name": c.name}))
                    .collect();
                self.channels = Some(channels);
                Ok(done(Value::Array(rows)))
            }
            K::ChangePath => {
                let mut contact = self.contact(arg(inv, 0)).await?;
                let path = hex::decode(arg(inv, 1)).map_err(|_| invalid(inv, "path", arg(inv, 1)))?;
                if path.len() > MAX_PATH_SIZE {
                    return Err(invalid(inv, "path", arg(inv, 1)));
                }
                contact.set_path(&path);
                let result = self.request_ok(Command::AddUpdateContact { contact }).await;
                self.invalidate_contacts();
                result
            }
            K::ResetPath => {
                let public_key = self.contact(arg(inv, 0)).await?.public_key;
                let result = self.request_ok(Command::ResetPath { public_key }).await;
                self.invalidate_contacts();
                result
            }
            K::ShareContact => {
                let public_key = self.contact(arg(inv, 0)).await?.public_key;
                self.request_ok(Command::ShareContact { public_key }).await
            }
            K::ExportContact => {
                let public_key = self.contact(arg(inv, 0)).await?.public_key;
                self.export(Some(public_key)).await
            }
            K::ExportMyself => self.export(None).await,
            K::RemoveContact => {
                let public_key = self.contact(arg(inv, 0)).await?.public_key;
                let result = self.request_ok(Command::RemoveContact { public_key }).await;
                self.invalidate_contacts();
                result
            }
            K::Recv => Ok(done(self.next_message().await?.unwrap_or(Value::Null))),
            K::SyncMsgs => {
                let mut messages = Vec::new();
                while let Some(message) = self.next_message().await? {
                    messages.push(message);
                }
                Ok(done(Value::Array(messages)))
            }
            K::WaitMsg => self.wait_message(None).await,
            K::TrywaitMsg => {
                let secs: u64 = parse(inv, 0, "seconds")?;
                let window = Duration::from_secs(secs);
                if window > MAX_WAIT {
                    return Err(invalid(inv, "seconds", arg(inv, 0)));
                }
                self.wait_message(Some(window)).await
            }
            K::Wmt8 => self.wait_message(Some(self.options.short_message_wait)).await,
            K::WaitAck => {
                let timeout = self.options.ack_fallback;
                let mut wait = self.armed_or(WaitSlot::Ack, EventFilter::AnyAck, Some(timeout));
                match settle(wait.outcome().await)? {
                    Some(PushNotification::SendConfirmed { ack_code, trip_time_ms }) => Ok(done(json!({
                        "ack": format!("{:08x}", ack_code),
                        "trip_time_ms": trip_time_ms,
                    }))),
                    Some(other) => Err(CommandError::Unexpected(other.name().to_string())),
                    None => Ok(Reply::TimedOut(WaitSlot::Ack)),
                }
            }
            K::Advert => self.request_ok(Command::SendSelfAdvert { flood: false }).await,
            K::Sleep => {
                let secs: f64 = parse(inv, 0, "seconds")?;
                let pause = Duration::try_from_secs_f64(secs)
                    .ok()
                    .filter(|d| *d <= MAX_WAIT)
                    .ok_or_else(|| invalid(inv, "seconds", arg(inv, 0)))?;
                let interrupt = self.interrupt.clone();
                tokio::select! {
                    _ = tokio::time::sleep(pause) => Ok(done(Value::Null)),
                    _ = interrupt.triggered() => Err(CommandError::Cancelled),
                }
            }
            K::To => self.navigate(arg(inv, 0)).await,
            K::Script => self.script(arg(inv, 0), sink).await,
            K::Help => Ok(done(json!(self.help_text()))),
        }
    }

    /// One request; device refusals become errors.
    pub(crate) async fn request(&self, command: Command) -> CommandResult<Response> {
        match self.session.request(command).await? {
            Response::Error(code) => Err(CommandError::Device(code)),
            Response::Disabled => Err(CommandError::Disabled),
            other => Ok(other),
        }
    }

    async fn request_ok(&self, command: Command) -> CommandResult<Reply> {
        match self.request(command).await? {
            Response::Ok => Ok(done(Value::Null)),
            other => Err(unexpected(other)),
        }
    }

    /// Send a command whose answer arrives as a push; `wait` was armed
    /// before sending so the answer cannot slip past.
    async fn request_armed(&mut self, command: Command, wait: PendingWait) -> CommandResult<Reply> {
        let slot = wait.slot();
        match self.request(command).await? {
            Response::Sent { .. } | Response::Ok => {
                self.armed.insert(slot, wait);
                Ok(done(Value::Null))
            }
            other => Err(unexpected(other)),
        }
    }

    fn armed_or(&mut self, slot: WaitSlot, filter: EventFilter, timeout: Option<Duration>) -> PendingWait {
        match self.armed.remove(&slot) {
            Some(wait) => wait,
            None => self.waits.arm(slot, filter, timeout),
        }
    }

    async fn infos(&self) -> CommandResult<Reply> {
        if let Some(info) = self.session.self_info() {
            return Ok(done(self_info_json(&info)));
        }
        match self.request(Command::app_start(APP_NAME)).await? {
            Response::SelfInfo(info) => Ok(done(self_info_json(&info))),
            other => Err(unexpected(other)),
        }
    }

    async fn device_time(&self) -> CommandResult<u32> {
        match self.request(Command::GetDeviceTime).await? {
            Response::CurrentTime { time_secs } => Ok(time_secs),
            other => Err(unexpected(other)),
        }
    }

    async fn set_time(&self, time_secs: u32) -> CommandResult<Reply> {
        self.request_ok(Command::SetDeviceTime { time_secs }).await
    }

    async fn set_coords(&self, lat: i32, lon: i32) -> CommandResult<Reply> {
        self.request_ok(Command::SetAdvertLatLon { lat, lon, alt: 0 }).await
    }

    async fn set_param(&self, inv: &Invocation) -> CommandResult<Reply> {
        let value = arg(inv, 1);
        let own = self.session.self_info().unwrap_or_default();
        match arg(inv, 0) {
            "pin" => {
                let pin = parse(inv, 1, "pin")?;
                self.request_ok(Command::SetDevicePin { pin }).await
            }
            "radio" => {
                let parts: Vec<&str> = value.split(',').collect();
                let params = radio_params(inv, &parts)?;
                self.request_ok(Command::SetRadioParams { params }).await
            }
            "name" => {
                self.request_ok(Command::SetAdvertName {
                    name: value.to_string(),
                })
                .await
            }
            "tx" => {
                let power_dbm = parse(inv, 1, "tx power")?;
                self.request_ok(Command::SetRadioTxPower { power_dbm }).await
            }
            "lat" => {
                let lat: f64 = parse(inv, 1, "latitude")?;
                self.set_coords(microdegrees(lat), own.gps_lon).await
            }
            "lon" => {
                let lon: f64 = parse(inv, 1, "longitude")?;
                self.set_coords(own.gps_lat, microdegrees(lon)).await
            }
            "coords" => {
                let Some((lat, lon)) = value.split_once(',') else {
                    return Err(invalid(inv, "coordinates", value));
                };
                let lat: f64 = parse_str(inv, lat, "latitude")?;
                let lon: f64 = parse_str(inv, lon, "longitude")?;
                self.set_coords(microdegrees(lat), microdegrees(lon)).await
            }
            other => Err(invalid(inv, "parameter", other)),
        }
    }

    async fn send_text(
        &mut self,
        recipient_prefix: PublicKeyPrefix,
        text: &str,
        text_type: TextType,
        track_ack: bool,
    ) -> CommandResult<Reply> {
        let timestamp = self.device_time().await?;
        let command = Command::SendTextMessage {
            text_type,
            attempt: 0,
            timestamp,
            recipient_prefix,
            text: text.to_string(),
        };

        match self.request(command).await? {
            Response::Sent {
                is_flood,
                expected_ack,
                est_timeout_ms,
            } => {
                if track_ack {
                    let window = if est_timeout_ms > 0 {
                        Duration::from_millis(est_timeout_ms as u64)
                    } else {
                        self.options.ack_fallback
                    };
                    let wait = self
                        .waits
                        .arm(WaitSlot::Ack, EventFilter::Ack(expected_ack), Some(window));
                    self.armed.insert(WaitSlot::Ack, wait);
                }
                Ok(done(json!({
                    "type": if is_flood { "flood" } else { "direct" },
                    "expected_ack": format!("{:08x}", expected_ack),
                    "timeout_ms": est_timeout_ms,
                })))
            }
            other => Err(unexpected(other)),
        }
    }

    async fn send_channel(&self, channel: ChannelRef, text: &str) -> CommandResult<Reply> {
        let timestamp = self.device_time().await?;
        let command = Command::SendChannelTextMessage {
            text_type: TextType::Plain,
            channel_idx: channel.index,
            timestamp,
            text: text.to_string(),
        };
        match self.request(command).await? {
            Response::Ok | Response::Sent { .. } => Ok(done(json!({
                "channel_idx": channel.index,
                "channel": channel.name,
            }))),
            other => Err(unexpected(other)),
        }
    }

    async fn export(&self, public_key: Option<PublicKey>) -> CommandResult<Reply> {
        match self.request(Command::ExportContact { public_key }).await? {
            Response::ExportedContact { data } => Ok(done(json!(format!("meshcore://{}", hex::encode(data))))),
            other => Err(unexpected(other)),
        }
    }

    /// Pop one queued message; `None` once the queue is empty.
    pub(crate) async fn next_message(&mut self) -> CommandResult<Option<Value>> {
        match self.request(Command::SyncNextMessage).await? {
            Response::NoMoreMessages => {
                self.waits.note_queue_empty();
                Ok(None)
            }
            Response::ContactMessage(message) => Ok(Some(self.contact_message(message).await?)),
            Response::ChannelMessage(message) => Ok(Some(self.channel_message(message))),
            other => Err(unexpected(other)),
        }
    }

    async fn contact_message(&mut self, message: ReceivedContactMessage) -> CommandResult<Value> {
        let sender = contact_by_prefix(self.contact_list().await?, &message.sender_prefix).map(ContactRef::from);
        let from = match sender {
            Some(sender) => {
                let name = sender.name.clone();
                self.recipients.observe_sender(sender);
                name
            }
            None => message.sender_prefix.to_hex(),
        };
        Ok(json!({
            "type": "contact",
            "from": from,
            "sender_prefix": message.sender_prefix.to_hex(),
            "path_len": message.path_len,
            "text_type": u8::from(message.text_type),
            "timestamp": message.timestamp,
            "snr": message.snr(),
            "text": message.text,
        }))
    }

    fn channel_message(&self, message: ReceivedChannelMessage) -> Value {
        let name = self
            .channels
            .as_deref()
            .and_then(|channels| channels.iter().find(|c| c.index == message.channel_idx))
            .map(|c| c.name.clone())
            .unwrap_or_default();
        json!({
            "type": "channel",
            "channel_idx": message.channel_idx,
            "channel": name,
            "path_len": message.path_len,
            "timestamp": message.timestamp,
            "snr": message.snr(),
            "text": message.text,
        })
    }

    async fn wait_message(&mut self, timeout: Option<Duration>) -> CommandResult<Reply> {
        let mut wait = self.armed_or(WaitSlot::Message, EventFilter::MessageWaiting, timeout);
        match settle(wait.outcome().await)? {
            Some(_) => Ok(done(self.next_message().await?.unwrap_or(Value::Null))),
            None => Ok(Reply::TimedOut(WaitSlot::Message)),
        }
    }

    async fn recipient(&mut self, needle: &str) -> CommandResult<Recipient> {
        let contact_error = if needle.starts_with('#') {
            None
        } else {
            match self.contact(needle).await {
                Ok(contact) => return Ok(Recipient::Contact(ContactRef::from(&contact))),
                Err(CommandError::Unresolved(reason)) => Some(CommandError::Unresolved(reason)),
                Err(other) => return Err(other),
            }
        };

        match self.channel(needle).await {
            Ok(channel) => Ok(Recipient::Channel(channel)),
            Err(CommandError::Unresolved(reason)) => Err(contact_error.unwrap_or(CommandError::Unresolved(reason))),
            Err(other) => Err(other),
        }
    }

    async fn navigate(&mut self, target: &str) -> CommandResult<Reply> {
        match NavTarget::parse(target) {
            NavTarget::Root => self.recipients.switch_to(Recipient::Root),
            NavTarget::Back => self.recipients.back(),
            NavTarget::LastSender => self.recipients.to_last_sender()?,
            NavTarget::Named(needle) => {
                let recipient = self.recipient(&needle).await?;
                self.recipients.switch_to(recipient);
            }
        }
        debug!(current = %self.recipients.current, "recipient changed");
        Ok(done(json!(self.recipients.current.to_string())))
    }

    async fn script(&mut self, path: &str, sink: &mut RecordSink<'_>) -> CommandResult<Reply> {
        let script_error = |reason: String| CommandError::Script {
            path: path.to_string(),
            reason,
        };
        if self.script_depth >= self.options.script_depth {
            return Err(script_error("scripts nested too deep".to_string()));
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| script_error(e.to_string()))?;

        self.script_depth += 1;
        let result = self.run_script(&text, sink).await;
        self.script_depth -= 1;

        let (lines, records) = result?;
        Ok(done(json!({
            "script": path,
            "lines": lines,
            "records": records,
        })))
    }

    /// Run each non-empty, non-comment line as a command line.
    async fn run_script(&mut self, text: &str, sink: &mut RecordSink<'_>) -> CommandResult<(usize, usize)> {
        let mut lines = 0;
        let mut records = 0;

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            lines += 1;

            let tokens = match tokenize(line) {
                Ok(tokens) => tokens,
                Err(e) => {
                    records += 1;
                    sink(OutputRecord::failed(line, e.into()));
                    continue;
                }
            };

            let mut counting = |record: OutputRecord| {
                records += 1;
                sink(record);
            };
            if let ChainStatus::Aborted(error) = self.run_streaming(&tokens, &mut counting).await {
                return Err(error);
            }
        }

        Ok((lines, records))
    }

    fn help_text(&self) -> String {
        self.registry
            .iter()
            .map(|spec| {
                let aliases = if spec.aliases.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", spec.aliases.join(", "))
                };
                format!("  {:<48} {}{}", spec.usage, spec.help, aliases)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
