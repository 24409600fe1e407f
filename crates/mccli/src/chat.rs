//! Chat state machine
//!
//! Interactive lines are addressed to the current recipient. At the root a
//! line is a command line; a chat contact gets a message, a repeater or room
//! server gets a remote command, a channel gets a channel message. A leading
//! `/` always runs the rest as a command line, and `to ...` navigates.
//!
//! Messages sent from here arm an ack wait; the recipient shows a pending-ack
//! marker in the prompt until the ack arrives. A timed-out ack leaves the
//! marker set. Acks are tracked by code, so a confirmation still clears the
//! marker after a later send replaced its wait.

use std::collections::HashMap;

use mccli_protocol::PushNotification;
use serde_json::Value;
use tracing::{debug, info};

use crate::contacts::Recipient;
use crate::format::{message_line, render, Outcome, OutputMode, OutputRecord};
use crate::pipeline::Pipeline;
use crate::registry::CommandKind;
use crate::segment::Invocation;
use crate::wait::{EventFilter, PendingWait, WaitOutcome, WaitSlot};

/// What the caller should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    Continue,
    Quit,
}

/// An ack wait handed to the caller, tagged with who it is for.
#[derive(Debug)]
pub struct AckWatch {
    /// Display name of the recipient.
    pub recipient: String,
    pub ack_code: u32,
    pub wait: PendingWait,
}

/// Interactive session over one pipeline.
pub struct ChatSession {
    pipeline: Pipeline,
    mode: OutputMode,
    /// Unconfirmed ack codes and who they were sent to.
    unacked: HashMap<u32, String>,
    acks: Vec<AckWatch>,
}

impl ChatSession {
    pub fn new(pipeline: Pipeline, mode: OutputMode) -> Self {
        ChatSession {
            pipeline,
            mode,
            unacked: HashMap::new(),
            acks: Vec::new(),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn current(&self) -> &Recipient {
        &self.pipeline.recipients().current
    }

    /// Whether `recipient` still has an unconfirmed message.
    pub fn awaiting_ack(&self, recipient: &Recipient) -> bool {
        let name = recipient.to_string();
        self.unacked.values().any(|r| *r == name)
    }

    /// `alice> `, or `*alice> ` while an ack is outstanding.
    pub fn prompt(&self) -> String {
        let current = self.current();
        let marker = if self.awaiting_ack(current) { "*" } else { "" };
        format!("{}{}> ", marker, current)
    }

    /// Ack waits armed since the last call.
    pub fn take_ack_watches(&mut self) -> Vec<AckWatch> {
        std::mem::take(&mut self.acks)
    }

    /// Handle one input line, printing rendered records through `print`.
    pub async fn handle_line(&mut self, line: &str, print: &mut (dyn FnMut(String) + Send)) -> LineAction {
        let line = line.trim();
        if line.is_empty() {
            return LineAction::Continue;
        }
        // A Ctrl-C only stops the line that was running when it came
        self.pipeline.interrupt().clear();
        if matches!(line, "q" | "quit") {
            self.pipeline.cancel_waits();
            return LineAction::Quit;
        }

        if let Some(command_line) = line.strip_prefix('/') {
            self.run_command_line(command_line, print).await;
            return LineAction::Continue;
        }
        if line == "to" || line.starts_with("to ") {
            self.run_command_line(line, print).await;
            return LineAction::Continue;
        }

        let invocation = match self.current().clone() {
            Recipient::Root => {
                self.run_command_line(line, print).await;
                return LineAction::Continue;
            }
            Recipient::Contact(contact) if contact.kind.accepts_commands() => Invocation::new(
                CommandKind::Cmd,
                "cmd",
                vec![contact.public_key.to_hex(), line.to_string()],
            ),
            Recipient::Contact(contact) => Invocation::new(
                CommandKind::Msg,
                "msg",
                vec![contact.public_key.to_hex(), line.to_string()],
            ),
            Recipient::Channel(channel) => Invocation::new(
                CommandKind::ChanMsg,
                "chan_msg",
                vec![channel.index.to_string(), line.to_string()],
            ),
        };

        let mode = self.mode;
        let record = self
            .pipeline
            .execute(&invocation, &mut |nested| print(render(&nested, mode)))
            .await;

        if record.is_ok() && invocation.kind == CommandKind::Msg {
            if let Some(wait) = self.pipeline.take_armed(WaitSlot::Ack) {
                if let EventFilter::Ack(ack_code) = wait.filter() {
                    let recipient = self.current().to_string();
                    self.unacked.insert(ack_code, recipient.clone());
                    self.acks.push(AckWatch {
                        recipient,
                        ack_code,
                        wait,
                    });
                }
            }
        }
        // Successful sends are silent in human mode; the prompt shows the ack state
        if !record.is_ok() || self.mode == OutputMode::Json {
            print(render(&record, mode));
        }
        LineAction::Continue
    }

    async fn run_command_line(&mut self, line: &str, print: &mut (dyn FnMut(String) + Send)) {
        let tokens = match crate::segment::tokenize(line) {
            Ok(tokens) => tokens,
            Err(e) => {
                print(render(&OutputRecord::failed(line, e.into()), self.mode));
                return;
            }
        };
        let mode = self.mode;
        let mut confirmed = Vec::new();
        self.pipeline
            .run_streaming(&tokens, &mut |record| {
                if let Some(code) = confirmed_ack(&record) {
                    confirmed.push(code);
                }
                print(render(&record, mode))
            })
            .await;
        for code in confirmed {
            self.clear_ack(code);
        }
    }

    /// React to a push notification nobody waited for.
    pub async fn handle_event(&mut self, event: PushNotification, print: &mut (dyn FnMut(String) + Send)) {
        match event {
            PushNotification::MessageWaiting => {
                let invocation = Invocation::new(CommandKind::SyncMsgs, "sync_msgs", Vec::new());
                let record = self.pipeline.execute(&invocation, &mut |_| {}).await;
                match (&record.outcome, self.mode) {
                    (Outcome::Done(Value::Array(messages)), OutputMode::Human) => {
                        for message in messages {
                            print(message_line(message));
                        }
                    }
                    _ => print(render(&record, self.mode)),
                }
            }
            PushNotification::Advert { public_key } => {
                debug!(key = %public_key.to_hex(), "advert heard");
                self.pipeline.invalidate_contacts();
            }
            PushNotification::NewAdvert(contact) => {
                info!(name = %contact.name, "new contact");
                self.pipeline.invalidate_contacts();
            }
            PushNotification::PathUpdated { .. } => self.pipeline.invalidate_contacts(),
            PushNotification::SendConfirmed { ack_code, .. } => self.clear_ack(ack_code),
            other => debug!(event = other.name(), "ignored push notification"),
        }
    }

    /// Record how the ack wait for `ack_code` ended.
    pub fn on_ack(&mut self, ack_code: u32, outcome: &WaitOutcome) {
        match outcome {
            WaitOutcome::Fulfilled(PushNotification::SendConfirmed { ack_code, .. }) => self.clear_ack(*ack_code),
            // Superseded waits stay tracked; the ack may still show up unclaimed
            other => debug!(ack = %format!("{:08x}", ack_code), ?other, "no ack"),
        }
    }

    fn clear_ack(&mut self, ack_code: u32) {
        if let Some(recipient) = self.unacked.remove(&ack_code) {
            debug!(%recipient, "ack received");
        }
    }
}

/// The ack code reported by a successful `wait_ack` record.
fn confirmed_ack(record: &OutputRecord) -> Option<u32> {
    if record.command != "wait_ack" {
        return None;
    }
    match &record.outcome {
        Outcome::Done(value) => {
            let code = value.get("ack")?.as_str()?;
            u32::from_str_radix(code, 16).ok()
        }
        _ => None,
    }
}
