//! Command pipeline
//!
//! Segments a token stream against the [`Registry`] and executes the
//! invocations strictly one after another against the shared session. Each
//! invocation produces exactly one [`OutputRecord`], streamed to the caller's
//! sink as soon as it exists. A transport failure stops the chain; the
//! invocations after it are still reported, as aborted records.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mccli_protocol::{ChannelInfo, ContactInfo};
use tokio::sync::Notify;
use tracing::debug;

use crate::contacts::{resolve_channel, resolve_contact, ChannelRef, RecipientContext};
use crate::error::{CommandError, CommandResult};
use crate::format::{Outcome, OutputRecord};
use crate::registry::{Registry, ResultShape};
use crate::segment::{segment, tokenize, Invocation, Segment};
use crate::session::DeviceSession;
use crate::wait::{PendingWait, WaitCoordinator, WaitSlot};

/// Boxed future returned by recursive pipeline calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Receives records as they are produced.
pub type RecordSink<'a> = dyn FnMut(OutputRecord) + Send + 'a;

/// Timing and limits used by the handlers.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub login_timeout: Duration,
    pub status_timeout: Duration,
    /// Ack window when the device suggests none.
    pub ack_fallback: Duration,
    /// Window of `wmt8`.
    pub short_message_wait: Duration,
    /// Channel indexes probed by `channels`.
    pub max_channels: u8,
    /// Nesting limit of `script`.
    pub script_depth: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            login_timeout: Duration::from_secs(5),
            status_timeout: Duration::from_secs(5),
            ack_fallback: Duration::from_secs(6),
            short_message_wait: Duration::from_secs(8),
            max_channels: 8,
            script_depth: 8,
        }
    }
}

/// Ctrl-C state shared with the signal handler.
#[derive(Debug, Default)]
pub struct Interrupt {
    flag: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Resolves once [`Interrupt::trigger`] has been called.
    pub async fn triggered(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// How a chain ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainStatus {
    Completed,
    /// Stopped early by this error; later invocations were reported aborted.
    Aborted(CommandError),
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Done(serde_json::Value),
    TimedOut(WaitSlot),
}

/// Executes invocations against one device session.
pub struct Pipeline {
    pub(crate) session: Arc<dyn DeviceSession>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) waits: WaitCoordinator,
    pub(crate) options: PipelineOptions,
    pub(crate) interrupt: Arc<Interrupt>,
    pub(crate) contacts: Option<Vec<ContactInfo>>,
    pub(crate) channels: Option<Vec<ChannelInfo>>,
    pub(crate) armed: HashMap<WaitSlot, PendingWait>,
    pub(crate) recipients: RecipientContext,
    pub(crate) script_depth: usize,
}

impl Pipeline {
    pub fn new(session: Arc<dyn DeviceSession>, waits: WaitCoordinator, options: PipelineOptions) -> Self {
        Pipeline {
            session,
            registry: Arc::new(Registry::builtin()),
            waits,
            options,
            interrupt: Arc::new(Interrupt::default()),
            contacts: None,
            channels: None,
            armed: HashMap::new(),
            recipients: RecipientContext::default(),
            script_depth: 0,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn waits(&self) -> &WaitCoordinator {
        &self.waits
    }

    pub fn session(&self) -> &Arc<dyn DeviceSession> {
        &self.session
    }

    pub fn interrupt(&self) -> Arc<Interrupt> {
        self.interrupt.clone()
    }

    pub fn recipients(&self) -> &RecipientContext {
        &self.recipients
    }

    pub fn recipients_mut(&mut self) -> &mut RecipientContext {
        &mut self.recipients
    }

    /// Take the wait a previous command armed on `slot`, if still held.
    pub fn take_armed(&mut self, slot: WaitSlot) -> Option<PendingWait> {
        self.armed.remove(&slot)
    }

    /// Drop every armed wait and cancel outstanding registrations.
    pub fn cancel_waits(&mut self) {
        self.armed.clear();
        self.waits.cancel_all();
    }

    /// Run a chain and collect its records.
    pub async fn run(&mut self, tokens: &[String]) -> Vec<OutputRecord> {
        let mut records = Vec::new();
        self.run_streaming(tokens, &mut |record| records.push(record)).await;
        records
    }

    /// Tokenize and run one command line.
    pub async fn run_line(&mut self, line: &str) -> Vec<OutputRecord> {
        match tokenize(line) {
            Ok(tokens) => self.run(&tokens).await,
            Err(e) => vec![OutputRecord::failed(line.trim(), e.into())],
        }
    }

    /// Run a chain, handing each record to `sink` as soon as it exists.
    pub fn run_streaming<'a>(
        &'a mut self,
        tokens: &'a [String],
        sink: &'a mut RecordSink<'_>,
    ) -> BoxFuture<'a, ChainStatus> {
        Box::pin(async move {
            let segments = segment(&self.registry, tokens);
            let mut stop: Option<CommandError> = None;

            for seg in segments {
                let (name, structured) = match &seg {
                    Segment::Invocation(inv) => (inv.name.to_string(), inv.structured),
                    Segment::Invalid { token, structured, .. } => (token.clone(), *structured),
                };

                if stop.is_none() && self.interrupt.is_set() {
                    stop = Some(CommandError::Cancelled);
                }

                let mut record = match (&stop, seg) {
                    (Some(cause), _) => {
                        OutputRecord::failed(name, CommandError::Aborted(format!("chain stopped: {}", cause)))
                    }
                    (None, Segment::Invalid { error, .. }) => OutputRecord::failed(name, error.into()),
                    (None, Segment::Invocation(inv)) => self.execute(&inv, sink).await,
                };
                record.structured = structured;

                if stop.is_none() {
                    if let Outcome::Failed(error) = &record.outcome {
                        if error.is_fatal() {
                            stop = Some(error.clone());
                        }
                    }
                }
                sink(record);
            }

            match stop {
                Some(error) => ChainStatus::Aborted(error),
                None => ChainStatus::Completed,
            }
        })
    }

    /// Execute one invocation. Nested records (from `script`) go to `sink`;
    /// the invocation's own record is returned.
    pub async fn execute(&mut self, inv: &Invocation, sink: &mut RecordSink<'_>) -> OutputRecord {
        let shape = self
            .registry
            .spec(inv.kind)
            .map(|s| s.shape)
            .unwrap_or(ResultShape::Record);

        debug!(command = inv.name, args = ?inv.args, "executing");
        let outcome = match self.dispatch(inv, sink).await {
            Ok(Reply::Done(value)) => Outcome::Done(value),
            Ok(Reply::TimedOut(slot)) => Outcome::TimedOut(slot),
            Err(error) => {
                debug!(command = inv.name, %error, "command failed");
                Outcome::Failed(error)
            }
        };

        OutputRecord {
            command: inv.name.to_string(),
            shape,
            outcome,
            structured: inv.structured,
        }
    }

    /// The contact list, fetched on first use.
    pub(crate) async fn contact_list(&mut self) -> CommandResult<&[ContactInfo]> {
        if self.contacts.is_none() {
            self.contacts = Some(self.session.list_contacts().await?);
        }
        Ok(self.contacts.as_deref().unwrap_or_default())
    }

    /// Resolve a contact reference against the cached contact list.
    pub(crate) async fn contact(&mut self, needle: &str) -> CommandResult<ContactInfo> {
        let contacts = self.contact_list().await?;
        resolve_contact(contacts, needle).cloned()
    }

    /// Resolve a channel reference. Numeric references skip the device.
    pub(crate) async fn channel(&mut self, needle: &str) -> CommandResult<ChannelRef> {
        if needle.parse::<u8>().is_err() && self.channels.is_none() {
            self.channels = Some(self.session.list_channels(self.options.max_channels).await?);
        }
        resolve_channel(self.channels.as_deref().unwrap_or_default(), needle)
    }

    /// Forget cached contacts after a change on the device.
    pub(crate) fn invalidate_contacts(&mut self) {
        self.contacts = None;
    }
}
