//! Contact and channel references, and the chat recipient context.

use std::fmt;

use mccli_protocol::{ChannelInfo, ContactInfo, ContactKind, PublicKey, PublicKeyPrefix};

use crate::error::{CommandError, CommandResult};

/// A resolved contact.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactRef {
    pub name: String,
    pub public_key: PublicKey,
    pub kind: ContactKind,
}

impl From<&ContactInfo> for ContactRef {
    fn from(contact: &ContactInfo) -> Self {
        ContactRef {
            name: contact.name.clone(),
            public_key: contact.public_key,
            kind: contact.kind(),
        }
    }
}

/// A resolved channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRef {
    pub index: u8,
    pub name: String,
}

/// Where typed text goes in chat mode.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Recipient {
    /// The node itself: lines are command lines.
    #[default]
    Root,
    Contact(ContactRef),
    Channel(ChannelRef),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Root => f.write_str("/"),
            Recipient::Contact(c) => f.write_str(&c.name),
            Recipient::Channel(ch) if ch.name.is_empty() => write!(f, "ch{}", ch.index),
            Recipient::Channel(ch) => write!(f, "#{}", ch.name.trim_start_matches('#')),
        }
    }
}

/// Navigation argument of `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavTarget {
    /// `/` or `~`
    Root,
    /// `..`
    Back,
    /// `!`
    LastSender,
    /// Anything else: a contact or channel reference.
    Named(String),
}

impl NavTarget {
    pub fn parse(arg: &str) -> Self {
        match arg {
            "/" | "~" => NavTarget::Root,
            ".." => NavTarget::Back,
            "!" => NavTarget::LastSender,
            other => NavTarget::Named(other.to_string()),
        }
    }
}

/// Current recipient with one level of back history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipientContext {
    pub current: Recipient,
    pub previous: Recipient,
    pub last_sender: Option<ContactRef>,
}

impl RecipientContext {
    /// Make `recipient` current, remembering the old one.
    pub fn switch_to(&mut self, recipient: Recipient) {
        self.previous = std::mem::replace(&mut self.current, recipient);
    }

    /// `to ..`
    pub fn back(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
    }

    /// `to !`
    pub fn to_last_sender(&mut self) -> CommandResult<()> {
        let sender = self
            .last_sender
            .clone()
            .ok_or_else(|| CommandError::Unresolved("nobody has messaged yet".to_string()))?;
        self.switch_to(Recipient::Contact(sender));
        Ok(())
    }

    /// Remember who messaged last; the current recipient stays.
    pub fn observe_sender(&mut self, sender: ContactRef) {
        self.last_sender = Some(sender);
    }
}

fn ambiguous<'a>(needle: &str, matches: impl Iterator<Item = &'a ContactInfo>) -> CommandError {
    let names: Vec<&str> = matches.map(|c| c.name.as_str()).collect();
    CommandError::Unresolved(format!("ambiguous contact '{}' ({})", needle, names.join(", ")))
}

/// Find a contact by exact name, by hex key prefix, or by an unambiguous
/// case-insensitive name prefix, in that order.
pub fn resolve_contact<'a>(contacts: &'a [ContactInfo], needle: &str) -> CommandResult<&'a ContactInfo> {
    if let Some(contact) = contacts.iter().find(|c| c.name == needle) {
        return Ok(contact);
    }

    if needle.len() >= 2 && needle.chars().all(|c| c.is_ascii_hexdigit()) {
        let needle_lower = needle.to_ascii_lowercase();
        let by_key: Vec<&ContactInfo> = contacts
            .iter()
            .filter(|c| c.public_key.to_hex().starts_with(&needle_lower))
            .collect();
        match by_key.len() {
            0 => {}
            1 => return Ok(by_key[0]),
            _ => return Err(ambiguous(needle, by_key.into_iter())),
        }
    }

    let lower = needle.to_lowercase();
    let by_name: Vec<&ContactInfo> = contacts
        .iter()
        .filter(|c| c.name.to_lowercase().starts_with(&lower))
        .collect();
    match by_name.len() {
        1 => Ok(by_name[0]),
        0 => Err(CommandError::Unresolved(format!("unknown contact '{}'", needle))),
        _ => Err(ambiguous(needle, by_name.into_iter())),
    }
}

/// Find the contact a received message came from.
pub fn contact_by_prefix<'a>(contacts: &'a [ContactInfo], prefix: &PublicKeyPrefix) -> Option<&'a ContactInfo> {
    contacts.iter().find(|c| c.public_key.starts_with(prefix.as_bytes()))
}

/// Find a channel by index or by name (`#` optional, case-insensitive).
pub fn resolve_channel(channels: &[ChannelInfo], needle: &str) -> CommandResult<ChannelRef> {
    if let Ok(index) = needle.parse::<u8>() {
        let name = channels
            .iter()
            .find(|c| c.index == index)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        return Ok(ChannelRef { index, name });
    }

    let wanted = needle.trim_start_matches('#');
    channels
        .iter()
        .find(|c| c.name.trim_start_matches('#').eq_ignore_ascii_case(wanted))
        .map(|c| ChannelRef {
            index: c.index,
            name: c.name.clone(),
        })
        .ok_or_else(|| CommandError::Unresolved(format!("unknown channel '{}'", needle)))
}
