//! Command registry
//!
//! Every command the shell understands is described once by a
//! [`CommandSpec`]: its [`CommandKind`] (what the pipeline dispatches on),
//! its names, how many tokens it takes and how its result renders.

use std::collections::HashMap;

use tracing::warn;

/// What a command does. The pipeline dispatches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Infos,
    Query,
    Clock,
    SyncTime,
    SetTime,
    SetTxPower,
    SetRadio,
    SetTuning,
    SetName,
    Set,
    GetBattery,
    Reboot,
    Send,
    Msg,
    ChanMsg,
    DefChanMsg,
    Cmd,
    Login,
    WaitLogin,
    ReqStatus,
    WaitStatus,
    Contacts,
    Channels,
    ChangePath,
    ResetPath,
    ShareContact,
    ExportContact,
    ExportMyself,
    RemoveContact,
    Recv,
    SyncMsgs,
    WaitMsg,
    TrywaitMsg,
    Wmt8,
    WaitAck,
    Advert,
    Sleep,
    To,
    Script,
    Help,
}

/// How many tokens a command consumes after its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many positional arguments.
    Fixed(usize),
    /// `leading` positional arguments, then a free-text body running up to
    /// the next command name.
    Text {
        /// Positional arguments before the body.
        leading: usize,
    },
    /// Zero or one argument, taken only when it is one of these words.
    Optional(&'static [&'static str]),
}

/// How a command's result is rendered for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Nothing beyond success.
    Unit,
    /// A single value or a block of text.
    Scalar,
    /// An epoch timestamp, shown as a date.
    Clock,
    /// A flat object, one `key: value` line per field.
    Record,
    /// Contact table.
    Contacts,
    /// Channel list.
    Channels,
    /// Received messages.
    Messages,
}

/// Immutable description of one command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub kind: CommandKind,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub arity: Arity,
    pub shape: ResultShape,
    pub usage: &'static str,
    pub help: &'static str,
}

/// Name and alias lookup over the registered commands.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    specs: Vec<CommandSpec>,
    index: HashMap<&'static str, usize>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. A name already taken is rebound to the new command.
    pub fn register(&mut self, spec: CommandSpec) {
        let slot = self.specs.len();
        for name in std::iter::once(&spec.name).chain(spec.aliases.iter()) {
            if let Some(previous) = self.index.insert(name, slot) {
                warn!(name, previous = self.specs[previous].name, "command name rebound");
            }
        }
        self.specs.push(spec);
    }

    /// Look up a token by exact name or alias.
    pub fn resolve(&self, token: &str) -> Option<&CommandSpec> {
        self.index.get(token).map(|&i| &self.specs[i])
    }

    /// The command registered for `kind`.
    pub fn spec(&self, kind: CommandKind) -> Option<&CommandSpec> {
        self.specs.iter().find(|s| s.kind == kind)
    }

    /// Registered commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.specs.iter()
    }

    /// The full command set of the shell.
    pub fn builtin() -> Self {
        use Arity::*;
        use CommandKind as K;
        use ResultShape as R;

        let mut registry = Registry::new();
        let mut add = |kind: CommandKind,
                       name: &'static str,
                       aliases: &'static [&'static str],
                       arity: Arity,
                       shape: ResultShape,
                       usage: &'static str,
                       help: &'static str| {
            registry.register(CommandSpec {
                kind,
                name,
                aliases,
                arity,
                shape,
                usage,
                help,
            })
        };

        add(K::Infos, "infos", &["i"], Fixed(0), R::Record, "infos", "print informations about the node");
        add(K::Query, "query", &["q"], Fixed(0), R::Record, "query", "query device firmware and limits");
        add(K::Clock, "clock", &["get_time"], Optional(&["sync"]), R::Clock, "clock [sync]", "get current time, or set it from this host");
        add(K::SyncTime, "sync_time", &["st"], Fixed(0), R::Unit, "sync_time", "set device time to host time");
        add(K::SetTime, "set_time", &[], Fixed(1), R::Unit, "set_time <epoch>", "set device time");
        add(K::SetTxPower, "set_txpower", &["txp"], Fixed(1), R::Unit, "set_txpower <dbm>", "set tx power");
        add(K::SetRadio, "set_radio", &["rad"], Fixed(4), R::Unit, "set_radio <freq> <bw> <sf> <cr>", "set radio params (MHz, kHz)");
        add(K::SetTuning, "set_tuning", &["tun"], Fixed(2), R::Unit, "set_tuning <rx_dly> <af>", "set tuning params");
        add(K::SetName, "set_name", &[], Text { leading: 0 }, R::Unit, "set_name <name>", "set advertised name");
        add(K::Set, "set", &[], Fixed(2), R::Unit, "set <pin|radio|name|tx|lat|lon|coords> <value>", "set a node parameter");
        add(K::GetBattery, "get_bat", &["b"], Fixed(0), R::Record, "get_bat", "get battery level");
        add(K::Reboot, "reboot", &[], Fixed(0), R::Unit, "reboot", "reboot the node");
        add(K::Send, "send", &[], Text { leading: 1 }, R::Record, "send <key> <text>", "send a message to a public key prefix");
        add(K::Msg, "msg", &["sendto", "m", "{"], Text { leading: 1 }, R::Record, "msg <contact> <text>", "send a message to a contact");
        add(K::ChanMsg, "chan_msg", &["ch"], Text { leading: 1 }, R::Record, "chan_msg <channel> <text>", "send a message to a channel");
        add(K::DefChanMsg, "def_chan_msg", &["def_chan", "dch"], Text { leading: 0 }, R::Record, "def_chan_msg <text>", "send a message on the default channel");
        add(K::Cmd, "cmd", &["c", "["], Text { leading: 1 }, R::Record, "cmd <contact> <command>", "send a command to a repeater or room");
        add(K::Login, "login", &["l", "[["], Fixed(2), R::Unit, "login <contact> <password>", "log into a node");
        add(K::WaitLogin, "wait_login", &["wl", "]]"], Fixed(0), R::Record, "wait_login", "wait for login (times out after 5s)");
        add(K::ReqStatus, "req_status", &["rs"], Fixed(1), R::Unit, "req_status <contact>", "request status of a node");
        add(K::WaitStatus, "wait_status", &["ws"], Fixed(0), R::Record, "wait_status", "wait for a status reply");
        add(K::Contacts, "contacts", &["lc"], Fixed(0), R::Contacts, "contacts", "get contact list");
        add(K::Channels, "channels", &["lch"], Fixed(0), R::Channels, "channels", "list configured channels");
        add(K::ChangePath, "change_path", &["cp"], Fixed(2), R::Unit, "change_path <contact> <path>", "change the out path to a contact");
        add(K::ResetPath, "reset_path", &["rp"], Fixed(1), R::Unit, "reset_path <contact>", "reset the path to a contact to flood");
        add(K::ShareContact, "share_contact", &["sc"], Fixed(1), R::Unit, "share_contact <contact>", "share a contact with others (zero hop)");
        add(K::ExportContact, "export_contact", &["ec"], Fixed(1), R::Scalar, "export_contact <contact>", "get a contact's URI");
        add(K::ExportMyself, "export_myself", &["e"], Fixed(0), R::Scalar, "export_myself", "export this node's URI");
        add(K::RemoveContact, "remove_contact", &[], Fixed(1), R::Unit, "remove_contact <contact>", "remove a contact");
        add(K::Recv, "recv", &["r"], Fixed(0), R::Messages, "recv", "read the next message");
        add(K::SyncMsgs, "sync_msgs", &["sm"], Fixed(0), R::Messages, "sync_msgs", "get all unread messages");
        add(K::WaitMsg, "wait_msg", &["wm"], Fixed(0), R::Messages, "wait_msg", "wait for a message and read it");
        add(K::TrywaitMsg, "trywait_msg", &["wmt"], Fixed(1), R::Messages, "trywait_msg <secs>", "wait for a message up to <secs>");
        add(K::Wmt8, "wmt8", &["]"], Fixed(0), R::Messages, "wmt8", "wait for a message up to 8 seconds");
        add(K::WaitAck, "wait_ack", &["wa", "}"], Fixed(0), R::Record, "wait_ack", "wait for the ack of the last message");
        add(K::Advert, "advert", &["a"], Fixed(0), R::Unit, "advert", "send an advertisement");
        add(K::Sleep, "sleep", &["s"], Fixed(1), R::Unit, "sleep <secs>", "pause");
        add(K::To, "to", &[], Fixed(1), R::Scalar, "to <contact|channel|/|~|..|!>", "change the current recipient");
        add(K::Script, "script", &[], Fixed(1), R::Record, "script <file>", "run the command lines of a file");
        add(K::Help, "help", &["h", "?"], Fixed(0), R::Scalar, "help", "list commands");

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_name_and_alias() {
        let registry = Registry::builtin();
        assert_eq!(registry.resolve("msg").unwrap().kind, CommandKind::Msg);
        assert_eq!(registry.resolve("{").unwrap().kind, CommandKind::Msg);
        assert_eq!(registry.resolve("]]").unwrap().kind, CommandKind::WaitLogin);
        assert_eq!(registry.resolve("]").unwrap().kind, CommandKind::Wmt8);
        assert!(registry.resolve("hello").is_none());
        assert!(registry.resolve("MSG").is_none());
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let registry = Registry::builtin();
        let mut seen = std::collections::HashSet::new();
        for spec in registry.iter() {
            for name in std::iter::once(&spec.name).chain(spec.aliases.iter()) {
                assert!(seen.insert(*name), "duplicate command name {}", name);
            }
        }
    }

    #[test]
    fn test_register_rebinds_name() {
        let mut registry = Registry::builtin();
        registry.register(CommandSpec {
            kind: CommandKind::Help,
            name: "commands",
            aliases: &["h"],
            arity: Arity::Fixed(0),
            shape: ResultShape::Scalar,
            usage: "commands",
            help: "list commands",
        });
        assert_eq!(registry.resolve("h").unwrap().name, "commands");
        assert_eq!(registry.resolve("help").unwrap().name, "help");
    }
}
