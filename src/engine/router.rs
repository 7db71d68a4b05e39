//! Prefix command routing.
//!
//! A message is routed as a command when some command other than the
//! built-in `help` is registered and its raw text starts with a configured
//! prefix character. The first whitespace-separated token, minus the prefix,
//! is matched case-sensitively against every command's aliases.
//!
//! | Message                              | Outcome                  |
//! |--------------------------------------|--------------------------|
//! | no prefix, or only `help` registered | fan out to subscribers   |
//! | prefix, alias matches                | fire applicable commands |
//! | prefix, no alias matches             | one fallback reply       |

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::handler::Handler;
use crate::constants::HELP_COMMAND;
use crate::error::EngineError;
use crate::models::{Lineage, Message, MessageKind, Target};

/// A named command with its applicability rules.
#[derive(Debug)]
pub struct Command {
    aliases: Vec<String>,
    handler: Handler<Arc<Message>>,
    kind: MessageKind,
    admin: bool,
    help: String,
    audience: Vec<Target>,
    builtin: bool,
}

impl Command {
    /// Create a command answering to `aliases`, applicable to any message.
    pub fn new<I, S>(aliases: I, handler: Handler<Arc<Message>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            aliases: aliases.into_iter().map(Into::into).collect(),
            handler,
            kind: MessageKind::Any,
            admin: false,
            help: String::new(),
            audience: Vec::new(),
            builtin: false,
        }
    }

    /// Restrict the command to messages of `kind`.
    #[must_use]
    pub fn applies_to(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Restrict the command to configured admins.
    #[must_use]
    pub fn admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Set the help text.
    #[must_use]
    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help = text.into();
        self
    }

    /// Restrict the command to an audience allow-list.
    #[must_use]
    pub fn audience(mut self, targets: impl IntoIterator<Item = Target>) -> Self {
        self.audience = targets.into_iter().collect();
        self
    }

    /// All aliases, primary name first.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Primary name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.aliases.first().map_or("", String::as_str)
    }

    /// Kind of message the command applies to.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Whether only admins may run the command.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Help text.
    #[must_use]
    pub fn help_text(&self) -> &str {
        &self.help
    }

    /// Audience allow-list; empty means everyone.
    #[must_use]
    pub fn targets(&self) -> &[Target] {
        &self.audience
    }

    pub(crate) fn handler(&self) -> &Handler<Arc<Message>> {
        &self.handler
    }

    fn answers(&self, alias: &str) -> bool {
        self.aliases.iter().any(|a| a == alias)
    }

    fn visible_to(&self, msg: &Message, admins: &HashSet<i64>) -> bool {
        msg.kind().is_a(self.kind) && (!self.admin || admins.contains(&msg.sender().user_id))
    }

    fn accepts(&self, msg: &Message, admins: &HashSet<i64>) -> bool {
        self.visible_to(msg, admins) && Target::allows(&self.audience, msg)
    }
}

/// What the router decided for one message.
#[derive(Debug)]
pub enum Routing {
    /// Prefixed message naming registered commands; these ones fire.
    Commands(Vec<Arc<Command>>),
    /// Prefixed message naming no registered command.
    Unknown,
    /// Not a command; deliver to message subscribers.
    Fanout,
}

type CommandList = RwLock<Vec<Arc<Command>>>;

/// Registered commands plus the routing rules.
#[derive(Debug)]
pub struct CommandRouter {
    commands: Arc<CommandList>,
    prefixes: Vec<char>,
    admins: Arc<HashSet<i64>>,
}

impl CommandRouter {
    /// Create a router with the built-in help command registered.
    pub fn new(prefixes: Vec<char>, admins: impl IntoIterator<Item = i64>) -> Self {
        let router = Self {
            commands: Arc::new(RwLock::new(Vec::new())),
            prefixes,
            admins: Arc::new(admins.into_iter().collect()),
        };
        let help = router.help_command();
        router
            .commands
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(help));
        router
    }

    /// Register a command.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registration`] if the command has no aliases,
    /// an alias is empty or contains whitespace, or an alias is already
    /// taken.
    pub fn register(&self, command: Command) -> Result<Arc<Command>, EngineError> {
        if command.aliases.is_empty() {
            return Err(EngineError::Registration(
                "command needs at least one alias".to_string(),
            ));
        }
        if let Some(bad) = command
            .aliases
            .iter()
            .find(|a| a.is_empty() || a.chars().any(char::is_whitespace))
        {
            return Err(EngineError::Registration(format!("invalid alias '{bad}'")));
        }

        let mut commands = self.commands.write().unwrap_or_else(PoisonError::into_inner);
        for (i, alias) in command.aliases.iter().enumerate() {
            let taken = command.aliases[..i].contains(alias)
                || commands.iter().any(|existing| existing.answers(alias));
            if taken {
                return Err(EngineError::Registration(format!(
                    "alias '{alias}' is already registered"
                )));
            }
        }

        let command = Arc::new(command);
        commands.push(Arc::clone(&command));
        log::debug!("[Router] Registered command {:?}", command.aliases);
        Ok(command)
    }

    /// Decide how `msg` is handled.
    #[must_use]
    pub fn route(&self, msg: &Message) -> Routing {
        let commands = self.commands.read().unwrap_or_else(PoisonError::into_inner);
        if commands.iter().all(|c| c.builtin) {
            return Routing::Fanout;
        }

        let text = msg.raw_message();
        let Some(prefix) = text.chars().next().filter(|c| self.prefixes.contains(c)) else {
            return Routing::Fanout;
        };
        let first = text.split_whitespace().next().unwrap_or_default();
        let alias = first.strip_prefix(prefix).unwrap_or(first);

        let mut named = commands.iter().filter(|c| c.answers(alias)).peekable();
        if named.peek().is_none() {
            return Routing::Unknown;
        }
        Routing::Commands(
            named
                .filter(|c| c.accepts(msg, &self.admins))
                .cloned()
                .collect(),
        )
    }

    /// Whether `user_id` is a configured admin.
    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    /// Number of registered commands, help included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no command is registered. Never true once constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Help listing for `msg`.
    #[must_use]
    pub fn help_for(&self, msg: &Message) -> String {
        let commands = self.commands.read().unwrap_or_else(PoisonError::into_inner);
        render_help(&commands, msg, &self.admins, self.primary_prefix())
    }

    fn primary_prefix(&self) -> char {
        self.prefixes.first().copied().unwrap_or(crate::constants::DEFAULT_COMMAND_PREFIX)
    }

    fn help_command(&self) -> Command {
        let commands: Weak<CommandList> = Arc::downgrade(&self.commands);
        let admins = Arc::clone(&self.admins);
        let prefix = self.primary_prefix();

        let handler = Handler::from_async(move |msg: Arc<Message>| {
            let text = commands.upgrade().map(|list| {
                let list = list.read().unwrap_or_else(PoisonError::into_inner);
                render_help(&list, &msg, &admins, prefix)
            });
            async move {
                let text = text.ok_or(EngineError::EngineGone)?;
                msg.reply(&text).await?;
                Ok(())
            }
        });

        let mut help = Command::new([HELP_COMMAND], handler).help("List available commands");
        help.builtin = true;
        help
    }
}

fn render_help(
    commands: &[Arc<Command>],
    msg: &Message,
    admins: &HashSet<i64>,
    prefix: char,
) -> String {
    let mut out = String::from("Commands:");
    for command in commands.iter().filter(|c| c.visible_to(msg, admins)) {
        let names: Vec<String> = command.aliases.iter().map(|a| format!("{prefix}{a}")).collect();
        out.push('\n');
        out.push_str(&names.join(", "));
        if !command.help.is_empty() {
            out.push_str(" - ");
            out.push_str(&command.help);
        }
    }
    out
}
