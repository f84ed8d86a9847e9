//! Command table: canonical names, aliases and scopes

use std::collections::HashMap;

/// What a command does, independent of how it was addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Start,
    Stop,
    SendFiles,
    GetFiles,
    Status,
    Shell,
    ShellDetached,
    SystemOff,
}

/// Who a command is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// First argument names the target device
    Device {
        /// When false, a missing target means every device
        target_required: bool,
    },
    /// Every instance acts on it
    Universal,
}

/// One registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub kind: CommandKind,
    pub scope: Scope,
}

const DEVICE: Scope = Scope::Device {
    target_required: true,
};

const COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "start", aliases: &["st"], kind: CommandKind::Start, scope: DEVICE },
    CommandSpec { name: "startall", aliases: &["sta"], kind: CommandKind::Start, scope: Scope::Universal },
    CommandSpec { name: "stop", aliases: &["sp"], kind: CommandKind::Stop, scope: DEVICE },
    CommandSpec { name: "stopall", aliases: &["spa"], kind: CommandKind::Stop, scope: Scope::Universal },
    CommandSpec { name: "sendfiles", aliases: &["sendfile", "sf"], kind: CommandKind::SendFiles, scope: DEVICE },
    CommandSpec { name: "sendfilesall", aliases: &["sendfileall", "sfa"], kind: CommandKind::SendFiles, scope: Scope::Universal },
    CommandSpec { name: "getfiles", aliases: &["getfile", "gf"], kind: CommandKind::GetFiles, scope: DEVICE },
    CommandSpec { name: "getfilesall", aliases: &["getfileall", "gfa"], kind: CommandKind::GetFiles, scope: Scope::Universal },
    CommandSpec {
        name: "status",
        aliases: &["ss"],
        kind: CommandKind::Status,
        scope: Scope::Device { target_required: false },
    },
    CommandSpec { name: "statusall", aliases: &["ssa"], kind: CommandKind::Status, scope: Scope::Universal },
    CommandSpec { name: "shell", aliases: &["sl"], kind: CommandKind::Shell, scope: DEVICE },
    CommandSpec { name: "shellall", aliases: &["sla"], kind: CommandKind::Shell, scope: Scope::Universal },
    CommandSpec {
        name: "shellprocess",
        aliases: &["shellp", "slp"],
        kind: CommandKind::ShellDetached,
        scope: DEVICE,
    },
    CommandSpec {
        name: "shellprocessall",
        aliases: &["shellpall", "shellpa", "slpa"],
        kind: CommandKind::ShellDetached,
        scope: Scope::Universal,
    },
    CommandSpec { name: "systemoff", aliases: &[], kind: CommandKind::SystemOff, scope: DEVICE },
    CommandSpec { name: "systemoffall", aliases: &[], kind: CommandKind::SystemOff, scope: Scope::Universal },
];

/// Name and alias lookup, built once at startup
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    by_name: HashMap<&'static str, CommandSpec>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut by_name = HashMap::new();
        for spec in COMMANDS {
            by_name.insert(spec.name, *spec);
            for alias in spec.aliases {
                by_name.insert(*alias, *spec);
            }
        }
        Self { by_name }
    }

    /// Resolve a canonical name or alias
    pub fn resolve(&self, name: &str) -> Option<&CommandSpec> {
        self.by_name.get(name)
    }

    /// Every canonical command, in table order
    #[cfg(test)]
    pub fn commands(&self) -> impl Iterator<Item = &'static CommandSpec> {
        COMMANDS.iter()
    }
}
