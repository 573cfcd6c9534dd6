#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandKind {
    Help,
    Detach,
    Copy,
    Clear,
    Info,
    History,
    Quit,
    Attach,
    Temperature,
    MaxTokens,
    Export,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub kind: CommandKind,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        kind: CommandKind::Help,
    },
    CommandSpec {
        command: "detach",
        kind: CommandKind::Detach,
    },
    CommandSpec {
        command: "copy",
        kind: CommandKind::Copy,
    },
    CommandSpec {
        command: "clear",
        kind: CommandKind::Clear,
    },
    CommandSpec {
        command: "info",
        kind: CommandKind::Info,
    },
    CommandSpec {
        command: "history",
        kind: CommandKind::History,
    },
    CommandSpec {
        command: "quit",
        kind: CommandKind::Quit,
    },
    CommandSpec {
        command: "exit",
        kind: CommandKind::Quit,
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "attach",
    kind: CommandKind::Attach,
}];

pub(crate) const NUMERIC_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "temperature",
        kind: CommandKind::Temperature,
    },
    CommandSpec {
        command: "temp",
        kind: CommandKind::Temperature,
    },
    CommandSpec {
        command: "max_tokens",
        kind: CommandKind::MaxTokens,
    },
];

pub(crate) const EXPORT_COMMAND: CommandSpec = CommandSpec {
    command: "export",
    kind: CommandKind::Export,
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/attach <path>",
    "/detach",
    "/temperature <0.1-2.0>",
    "/max_tokens <n>",
    "/export [txt|json]",
    "/copy",
    "/clear",
    "/history",
    "/info",
    "/help",
    "/quit",
];

pub(crate) fn find_command(command: &str, specs: &[CommandSpec]) -> Option<CommandKind> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.kind)
}
