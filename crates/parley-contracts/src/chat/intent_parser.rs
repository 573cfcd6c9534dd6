use super::command_registry::{
    find_command, CommandKind, EXPORT_COMMAND, NO_ARG_COMMANDS, NUMERIC_COMMANDS,
    SINGLE_PATH_COMMANDS,
};

/// What a line typed into the chat prompt asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentAction {
    Noop,
    Send { text: String },
    Help,
    Attach { path: String },
    Detach,
    SetTemperature { value: Option<f32> },
    SetMaxTokens { value: Option<u32> },
    Export { format: String },
    Copy,
    Clear,
    Info,
    History,
    Quit,
    Unknown { command: String, arg: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: IntentAction,
    pub raw: String,
}

impl Intent {
    fn new(action: IntentAction, raw: &str) -> Self {
        Self {
            action,
            raw: raw.to_string(),
        }
    }
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

fn no_arg_action(kind: CommandKind) -> IntentAction {
    match kind {
        CommandKind::Help => IntentAction::Help,
        CommandKind::Detach => IntentAction::Detach,
        CommandKind::Copy => IntentAction::Copy,
        CommandKind::Clear => IntentAction::Clear,
        CommandKind::Info => IntentAction::Info,
        CommandKind::History => IntentAction::History,
        _ => IntentAction::Quit,
    }
}

/// Parses one line of chat input. Lines starting with `/name` are commands;
/// everything else (including `/` followed by a non-word character) is sent
/// to the model verbatim.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new(IntentAction::Noop, text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(kind) = find_command(&command, NO_ARG_COMMANDS) {
                return Intent::new(no_arg_action(kind), text);
            }

            if find_command(&command, SINGLE_PATH_COMMANDS).is_some() {
                return Intent::new(
                    IntentAction::Attach {
                        path: parse_single_path_arg(arg),
                    },
                    text,
                );
            }

            if let Some(kind) = find_command(&command, NUMERIC_COMMANDS) {
                let action = if kind == CommandKind::Temperature {
                    IntentAction::SetTemperature {
                        value: arg.parse::<f32>().ok().filter(|value| value.is_finite()),
                    }
                } else {
                    IntentAction::SetMaxTokens {
                        value: arg.parse::<u32>().ok(),
                    }
                };
                return Intent::new(action, text);
            }

            if command == EXPORT_COMMAND.command {
                let format = if arg.is_empty() { "txt" } else { arg };
                return Intent::new(
                    IntentAction::Export {
                        format: format.to_string(),
                    },
                    text,
                );
            }

            return Intent::new(
                IntentAction::Unknown {
                    command,
                    arg: arg.to_string(),
                },
                text,
            );
        }
    }

    Intent::new(
        IntentAction::Send {
            text: raw_trimmed.to_string(),
        },
        text,
    )
}

#[cfg(test)]
mod tests {
    use super::{parse_intent, IntentAction};

    #[test]
    fn blank_line_is_noop() {
        assert_eq!(parse_intent("   \n").action, IntentAction::Noop);
    }

    #[test]
    fn plain_text_is_sent_trimmed() {
        let intent = parse_intent("  tell me a joke \n");
        assert_eq!(
            intent.action,
            IntentAction::Send {
                text: "tell me a joke".to_string()
            }
        );
        assert_eq!(intent.raw, "  tell me a joke \n");
    }

    #[test]
    fn slash_without_command_name_is_sent() {
        assert_eq!(
            parse_intent("/ not a command").action,
            IntentAction::Send {
                text: "/ not a command".to_string()
            }
        );
    }

    #[test]
    fn attach_accepts_quoted_paths() {
        assert_eq!(
            parse_intent("/attach \"/tmp/my notes.md\"").action,
            IntentAction::Attach {
                path: "/tmp/my notes.md".to_string()
            }
        );
        assert_eq!(
            parse_intent("/ATTACH photo.png").action,
            IntentAction::Attach {
                path: "photo.png".to_string()
            }
        );
        assert_eq!(
            parse_intent("/attach").action,
            IntentAction::Attach {
                path: String::new()
            }
        );
    }

    #[test]
    fn numeric_commands_parse_values() {
        assert_eq!(
            parse_intent("/temperature 1.3").action,
            IntentAction::SetTemperature { value: Some(1.3) }
        );
        assert_eq!(
            parse_intent("/temp warm").action,
            IntentAction::SetTemperature { value: None }
        );
        assert_eq!(
            parse_intent("/max_tokens 2048").action,
            IntentAction::SetMaxTokens { value: Some(2048) }
        );
        assert_eq!(
            parse_intent("/max_tokens -5").action,
            IntentAction::SetMaxTokens { value: None }
        );
    }

    #[test]
    fn export_defaults_to_text() {
        assert_eq!(
            parse_intent("/export").action,
            IntentAction::Export {
                format: "txt".to_string()
            }
        );
        assert_eq!(
            parse_intent("/export json").action,
            IntentAction::Export {
                format: "json".to_string()
            }
        );
    }

    #[test]
    fn no_arg_commands() {
        assert_eq!(parse_intent("/copy").action, IntentAction::Copy);
        assert_eq!(parse_intent("/clear").action, IntentAction::Clear);
        assert_eq!(parse_intent("/detach").action, IntentAction::Detach);
        assert_eq!(parse_intent("/info").action, IntentAction::Info);
        assert_eq!(parse_intent("/history").action, IntentAction::History);
        assert_eq!(parse_intent("/help").action, IntentAction::Help);
        assert_eq!(parse_intent("/exit").action, IntentAction::Quit);
    }

    #[test]
    fn unknown_command_keeps_argument() {
        assert_eq!(
            parse_intent("/magic foo bar").action,
            IntentAction::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string()
            }
        );
    }
}
