mod command_registry;
mod intent_parser;
mod message;
mod stamp;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use intent_parser::{parse_intent, Intent, IntentAction};
pub use message::{messages_to_value, Message, Role};
pub use stamp::{stamp_content, strip_stamp, strip_stamp_markup, ASSISTANT_LABEL, USER_LABEL};
