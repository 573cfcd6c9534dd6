//! Timestamp markup for transcript turns: `**[HH:MM:SS] You:** text`.

use chrono::Timelike;

use super::Role;

pub const USER_LABEL: &str = "You";
pub const ASSISTANT_LABEL: &str = "AI";
const SYSTEM_LABEL: &str = "System";

fn label_for(role: Role) -> &'static str {
    match role {
        Role::User => USER_LABEL,
        Role::Assistant => ASSISTANT_LABEL,
        Role::System => SYSTEM_LABEL,
    }
}

pub fn stamp_content<T: Timelike>(content: &str, role: Role, at: &T) -> String {
    format!(
        "**[{:02}:{:02}:{:02}] {}:** {content}",
        at.hour(),
        at.minute(),
        at.second(),
        label_for(role),
    )
}

/// Returns the message body without its leading timestamp markup.
///
/// Content that does not start with the markup is returned unchanged.
pub fn strip_stamp(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("**[") else {
        return content;
    };
    for label in [USER_LABEL, ASSISTANT_LABEL, SYSTEM_LABEL] {
        let marker = format!("] {label}:**");
        if let Some((stamp, body)) = rest.split_once(marker.as_str()) {
            if stamp.len() == 8 && stamp.chars().all(|ch| ch.is_ascii_digit() || ch == ':') {
                return body.strip_prefix(' ').unwrap_or(body);
            }
        }
    }
    content
}

/// Drops the bold markers around timestamp headers, keeping the time and
/// speaker label: `**[12:00:00] AI:**` becomes `[12:00:00] AI:`.
pub fn strip_stamp_markup(content: &str) -> String {
    let mut out = content.replace("**[", "[");
    for label in [USER_LABEL, ASSISTANT_LABEL, SYSTEM_LABEL] {
        out = out.replace(&format!("] {label}:**"), &format!("] {label}:"));
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::{stamp_content, strip_stamp, strip_stamp_markup};
    use crate::chat::Role;

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 5, 9).unwrap_or_default()
    }

    #[test]
    fn stamp_uses_role_labels() {
        assert_eq!(
            stamp_content("hello", Role::User, &noon()),
            "**[12:05:09] You:** hello"
        );
        assert_eq!(
            stamp_content("hi there", Role::Assistant, &noon()),
            "**[12:05:09] AI:** hi there"
        );
    }

    #[test]
    fn strip_stamp_returns_exact_body() {
        let stamped = stamp_content(" padded body", Role::Assistant, &noon());
        assert_eq!(strip_stamp(&stamped), " padded body");
        assert_eq!(strip_stamp("plain text"), "plain text");
        assert_eq!(strip_stamp("**[not a time] AI:** x"), "**[not a time] AI:** x");
    }

    #[test]
    fn strip_stamp_markup_keeps_time_and_label() {
        assert_eq!(
            strip_stamp_markup("**[12:05:09] You:** question"),
            "[12:05:09] You: question"
        );
        assert_eq!(
            strip_stamp_markup("**[12:05:09] AI:** answer"),
            "[12:05:09] AI: answer"
        );
    }
}
