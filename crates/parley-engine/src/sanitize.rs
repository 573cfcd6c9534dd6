/// Appended when text is cut at the length ceiling.
pub const TRUNCATION_MARKER: &str = "...";

const KNOWN_ENTITIES: &[&str] = &["&amp;", "&lt;", "&gt;", "&quot;", "&#x27;"];

/// Trims, escapes markup-significant characters and bounds `text` to
/// `max_chars` characters plus [`TRUNCATION_MARKER`].
///
/// Complete entities from an earlier pass are left intact, so re-cleaning the
/// transcript every turn does not pile up `&amp;amp;`. The cut lands at exactly
/// `max_chars` characters and may split an entity; a later pass escapes the
/// dangling `&` of such a fragment.
pub fn sanitize_input(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    truncate_with_marker(&escape_html(trimmed), max_chars)
}

/// HTML-escapes `& < > " '`, leaving well-formed entities that this function
/// itself produces untouched.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (idx, ch) in value.char_indices() {
        match ch {
            '&' if KNOWN_ENTITIES
                .iter()
                .any(|entity| value[idx..].starts_with(entity)) =>
            {
                out.push('&')
            }
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Keeps the first `max_chars` characters and appends the marker when `text`
/// is longer than that.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
    }
}

#[cfg(test)]
mod tests {
    use super::{escape_html, sanitize_input, truncate_with_marker, TRUNCATION_MARKER};

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            sanitize_input("  <b>\"Tom\" & 'Jerry'</b>  ", 100),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#x27;Jerry&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn empty_and_whitespace_become_empty() {
        assert_eq!(sanitize_input("", 10), "");
        assert_eq!(sanitize_input(" \n\t ", 10), "");
    }

    #[test]
    fn long_input_is_cut_at_max_plus_marker() {
        for max in [1usize, 5, 16, 64] {
            let input = "abcdefghij".repeat(10);
            let out = sanitize_input(&input, max);
            assert_eq!(out.chars().count(), max + TRUNCATION_MARKER.chars().count());
            assert!(out.ends_with(TRUNCATION_MARKER));
            assert!(input.starts_with(&out[..max]));
        }
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let out = truncate_with_marker("你好世界和平", 4);
        assert_eq!(out, "你好世界...");
        assert_eq!(truncate_with_marker("你好", 2), "你好");
    }

    #[test]
    fn truncation_applies_after_escaping() {
        assert_eq!(sanitize_input("<<<<", 6), "&lt;&l...");
    }

    #[test]
    fn sanitizing_twice_is_stable() {
        let once = sanitize_input("a & b <c> \"d\" 'e' &amp; f", 20);
        assert_eq!(sanitize_input(&once, 20), once);
        assert_eq!(escape_html("&amp;&lt;"), "&amp;&lt;");
        assert_eq!(escape_html("AT&T"), "AT&amp;T");
    }

    #[test]
    fn cut_keeps_exact_length_even_inside_an_entity() {
        let cleaned = sanitize_input("<<", 6);
        assert_eq!(cleaned, "&lt;&l...");
        assert_eq!(cleaned.chars().count(), 6 + TRUNCATION_MARKER.len());

        let recleaned = sanitize_input(&cleaned, 100);
        assert_eq!(recleaned, "&lt;&amp;l...");
    }
}
