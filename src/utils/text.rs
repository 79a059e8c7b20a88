use regex::Regex;
use std::sync::OnceLock;

fn blank_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n[ \t]*\n").expect("blank line pattern is valid"))
}

/// `\r\n` and lone `\r` line endings become `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Stripped, non-empty paragraphs separated by blank lines. A line holding
/// only spaces or tabs counts as blank.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    blank_line()
        .split(&normalize_newlines(text))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// First `max_chars` characters of `text`, for log lines.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_paragraphs_drops_empty() {
        assert_eq!(split_paragraphs("a\n\n \n\nb"), vec!["a", "b"]);
        assert_eq!(split_paragraphs("One.\n\n\n\n  Two.  \n\n"), vec!["One.", "Two."]);
        assert!(split_paragraphs("   ").is_empty());
    }

    #[test]
    fn test_split_paragraphs_handles_crlf_and_padded_blank_lines() {
        let text = "\"Hola,\" dijo Mara.\r\n\r\nLa nave crujió.\r\n\r\n\"Nadie se retira.\"";
        assert_eq!(
            split_paragraphs(text),
            vec!["\"Hola,\" dijo Mara.", "La nave crujió.", "\"Nadie se retira.\""]
        );
        assert_eq!(split_paragraphs("Uno.\n \t\nDos.\nsigue."), vec!["Uno.", "Dos.\nsigue."]);
        assert_eq!(normalize_newlines("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("¿Vienes?", 3), "¿Vi...");
        assert_eq!(preview("Sí", 30), "Sí");
    }
}
