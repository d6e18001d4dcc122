/// Truncates `text` to `max_chars` characters, appending `...` when cut.
pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

/// Keeps the last `max_chars` characters of `text`, prefixing `...` when cut.
///
/// Used for subprocess stderr where the useful diagnostic is at the end.
pub fn tail_for_error(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let tail = trimmed.chars().skip(count - max_chars).collect::<String>();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::{tail_for_error, truncate_for_error};

    #[test]
    fn regression_truncate_for_error_preserves_unicode_boundaries() {
        assert_eq!(truncate_for_error("li🌊ght", 3), "li🌊...");
        assert_eq!(truncate_for_error("ok", 10), "ok");
    }

    #[test]
    fn unit_tail_for_error_keeps_trailing_characters() {
        assert_eq!(tail_for_error("fatal: bad ref\n", 40), "fatal: bad ref");
        assert_eq!(tail_for_error("abcdefgh", 3), "...fgh");
    }
}
