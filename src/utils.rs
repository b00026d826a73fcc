/// Shared utility functions

/// Truncate a string to at most `max_chars` characters (not bytes)
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Mask a secret for display (shows first 8 / last 4 chars)
pub fn mask_secret(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "*".repeat(chars.len())
    }
}

/// Current time as unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_ascii() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("hello", 0), "");
    }

    #[test]
    fn test_truncate_chars_counts_characters_not_bytes() {
        // each of these is multi-byte in UTF-8
        let s = "ñandú über";
        assert_eq!(truncate_chars(s, 5), "ñandú");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("gsk_1234567890abcdef"), "gsk_1234...cdef");
        assert_eq!(mask_secret("short"), "*****");
    }
}
