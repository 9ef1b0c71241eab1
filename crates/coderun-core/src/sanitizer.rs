//! Normalization of captured container output into compact transport text.

/// Collapses whitespace runs to a single space, trims both ends and drops
/// C0/C1 control characters.
///
/// Whitespace is classified before control characters, so tabs and newlines
/// separate words instead of gluing them together. The result never contains
/// a leading, trailing or doubled space, which makes the function idempotent.
/// A byte order mark (U+FEFF) counts as whitespace.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.chars() {
        if is_space(c) {
            pending_space = !out.is_empty();
        } else if c.is_control() {
            continue;
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }

    out
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

/// Decodes raw output bytes (lossily) and sanitizes the text.
pub fn sanitize_bytes(raw: &[u8]) -> String {
    sanitize(&String::from_utf8_lossy(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_runs() {
        assert_eq!(sanitize("a  b"), "a b");
        assert_eq!(sanitize("line one\n\n\tline two\r\n"), "line one line two");
    }

    #[test]
    fn test_trims_edges() {
        assert_eq!(sanitize("   2\n"), "2");
    }

    #[test]
    fn test_empty_and_blank_inputs() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize(" \t\n\r "), "");
        assert_eq!(sanitize("\u{0007}\u{001b}\u{0000}\u{009b}"), "");
        assert_eq!(sanitize("\n\u{0007} \u{001b}\n"), "");
    }

    #[test]
    fn test_strips_control_characters() {
        assert_eq!(sanitize("ding\u{0007}dong"), "dingdong");
        assert_eq!(sanitize("\u{001b}[31mred\u{001b}[0m"), "[31mred[0m");
        assert_eq!(sanitize("del\u{007f}eted"), "deleted");
        assert_eq!(sanitize("c1\u{0090}range"), "c1range");
    }

    #[test]
    fn test_control_between_spaces_does_not_double_space() {
        assert_eq!(sanitize("a \u{0007} b"), "a b");
        assert_eq!(sanitize("\u{0007} a"), "a");
    }

    #[test]
    fn test_byte_order_mark_is_whitespace() {
        assert_eq!(sanitize("a\u{feff}b"), "a b");
        assert_eq!(sanitize("\u{feff}hello\u{feff}"), "hello");
        assert_eq!(sanitize_bytes(b"\xef\xbb\xbfok\n"), "ok");
    }

    #[test]
    fn test_keeps_non_ascii_text() {
        assert_eq!(sanitize("héllo\u{3000}wörld ✓"), "héllo wörld ✓");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "",
            "plain",
            "  lead and trail  ",
            "a\u{0007} \u{0007}b",
            "tab\tsep\u{001b}\u{0085}next",
            "\u{00a0}nbsp\u{00a0}",
            "mixed \u{0000}\n\u{009f} end ",
            "\u{feff} bom \u{feff}\u{0007}\u{feff}x",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", input);
            assert!(!once.starts_with(' ') && !once.ends_with(' '));
            assert!(!once.contains("  "));
            assert!(!once.chars().any(|c| c.is_control()));
        }
    }

    #[test]
    fn test_sanitize_bytes_replaces_invalid_utf8() {
        assert_eq!(sanitize_bytes(b"ok\xff\n"), "ok\u{fffd}");
    }
}
