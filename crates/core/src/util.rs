//! Small helpers shared by the stores and the option resolver.

/// Percent-escape everything outside `[A-Za-z0-9_-]` so the result is safe as a
/// single path component and never contains the suffix delimiter.
pub fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Reverse of [`escape_component`]. Returns `None` on malformed escapes or
/// invalid UTF-8.
pub fn unescape_component(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trips_reserved_characters() {
        for raw in ["plain", "a.b", "x/y,z", "100%", "", "ünï"] {
            let escaped = escape_component(raw);
            assert!(!escaped.contains(['/', '.', ',']));
            assert_eq!(unescape_component(&escaped).as_deref(), Some(raw));
        }
    }

    #[test]
    fn unescape_rejects_truncated_sequences() {
        assert_eq!(unescape_component("abc%4"), None);
        assert_eq!(unescape_component("%zz"), None);
    }
}
