//! Payload escaping for the patricia node wire format.
//!
//! Every character in [`RESERVED`] is percent-hex escaped in payload
//! fields, whichever separators a [`WireConfig`] picks. That guarantee is
//! what allows field separators and the value-absence marker to be parsed
//! without lookahead.

use crate::error::{TrieError, TrieResult};

/// Characters that never appear un-escaped in an escaped payload.
/// Separators and markers must be chosen from this set.
pub const RESERVED: [char; 4] = ['%', '/', '!', '~'];

/// The marker standing in for an absent value field.
pub const VALUE_ABSENT: char = '~';

/// Separator choice for the node wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireConfig {
    /// Joins the four node fields.
    pub primary: char,
    /// Joins the child hashes inside the third field.
    pub secondary: char,
}

impl WireConfig {
    /// Build a config, validating that both separators come from
    /// [`RESERVED`], are distinct, and neither is the absence marker.
    pub fn new(primary: char, secondary: char) -> TrieResult<Self> {
        for c in [primary, secondary] {
            if !RESERVED.contains(&c) {
                return Err(TrieError::InvalidConfig(format!(
                    "separator {c:?} is not in the reserved set"
                )));
            }
            if c == VALUE_ABSENT || c == '%' {
                return Err(TrieError::InvalidConfig(format!(
                    "separator {c:?} is reserved for markers"
                )));
            }
        }
        if primary == secondary {
            return Err(TrieError::InvalidConfig(
                "primary and secondary separators must differ".into(),
            ));
        }
        Ok(Self { primary, secondary })
    }
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            primary: '/',
            secondary: '!',
        }
    }
}

/// Escape every reserved character as `%XX` (two lowercase hex digits of
/// the character's ASCII value).
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if RESERVED.contains(&c) {
            out.push('%');
            out.push_str(&format!("{:02x}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Exact inverse of [`escape`].
pub fn unescape(s: &str) -> TrieResult<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let hi = chars.next();
        let lo = chars.next();
        let (Some(hi), Some(lo)) = (hi, lo) else {
            return Err(TrieError::InvalidEscape(s.to_owned()));
        };
        let code = u32::from_str_radix(&format!("{hi}{lo}"), 16)
            .map_err(|_| TrieError::InvalidEscape(s.to_owned()))?;
        let c = char::from_u32(code).ok_or_else(|| TrieError::InvalidEscape(s.to_owned()))?;
        out.push(c);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(escape("hello world"), "hello world");
    }

    #[test]
    fn reserved_chars_are_escaped() {
        assert_eq!(escape("a/b!c~d%e"), "a%2fb%21c%7ed%25e");
    }

    #[test]
    fn escaped_text_contains_no_reserved_chars() {
        let escaped = escape("///!!!~~~%%%");
        for c in RESERVED {
            if c != '%' {
                assert!(!escaped.contains(c), "unescaped {c:?} in {escaped:?}");
            }
        }
        // '%' only appears as an escape introducer followed by hex.
        for (i, c) in escaped.char_indices() {
            if c == '%' {
                assert!(escaped[i + 1..].len() >= 2);
            }
        }
    }

    #[test]
    fn roundtrip() {
        for s in ["", "plain", "a/b", "100%!", "~tilde~", "mixed/%!~end"] {
            assert_eq!(unescape(&escape(s)).unwrap(), s);
        }
    }

    #[test]
    fn unescape_rejects_truncated_sequence() {
        assert!(matches!(unescape("abc%2"), Err(TrieError::InvalidEscape(_))));
        assert!(matches!(unescape("abc%"), Err(TrieError::InvalidEscape(_))));
    }

    #[test]
    fn unescape_rejects_non_hex() {
        assert!(matches!(unescape("%zz"), Err(TrieError::InvalidEscape(_))));
    }

    #[test]
    fn config_rejects_unreserved_separator() {
        assert!(WireConfig::new('#', '!').is_err());
    }

    #[test]
    fn config_rejects_marker_chars() {
        assert!(WireConfig::new('~', '!').is_err());
        assert!(WireConfig::new('%', '!').is_err());
    }

    #[test]
    fn config_rejects_equal_separators() {
        assert!(WireConfig::new('/', '/').is_err());
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = WireConfig::default();
        assert_eq!(WireConfig::new(cfg.primary, cfg.secondary).unwrap(), cfg);
    }
}
