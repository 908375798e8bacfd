//! Output sanitization.
//!
//! Buffered output is raw bytes (subprocess output is not guaranteed to be
//! UTF-8) but the workitem carries it as a JSON string. Before a flush the
//! buffer goes through an ordered chain of strategies; the first one that
//! yields text wins.

use std::borrow::Cow;

/// Text used when no strategy manages to produce anything.
pub const PLACEHOLDER: &str = "?_?";

/// A single sanitization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sanitizer {
    /// Use the buffer unchanged; only valid UTF-8 passes.
    AsIs,
    /// Replace invalid byte sequences with U+FFFD.
    ReplaceInvalid,
    /// Replace every non-ASCII byte with `?`.
    AsciiOnly,
    /// Give up and emit [`PLACEHOLDER`].
    Placeholder,
}

/// Strategies in the order they are tried.
pub const CHAIN: [Sanitizer; 4] = [
    Sanitizer::AsIs,
    Sanitizer::ReplaceInvalid,
    Sanitizer::AsciiOnly,
    Sanitizer::Placeholder,
];

impl Sanitizer {
    /// Apply this strategy, returning `None` when it cannot handle the input.
    pub fn apply<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Sanitizer::AsIs => as_is(bytes),
            Sanitizer::ReplaceInvalid => replace_invalid(bytes),
            Sanitizer::AsciiOnly => ascii_only(bytes),
            Sanitizer::Placeholder => Some(Cow::Borrowed(PLACEHOLDER)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sanitizer::AsIs => "as_is",
            Sanitizer::ReplaceInvalid => "replace_invalid",
            Sanitizer::AsciiOnly => "ascii_only",
            Sanitizer::Placeholder => "placeholder",
        }
    }
}

/// The buffer untouched, if it is valid UTF-8.
pub fn as_is(bytes: &[u8]) -> Option<Cow<'_, str>> {
    std::str::from_utf8(bytes).ok().map(Cow::Borrowed)
}

/// Invalid sequences coerced to U+FFFD.
pub fn replace_invalid(bytes: &[u8]) -> Option<Cow<'_, str>> {
    Some(String::from_utf8_lossy(bytes))
}

/// Non-ASCII bytes replaced by `?`.
pub fn ascii_only(bytes: &[u8]) -> Option<Cow<'_, str>> {
    let text: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    Some(Cow::Owned(text))
}

/// Length of a truncated multi-byte UTF-8 sequence at the end of `bytes`,
/// or 0 when the buffer does not end mid-character.
pub fn incomplete_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        // Skip continuation bytes back to the sequence's leading byte
        if bytes[i] & 0xC0 == 0x80 {
            continue;
        }
        return match std::str::from_utf8(&bytes[i..]) {
            Err(e) if e.valid_up_to() == 0 && e.error_len().is_none() => bytes.len() - i,
            _ => 0,
        };
    }
    0
}

/// Run the buffer through [`CHAIN`], returning the text and the strategy
/// that produced it.
pub fn sanitize(bytes: &[u8]) -> (Cow<'_, str>, Sanitizer) {
    sanitize_with(&CHAIN, bytes)
}

/// Run the buffer through a custom chain.
pub fn sanitize_with<'a>(chain: &[Sanitizer], bytes: &'a [u8]) -> (Cow<'a, str>, Sanitizer) {
    for strategy in chain {
        if let Some(text) = strategy.apply(bytes) {
            return (text, *strategy);
        }
    }
    (Cow::Borrowed(PLACEHOLDER), Sanitizer::Placeholder)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVALID: &[u8] = b"ok \xff\xfe done";

    #[test]
    fn test_as_is() {
        assert_eq!(as_is("café".as_bytes()).as_deref(), Some("café"));
        assert!(as_is(INVALID).is_none());
    }

    #[test]
    fn test_replace_invalid() {
        assert_eq!(
            replace_invalid(INVALID).as_deref(),
            Some("ok \u{FFFD}\u{FFFD} done")
        );
    }

    #[test]
    fn test_ascii_only() {
        assert_eq!(ascii_only(INVALID).as_deref(), Some("ok ?? done"));
        // é is two bytes, so two question marks
        assert_eq!(ascii_only("café".as_bytes()).as_deref(), Some("caf??"));
    }

    #[test]
    fn test_incomplete_tail() {
        let euro = "€".as_bytes();
        assert_eq!(incomplete_tail(b"plain"), 0);
        assert_eq!(incomplete_tail(b""), 0);
        assert_eq!(incomplete_tail("a€".as_bytes()), 0);
        assert_eq!(incomplete_tail(&[b'a', euro[0]]), 1);
        assert_eq!(incomplete_tail(&[b'a', euro[0], euro[1]]), 2);
        // Invalid bytes are not held back
        assert_eq!(incomplete_tail(b"a\xff"), 0);
        assert_eq!(incomplete_tail(b"\x80\x80\x80"), 0);
    }

    #[test]
    fn test_chain_prefers_as_is() {
        let (text, used) = sanitize(b"plain text");
        assert_eq!(text, "plain text");
        assert_eq!(used, Sanitizer::AsIs);
        assert!(matches!(text, Cow::Borrowed(_)));
    }

    #[test]
    fn test_chain_falls_back_on_invalid_utf8() {
        let (text, used) = sanitize(INVALID);
        assert_eq!(used, Sanitizer::ReplaceInvalid);
        assert!(text.starts_with("ok "));
    }

    #[test]
    fn test_custom_chain() {
        let (text, used) = sanitize_with(&[Sanitizer::AsIs, Sanitizer::AsciiOnly], INVALID);
        assert_eq!(text, "ok ?? done");
        assert_eq!(used, Sanitizer::AsciiOnly);

        let (text, used) = sanitize_with(&[Sanitizer::AsIs], INVALID);
        assert_eq!(text, PLACEHOLDER);
        assert_eq!(used, Sanitizer::Placeholder);
    }
}
