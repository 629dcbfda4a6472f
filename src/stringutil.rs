//! Character classes and field-value validation.
//!
//! The two `index_of_not_allowed_*` functions are the only place the token and
//! field-value grammars are checked. Both the header builder and the metadata
//! parser go through them.

use crate::header::HeaderCharset;

/// Additional character classes.
pub trait CharClassExt {
    /// Returns whether the octet is valid as a "tchar" (token) character.
    ///
    /// `ALPHA DIGIT ! # $ % & ' * + - . ^ _ ` | ~`
    fn is_token(&self) -> bool;

    /// Returns whether the octet is valid as a visible "VCHAR" character.
    fn is_vchar(&self) -> bool;

    /// Returns whether the octet is valid as a whitespace character.
    ///
    /// `Space Tab`
    fn is_ws(&self) -> bool;
}

impl CharClassExt for u8 {
    fn is_token(&self) -> bool {
        self.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(self)
    }

    fn is_vchar(&self) -> bool {
        (0x21..=0x7e).contains(self)
    }

    fn is_ws(&self) -> bool {
        b"\t ".contains(self)
    }
}

/// Returns the index of the first character not allowed in a token.
///
/// The index counts characters, not bytes. An empty string has no
/// disallowed characters.
pub fn index_of_not_allowed_in_tokens(text: &str) -> Option<usize> {
    text.chars()
        .position(|c| !c.is_ascii() || !(c as u8).is_token())
}

/// Returns the index of the first character not allowed in a header field value.
///
/// Visible characters, space and horizontal tab are always allowed. Other
/// characters are allowed when they are not controls and are representable in
/// `charset`.
pub fn index_of_not_allowed_in_header_value(text: &str, charset: HeaderCharset) -> Option<usize> {
    text.chars()
        .position(|c| !is_allowed_in_header_value(c, charset))
}

fn is_allowed_in_header_value(c: char, charset: HeaderCharset) -> bool {
    if c.is_ascii() {
        let byte = c as u8;
        byte.is_vchar() || byte.is_ws()
    } else {
        match charset {
            HeaderCharset::Latin1 => (c as u32) <= 0xff && !c.is_control(),
            HeaderCharset::Utf8 => !c.is_control(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_class_ext() {
        assert!(b'a'.is_token());
        assert!(b'~'.is_token());
        assert!(!b'\n'.is_token());
        assert!(!b':'.is_token());

        assert!(b'!'.is_vchar());
        assert!(!b' '.is_vchar());
        assert!(!b'\x7f'.is_vchar());

        assert!(b'\t'.is_ws());
        assert!(!b'a'.is_ws());
    }

    #[test]
    fn test_tokens() {
        assert_eq!(index_of_not_allowed_in_tokens("GET"), None);
        assert_eq!(index_of_not_allowed_in_tokens(""), None);
        assert_eq!(index_of_not_allowed_in_tokens("X-Custom_Header.1"), None);
        assert_eq!(index_of_not_allowed_in_tokens("G ET"), Some(1));
        assert_eq!(index_of_not_allowed_in_tokens("GET:"), Some(3));
        assert_eq!(index_of_not_allowed_in_tokens("(a)"), Some(0));
        assert_eq!(index_of_not_allowed_in_tokens("naïve"), Some(2));
    }

    #[test]
    fn test_tokens_each_delimiter() {
        for delimiter in "()<>@,;:\\\"/[]?={} \t".chars() {
            let text = format!("abc{}def", delimiter);
            assert_eq!(index_of_not_allowed_in_tokens(&text), Some(3), "{:?}", text);
        }
    }

    #[test]
    fn test_header_value() {
        let latin1 = HeaderCharset::Latin1;

        assert_eq!(index_of_not_allowed_in_header_value("text/html; q=0.9", latin1), None);
        assert_eq!(index_of_not_allowed_in_header_value("a\tb", latin1), None);
        assert_eq!(index_of_not_allowed_in_header_value("café", latin1), None);
        assert_eq!(index_of_not_allowed_in_header_value("ab\ncd", latin1), Some(2));
        assert_eq!(index_of_not_allowed_in_header_value("\x00", latin1), Some(0));
        assert_eq!(index_of_not_allowed_in_header_value("abc\x7f", latin1), Some(3));
        assert_eq!(index_of_not_allowed_in_header_value("x\u{85}", latin1), Some(1));
    }

    #[test]
    fn test_header_value_charset() {
        assert_eq!(
            index_of_not_allowed_in_header_value("hi 世界", HeaderCharset::Latin1),
            Some(3)
        );
        assert_eq!(
            index_of_not_allowed_in_header_value("hi 世界", HeaderCharset::Utf8),
            None
        );
        assert_eq!(
            index_of_not_allowed_in_header_value("世\r", HeaderCharset::Utf8),
            Some(1)
        );
    }

    #[test]
    fn test_header_value_every_control() {
        for byte in (0x00u8..=0x1f).chain(std::iter::once(0x7f)) {
            if byte == b'\t' {
                continue;
            }

            let text = format!("ok{}ok", byte as char);
            assert_eq!(
                index_of_not_allowed_in_header_value(&text, HeaderCharset::Latin1),
                Some(2),
                "byte {:#x}",
                byte
            );
        }
    }
}
