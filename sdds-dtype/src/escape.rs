//! Backslash escapes in ASCII tokens and header strings.

use std::borrow::Cow;

/// Interpret backslash escapes.
///
/// Recognizes `\n \t \r \b \f \v \a \\ \" \' \! \?` and octal `\ddd`. Unknown escapes are kept
/// verbatim, including the backslash.
pub fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }
    Cow::Owned(String::from_utf8_lossy(&unescape_bytes(s)).into_owned())
}

/// Interpret backslash escapes, keeping the raw bytes an octal escape may produce.
pub fn unescape_bytes(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let next = bytes[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'a' => out.push(0x07),
            b'\\' | b'"' | b'\'' | b'!' | b'?' => out.push(next),
            b'0'..=b'7' => {
                let mut value = u32::from(next - b'0');
                let mut digits = 1;
                while digits < 3 && i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
                    value = value * 8 + u32::from(bytes[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push(u8::try_from(value & 0xff).unwrap_or(u8::MAX));
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    out
}

/// Escape a string so that [`unescape`] restores it.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s
        .bytes()
        .any(|b| matches!(b, b'\\' | b'"' | b'\n' | b'\t' | b'\r') || b < 0x20)
    {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Returns true if an ASCII token must be quoted to read back as a single token.
pub fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.starts_with('!')
        || s.bytes()
            .any(|b| b.is_ascii_whitespace() || b == b'"' || b == b'\\' || b < 0x20)
}

/// Render a string as an ASCII data token, quoting and escaping it when required.
pub fn quote_token(s: &str) -> Cow<'_, str> {
    if needs_quotes(s) {
        Cow::Owned(format!("\"{}\"", escape(s)))
    } else {
        Cow::Borrowed(s)
    }
}

/// Render a single byte as an ASCII data token.
pub fn char_token(c: u8) -> String {
    if c.is_ascii_graphic() && !matches!(c, b'"' | b'\\' | b'!') {
        (c as char).to_string()
    } else {
        match c {
            b'"' => "\"\\\"\"".to_string(),
            b'\\' => "\"\\\\\"".to_string(),
            b'!' => "\"!\"".to_string(),
            b' ' => "\" \"".to_string(),
            other => format!("\"\\{other:03o}\""),
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("plain", "plain")]
    #[case(r"a\nb", "a\nb")]
    #[case(r"tab\there", "tab\there")]
    #[case(r#"say \"hi\""#, "say \"hi\"")]
    #[case(r"back\\slash", "back\\slash")]
    #[case(r"\!bang", "!bang")]
    #[case(r"\101\102", "AB")]
    #[case(r"\q", r"\q")]
    #[case("trailing\\", "trailing\\")]
    fn unescapes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(unescape(input), expected);
    }

    #[rstest]
    #[case("")]
    #[case("two words")]
    #[case("quote\"inside")]
    #[case("line\nbreak")]
    #[case("!comment-like")]
    #[case("back\\slash")]
    fn quoted_tokens_unescape_to_original(#[case] value: &str) {
        let token = quote_token(value);
        assert!(token.starts_with('"') && token.ends_with('"'));
        assert_eq!(unescape(&token[1..token.len() - 1]), value);
    }

    #[test]
    fn octal_escapes_keep_high_bytes() {
        assert_eq!(unescape_bytes(r"\351"), vec![0xe9]);
        assert_eq!(unescape_bytes(&char_token(0xe9)[1..5]), vec![0xe9]);
    }

    #[test]
    fn simple_tokens_are_not_quoted() {
        assert_eq!(quote_token("abc"), "abc");
        assert_eq!(char_token(b'x'), "x");
        assert_eq!(char_token(b' '), "\" \"");
        assert_eq!(char_token(0), "\"\\000\"");
    }
}
