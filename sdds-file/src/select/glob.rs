//! Shell-style wildcard matching.
//!
//! `*` matches any run of characters, `?` any single character and `[...]` one character from a
//! set of characters and ranges, negated by a leading `^` or `!`. A backslash makes the next
//! character literal.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Any,
    Star,
    Class { negated: bool, items: Vec<(char, char)> },
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        let token = match c {
            '*' => {
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                Token::Star
            }
            '?' => Token::Any,
            '\\' => Token::Literal(chars.next().unwrap_or('\\')),
            '[' => {
                let rest: String = chars.clone().collect();
                match parse_class(&rest) {
                    Some((token, used)) => {
                        for _ in 0..used {
                            chars.next();
                        }
                        token
                    }
                    None => Token::Literal('['),
                }
            }
            other => Token::Literal(other),
        };
        tokens.push(token);
    }
    tokens
}

/// Parse a set following `[`, returning the token and the number of characters consumed,
/// including the closing `]`.
fn parse_class(rest: &str) -> Option<(Token, usize)> {
    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;
    let negated = matches!(chars.first(), Some('^' | '!'));
    if negated {
        i += 1;
    }
    let mut items = Vec::new();
    let mut first = true;
    while i < chars.len() {
        let mut c = chars[i];
        if c == ']' && !first {
            return Some((Token::Class { negated, items }, i + 1));
        }
        first = false;
        if c == '\\' && i + 1 < chars.len() {
            i += 1;
            c = chars[i];
        }
        if i + 2 < chars.len() && chars[i + 1] == '-' && chars[i + 2] != ']' {
            items.push((c, chars[i + 2]));
            i += 3;
        } else {
            items.push((c, c));
            i += 1;
        }
    }
    None
}

fn matches_token(token: &Token, c: char, fold: bool) -> bool {
    let eq = |a: char, b: char| {
        if fold {
            a.to_lowercase().eq(b.to_lowercase())
        } else {
            a == b
        }
    };
    match token {
        Token::Literal(l) => eq(*l, c),
        Token::Any => true,
        Token::Star => false,
        Token::Class { negated, items } => {
            let lower = c.to_lowercase().next().unwrap_or(c);
            let upper = c.to_uppercase().next().unwrap_or(c);
            let hit = items.iter().any(|(lo, hi)| {
                (*lo..=*hi).contains(&c)
                    || (fold && ((*lo..=*hi).contains(&lower) || (*lo..=*hi).contains(&upper)))
            });
            hit != *negated
        }
    }
}

fn match_tokens(tokens: &[Token], text: &[char], fold: bool) -> bool {
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(Token::Star) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(token) if matches_token(token, text[t], fold) => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    t = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }
    tokens[p..].iter().all(|token| *token == Token::Star)
}

/// Returns true if `text` matches the wildcard `pattern`.
pub fn wild_match(pattern: &str, text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    match_tokens(&tokenize(pattern), &text, false)
}

/// Case-insensitive [`wild_match`].
pub fn wild_match_ci(pattern: &str, text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    match_tokens(&tokenize(pattern), &text, true)
}

/// Returns true if `pattern` contains any unescaped wildcard character.
pub fn has_wildcards(pattern: &str) -> bool {
    let mut escaped = false;
    for c in pattern.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("*", "", true)]
    #[case("*", "anything", true)]
    #[case("x*", "xray", true)]
    #[case("x*", "ray", false)]
    #[case("*ray", "xray", true)]
    #[case("a*b*c", "aXXbYYc", true)]
    #[case("a*b*c", "aXXbYY", false)]
    #[case("?", "a", true)]
    #[case("?", "", false)]
    #[case("s??", "s12", true)]
    #[case("[abc]x", "bx", true)]
    #[case("[abc]x", "dx", false)]
    #[case("[a-c]1", "c1", true)]
    #[case("[^a-c]1", "c1", false)]
    #[case("[!a-c]1", "z1", true)]
    #[case("[]]", "]", true)]
    #[case("\\*", "*", true)]
    #[case("\\*", "x", false)]
    #[case("[abc", "[abc", true)]
    #[case("Beam*", "BeamCurrent", true)]
    fn matches(#[case] pattern: &str, #[case] text: &str, #[case] expected: bool) {
        assert_eq!(wild_match(pattern, text), expected, "{pattern} vs {text}");
    }

    #[test]
    fn case_insensitive() {
        assert!(wild_match_ci("beam*", "BEAMCurrent"));
        assert!(wild_match_ci("[a-c]X", "Bx"));
        assert!(!wild_match("beam*", "BEAMCurrent"));
    }

    #[test]
    fn detects_wildcards() {
        assert!(has_wildcards("a*"));
        assert!(has_wildcards("[ab]"));
        assert!(!has_wildcards("plain"));
        assert!(!has_wildcards("escaped\\*"));
    }
}
