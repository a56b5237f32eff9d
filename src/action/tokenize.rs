//! Minimal shell word splitting that keeps token offsets
//!
//! Used by the `split` combinators, which need to know where the word under the
//! cursor starts in the original text. Unterminated quotes are accepted since the
//! last word is usually still being typed.

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Word,
    /// `|`, `||`, `&`, `&&` or `;`
    Operator,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Unquoted text
    pub text: String,
    /// Byte offset of the token in the input
    pub start: usize,
    /// Quote character the token was opened with
    pub quote: Option<char>,
}

impl Token {
    fn word(start: usize) -> Self {
        Token {
            kind: TokenKind::Word,
            text: String::new(),
            start,
            quote: None,
        }
    }
}

/// Split `input` into words and operators; the result always ends with the
/// word under the cursor (empty when the input ends in whitespace or an operator).
pub(crate) fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<Token> = None;
    let mut quote: Option<char> = None;
    let mut chars = input.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else if c == '\\' && q == '"' {
                if let Some((_, next)) = chars.next() {
                    push_char(&mut current, idx, next);
                }
            } else {
                push_char(&mut current, idx, c);
            }
            continue;
        }

        match c {
            ' ' | '\t' | '\n' => {
                if let Some(token) = current.take() {
                    tokens.push(token);
                }
            }
            '\'' | '"' => {
                let token = current.get_or_insert_with(|| Token::word(idx));
                if token.text.is_empty() && token.quote.is_none() {
                    token.quote = Some(c);
                }
                quote = Some(c);
            }
            '\\' => {
                if let Some((_, next)) = chars.next() {
                    push_char(&mut current, idx, next);
                }
            }
            '|' | '&' | ';' => {
                if let Some(token) = current.take() {
                    tokens.push(token);
                }
                let mut text = c.to_string();
                if c != ';' {
                    if let Some(&(_, next)) = chars.peek() {
                        if next == c {
                            text.push(next);
                            chars.next();
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Operator,
                    text,
                    start: idx,
                    quote: None,
                });
            }
            _ => push_char(&mut current, idx, c),
        }
    }

    match current {
        Some(token) => tokens.push(token),
        None => tokens.push(Token::word(input.len())),
    }
    tokens
}

fn push_char(current: &mut Option<Token>, idx: usize, c: char) {
    current.get_or_insert_with(|| Token::word(idx)).text.push(c);
}

/// Tokens of the last pipeline segment
pub(crate) fn current_pipeline(tokens: &[Token]) -> &[Token] {
    match tokens.iter().rposition(|t| t.kind == TokenKind::Operator) {
        Some(idx) => &tokens[idx + 1..],
        None => tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(tokens: &[Token]) -> Vec<&str> {
        tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.text.as_str())
            .collect()
    }

    #[test]
    fn test_trailing_space_opens_empty_word() {
        let tokens = tokenize("one ");
        assert_eq!(words(&tokens), vec!["one", ""]);
        assert_eq!(tokens[1].start, 4);

        assert_eq!(words(&tokenize("")), vec![""]);
    }

    #[test]
    fn test_quotes() {
        let tokens = tokenize(r#"a "b c" 'd"#);
        assert_eq!(words(&tokens), vec!["a", "b c", "d"]);
        assert_eq!(tokens[1].quote, Some('"'));
        assert_eq!(tokens[2].quote, Some('\''));
        assert_eq!(tokens[2].start, 8);
    }

    #[test]
    fn test_pipeline() {
        let tokens = tokenize("one two | one ");
        let pipeline = current_pipeline(&tokens);
        assert_eq!(words(pipeline), vec!["one", ""]);
        assert_eq!(pipeline[1].start, 14);

        let tokens = tokenize("a&&b");
        assert_eq!(tokens[1].text, "&&");
        assert_eq!(words(current_pipeline(&tokens)), vec!["b"]);
    }
}
