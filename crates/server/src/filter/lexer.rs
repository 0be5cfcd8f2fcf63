use super::FilterError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum TokenKind {
    Ident(String),
    Str(String),
    Number(f64, String),
    True,
    False,
    LParen,
    RParen,
    Dot,
    Comma,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

pub(super) fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let byte = bytes[pos];

        if byte.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let two = bytes.get(pos..pos + 2);
        let kind = match (byte, two) {
            (_, Some(b"==")) => {
                pos += 2;
                TokenKind::EqEq
            }
            (_, Some(b"!=")) => {
                pos += 2;
                TokenKind::NotEq
            }
            (_, Some(b"<=")) => {
                pos += 2;
                TokenKind::Le
            }
            (_, Some(b">=")) => {
                pos += 2;
                TokenKind::Ge
            }
            (_, Some(b"&&")) => {
                pos += 2;
                TokenKind::AndAnd
            }
            (_, Some(b"||")) => {
                pos += 2;
                TokenKind::OrOr
            }
            (b'<', _) => {
                pos += 1;
                TokenKind::Lt
            }
            (b'>', _) => {
                pos += 1;
                TokenKind::Gt
            }
            (b'!', _) => {
                pos += 1;
                TokenKind::Bang
            }
            (b'(', _) => {
                pos += 1;
                TokenKind::LParen
            }
            (b')', _) => {
                pos += 1;
                TokenKind::RParen
            }
            (b'.', _) => {
                pos += 1;
                TokenKind::Dot
            }
            (b',', _) => {
                pos += 1;
                TokenKind::Comma
            }
            (b'"', _) => {
                let (value, end) = read_string(input, pos)?;
                pos = end;
                TokenKind::Str(value)
            }
            (b'-' | b'0'..=b'9', _) => {
                let end = scan_number(bytes, pos);
                let text = &input[pos..end];
                let value = text.parse::<f64>().map_err(|_| FilterError::InvalidNumber {
                    text: text.to_string(),
                    offset: start,
                })?;
                pos = end;
                TokenKind::Number(value, text.to_string())
            }
            (b'a'..=b'z' | b'A'..=b'Z' | b'_', _) => {
                let end = bytes[pos..]
                    .iter()
                    .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
                    .map(|len| pos + len)
                    .unwrap_or(bytes.len());
                let word = &input[pos..end];
                pos = end;
                match word {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    _ => TokenKind::Ident(word.to_string()),
                }
            }
            _ => {
                let found = input[pos..].chars().next().unwrap_or('?');
                return Err(FilterError::UnexpectedCharacter { found, offset: start });
            }
        };

        tokens.push(Token { kind, offset: start });
    }

    tokens.push(Token { kind: TokenKind::Eof, offset: input.len() });
    Ok(tokens)
}

fn scan_number(bytes: &[u8], start: usize) -> usize {
    let mut end = start + 1;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    end
}

fn read_string(input: &str, start: usize) -> Result<(String, usize), FilterError> {
    let mut value = String::new();
    let mut chars = input[start + 1..].char_indices();

    while let Some((index, ch)) = chars.next() {
        let offset = start + 1 + index;
        match ch {
            '"' => return Ok((value, offset + 1)),
            '\\' => match chars.next() {
                Some((_, escaped @ ('"' | '\\'))) => value.push(escaped),
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                _ => return Err(FilterError::InvalidEscape { offset }),
            },
            _ => value.push(ch),
        }
    }

    Err(FilterError::UnterminatedString { offset: start })
}
