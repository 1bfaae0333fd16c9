//! Lexer for the schema DSL.
//!
//! Splits source text into [`Token`]s. Whitespace and `//` line comments are
//! skipped. Lexing never panics: the first character that cannot start a
//! token is reported as [`LexError::IllegalCharacter`].

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, anychar, char, digit1, multispace1},
    combinator::{consumed, map, map_opt, opt, recognize, value},
    multi::many0,
    sequence::pair,
    IResult,
};
use thiserror::Error;

use super::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("illegal character '{ch}' at line {line}, column {column}")]
    IllegalCharacter { ch: char, line: usize, column: usize },

    #[error("unterminated string literal at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },
}

impl LexError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            LexError::IllegalCharacter { line, column, .. }
            | LexError::UnterminatedString { line, column } => (*line, *column),
        }
    }
}

// ============ Token Parsers ============

/// Parse a `//` comment up to (not including) the line break.
fn comment(input: &str) -> IResult<&str, ()> {
    value((), pair(tag("//"), take_while(|c| c != '\n' && c != '\r')))(input)
}

/// Skip whitespace and comments.
fn trivia(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((value((), multispace1), comment))))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)
}

fn operator(input: &str) -> IResult<&str, TokenKind> {
    map_opt(
        alt((tag("=="), tag("!="), tag("<="), tag(">="), tag("&&"), tag("||"))),
        TokenKind::from_operator,
    )(input)
}

fn punct(input: &str) -> IResult<&str, TokenKind> {
    map_opt(anychar, TokenKind::from_punct)(input)
}

/// Quoted string (double or single quotes, backslash escapes). Returns the
/// contents without the quotes. A missing closing quote before end of line
/// is a hard failure.
fn string_literal(input: &str) -> IResult<&str, &str> {
    let (rest, quote) = alt((char('"'), char('\'')))(input)?;
    let mut escaped = false;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            c if c == quote && !escaped => return Ok((&rest[idx + 1..], &rest[..idx])),
            '\n' => break,
            _ => escaped = false,
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn token(input: &str) -> IResult<&str, (TokenKind, &str)> {
    alt((
        map(string_literal, |s| (TokenKind::String, s)),
        map(number, |n| (TokenKind::Number, n)),
        map(identifier, |id| {
            (TokenKind::keyword(id).unwrap_or(TokenKind::Identifier), id)
        }),
        map(consumed(operator), |(text, kind)| (kind, text)),
        map(consumed(punct), |(text, kind)| (kind, text)),
    ))(input)
}

// ============ Lexer ============

/// Maps byte offsets to 1-based line/column pairs.
struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            line_starts,
        }
    }

    fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line];
        let column = self.source[start..offset].chars().count() + 1;
        (line + 1, column)
    }
}

/// Tokenizes `source`. The returned stream always ends with an `Eof` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let index = LineIndex::new(source);
    let mut tokens = Vec::new();
    let mut rest = source;

    loop {
        // trivia never fails: many0 stops at the first non-matching char
        if let Ok((after, ())) = trivia(rest) {
            rest = after;
        }
        let offset = source.len() - rest.len();
        let (line, column) = index.position(offset);

        if rest.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                value: String::new(),
                line,
                column,
                offset,
            });
            return Ok(tokens);
        }

        match token(rest) {
            Ok((after, (kind, text))) => {
                tokens.push(Token {
                    kind,
                    value: text.to_string(),
                    line,
                    column,
                    offset,
                });
                rest = after;
            }
            Err(nom::Err::Failure(_)) => {
                return Err(LexError::UnterminatedString { line, column });
            }
            Err(_) => {
                let ch = rest.chars().next().unwrap_or('\0');
                return Err(LexError::IllegalCharacter { ch, line, column });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_lexes_keywords_and_identifiers() {
        assert_eq!(
            kinds("entity document { relation owner @user }"),
            vec![
                TokenKind::Entity,
                TokenKind::Identifier,
                TokenKind::LBrace,
                TokenKind::Relation,
                TokenKind::Identifier,
                TokenKind::At,
                TokenKind::Identifier,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexes_operators_longest_match_first() {
        assert_eq!(
            kinds("== != <= >= && || < > ! & | ="),
            vec![
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Bang,
                TokenKind::Amp,
                TokenKind::Pipe,
                TokenKind::Assign,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexes_literals() {
        let tokens = tokenize(r#"42 3.14 "hello world" 'x'"#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].value, "42");
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[1].value, "3.14");
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].value, "hello world");
        assert_eq!(tokens[3].kind, TokenKind::String);
        assert_eq!(tokens[3].value, "x");
    }

    #[test]
    fn test_identifier_cannot_start_with_digit() {
        let tokens = tokenize("9abc").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].value, "abc");
    }

    #[test]
    fn test_skips_comments_and_tracks_positions() {
        let source = "// header comment\nentity user {}\n  // trailing\n  entity doc {}";
        let tokens = tokenize(source).unwrap();

        assert_eq!(tokens[0].kind, TokenKind::Entity);
        assert_eq!((tokens[0].line, tokens[0].column), (2, 1));
        assert_eq!(tokens[1].value, "user");
        assert_eq!((tokens[1].line, tokens[1].column), (2, 8));

        let doc = tokens.iter().find(|t| t.value == "doc").unwrap();
        assert_eq!((doc.line, doc.column), (4, 10));
        assert_eq!(&source[doc.offset..doc.offset + 3], "doc");
    }

    #[test]
    fn test_illegal_character_reports_position() {
        let err = tokenize("entity user {\n  $\n}").unwrap_err();
        assert_eq!(
            err,
            LexError::IllegalCharacter {
                ch: '$',
                line: 2,
                column: 3
            }
        );
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        let err = tokenize("rule r(x) { \"open }").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { line: 1, .. }));
    }

    #[test]
    fn test_empty_input_yields_only_eof() {
        assert_eq!(kinds("   \n // nothing\n"), vec![TokenKind::Eof]);
    }
}
