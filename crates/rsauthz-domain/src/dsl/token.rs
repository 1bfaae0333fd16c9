//! Token definitions for the schema DSL.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Keywords
    Entity,
    Relation,
    Attribute,
    Permission,
    Action,
    Rule,
    Or,
    And,
    Not,

    // Literals
    Identifier,
    String,
    Number,

    // Punctuation
    Assign,
    Colon,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    At,
    Hash,
    Question,

    // Operators
    Bang,
    Amp,
    Pipe,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Eof,
}

impl TokenKind {
    /// Maps a word to its keyword kind; `None` for plain identifiers.
    pub fn keyword(word: &str) -> Option<Self> {
        Some(match word {
            "entity" => TokenKind::Entity,
            "relation" => TokenKind::Relation,
            "attribute" => TokenKind::Attribute,
            "permission" => TokenKind::Permission,
            "action" => TokenKind::Action,
            "rule" => TokenKind::Rule,
            "or" => TokenKind::Or,
            "and" => TokenKind::And,
            "not" => TokenKind::Not,
            _ => return None,
        })
    }

    pub(crate) fn from_punct(ch: char) -> Option<Self> {
        Some(match ch {
            '=' => TokenKind::Assign,
            ':' => TokenKind::Colon,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            '@' => TokenKind::At,
            '#' => TokenKind::Hash,
            '?' => TokenKind::Question,
            '!' => TokenKind::Bang,
            '&' => TokenKind::Amp,
            '|' => TokenKind::Pipe,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            _ => return None,
        })
    }

    pub(crate) fn from_operator(op: &str) -> Option<Self> {
        Some(match op {
            "==" => TokenKind::Eq,
            "!=" => TokenKind::NotEq,
            "<=" => TokenKind::Le,
            ">=" => TokenKind::Ge,
            "&&" => TokenKind::AndAnd,
            "||" => TokenKind::OrOr,
            _ => return None,
        })
    }

    /// True for keywords that may also appear where a name is expected.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Entity
                | TokenKind::Relation
                | TokenKind::Attribute
                | TokenKind::Permission
                | TokenKind::Action
                | TokenKind::Rule
                | TokenKind::Or
                | TokenKind::And
                | TokenKind::Not
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Entity => "'entity'",
            TokenKind::Relation => "'relation'",
            TokenKind::Attribute => "'attribute'",
            TokenKind::Permission => "'permission'",
            TokenKind::Action => "'action'",
            TokenKind::Rule => "'rule'",
            TokenKind::Or => "'or'",
            TokenKind::And => "'and'",
            TokenKind::Not => "'not'",
            TokenKind::Identifier => "identifier",
            TokenKind::String => "string literal",
            TokenKind::Number => "number",
            TokenKind::Assign => "'='",
            TokenKind::Colon => "':'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Dot => "'.'",
            TokenKind::Comma => "','",
            TokenKind::At => "'@'",
            TokenKind::Hash => "'#'",
            TokenKind::Question => "'?'",
            TokenKind::Bang => "'!'",
            TokenKind::Amp => "'&'",
            TokenKind::Pipe => "'|'",
            TokenKind::Eq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::AndAnd => "'&&'",
            TokenKind::OrOr => "'||'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Eof => "end of input",
        };
        f.write_str(s)
    }
}

/// A lexed token. `line` and `column` are 1-based; `offset` is the byte
/// offset of the token's first character in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Token {
    /// Byte length of the token in the source. String values exclude their quotes.
    pub fn source_len(&self) -> usize {
        match self.kind {
            TokenKind::String => self.value.len() + 2,
            _ => self.value.len(),
        }
    }
}
