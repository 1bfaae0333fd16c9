//! Recursive-descent parser for the schema DSL.
//!
//! Example DSL:
//! ```text
//! rule is_public(resource) {
//!     resource.public == true
//! }
//!
//! entity user {}
//!
//! entity document {
//!     relation owner @user
//!     relation viewer @user @team#member
//!     attribute public bool
//!
//!     permission edit = owner
//!     permission view = owner or viewer or is_public(resource)
//! }
//! ```
//!
//! Errors do not stop the parse: every syntax error is recorded with its
//! position and the parser resynchronises at the next statement, so one call
//! reports all problems at once.

use std::fmt;

use thiserror::Error;

use super::ast::{
    AttributeDef, BinaryOp, EntityDef, PermissionDef, RelationDef, RelationTarget, RuleDef,
    RuleExpr, SchemaAst,
};
use super::lexer::{tokenize, LexError};
use super::token::{Token, TokenKind};

/// A single syntax error with its 1-based source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

/// All errors found while parsing one source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ParseError {
    pub errors: Vec<SyntaxError>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        let (line, column) = err.position();
        let message = match &err {
            LexError::IllegalCharacter { ch, .. } => format!("illegal character '{ch}'"),
            LexError::UnterminatedString { .. } => "unterminated string literal".to_string(),
        };
        ParseError {
            errors: vec![SyntaxError {
                message,
                line,
                column,
            }],
        }
    }
}

/// Result type for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parses DSL source into a [`SchemaAst`].
pub fn parse(source: &str) -> ParseResult<SchemaAst> {
    let tokens = tokenize(source)?;
    Parser::new(source, tokens).parse_schema()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    // ============ Token Navigation ============

    fn token_at(&self, index: usize) -> &Token {
        // The stream always ends with Eof, so clamping to the last token is safe.
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[index.min(last)]
    }

    fn current(&self) -> &Token {
        self.token_at(self.pos)
    }

    fn peek(&self) -> &Token {
        self.token_at(self.pos + 1)
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error_at(&mut self, token: &Token, message: impl Into<String>) {
        self.errors.push(SyntaxError {
            message: message.into(),
            line: token.line,
            column: token.column,
        });
    }

    fn error(&mut self, message: impl Into<String>) {
        let token = self.current().clone();
        self.error_at(&token, message);
    }

    fn describe(token: &Token) -> String {
        match token.kind {
            TokenKind::Identifier => format!("identifier '{}'", token.value),
            TokenKind::Number => format!("number {}", token.value),
            TokenKind::String => format!("string \"{}\"", token.value),
            kind => kind.to_string(),
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Option<Token> {
        if self.at(kind) {
            return Some(self.advance());
        }
        let found = Self::describe(self.current());
        self.error(format!("expected {kind} {context}, found {found}"));
        None
    }

    fn expect_ident(&mut self, what: &str) -> Option<String> {
        if self.at(TokenKind::Identifier) {
            return Some(self.advance().value);
        }
        let found = Self::describe(self.current());
        self.error(format!("expected {what}, found {found}"));
        None
    }

    /// Skips to the next top-level `entity`/`rule` keyword.
    fn recover_top_level(&mut self) {
        while !matches!(
            self.current().kind,
            TokenKind::Entity | TokenKind::Rule | TokenKind::Eof
        ) {
            self.advance();
        }
    }

    /// Skips the rest of a broken entity-body statement.
    fn recover_statement(&mut self) {
        while !matches!(
            self.current().kind,
            TokenKind::Relation
                | TokenKind::Attribute
                | TokenKind::Permission
                | TokenKind::Action
                | TokenKind::RBrace
                | TokenKind::Entity
                | TokenKind::Eof
        ) {
            self.advance();
        }
    }

    /// Consumes tokens up to the `close` that balances an already consumed
    /// `open`, returning the trimmed source text between them. Whitespace
    /// between tokens is kept; comments are dropped.
    fn capture_balanced(
        &mut self,
        open: &Token,
        close: TokenKind,
        what: &str,
    ) -> Option<String> {
        let mut text = String::new();
        let mut cursor = open.offset + open.source_len();
        let mut depth = 1usize;
        loop {
            let token = self.current().clone();
            if token.kind == TokenKind::Eof {
                self.error_at(open, format!("unterminated {what}: missing {close}"));
                return None;
            }
            push_without_comments(&mut text, &self.source[cursor..token.offset]);
            if token.kind == open.kind {
                depth += 1;
            } else if token.kind == close {
                depth -= 1;
                if depth == 0 {
                    self.advance();
                    return Some(text.trim().to_string());
                }
            }
            cursor = token.offset + token.source_len();
            text.push_str(&self.source[token.offset..cursor]);
            self.advance();
        }
    }

    // ============ Top Level ============

    fn parse_schema(mut self) -> ParseResult<SchemaAst> {
        let mut ast = SchemaAst::default();

        while !self.at(TokenKind::Eof) {
            let kind = self.current().kind;
            match kind {
                TokenKind::Entity => match self.parse_entity() {
                    Some(entity) => ast.entities.push(entity),
                    None => self.recover_top_level(),
                },
                TokenKind::Rule => match self.parse_rule_def() {
                    Some(rule) => ast.rules.push(rule),
                    None => self.recover_top_level(),
                },
                _ => {
                    let found = Self::describe(self.current());
                    self.error(format!(
                        "unexpected {found}, expected 'entity' or 'rule' definition"
                    ));
                    self.advance();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(ast)
        } else {
            Err(ParseError {
                errors: self.errors,
            })
        }
    }

    fn parse_rule_def(&mut self) -> Option<RuleDef> {
        self.advance(); // 'rule'
        let name = self.expect_ident("rule name")?;
        self.expect(TokenKind::LParen, "after rule name")?;

        let mut params = Vec::new();
        loop {
            params.push(self.expect_ident("rule parameter name")?);
            if self.at(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen, "to close rule parameters")?;

        let open = self.expect(TokenKind::LBrace, "to open rule body")?;
        let body = self.capture_balanced(&open, TokenKind::RBrace, "rule body")?;
        if body.is_empty() {
            self.error_at(&open, format!("rule '{name}' has an empty body"));
            return None;
        }

        Some(RuleDef { name, params, body })
    }

    fn parse_entity(&mut self) -> Option<EntityDef> {
        self.advance(); // 'entity'
        let name = self.expect_ident("entity name")?;
        self.expect(TokenKind::LBrace, "to open entity body")?;

        let mut entity = EntityDef {
            name,
            ..Default::default()
        };

        loop {
            let kind = self.current().kind;
            match kind {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Eof | TokenKind::Entity => {
                    let message = format!("missing '}}' to close entity '{}'", entity.name);
                    self.error(message);
                    break;
                }
                TokenKind::Relation => match self.parse_relation() {
                    Some(relation) => entity.relations.push(relation),
                    None => self.recover_statement(),
                },
                TokenKind::Attribute => match self.parse_attribute() {
                    Some(attribute) => entity.attributes.push(attribute),
                    None => self.recover_statement(),
                },
                TokenKind::Permission | TokenKind::Action => match self.parse_permission() {
                    Some(permission) => entity.permissions.push(permission),
                    None => self.recover_statement(),
                },
                _ => {
                    let found = Self::describe(self.current());
                    self.error(format!(
                        "unexpected {found} in entity '{}', expected relation, attribute or permission",
                        entity.name
                    ));
                    self.advance();
                }
            }
        }

        Some(entity)
    }

    // ============ Entity Statements ============

    fn parse_relation(&mut self) -> Option<RelationDef> {
        self.advance(); // 'relation'
        let name = self.expect_ident("relation name")?;

        if !self.at(TokenKind::At) {
            let found = Self::describe(self.current());
            self.error(format!(
                "relation '{name}' must declare at least one '@type' target, found {found}"
            ));
            return None;
        }

        let mut targets = Vec::new();
        while self.at(TokenKind::At) {
            self.advance();
            let entity = self.expect_ident("target entity type after '@'")?;
            let relation = if self.at(TokenKind::Hash) {
                self.advance();
                Some(self.expect_ident("userset relation after '#'")?)
            } else {
                None
            };
            targets.push(RelationTarget { entity, relation });
        }

        Some(RelationDef { name, targets })
    }

    fn parse_attribute(&mut self) -> Option<AttributeDef> {
        self.advance(); // 'attribute'
        let name = self.expect_ident("attribute name")?;
        let type_name = self.expect_ident("attribute type")?;
        let is_array = if self.at(TokenKind::LBracket) {
            self.advance();
            self.expect(TokenKind::RBracket, "after '[' in array type")?;
            true
        } else {
            false
        };

        Some(AttributeDef {
            name,
            type_name,
            is_array,
        })
    }

    fn parse_permission(&mut self) -> Option<PermissionDef> {
        self.advance(); // 'permission' | 'action'
        let name = self.expect_ident("permission name")?;
        self.expect(TokenKind::Assign, "after permission name")?;
        let rule = self.parse_or()?;
        Some(PermissionDef { name, rule })
    }

    // ============ Rule Expressions ============

    fn parse_or(&mut self) -> Option<RuleExpr> {
        let mut left = self.parse_and()?;
        while self.at(TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = RuleExpr::binary(BinaryOp::Or, left, right);
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<RuleExpr> {
        let mut left = self.parse_unary()?;
        while self.at(TokenKind::And) {
            self.advance();
            let right = self.parse_unary()?;
            left = RuleExpr::binary(BinaryOp::And, left, right);
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<RuleExpr> {
        if self.at(TokenKind::Not) {
            self.advance();
            let operand = self.parse_primary()?;
            return Some(RuleExpr::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Option<RuleExpr> {
        let kind = self.current().kind;
        match kind {
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_or()?;
                self.expect(TokenKind::RParen, "to close parenthesised expression")?;
                Some(expr)
            }
            TokenKind::Rule => {
                self.advance();
                let open = self.expect(TokenKind::LParen, "after 'rule'")?;
                let expression =
                    self.capture_balanced(&open, TokenKind::RParen, "inline rule expression")?;
                if expression.is_empty() {
                    self.error_at(&open, "inline rule expression is empty");
                    return None;
                }
                Some(RuleExpr::Inline { expression })
            }
            TokenKind::Identifier => match self.peek_kind() {
                TokenKind::LParen => self.parse_call(),
                TokenKind::Dot => {
                    let relation = self.advance().value;
                    self.advance(); // '.'
                    let permission = self.expect_ident("permission or relation name after '.'")?;
                    Some(RuleExpr::Member {
                        relation,
                        permission,
                    })
                }
                _ => Some(RuleExpr::Identifier(self.advance().value)),
            },
            _ => {
                let found = Self::describe(self.current());
                self.error(format!(
                    "expected relation, permission, rule call or '(' but found {found}"
                ));
                None
            }
        }
    }

    fn parse_call(&mut self) -> Option<RuleExpr> {
        let name = self.advance().value;
        self.advance(); // '('
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                args.push(self.expect_ident("rule call argument")?);
                if self.at(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "to close rule call arguments")?;
        Some(RuleExpr::Call { name, args })
    }
}

/// Appends inter-token trivia to `out` with any `//` comment removed.
fn push_without_comments(out: &mut String, trivia: &str) {
    for piece in trivia.split_inclusive('\n') {
        match piece.find("//") {
            Some(start) => {
                out.push_str(&piece[..start]);
                if piece.ends_with('\n') {
                    out.push('\n');
                }
            }
            None => out.push_str(piece),
        }
    }
}
