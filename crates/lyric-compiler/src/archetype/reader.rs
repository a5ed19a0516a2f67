//! S-expression reader for archetypes.
//!
//! ```text
//! (Block
//!   ; comment
//!   (Val :identifier x :type "Int" (Integer :value "1")))
//! ```
//!
//! A node is `(Class :key value ... children...)`. Values are quoted strings
//! or bare words. Errors are collected into [`Diagnostics`] and the read
//! fails with [`CompilerError::Parse`] once the whole input has been seen.

use std::ops::Range;

use logos::Logos;
use rowan::TextRange;

use super::{Archetype, ArchetypeBuilder, AstClass, NodeId};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{CompilerError, Result};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum TokenKind {
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[regex(r":[A-Za-z_][A-Za-z0-9_]*")]
    Key,
    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    Str,
    #[regex(r#"[^\s()";:]+"#)]
    Word,
    #[regex(r";[^\n]*", logos::skip, allow_greedy = true)]
    Comment,
    /// Consecutive unrecognized characters.
    Garbage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: TextRange,
}

fn range_to_text_range(range: Range<usize>) -> TextRange {
    TextRange::new((range.start as u32).into(), (range.end as u32).into())
}

/// Tokenize `source`, coalescing runs of lexer errors into one `Garbage` token.
pub fn lex(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    let mut error_start: Option<usize> = None;

    loop {
        match lexer.next() {
            Some(Ok(kind)) => {
                if let Some(start) = error_start.take() {
                    tokens.push(Token {
                        kind: TokenKind::Garbage,
                        span: range_to_text_range(start..lexer.span().start),
                    });
                }
                tokens.push(Token {
                    kind,
                    span: range_to_text_range(lexer.span()),
                });
            }
            Some(Err(())) => {
                if error_start.is_none() {
                    error_start = Some(lexer.span().start);
                }
            }
            None => {
                if let Some(start) = error_start.take() {
                    tokens.push(Token {
                        kind: TokenKind::Garbage,
                        span: range_to_text_range(start..source.len()),
                    });
                }
                break;
            }
        }
    }

    tokens
}

fn token_text<'s>(source: &'s str, token: &Token) -> &'s str {
    &source[Range::<usize>::from(token.span)]
}

/// Strip the quotes of a string token and resolve escapes.
fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

struct Open {
    node: NodeId,
    start: TextRange,
}

struct Reader<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    builder: ArchetypeBuilder,
    diagnostics: Diagnostics,
    stack: Vec<Open>,
    root: Option<NodeId>,
}

pub(super) fn read(source: &str) -> Result<Archetype> {
    let mut reader = Reader {
        source,
        tokens: lex(source),
        pos: 0,
        builder: ArchetypeBuilder::new(),
        diagnostics: Diagnostics::new(),
        stack: Vec::new(),
        root: None,
    };
    reader.run()?;

    if reader.diagnostics.has_errors() {
        return Err(CompilerError::Parse(reader.diagnostics));
    }
    match reader.root {
        Some(root) => reader.builder.build(root),
        None => {
            let mut diagnostics = Diagnostics::new();
            diagnostics
                .report(DiagnosticKind::MissingRoot, TextRange::empty(0.into()))
                .emit();
            Err(CompilerError::Parse(diagnostics))
        }
    }
}

impl Reader<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn end_range(&self) -> TextRange {
        TextRange::empty((self.source.len() as u32).into())
    }

    fn run(&mut self) -> Result<()> {
        while let Some(token) = self.bump() {
            match token.kind {
                TokenKind::ParenOpen => self.open(token)?,
                TokenKind::ParenClose => self.close(token)?,
                TokenKind::Key => self.attribute(token)?,
                TokenKind::Str | TokenKind::Word => {
                    self.diagnostics
                        .report(DiagnosticKind::BareValue, token.span)
                        .message(token_text(self.source, &token))
                        .emit();
                }
                TokenKind::Comment => {}
                TokenKind::Garbage => {
                    self.diagnostics
                        .report(DiagnosticKind::UnexpectedToken, token.span)
                        .message(token_text(self.source, &token))
                        .emit();
                }
            }
        }

        if let Some(open) = self.stack.last() {
            let end = self.end_range();
            self.diagnostics
                .report(DiagnosticKind::UnclosedNode, end)
                .related_to("node starts here", open.start)
                .emit();
        }
        Ok(())
    }

    fn open(&mut self, paren: Token) -> Result<()> {
        let class_token = match self.peek() {
            Some(t) if t.kind == TokenKind::Word => {
                self.pos += 1;
                t
            }
            _ => {
                let range = self.peek().map_or(self.end_range(), |t| t.span);
                self.diagnostics
                    .report(DiagnosticKind::ExpectedNodeClass, range)
                    .emit();
                return Ok(());
            }
        };
        let name = token_text(self.source, &class_token);
        let Some(class) = AstClass::from_name(name) else {
            self.diagnostics
                .report(DiagnosticKind::UnknownNodeClass, class_token.span)
                .message(name)
                .emit();
            // read the subtree anyway so its parens stay balanced
            let node = self.builder.push(AstClass::Block, paren.span);
            self.stack.push(Open {
                node,
                start: paren.span,
            });
            return Ok(());
        };

        let node = self.builder.push(class, paren.span);
        if let Some(parent) = self.stack.last() {
            self.builder.append_child(parent.node, node)?;
        } else if self.root.is_some() {
            self.diagnostics
                .report(DiagnosticKind::MultipleRoots, paren.span)
                .emit();
        } else {
            self.root = Some(node);
        }
        self.stack.push(Open {
            node,
            start: paren.span,
        });
        Ok(())
    }

    fn close(&mut self, paren: Token) -> Result<()> {
        let Some(open) = self.stack.pop() else {
            self.diagnostics
                .report(DiagnosticKind::UnexpectedToken, paren.span)
                .message(")")
                .emit();
            return Ok(());
        };
        let range = open.start.cover(paren.span);
        self.builder.set_range(open.node, range)
    }

    fn attribute(&mut self, key: Token) -> Result<()> {
        let name = &token_text(self.source, &key)[1..];
        let value = match self.peek() {
            Some(t) if t.kind == TokenKind::Str => {
                self.pos += 1;
                unquote(token_text(self.source, &t))
            }
            Some(t) if t.kind == TokenKind::Word => {
                self.pos += 1;
                token_text(self.source, &t).to_owned()
            }
            other => {
                let range = other.map_or(self.end_range(), |t| t.span);
                self.diagnostics
                    .report(DiagnosticKind::ExpectedAttributeValue, range)
                    .message(name)
                    .emit();
                return Ok(());
            }
        };
        match self.stack.last() {
            Some(open) => self.builder.set_attr(open.node, name, value),
            None => {
                self.diagnostics
                    .report(DiagnosticKind::UnexpectedToken, key.span)
                    .message(token_text(self.source, &key))
                    .emit();
                Ok(())
            }
        }
    }
}
