// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Parser for `{{ pipeline }}` templates.

use crate::error::{FerryError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Action(Pipeline),
}

/// Commands separated by `|`; each result is passed as the last argument of the next.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline(pub Vec<Command>);

#[derive(Debug, Clone, PartialEq)]
pub struct Command(pub Vec<Term>);

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// `.` or `.a.b`
    Field(Vec<String>),
    Func(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Group(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Pipe,
    LParen,
    RParen,
    Field(Vec<String>),
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
}

fn err(msg: impl Into<String>) -> FerryError {
    FerryError::TemplateError(msg.into())
}

pub fn parse(src: &str) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    let mut rest = src;

    while let Some(start) = rest.find("{{") {
        let mut text = &rest[..start];
        let mut inner = &rest[start + 2..];
        if inner.starts_with('-') && inner[1..].starts_with(|c: char| c.is_ascii_whitespace()) {
            text = text.trim_end();
            inner = &inner[1..];
        }
        if !text.is_empty() {
            nodes.push(Node::Text(text.to_string()));
        }

        let (tokens, after, trim_right) = lex_action(inner)?;
        rest = if trim_right { after.trim_start() } else { after };

        // comment-only actions produce no tokens
        if tokens.is_empty() {
            if inner.trim_start().starts_with("/*") {
                continue;
            }
            return Err(err("missing value for command"));
        }

        let mut pos = 0;
        let pipeline = parse_pipeline(&tokens, &mut pos, false)?;
        nodes.push(Node::Action(pipeline));
    }

    if !rest.is_empty() {
        nodes.push(Node::Text(rest.to_string()));
    }
    Ok(nodes)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Lex one action up to its closing `}}`, returning the tokens, the text
/// after the action and whether trailing whitespace must be trimmed.
fn lex_action(src: &str) -> Result<(Vec<Token>, &str, bool)> {
    let mut tokens = Vec::new();
    let mut i = 0;

    loop {
        i += src[i..].len() - src[i..].trim_start().len();
        let rest = &src[i..];
        let had_ws = src[..i].ends_with(|c: char| c.is_whitespace());

        let c = match rest.chars().next() {
            Some(c) => c,
            None => return Err(err("unclosed action")),
        };

        if rest.starts_with("}}") {
            return Ok((tokens, &rest[2..], false));
        }
        if rest.starts_with("-}}") && had_ws {
            return Ok((tokens, &rest[3..], true));
        }
        if rest.starts_with("/*") {
            let end = rest.find("*/").ok_or_else(|| err("unclosed comment"))?;
            i += end + 2;
            continue;
        }

        match c {
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let (value, len) = lex_quoted(&rest[1..])?;
                tokens.push(Token::Str(value));
                i += len + 1;
            }
            '`' => {
                let end = rest[1..].find('`').ok_or_else(|| err("unterminated raw string"))?;
                tokens.push(Token::Str(rest[1..end + 1].to_string()));
                i += end + 2;
            }
            '.' => {
                let mut segments = Vec::new();
                let mut j = 0;
                while rest[j..].starts_with('.') && rest[j + 1..].starts_with(is_ident_char) {
                    let len = rest[j + 1..]
                        .find(|c: char| !is_ident_char(c))
                        .unwrap_or(rest.len() - j - 1);
                    segments.push(rest[j + 1..j + 1 + len].to_string());
                    j += len + 1;
                }
                if segments.is_empty() {
                    j = 1;
                }
                tokens.push(Token::Field(segments));
                i += j;
            }
            c if c == '-' || c.is_ascii_digit() => {
                let len = rest[1..]
                    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                    .map_or(rest.len(), |l| l + 1);
                let literal = &rest[..len];
                let token = if let Ok(n) = literal.parse::<i64>() {
                    Token::Int(n)
                } else {
                    Token::Float(
                        literal
                            .parse::<f64>()
                            .map_err(|_| err(format!("bad number syntax: {:?}", literal)))?,
                    )
                };
                tokens.push(token);
                i += len;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
                tokens.push(Token::Ident(rest[..len].to_string()));
                i += len;
            }
            other => return Err(err(format!("unexpected {:?} in action", other))),
        }
    }
}

/// Lex a double quoted string body, returning the value and the consumed
/// length including the closing quote.
fn lex_quoted(src: &str) -> Result<(String, usize)> {
    let mut value = String::new();
    let mut chars = src.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((value, idx + 1)),
            '\\' => match chars.next().map(|(_, c)| c) {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('r') => value.push('\r'),
                Some('"') => value.push('"'),
                Some('\\') => value.push('\\'),
                other => return Err(err(format!("unknown escape sequence {:?}", other))),
            },
            c => value.push(c),
        }
    }
    Err(err("unterminated quoted string"))
}

fn parse_pipeline(tokens: &[Token], pos: &mut usize, in_group: bool) -> Result<Pipeline> {
    let mut commands = Vec::new();
    loop {
        let command = parse_command(tokens, pos)?;
        if command.0.is_empty() {
            return Err(err("missing value for command"));
        }
        commands.push(command);

        match tokens.get(*pos) {
            Some(Token::Pipe) => *pos += 1,
            Some(Token::RParen) if in_group => {
                *pos += 1;
                return Ok(Pipeline(commands));
            }
            Some(Token::RParen) => return Err(err("unexpected right paren")),
            None if in_group => return Err(err("unclosed left paren")),
            None => return Ok(Pipeline(commands)),
            Some(other) => return Err(err(format!("unexpected {:?}", other))),
        }
    }
}

fn parse_command(tokens: &[Token], pos: &mut usize) -> Result<Command> {
    let mut terms = Vec::new();
    while let Some(token) = tokens.get(*pos) {
        let term = match token {
            Token::Pipe | Token::RParen => break,
            Token::LParen => {
                *pos += 1;
                terms.push(Term::Group(parse_pipeline(tokens, pos, true)?));
                continue;
            }
            Token::Field(path) => Term::Field(path.clone()),
            Token::Ident(name) if name == "true" => Term::Bool(true),
            Token::Ident(name) if name == "false" => Term::Bool(false),
            Token::Ident(name) => Term::Func(name.clone()),
            Token::Str(s) => Term::Str(s.clone()),
            Token::Int(n) => Term::Int(*n),
            Token::Float(f) => Term::Float(*f),
        };
        terms.push(term);
        *pos += 1;
    }
    Ok(Command(terms))
}
