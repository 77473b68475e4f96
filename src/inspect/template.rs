//! inspect::template
//!
//! Go-style text templates for `--output` formats.
//!
//! # Syntax
//!
//! Text outside `{{ }}` is copied verbatim. Actions hold a pipeline, or a
//! control structure:
//!
//! - `{{.}}`, `{{.A.B}}`, `{{$}}`, `{{$x.A}}` render a value
//! - `{{$x := pipeline}}` declares and `{{$x = pipeline}}` assigns a variable
//! - `{{.A | printf "%s"}}` passes the value on as the last argument
//! - `{{(pipeline).A}}` groups a pipeline and reads fields of its result
//! - `{{if p}}..{{else if q}}..{{else}}..{{end}}`
//! - `{{with p}}..{{else}}..{{end}}` runs its body with dot set to `p`
//! - `{{range p}}..{{else}}..{{end}}` over arrays, maps (sorted keys) and
//!   non-negative integers, with `{{range $i, $e := p}}`, `{{break}}` and
//!   `{{continue}}`
//! - `{{/* comment */}}` renders nothing
//!
//! A `-` directly inside a delimiter and followed (or preceded) by a space,
//! as in `{{- .ULID -}}`, trims all whitespace in the adjacent text.
//!
//! Functions: `and`, `or`, `not`, `len`, `index`, `slice`, `print`,
//! `printf`, `println`, `eq`, `ne`, `lt`, `le`, `gt`, `ge`. Unknown
//! functions and undefined variables are parse errors.
//!
//! # Field resolution
//!
//! Documents are structs, except for `labels` objects, which are string
//! maps. A struct field matches its key exactly, and otherwise ignoring
//! ASCII case, so `{{.MinTime}}` finds `minTime`; a missing struct field is
//! an error. Map keys match exactly, and a missing key renders
//! `<no value>`.
//!
//! # Value formatting
//!
//! | Value  | Output                |
//! |--------|-----------------------|
//! | string | raw text              |
//! | number | decimal text          |
//! | bool   | `true` / `false`      |
//! | null   | `<no value>`          |
//! | array  | `[a b c]`             |
//! | map    | `map[k1:v1 k2:v2]`    |
//! | struct | compact JSON          |
//!
//! # Example
//!
//! ```
//! use blockscope::inspect::template::Template;
//! use serde_json::json;
//!
//! let tmpl = Template::parse(
//!     "{{.ULID}} {{range $i, $s := .Compaction.Sources}}{{if $i}},{{end}}{{$s}}{{end}}",
//! )
//! .unwrap();
//! let doc = json!({"ulid": "01ABC", "compaction": {"sources": ["01A", "01B"]}});
//! assert_eq!(tmpl.execute(&doc).unwrap(), "01ABC 01A,01B");
//! ```

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::iter::Peekable;
use std::str::Chars;

use serde_json::{Number, Value};
use thiserror::Error;

/// Rendered for null values and missing map keys.
pub const NO_VALUE: &str = "<no value>";

/// How `print` and `printf` render null.
const NIL: &str = "<nil>";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const COMMENT_OPEN: &str = "/*";
const COMMENT_CLOSE: &str = "*/";

const FUNCTIONS: &[&str] = &[
    "and", "eq", "ge", "gt", "index", "le", "len", "lt", "ne", "not", "or", "print", "printf",
    "println", "slice",
];

const KEYWORDS: &[&str] = &[
    "block", "break", "continue", "define", "else", "end", "if", "range", "template", "with",
];

/// Object keys holding string maps rather than structs.
const MAP_FIELDS: &[&str] = &["labels"];

/// Errors from parsing or executing a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template text is malformed.
    #[error("template: offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// The template could not be applied to a document.
    #[error("template: executing {action}: {message}")]
    Exec { action: String, message: String },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Action { action: String, pipe: Pipeline },
    If(Branch),
    With(Branch),
    Range(Branch),
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Branch {
    action: String,
    pipe: Pipeline,
    body: Vec<Node>,
    otherwise: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pipeline {
    decl: Vec<String>,
    assign: bool,
    commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Command {
    args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Dot,
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Function(String),
    Literal(Value),
    Pipeline(Box<Pipeline>, Vec<String>),
}

impl Template {
    /// Parse template text.
    ///
    /// # Errors
    ///
    /// `TemplateError::Parse` for an unclosed action, comment or control
    /// structure, an empty action, a malformed field path, an unknown
    /// function, an undefined variable, or an unsupported action such as
    /// `{{template}}`.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let items = scan(source)?;
        let mut parser = Parser {
            items: items.into_iter(),
            vars: vec!["$".to_string()],
            loops: 0,
        };

        let (nodes, stop) = parser.parse_list()?;
        match stop {
            Stop::Eof => Ok(Self {
                source: source.to_string(),
                nodes,
            }),
            Stop::End { offset } => Err(parse_error(offset, "unexpected {{end}}")),
            Stop::Else { offset, .. } => Err(parse_error(offset, "unexpected {{else}}")),
        }
    }

    /// The original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Apply the template to a document.
    ///
    /// # Errors
    ///
    /// `TemplateError::Exec` if a field does not resolve, a function is
    /// misused, or a value cannot be iterated or compared.
    pub fn execute(&self, data: &Value) -> Result<String, TemplateError> {
        let root = Data::new(data.clone());
        let mut exec = Exec {
            vars: vec![("$".to_string(), root.clone())],
        };
        let mut out = String::new();
        exec.walk(&self.nodes, &root, &mut out)?;
        Ok(out)
    }
}

fn parse_error(offset: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Parse {
        offset,
        message: message.into(),
    }
}

fn exec_error(action: &str, message: impl Into<String>) -> TemplateError {
    TemplateError::Exec {
        action: action.to_string(),
        message: message.into(),
    }
}

// =============================================================================
// Scanning
// =============================================================================

#[derive(Debug)]
enum Item {
    Text(String),
    Action { body: String, offset: usize },
}

/// Split source into text and action bodies. Comments are dropped.
fn scan(source: &str) -> Result<Vec<Item>, TemplateError> {
    let mut items = Vec::new();
    let mut pos = 0;
    let mut trim_leading = false;

    while pos <= source.len() {
        let rest = &source[pos..];
        let Some(open_rel) = rest.find(OPEN) else {
            push_text(&mut items, rest, trim_leading, false);
            break;
        };

        let open = pos + open_rel;
        let mut body_start = open + OPEN.len();
        let trim_before = has_left_trim(&source[body_start..]);
        if trim_before {
            body_start += 1;
        }
        push_text(&mut items, &source[pos..open], trim_leading, trim_before);

        let after_open = &source[body_start..];
        let lead_ws = after_open.len() - after_open.trim_start().len();
        let is_comment = after_open[lead_ws..].starts_with(COMMENT_OPEN);

        let (body_end, close_end) = if is_comment {
            let comment_start = body_start + lead_ws + COMMENT_OPEN.len();
            let end_rel = source[comment_start..]
                .find(COMMENT_CLOSE)
                .ok_or_else(|| parse_error(open, "unclosed comment"))?;
            let comment_end = comment_start + end_rel + COMMENT_CLOSE.len();
            let close_rel = source[comment_end..]
                .find(CLOSE)
                .ok_or_else(|| parse_error(open, "unclosed action"))?;
            let between = source[comment_end..comment_end + close_rel].trim();
            if !between.is_empty() && between != "-" {
                return Err(parse_error(comment_end, "comment ends before closing delimiter"));
            }
            (comment_end + close_rel, comment_end + close_rel + CLOSE.len())
        } else {
            let close_rel =
                find_close(after_open).ok_or_else(|| parse_error(open, "unclosed action"))?;
            (body_start + close_rel, body_start + close_rel + CLOSE.len())
        };

        let mut body = &source[body_start..body_end];
        trim_leading = has_right_trim(body);
        if trim_leading {
            body = &body[..body.len() - 1];
        }

        if !is_comment {
            if body.trim().is_empty() {
                return Err(parse_error(body_start, "missing value for command"));
            }
            items.push(Item::Action {
                body: body.to_string(),
                offset: body_start,
            });
        }
        pos = close_end;
    }

    Ok(items)
}

/// `{{- ` trims preceding text.
fn has_left_trim(after_open: &str) -> bool {
    let mut chars = after_open.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// ` -}}` trims following text.
fn has_right_trim(body: &str) -> bool {
    let mut chars = body.chars().rev();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// Position of the closing delimiter, skipping quoted text.
fn find_close(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' | '\'' => quote = Some(c),
            '}' if body[i..].starts_with(CLOSE) => return Some(i),
            _ => {}
        }
    }
    None
}

fn push_text(items: &mut Vec<Item>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}

// =============================================================================
// Lexing
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Ident(String),
    Literal(Value),
    Pipe,
    LeftParen,
    RightParen,
    Declare,
    Assign,
    Comma,
}

#[derive(Debug, Clone)]
struct Lexed {
    token: Token,
    /// Whitespace precedes the token.
    spaced: bool,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn lex(body: &str, offset: usize) -> Result<Vec<Lexed>, TemplateError> {
    let chars: Vec<(usize, char)> = body.char_indices().collect();
    let peek = |i: usize| chars.get(i).map(|&(_, c)| c);
    let mut tokens = Vec::new();
    let mut spaced = true;
    let mut i = 0;

    while i < chars.len() {
        let (at, c) = chars[i];
        let err = |message: String| parse_error(offset + at, message);
        if c.is_whitespace() {
            spaced = true;
            i += 1;
            continue;
        }

        let token = match c {
            '|' => {
                i += 1;
                Token::Pipe
            }
            '(' => {
                i += 1;
                Token::LeftParen
            }
            ')' => {
                i += 1;
                Token::RightParen
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            ':' if peek(i + 1) == Some('=') => {
                i += 2;
                Token::Declare
            }
            '=' => {
                i += 1;
                Token::Assign
            }
            '"' | '`' => {
                let (text, next) = lex_string(&chars, i).map_err(err)?;
                i = next;
                Token::Literal(Value::String(text))
            }
            '\'' => {
                let (text, next) = lex_string(&chars, i).map_err(err)?;
                let mut runes = text.chars();
                let (Some(rune), None) = (runes.next(), runes.next()) else {
                    return Err(err("malformed character constant".into()));
                };
                i = next;
                Token::Literal(Value::from(u32::from(rune)))
            }
            '.' if peek(i + 1).is_some_and(|c| c.is_ascii_digit()) => {
                let (number, next) = lex_number(&chars, i).map_err(err)?;
                i = next;
                Token::Literal(Value::Number(number))
            }
            '.' if peek(i + 1).is_some_and(is_ident_char) => {
                let (path, next) = lex_fields(&chars, i).map_err(err)?;
                i = next;
                Token::Field(path)
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '$' => {
                let mut end = i + 1;
                while peek(end).is_some_and(is_ident_char) {
                    end += 1;
                }
                let name: String = chars[i..end].iter().map(|&(_, c)| c).collect();
                let (path, next) = if peek(end) == Some('.') {
                    lex_fields(&chars, end).map_err(err)?
                } else {
                    (Vec::new(), end)
                };
                i = next;
                Token::Variable(name, path)
            }
            '-' | '+' if peek(i + 1).is_some_and(|c| c.is_ascii_digit() || c == '.') => {
                let (number, next) = lex_number(&chars, i).map_err(err)?;
                i = next;
                Token::Literal(Value::Number(number))
            }
            c if c.is_ascii_digit() => {
                let (number, next) = lex_number(&chars, i).map_err(err)?;
                i = next;
                Token::Literal(Value::Number(number))
            }
            c if is_ident_char(c) => {
                let mut end = i;
                while peek(end).is_some_and(is_ident_char) {
                    end += 1;
                }
                let word: String = chars[i..end].iter().map(|&(_, c)| c).collect();
                i = end;
                match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "nil" => Token::Literal(Value::Null),
                    _ => Token::Ident(word),
                }
            }
            other => return Err(err(format!("unexpected {:?} in command", other))),
        };

        tokens.push(Lexed { token, spaced });
        spaced = false;
    }

    Ok(tokens)
}

/// `.A.B.C` starting at a `.`.
fn lex_fields(chars: &[(usize, char)], start: usize) -> Result<(Vec<String>, usize), String> {
    let mut path = Vec::new();
    let mut i = start;
    while chars.get(i).map(|&(_, c)| c) == Some('.') {
        let mut end = i + 1;
        while chars.get(end).is_some_and(|&(_, c)| is_ident_char(c)) {
            end += 1;
        }
        if end == i + 1 {
            let text: String = chars[start..end].iter().map(|&(_, c)| c).collect();
            return Err(format!("malformed field path {:?}", text));
        }
        path.push(chars[i + 1..end].iter().map(|&(_, c)| c).collect());
        i = end;
    }
    Ok((path, i))
}

/// A quoted, raw or character literal starting at its opening quote.
fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start].1;
    let mut text = String::new();
    let mut i = start + 1;
    while let Some(&(_, c)) = chars.get(i) {
        i += 1;
        if c == quote {
            return Ok((text, i));
        }
        if c != '\\' || quote == '`' {
            text.push(c);
            continue;
        }
        let Some(&(_, escape)) = chars.get(i) else {
            break;
        };
        i += 1;
        let decoded = match escape {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0c}',
            'v' => '\u{0b}',
            '\\' | '"' | '\'' => escape,
            'x' | 'u' => {
                let len = if escape == 'x' { 2 } else { 4 };
                let hex: String = chars.iter().skip(i).take(len).map(|&(_, c)| c).collect();
                i += len;
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == len)
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid escape \\{}{}", escape, hex))?
            }
            other => return Err(format!("invalid escape \\{}", other)),
        };
        text.push(decoded);
    }
    Err("unterminated quoted string".into())
}

fn lex_number(chars: &[(usize, char)], start: usize) -> Result<(Number, usize), String> {
    let mut end = start + 1;
    while let Some(&(_, c)) = chars.get(end) {
        let prev = chars[end - 1].1;
        let exponent_sign = (c == '+' || c == '-') && matches!(prev, 'e' | 'E');
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
            end += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..end]
        .iter()
        .map(|&(_, c)| c)
        .filter(|&c| c != '_')
        .collect();

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.trim_start_matches('+')),
    };
    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .map(|h| i64::from_str_radix(h, 16));

    let number = match hex {
        Some(Ok(n)) => Some(Number::from(if negative { -n } else { n })),
        Some(Err(_)) => None,
        None => match text.trim_start_matches('+').parse::<i64>() {
            Ok(n) => Some(Number::from(n)),
            Err(_) => text
                .trim_start_matches('+')
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64),
        },
    };
    number
        .map(|n| (n, end))
        .ok_or_else(|| format!("bad number syntax: {:?}", text))
}

// =============================================================================
// Parsing
// =============================================================================

/// What ended a list of nodes.
enum Stop {
    Eof,
    End {
        offset: usize,
    },
    Else {
        offset: usize,
        action: String,
        rest: Vec<Lexed>,
    },
}

struct Parser {
    items: std::vec::IntoIter<Item>,
    /// Variables in scope, innermost last.
    vars: Vec<String>,
    /// Enclosing `range` bodies.
    loops: usize,
}

impl Parser {
    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let (body, offset) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { body, offset } => (body, offset),
            };
            let action = format!("{{{{{}}}}}", body.trim());
            let tokens = lex(&body, offset)?;
            let keyword = match tokens.first() {
                Some(Lexed {
                    token: Token::Ident(name),
                    ..
                }) if KEYWORDS.contains(&name.as_str()) => Some(name.as_str()),
                _ => None,
            };

            match keyword {
                Some("end") => {
                    expect_end(&tokens[1..], "end", offset)?;
                    return Ok((nodes, Stop::End { offset }));
                }
                Some("else") => {
                    return Ok((
                        nodes,
                        Stop::Else {
                            offset,
                            action,
                            rest: tokens[1..].to_vec(),
                        },
                    ))
                }
                Some(kind @ ("if" | "with" | "range")) => {
                    let node = self.parse_branch(kind, &tokens[1..], offset, action)?;
                    nodes.push(node);
                }
                Some(kind @ ("break" | "continue")) => {
                    if self.loops == 0 {
                        return Err(parse_error(
                            offset,
                            format!("{{{{{}}}}} outside {{{{range}}}}", kind),
                        ));
                    }
                    expect_end(&tokens[1..], kind, offset)?;
                    nodes.push(if kind == "break" {
                        Node::Break
                    } else {
                        Node::Continue
                    });
                }
                Some(kind) => {
                    return Err(parse_error(
                        offset,
                        format!("unsupported action {{{{{}}}}}", kind),
                    ))
                }
                None => {
                    let pipe = self.parse_pipeline(&tokens, offset, 1)?;
                    if pipe.commands.is_empty() {
                        return Err(parse_error(offset, "missing value for command"));
                    }
                    self.declare(&pipe, offset)?;
                    nodes.push(Node::Action { action, pipe });
                }
            }
        }

        Ok((nodes, Stop::Eof))
    }

    fn parse_branch(
        &mut self,
        kind: &str,
        tokens: &[Lexed],
        offset: usize,
        action: String,
    ) -> Result<Node, TemplateError> {
        let mark = self.vars.len();
        let max_decl = if kind == "range" { 2 } else { 1 };
        let pipe = self.parse_pipeline(tokens, offset, max_decl)?;
        if pipe.commands.is_empty() {
            return Err(parse_error(offset, format!("missing value for {}", kind)));
        }
        self.declare(&pipe, offset)?;

        if kind == "range" {
            self.loops += 1;
        }
        let body = self.parse_list();
        if kind == "range" {
            self.loops -= 1;
        }
        let (body, stop) = body?;

        let otherwise = match stop {
            Stop::End { .. } => Vec::new(),
            Stop::Eof => {
                return Err(parse_error(
                    offset,
                    format!("unexpected EOF in {{{{{}}}}}", kind),
                ))
            }
            Stop::Else {
                offset: else_offset,
                action: else_action,
                rest,
            } => match rest.first().map(|lexed| &lexed.token) {
                None => match self.parse_list()? {
                    (nodes, Stop::End { .. }) => nodes,
                    (_, Stop::Else { offset, .. }) => {
                        return Err(parse_error(offset, "expected {{end}}; found {{else}}"))
                    }
                    (_, Stop::Eof) => {
                        return Err(parse_error(else_offset, "unexpected EOF in {{else}}"))
                    }
                },
                Some(Token::Ident(next)) if next == "if" || next == "with" => {
                    let next = next.clone();
                    vec![self.parse_branch(&next, &rest[1..], else_offset, else_action)?]
                }
                Some(_) => {
                    return Err(parse_error(else_offset, "unexpected operand after {{else}}"))
                }
            },
        };
        self.vars.truncate(mark);

        let branch = Branch {
            action,
            pipe,
            body,
            otherwise,
        };
        Ok(match kind {
            "if" => Node::If(branch),
            "with" => Node::With(branch),
            _ => Node::Range(branch),
        })
    }

    fn parse_pipeline(
        &self,
        tokens: &[Lexed],
        offset: usize,
        max_decl: usize,
    ) -> Result<Pipeline, TemplateError> {
        let bare = |i: usize| match tokens.get(i).map(|lexed| &lexed.token) {
            Some(Token::Variable(name, path)) if path.is_empty() => Some(name.clone()),
            _ => None,
        };
        let binding = |i: usize| match tokens.get(i).map(|lexed| &lexed.token) {
            Some(Token::Declare) => Some(false),
            Some(Token::Assign) => Some(true),
            _ => None,
        };

        let (decl, assign, rest) = match (bare(0), binding(1)) {
            (Some(name), Some(assign)) => (vec![name], assign, &tokens[2..]),
            (Some(first), None) if matches!(tokens.get(1).map(|l| &l.token), Some(Token::Comma)) => {
                let (Some(second), Some(assign)) = (bare(2), binding(3)) else {
                    return Err(parse_error(offset, "malformed variable declaration"));
                };
                if max_decl < 2 {
                    return Err(parse_error(offset, "too many declarations"));
                }
                (vec![first, second], assign, &tokens[4..])
            }
            _ => (Vec::new(), false, tokens),
        };

        let mut pos = 0;
        let commands = self.parse_commands(rest, &mut pos, offset, false)?;
        Ok(Pipeline {
            decl,
            assign,
            commands,
        })
    }

    fn parse_commands(
        &self,
        tokens: &[Lexed],
        pos: &mut usize,
        offset: usize,
        nested: bool,
    ) -> Result<Vec<Command>, TemplateError> {
        let mut commands: Vec<Command> = Vec::new();
        loop {
            let mut args = Vec::new();
            while let Some(lexed) = tokens.get(*pos) {
                if matches!(lexed.token, Token::Pipe | Token::RightParen) {
                    break;
                }
                args.push(self.parse_operand(tokens, pos, offset)?);
            }

            let next = tokens.get(*pos).map(|lexed| &lexed.token);
            if args.is_empty() {
                if commands.is_empty() && next.is_none() && !nested {
                    return Ok(commands);
                }
                return Err(parse_error(offset, "missing command in pipeline"));
            }

            match &args[0] {
                Operand::Function(_) => {}
                Operand::Literal(Value::Null) => {
                    return Err(parse_error(offset, "nil is not a command"))
                }
                _ if !commands.is_empty() => {
                    return Err(parse_error(
                        offset,
                        format!("non executable command in pipeline stage {}", commands.len() + 1),
                    ))
                }
                _ if args.len() > 1 => {
                    return Err(parse_error(offset, "can't give argument to non-function"))
                }
                _ => {}
            }
            commands.push(Command { args });

            match next {
                None if nested => return Err(parse_error(offset, "unclosed left paren")),
                None => return Ok(commands),
                Some(Token::RightParen) if nested => return Ok(commands),
                Some(Token::RightParen) => {
                    return Err(parse_error(offset, "unexpected right paren"))
                }
                _ => *pos += 1,
            }
        }
    }

    fn parse_operand(
        &self,
        tokens: &[Lexed],
        pos: &mut usize,
        offset: usize,
    ) -> Result<Operand, TemplateError> {
        let token = &tokens[*pos].token;
        *pos += 1;

        let operand = match token {
            Token::Dot => Operand::Dot,
            Token::Field(path) => Operand::Field(path.clone()),
            Token::Variable(name, path) => {
                self.check_variable(name, offset)?;
                Operand::Variable(name.clone(), path.clone())
            }
            Token::Literal(value) => Operand::Literal(value.clone()),
            Token::Ident(name) if KEYWORDS.contains(&name.as_str()) => {
                return Err(parse_error(offset, format!("unexpected {:?} in operand", name)))
            }
            Token::Ident(name) => {
                if !FUNCTIONS.contains(&name.as_str()) {
                    return Err(parse_error(offset, format!("function {:?} not defined", name)));
                }
                Operand::Function(name.clone())
            }
            Token::LeftParen => {
                let commands = self.parse_commands(tokens, pos, offset, true)?;
                *pos += 1;
                let mut chain = Vec::new();
                while let Some(Lexed {
                    token: Token::Field(path),
                    spaced: false,
                }) = tokens.get(*pos)
                {
                    chain.extend(path.iter().cloned());
                    *pos += 1;
                }
                let pipe = Pipeline {
                    decl: Vec::new(),
                    assign: false,
                    commands,
                };
                Operand::Pipeline(Box::new(pipe), chain)
            }
            other => return Err(parse_error(offset, format!("unexpected {:?} in operand", other))),
        };
        Ok(operand)
    }

    fn check_variable(&self, name: &str, offset: usize) -> Result<(), TemplateError> {
        if self.vars.iter().any(|v| v == name) {
            Ok(())
        } else {
            Err(parse_error(offset, format!("undefined variable {:?}", name)))
        }
    }

    fn declare(&mut self, pipe: &Pipeline, offset: usize) -> Result<(), TemplateError> {
        for name in &pipe.decl {
            if pipe.assign {
                self.check_variable(name, offset)?;
            } else {
                self.vars.push(name.clone());
            }
        }
        Ok(())
    }
}

fn expect_end(rest: &[Lexed], keyword: &str, offset: usize) -> Result<(), TemplateError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(parse_error(
            offset,
            format!("unexpected operand in {{{{{}}}}}", keyword),
        ))
    }
}

// =============================================================================
// Execution
// =============================================================================

/// A value during execution. `map` marks string maps, whose keys are
/// matched exactly.
#[derive(Debug, Clone)]
struct Data {
    value: Value,
    map: bool,
}

impl Data {
    fn new(value: Value) -> Self {
        Self { value, map: false }
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
}

struct Exec {
    vars: Vec<(String, Data)>,
}

impl Exec {
    /// Run `nodes`; variables they declare go out of scope afterwards.
    fn walk(&mut self, nodes: &[Node], dot: &Data, out: &mut String) -> Result<Flow, TemplateError> {
        let mark = self.vars.len();
        let flow = self.walk_nodes(nodes, dot, out);
        self.vars.truncate(mark);
        flow
    }

    fn walk_nodes(
        &mut self,
        nodes: &[Node],
        dot: &Data,
        out: &mut String,
    ) -> Result<Flow, TemplateError> {
        for node in nodes {
            let flow = match node {
                Node::Text(text) => {
                    out.push_str(text);
                    Flow::Normal
                }
                Node::Action { action, pipe } => {
                    let value = self.pipeline(pipe, dot, action)?;
                    if pipe.decl.is_empty() {
                        format_value(&value.value, value.map, NO_VALUE, out);
                    } else {
                        self.set(&pipe.decl[0], value, pipe.assign);
                    }
                    Flow::Normal
                }
                Node::If(branch) | Node::With(branch) => {
                    let mark = self.vars.len();
                    let value = self.pipeline(&branch.pipe, dot, &branch.action)?;
                    let truth = is_true(&value);
                    if let Some(name) = branch.pipe.decl.first() {
                        self.set(name, value.clone(), branch.pipe.assign);
                    }
                    let flow = match (truth, node) {
                        (true, Node::With(_)) => self.walk(&branch.body, &value, out),
                        (true, _) => self.walk(&branch.body, dot, out),
                        (false, _) => self.walk(&branch.otherwise, dot, out),
                    };
                    self.vars.truncate(mark);
                    flow?
                }
                Node::Range(branch) => self.range(branch, dot, out)?,
                Node::Break => Flow::Break,
                Node::Continue => Flow::Continue,
            };
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn range(&mut self, branch: &Branch, dot: &Data, out: &mut String) -> Result<Flow, TemplateError> {
        let value = self.pipeline(&branch.pipe, dot, &branch.action)?;
        let items: Vec<(Value, Value)> = match &value.value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item.clone()))
                .collect(),
            Value::Object(map) if value.map => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|k| (Value::String(k.clone()), map[k.as_str()].clone()))
                    .collect()
            }
            Value::Number(n) if n.as_i64().is_some() => (0..n.as_i64().unwrap_or(0))
                .map(|i| (Value::from(i), Value::from(i)))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(exec_error(
                    &branch.action,
                    format!("range can't iterate over {}", plain(other)),
                ))
            }
        };

        if items.is_empty() {
            return self.walk(&branch.otherwise, dot, out);
        }

        for (key, item) in items {
            let mark = self.vars.len();
            let item = Data::new(item);
            match branch.pipe.decl.as_slice() {
                [elem] => self.set(elem, item.clone(), branch.pipe.assign),
                [index, elem] => {
                    self.set(index, Data::new(key), branch.pipe.assign);
                    self.set(elem, item.clone(), branch.pipe.assign);
                }
                _ => {}
            }
            let flow = self.walk(&branch.body, &item, out);
            self.vars.truncate(mark);
            if let Flow::Break = flow? {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    fn set(&mut self, name: &str, value: Data, assign: bool) {
        if assign {
            if let Some(slot) = self.vars.iter_mut().rev().find(|(n, _)| n == name) {
                slot.1 = value;
                return;
            }
        }
        self.vars.push((name.to_string(), value));
    }

    fn pipeline(&self, pipe: &Pipeline, dot: &Data, action: &str) -> Result<Data, TemplateError> {
        let mut piped: Option<Data> = None;
        for command in &pipe.commands {
            piped = Some(self.command(command, dot, piped, action)?);
        }
        Ok(piped.unwrap_or_else(|| Data::new(Value::Null)))
    }

    fn command(
        &self,
        command: &Command,
        dot: &Data,
        piped: Option<Data>,
        action: &str,
    ) -> Result<Data, TemplateError> {
        match command.args.split_first() {
            Some((Operand::Function(name), args)) => self.call(name, args, piped, dot, action),
            Some((operand, _)) => self.operand(operand, dot, action),
            None => Ok(Data::new(Value::Null)),
        }
    }

    fn operand(&self, operand: &Operand, dot: &Data, action: &str) -> Result<Data, TemplateError> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(path) => fields(dot.clone(), path, action),
            Operand::Variable(name, path) => {
                let value = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| exec_error(action, format!("undefined variable {:?}", name)))?;
                fields(value, path, action)
            }
            Operand::Literal(value) => Ok(Data::new(value.clone())),
            Operand::Function(name) => self.call(name, &[], None, dot, action),
            Operand::Pipeline(pipe, path) => fields(self.pipeline(pipe, dot, action)?, path, action),
        }
    }

    fn call(
        &self,
        name: &str,
        args: &[Operand],
        piped: Option<Data>,
        dot: &Data,
        action: &str,
    ) -> Result<Data, TemplateError> {
        let fail = |message: String| exec_error(action, format!("error calling {}: {}", name, message));

        // `and` and `or` stop evaluating at the deciding argument.
        if name == "and" || name == "or" {
            if args.is_empty() && piped.is_none() {
                return Err(fail("wrong number of args: want at least 1 got 0".into()));
            }
            let decides = name == "or";
            let mut last = Data::new(Value::Null);
            for arg in args {
                last = self.operand(arg, dot, action)?;
                if is_true(&last) == decides {
                    return Ok(last);
                }
            }
            return Ok(piped.unwrap_or(last));
        }

        let mut values = args
            .iter()
            .map(|arg| self.operand(arg, dot, action))
            .collect::<Result<Vec<_>, _>>()?;
        values.extend(piped);

        let arity = |want: usize| {
            if values.len() == want {
                Ok(())
            } else {
                Err(fail(format!(
                    "wrong number of args: want {} got {}",
                    want,
                    values.len()
                )))
            }
        };

        let result = match name {
            "not" => {
                arity(1)?;
                Value::Bool(!is_true(&values[0]))
            }
            "len" => {
                arity(1)?;
                Value::from(length(&values[0]).map_err(fail)?)
            }
            "index" => return index(values).map_err(fail),
            "slice" => slice(values).map_err(fail)?,
            "print" => Value::String(sprint(&values)),
            "println" => Value::String(sprintln(&values)),
            "printf" => {
                let Some((format, rest)) = values.split_first() else {
                    return Err(fail("wrong number of args: want at least 1 got 0".into()));
                };
                let Value::String(format) = &format.value else {
                    return Err(fail(format!(
                        "format must be a string, got {}",
                        go_type(&format.value)
                    )));
                };
                Value::String(sprintf(format, rest))
            }
            "eq" | "ne" => {
                let Some((first, rest)) = values.split_first() else {
                    return Err(fail("missing argument for comparison".into()));
                };
                if rest.is_empty() {
                    return Err(fail("missing argument for comparison".into()));
                }
                let mut equal = false;
                for other in rest {
                    if compare(&first.value, &other.value).map_err(fail)? == Ordering::Equal {
                        equal = true;
                        break;
                    }
                }
                Value::Bool(equal == (name == "eq"))
            }
            "lt" | "le" | "gt" | "ge" => {
                arity(2)?;
                let (a, b) = (&values[0].value, &values[1].value);
                if !matches!(
                    (a, b),
                    (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_))
                ) {
                    return Err(fail("invalid type for comparison".into()));
                }
                let ordering = compare(a, b).map_err(fail)?;
                Value::Bool(match name {
                    "lt" => ordering == Ordering::Less,
                    "le" => ordering != Ordering::Greater,
                    "gt" => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                })
            }
            other => return Err(exec_error(action, format!("function {:?} not defined", other))),
        };
        Ok(Data::new(result))
    }
}

fn fields(mut data: Data, path: &[String], action: &str) -> Result<Data, TemplateError> {
    for name in path {
        data = field(data, name, action)?;
    }
    Ok(data)
}

fn field(data: Data, name: &str, action: &str) -> Result<Data, TemplateError> {
    match data.value {
        Value::Object(mut map) => {
            if data.map {
                return Ok(Data::new(map.remove(name).unwrap_or(Value::Null)));
            }
            let key = if map.contains_key(name) {
                Some(name.to_string())
            } else {
                map.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
            };
            match key.and_then(|k| map.remove(&k).map(|v| (k, v))) {
                Some((key, value)) => {
                    let map = value.is_object()
                        && MAP_FIELDS.iter().any(|f| key.eq_ignore_ascii_case(f));
                    Ok(Data { value, map })
                }
                None => Err(exec_error(action, format!("can't evaluate field {}", name))),
            }
        }
        Value::Null => Ok(Data::new(Value::Null)),
        other => Err(exec_error(
            action,
            format!("can't evaluate field {} in type {}", name, type_name(&other)),
        )),
    }
}

fn is_true(data: &Data) -> bool {
    match &data.value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !data.map || !map.is_empty(),
    }
}

fn length(data: &Data) -> Result<usize, String> {
    match &data.value {
        Value::String(s) => Ok(s.len()),
        Value::Array(items) => Ok(items.len()),
        Value::Object(map) if data.map => Ok(map.len()),
        other => Err(format!("len of type {}", go_type(other))),
    }
}

fn as_index(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("cannot index with non-integer {}", n)),
        other => Err(format!("cannot index with type {}", go_type(other))),
    }
}

fn index(values: Vec<Data>) -> Result<Data, String> {
    let mut values = values.into_iter();
    let mut item = values
        .next()
        .ok_or_else(|| "wrong number of args: want at least 1 got 0".to_string())?;
    for key in values {
        item = match (&item.value, &key.value) {
            (Value::Null, _) => return Err("index of untyped nil".into()),
            (Value::Object(map), Value::String(k)) if item.map => {
                Data::new(map.get(k).cloned().unwrap_or_else(|| Value::String(String::new())))
            }
            (Value::Array(items), k) => {
                let i = as_index(k)?;
                let elem = usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| format!("index out of range: {}", i))?;
                Data::new(elem.clone())
            }
            (Value::String(s), k) => {
                let i = as_index(k)?;
                let byte = usize::try_from(i)
                    .ok()
                    .and_then(|i| s.as_bytes().get(i))
                    .ok_or_else(|| format!("index out of range: {}", i))?;
                Data::new(Value::from(*byte))
            }
            (other, _) => return Err(format!("can't index item of type {}", go_type(other))),
        };
    }
    Ok(item)
}

fn slice(values: Vec<Data>) -> Result<Value, String> {
    let Some((item, bounds)) = values.split_first() else {
        return Err("wrong number of args: want at least 1 got 0".into());
    };
    if bounds.len() > 2 {
        return Err("too many slice indexes".into());
    }
    let len = match &item.value {
        Value::String(s) => s.len(),
        Value::Array(items) => items.len(),
        other => return Err(format!("can't slice item of type {}", go_type(other))),
    };
    let bound = |i: usize, default: usize| -> Result<usize, String> {
        match bounds.get(i) {
            Some(b) => usize::try_from(as_index(&b.value)?)
                .map_err(|_| "negative slice index".to_string()),
            None => Ok(default),
        }
    };
    let (start, end) = (bound(0, 0)?, bound(1, len)?);
    if start > end || end > len {
        return Err(format!("slice index out of range: [{}:{}]", start, end));
    }
    match &item.value {
        Value::String(s) => s
            .get(start..end)
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| "slice splits a character".to_string()),
        Value::Array(items) => Ok(Value::Array(items[start..end].to_vec())),
        _ => Ok(Value::Null),
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, String> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(compare_numbers(x, y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            Err("non-comparable type".into())
        }
        _ => Err("incompatible types for comparison".into()),
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    let as_int = |n: &Number| n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from));
    match (as_int(x), as_int(y)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => {
            let (a, b) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    }
}

// =============================================================================
// Formatting
// =============================================================================

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

/// Type names as `printf` reports them.
fn go_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "<nil>",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float64",
        Value::Number(_) => "int64",
        Value::String(_) => "string",
        Value::Array(_) => "[]interface {}",
        Value::Object(_) => "map[string]interface {}",
    }
}

fn format_value(value: &Value, map: bool, nil: &str, out: &mut String) {
    match value {
        Value::Null => out.push_str(nil),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&format_number(n)),
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                format_value(item, false, nil, out);
            }
            out.push(']');
        }
        Value::Object(entries) if map => {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            out.push_str("map[");
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(key);
                out.push(':');
                format_value(&entries[key.as_str()], false, nil, out);
            }
            out.push(']');
        }
        Value::Object(_) => out.push_str(&value.to_string()),
    }
}

fn plain(value: &Value) -> String {
    let mut out = String::new();
    format_value(value, false, NIL, &mut out);
    out
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        format_float(n.as_f64().unwrap_or(0.0))
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{:.0}", f)
    } else {
        f.to_string()
    }
}

fn sprint(values: &[Data]) -> String {
    let mut out = String::new();
    for (i, data) in values.iter().enumerate() {
        if i > 0 && !data.value.is_string() && !values[i - 1].value.is_string() {
            out.push(' ');
        }
        format_value(&data.value, data.map, NIL, &mut out);
    }
    out
}

fn sprintln(values: &[Data]) -> String {
    let mut out = String::new();
    for (i, data) in values.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        format_value(&data.value, data.map, NIL, &mut out);
    }
    out.push('\n');
    out
}

#[derive(Debug, Default)]
struct Spec {
    minus: bool,
    plus: bool,
    zero: bool,
    space: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

fn digits(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = Some(n.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        chars.next();
    }
    n
}

/// `fmt.Sprintf` for the common verbs: `v s q d x X f F e E g t c`.
fn sprintf(format: &str, args: &[Data]) -> String {
    let mut out = String::new();
    let mut next = 0;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                '0' => spec.zero = true,
                ' ' => spec.space = true,
                '#' => {}
                _ => break,
            }
            chars.next();
        }
        spec.width = digits(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(digits(&mut chars).unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(next) else {
            let _ = write!(out, "%!{}(MISSING)", verb);
            continue;
        };
        next += 1;

        let (text, numeric) = format_verb(verb, &spec, arg);
        out.push_str(&pad(text, &spec, numeric));
    }

    if next < args.len() {
        out.push_str("%!(EXTRA ");
        for (i, arg) in args[next..].iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}={}", go_type(&arg.value), plain(&arg.value));
        }
        out.push(')');
    }
    out
}

fn sign(negative: bool, spec: &Spec) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

/// Go's `%e` exponent form, `1.500000e+00`.
fn exponent(f: f64, precision: usize, upper: bool) -> String {
    let text = format!("{:.*e}", precision, f);
    let (mantissa, exp) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    format!(
        "{}{}{}{:02}",
        mantissa,
        if upper { 'E' } else { 'e' },
        if exp < 0 { '-' } else { '+' },
        exp.abs()
    )
}

/// Format one argument. The flag marks numeric output, which `0` pads.
fn format_verb(verb: char, spec: &Spec, arg: &Data) -> (String, bool) {
    let value = &arg.value;
    let int = match value {
        Value::Number(n) => n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from)),
        _ => None,
    };
    let float = match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    };

    match (verb, value) {
        ('v', _) => {
            let mut text = String::new();
            format_value(value, arg.map, NIL, &mut text);
            (text, value.is_number())
        }
        ('s', Value::String(s)) => {
            let text = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            };
            (text, false)
        }
        ('s', Value::Array(_) | Value::Object(_)) => {
            let mut text = String::new();
            format_value(value, arg.map, NIL, &mut text);
            (text, false)
        }
        ('q', Value::String(_)) => (value.to_string(), false),
        ('d', _) if int.is_some() => {
            let n = int.unwrap_or(0);
            (format!("{}{}", sign(n < 0, spec), n.unsigned_abs()), true)
        }
        ('x' | 'X', _) if int.is_some() => {
            let n = int.unwrap_or(0);
            let hex = if verb == 'x' {
                format!("{:x}", n.unsigned_abs())
            } else {
                format!("{:X}", n.unsigned_abs())
            };
            (format!("{}{}", sign(n < 0, spec), hex), true)
        }
        ('x' | 'X', Value::String(s)) => {
            let mut text = String::new();
            for byte in s.bytes() {
                if verb == 'x' {
                    let _ = write!(text, "{:02x}", byte);
                } else {
                    let _ = write!(text, "{:02X}", byte);
                }
            }
            (text, false)
        }
        ('f' | 'F', _) if value.is_f64() => {
            let f = float.unwrap_or(0.0);
            let text = format!("{:.*}", spec.precision.unwrap_or(6), f.abs());
            (format!("{}{}", sign(f < 0.0, spec), text), true)
        }
        ('e' | 'E', _) if value.is_f64() => {
            let f = float.unwrap_or(0.0);
            let text = exponent(f.abs(), spec.precision.unwrap_or(6), verb == 'E');
            (format!("{}{}", sign(f < 0.0, spec), text), true)
        }
        ('g', _) if value.is_f64() => {
            let f = float.unwrap_or(0.0);
            (format!("{}{}", sign(f < 0.0, spec), format_float(f.abs())), true)
        }
        ('t', Value::Bool(b)) => (b.to_string(), false),
        ('c', _) if int.is_some() => {
            let rune = u32::try_from(int.unwrap_or(0))
                .ok()
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER);
            (rune.to_string(), false)
        }
        (verb, value) => (
            format!("%!{}({}={})", verb, go_type(value), plain(value)),
            false,
        ),
    }
}

fn pad(text: String, spec: &Spec, numeric: bool) -> String {
    let len = text.chars().count();
    let Some(width) = spec.width.filter(|&w| w > len) else {
        return text;
    };
    let fill = width - len;
    if spec.minus {
        format!("{}{}", text, " ".repeat(fill))
    } else if spec.zero && numeric {
        let split = text
            .char_indices()
            .find(|&(_, c)| !matches!(c, '-' | '+' | ' '))
            .map(|(i, _)| i)
            .unwrap_or(0);
        format!("{}{}{}", &text[..split], "0".repeat(fill), &text[split..])
    } else {
        format!("{}{}", " ".repeat(fill), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "ulid": "01ABC",
            "minTime": 0,
            "maxTime": 7200000,
            "stats": {"numSamples": 10, "numSeries": 2},
            "compaction": {"level": 1, "sources": ["01ABC", "01DEF"]},
            "version": 1,
            "labels": {"env": "prod", "region": "eu"},
            "thanos": {"source": "sidecar", "downsample": {"resolution": 0}}
        })
    }

    fn render(template: &str) -> Result<String, TemplateError> {
        Template::parse(template)?.execute(&doc())
    }

    fn parse_message(template: &str) -> String {
        match Template::parse(template) {
            Err(TemplateError::Parse { message, .. }) => message,
            other => panic!("expected parse error for {:?}, got {:?}", template, other),
        }
    }

    mod parse {
        use super::*;

        #[test]
        fn literal_only() {
            assert_eq!(render("no actions").unwrap(), "no actions");
        }

        #[test]
        fn empty_template() {
            assert_eq!(render("").unwrap(), "");
        }

        #[test]
        fn unclosed_action() {
            let err = Template::parse("{{.ULID").unwrap_err();
            assert!(matches!(err, TemplateError::Parse { offset: 0, .. }));
            assert!(err.to_string().contains("unclosed action"));
        }

        #[test]
        fn empty_action() {
            assert!(Template::parse("{{ }}").is_err());
        }

        #[test]
        fn unsupported_action() {
            let message = parse_message(r#"{{template "row" .}}"#);
            assert!(message.contains("unsupported action"));
        }

        #[test]
        fn malformed_path() {
            assert!(Template::parse("{{.A..B}}").is_err());
            assert!(Template::parse("{{.A.}}").is_err());
            assert!(Template::parse("{{.A-B}}").is_err());
        }

        #[test]
        fn unclosed_comment() {
            let err = Template::parse("{{/* never ends }}").unwrap_err();
            assert!(err.to_string().contains("unclosed comment"));
        }

        #[test]
        fn text_after_comment_rejected() {
            assert!(Template::parse("{{/* c */ .ULID}}").is_err());
        }

        #[test]
        fn keeps_source() {
            let tmpl = Template::parse("{{.ULID}}").unwrap();
            assert_eq!(tmpl.source(), "{{.ULID}}");
        }

        #[test]
        fn unclosed_control() {
            assert!(parse_message("{{if .ULID}}x").contains("unexpected EOF"));
            assert!(parse_message("{{range .X}}{{else}}y").contains("unexpected EOF"));
        }

        #[test]
        fn stray_end_and_else() {
            assert!(parse_message("x{{end}}").contains("unexpected {{end}}"));
            assert!(parse_message("x{{else}}").contains("unexpected {{else}}"));
            assert!(parse_message("{{if 1}}{{else}}{{else}}{{end}}").contains("expected {{end}}"));
        }

        #[test]
        fn break_outside_range() {
            assert!(parse_message("{{break}}").contains("outside {{range}}"));
            assert!(parse_message("{{range .X}}{{else}}{{continue}}{{end}}")
                .contains("outside {{range}}"));
        }

        #[test]
        fn undefined_variable() {
            assert!(parse_message("{{$x}}").contains("undefined variable"));
            assert!(parse_message("{{with $x := .ULID}}{{end}}{{$x}}").contains("undefined variable"));
            assert!(parse_message("{{$x = 1}}").contains("undefined variable"));
        }

        #[test]
        fn unknown_function() {
            assert!(parse_message("{{html .ULID}}").contains("function \"html\" not defined"));
        }

        #[test]
        fn arguments_to_non_function() {
            assert!(parse_message("{{.ULID 1}}").contains("non-function"));
            assert!(parse_message("{{.ULID | .MinTime}}").contains("non executable"));
            assert!(parse_message("{{nil}}").contains("nil is not a command"));
        }

        #[test]
        fn parentheses_must_balance() {
            assert!(parse_message("{{(len .ULID}}").contains("unclosed left paren"));
            assert!(parse_message("{{len .ULID)}}").contains("unexpected right paren"));
            assert!(parse_message("{{.ULID | }}").contains("missing command"));
        }

        #[test]
        fn range_allows_two_variables_only() {
            assert!(Template::parse("{{range $i, $e := .X}}{{end}}").is_ok());
            assert!(parse_message("{{with $i, $e := .X}}{{end}}").contains("too many declarations"));
        }

        #[test]
        fn delimiters_inside_strings() {
            assert_eq!(render(r#"{{printf "}}%s{{" .ULID}}"#).unwrap(), "}}01ABC{{");
        }

        #[test]
        fn bad_number() {
            assert!(parse_message("{{printf \"%d\" 12ab}}").contains("bad number syntax"));
        }
    }

    mod execute {
        use super::*;

        #[test]
        fn field_case_insensitive() {
            assert_eq!(render("{{.ULID}}").unwrap(), "01ABC");
            assert_eq!(render("{{.ulid}}").unwrap(), "01ABC");
            assert_eq!(render("{{.MinTime}}-{{.MaxTime}}").unwrap(), "0-7200000");
        }

        #[test]
        fn nested_fields() {
            assert_eq!(render("{{.Stats.NumSamples}}").unwrap(), "10");
            assert_eq!(render("{{.Compaction.Level}}").unwrap(), "1");
            assert_eq!(render("{{.Thanos.Downsample.Resolution}}").unwrap(), "0");
        }

        #[test]
        fn label_lookup() {
            assert_eq!(render("{{.Labels.env}}").unwrap(), "prod");
        }

        #[test]
        fn label_keys_are_case_sensitive() {
            assert_eq!(render("{{.Labels.ENV}}").unwrap(), "<no value>");
            assert_eq!(render("{{.LABELS.env}}").unwrap(), "prod");
            assert_eq!(render(r#"{{index .Labels "Env"}}"#).unwrap(), "");
        }

        #[test]
        fn missing_label_is_no_value() {
            assert_eq!(render("{{.Labels.tenant}}").unwrap(), "<no value>");
        }

        #[test]
        fn missing_field_is_error() {
            let err = render("{{.Nope}}").unwrap_err();
            assert!(matches!(err, TemplateError::Exec { .. }));
            assert!(err.to_string().contains("can't evaluate field Nope"));
        }

        #[test]
        fn field_of_scalar_is_error() {
            let err = render("{{.ULID.Foo}}").unwrap_err();
            assert!(err.to_string().contains("in type string"));
        }

        #[test]
        fn arrays_maps_and_structs() {
            assert_eq!(render("{{.Compaction.Sources}}").unwrap(), "[01ABC 01DEF]");
            assert_eq!(render("{{.Labels}}").unwrap(), "map[env:prod region:eu]");
            assert_eq!(
                render("{{.Stats}}").unwrap(),
                r#"{"numSamples":10,"numSeries":2}"#
            );
        }

        #[test]
        fn dot_is_compact_json() {
            let tmpl = Template::parse("{{.}}").unwrap();
            let out = tmpl.execute(&json!({"a": [1, 2]})).unwrap();
            assert_eq!(out, r#"{"a":[1,2]}"#);
        }

        #[test]
        fn null_is_no_value() {
            let tmpl = Template::parse("{{.a}}").unwrap();
            assert_eq!(tmpl.execute(&json!({"a": null})).unwrap(), "<no value>");
        }

        #[test]
        fn comment_renders_nothing() {
            assert_eq!(render("a{{/* note */}}b").unwrap(), "ab");
        }

        #[test]
        fn trim_markers() {
            assert_eq!(render("x  {{- .ULID -}}  y").unwrap(), "x01ABCy");
            assert_eq!(render("x  {{- .ULID}}  y").unwrap(), "x01ABC  y");
            assert_eq!(render("a \n{{- /* c */ -}}\n b").unwrap(), "ab");
        }

        #[test]
        fn dash_without_space_is_a_number() {
            assert_eq!(render("{{-3}}").unwrap(), "-3");
        }

        #[test]
        fn multiline_template() {
            assert_eq!(
                render("{{.ULID}}\n{{.Labels.region}}").unwrap(),
                "01ABC\neu"
            );
        }
    }

    mod control {
        use super::*;

        #[test]
        fn range_over_sources() {
            assert_eq!(
                render("{{range .Compaction.Sources}}{{.}},{{end}}").unwrap(),
                "01ABC,01DEF,"
            );
        }

        #[test]
        fn range_with_index_and_element() {
            assert_eq!(
                render("{{range $i, $s := .Compaction.Sources}}{{$i}}={{$s}} {{end}}").unwrap(),
                "0=01ABC 1=01DEF "
            );
        }

        #[test]
        fn range_over_labels_is_sorted() {
            assert_eq!(
                render("{{range $k, $v := .Labels}}{{$k}}={{$v}},{{end}}").unwrap(),
                "env=prod,region=eu,"
            );
            assert_eq!(render("{{range .Labels}}{{.}};{{end}}").unwrap(), "prod;eu;");
        }

        #[test]
        fn range_else_on_empty() {
            let tmpl = Template::parse("{{range .Sources}}x{{else}}none{{end}}").unwrap();
            assert_eq!(tmpl.execute(&json!({"sources": []})).unwrap(), "none");
        }

        #[test]
        fn range_over_integer() {
            assert_eq!(render("{{range 3}}{{.}}{{end}}").unwrap(), "012");
        }

        #[test]
        fn range_over_struct_is_error() {
            let err = render("{{range .Stats}}{{end}}").unwrap_err();
            assert!(err.to_string().contains("range can't iterate over"));
        }

        #[test]
        fn break_and_continue() {
            assert_eq!(
                render(r#"{{range .Compaction.Sources}}{{if eq . "01DEF"}}{{break}}{{end}}{{.}}{{end}}"#)
                    .unwrap(),
                "01ABC"
            );
            assert_eq!(
                render(r#"{{range .Compaction.Sources}}{{if eq . "01ABC"}}{{continue}}{{end}}{{.}}{{end}}"#)
                    .unwrap(),
                "01DEF"
            );
        }

        #[test]
        fn if_else_chain() {
            let tmpl = Template::parse(
                "{{if eq .Compaction.Level 1}}fresh{{else if gt .Compaction.Level 3}}old{{else}}mid{{end}}",
            )
            .unwrap();
            let at = |level: u32| json!({"compaction": {"level": level}});
            assert_eq!(tmpl.execute(&at(1)).unwrap(), "fresh");
            assert_eq!(tmpl.execute(&at(2)).unwrap(), "mid");
            assert_eq!(tmpl.execute(&at(5)).unwrap(), "old");
        }

        #[test]
        fn with_sets_dot() {
            assert_eq!(render("{{with .Thanos}}{{.Source}}{{end}}").unwrap(), "sidecar");
            assert_eq!(
                render("{{with .Labels.tenant}}{{.}}{{else}}shared{{end}}").unwrap(),
                "shared"
            );
        }

        #[test]
        fn variables_and_root() {
            assert_eq!(
                render("{{$id := .ULID}}{{range .Compaction.Sources}}{{if ne . $id}}{{.}}{{end}}{{end}}")
                    .unwrap(),
                "01DEF"
            );
            assert_eq!(
                render("{{range .Compaction.Sources}}{{$.ULID}}{{end}}").unwrap(),
                "01ABC01ABC"
            );
        }

        #[test]
        fn assignment_outlives_range_body() {
            assert_eq!(
                render("{{$n := 0}}{{range .Compaction.Sources}}{{$n = len .}}{{end}}{{$n}}").unwrap(),
                "5"
            );
        }

        #[test]
        fn declaration_prints_nothing() {
            assert_eq!(render("{{$x := .ULID}}[{{$x}}]").unwrap(), "[01ABC]");
        }
    }

    mod functions {
        use super::*;

        #[test]
        fn printf_call_and_pipeline() {
            assert_eq!(
                render(r#"{{printf "%s level=%d" .ULID .Compaction.Level}}"#).unwrap(),
                "01ABC level=1"
            );
            assert_eq!(render(r#"{{.ULID | printf "%s!"}}"#).unwrap(), "01ABC!");
        }

        #[test]
        fn printf_width_and_flags() {
            assert_eq!(
                render(r#"{{printf "%-8s|%5d|%05d|%+d" .ULID .Version 42 7}}"#).unwrap(),
                "01ABC   |    1|00042|+7"
            );
            assert_eq!(render(r#"{{printf "%.2f %e" 1.5 1.5}}"#).unwrap(), "1.50 1.500000e+00");
            assert_eq!(render(r#"{{printf "%x %X %q %t" 255 255 .ULID true}}"#).unwrap(), "ff FF \"01ABC\" true");
            assert_eq!(render(r#"{{printf "%v %v" .Compaction.Sources .Labels}}"#).unwrap(), "[01ABC 01DEF] map[env:prod region:eu]");
        }

        #[test]
        fn printf_argument_mismatches() {
            assert_eq!(render(r#"{{printf "%d"}}"#).unwrap(), "%!d(MISSING)");
            assert_eq!(render(r#"{{printf "%d" .ULID}}"#).unwrap(), "%!d(string=01ABC)");
            assert_eq!(render(r#"{{printf "x" 1}}"#).unwrap(), "x%!(EXTRA int64=1)");
            assert_eq!(render(r#"{{printf "100%%"}}"#).unwrap(), "100%");
        }

        #[test]
        fn print_and_println() {
            assert_eq!(render("{{print .ULID 1 2}}").unwrap(), "01ABC1 2");
            assert_eq!(render("{{println .ULID 1}}").unwrap(), "01ABC 1\n");
            assert_eq!(render("{{print nil}}").unwrap(), "<nil>");
        }

        #[test]
        fn len() {
            assert_eq!(render("{{len .Compaction.Sources}}").unwrap(), "2");
            assert_eq!(render("{{.Compaction.Sources | len}}").unwrap(), "2");
            assert_eq!(render("{{len .Labels}}").unwrap(), "2");
            assert_eq!(render("{{len .ULID}}").unwrap(), "5");
            assert!(render("{{len .Version}}").unwrap_err().to_string().contains("len of type"));
        }

        #[test]
        fn index_and_slice() {
            assert_eq!(render("{{index .Compaction.Sources 1}}").unwrap(), "01DEF");
            assert_eq!(render(r#"{{index .Labels "env"}}"#).unwrap(), "prod");
            assert!(render("{{index .Compaction.Sources 5}}")
                .unwrap_err()
                .to_string()
                .contains("index out of range"));
            assert_eq!(render("{{slice .ULID 0 2}}").unwrap(), "01");
            assert_eq!(render("{{slice .Compaction.Sources 1}}").unwrap(), "[01DEF]");
        }

        #[test]
        fn grouping_and_chained_fields() {
            assert_eq!(render("{{(index .Compaction.Sources 0)}}").unwrap(), "01ABC");
            assert_eq!(render("{{(.Thanos).Downsample.Resolution}}").unwrap(), "0");
            assert_eq!(render("{{len (slice .ULID 1)}}").unwrap(), "4");
        }

        #[test]
        fn logic() {
            assert_eq!(
                render("{{if and .Labels.env (not .Labels.tenant)}}ok{{end}}").unwrap(),
                "ok"
            );
            assert_eq!(render(r#"{{or .Labels.tenant "default"}}"#).unwrap(), "default");
            assert_eq!(render("{{and .ULID 0 .Nope}}").unwrap(), "0");
        }

        #[test]
        fn comparisons() {
            assert_eq!(render("{{lt .MinTime .MaxTime}}").unwrap(), "true");
            assert_eq!(render(r#"{{eq .ULID "x" "01ABC"}}"#).unwrap(), "true");
            assert_eq!(render("{{ge .Version 2}}").unwrap(), "false");
            assert!(render("{{eq .ULID 1}}")
                .unwrap_err()
                .to_string()
                .contains("incompatible types"));
            assert!(render("{{lt true false}}")
                .unwrap_err()
                .to_string()
                .contains("invalid type"));
        }

        #[test]
        fn wrong_arity() {
            assert!(render("{{not 1 2}}")
                .unwrap_err()
                .to_string()
                .contains("wrong number of args"));
        }
    }
}
