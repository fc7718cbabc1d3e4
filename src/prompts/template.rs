//! Minimal logic-light template engine for prompt text.
//!
//! Supported tags:
//!
//! ```text
//! {{skill.competence}}              interpolate a string, number or bool
//! {{#each samples}}- {{this}}{{/each}}
//! {{#if style}}...{{else}}...{{/if}}
//! {{@index}}                        1-based position inside #each
//! ```
//!
//! Templates are compiled once; rendering takes any `Serialize` view and never
//! substitutes empty text for a field that is not there.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template syntax error in {template} (line {line}): {message}")]
    Syntax {
        template: String,
        line: usize,
        message: String,
    },

    #[error("cannot render {template}: `{field}` {reason}")]
    Render {
        template: String,
        field: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var(String),
    Each {
        path: String,
        body: Vec<Node>,
    },
    If {
        path: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(name: &str, source: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize(name, source)?;
        let mut parser = Parser {
            name,
            tokens,
            pos: 0,
        };
        let (nodes, stop) = parser.parse_nodes()?;
        match stop {
            Stop::Eof => Ok(Self {
                name: name.to_string(),
                nodes,
            }),
            Stop::Close(kind, line) => Err(syntax(name, line, format!("unexpected {{{{/{kind}}}}}"))),
            Stop::Else(line) => Err(syntax(name, line, "unexpected {{else}}")),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render<T: Serialize + ?Sized>(&self, data: &T) -> Result<String, TemplateError> {
        let value = serde_json::to_value(data).map_err(|e| TemplateError::Render {
            template: self.name.clone(),
            field: "<root>".to_string(),
            reason: format!("could not be serialized: {e}"),
        })?;
        self.render_value(&value)
    }

    pub fn render_value(&self, data: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        let mut scopes = vec![Scope {
            value: data,
            index: None,
        }];
        self.render_nodes(&self.nodes, &mut scopes, &mut out)?;
        Ok(out)
    }

    fn render_nodes<'v>(
        &self,
        nodes: &[Node],
        scopes: &mut Vec<Scope<'v>>,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Var(path) if path == "@index" => {
                    let index = scopes
                        .iter()
                        .rev()
                        .find_map(|s| s.index)
                        .ok_or_else(|| self.render_err(path, "is only available inside #each"))?;
                    out.push_str(&(index + 1).to_string());
                }
                Node::Var(path) => match self.lookup(path, scopes)? {
                    Value::String(s) => out.push_str(s),
                    Value::Number(n) => out.push_str(&n.to_string()),
                    Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
                    Value::Null => return Err(self.render_err(path, "is null")),
                    _ => return Err(self.render_err(path, "is not a scalar value")),
                },
                Node::Each { path, body } => {
                    let items = match self.lookup(path, scopes)? {
                        Value::Array(items) => items,
                        _ => return Err(self.render_err(path, "is not a list")),
                    };
                    for (index, item) in items.iter().enumerate() {
                        scopes.push(Scope {
                            value: item,
                            index: Some(index),
                        });
                        let result = self.render_nodes(body, scopes, out);
                        scopes.pop();
                        result?;
                    }
                }
                Node::If {
                    path,
                    then,
                    otherwise,
                } => {
                    let branch = if truthy(self.lookup(path, scopes)?) {
                        then
                    } else {
                        otherwise
                    };
                    self.render_nodes(branch, scopes, out)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve a dotted path. The first segment is searched from the innermost
    /// scope outwards; the remaining segments must exist under it.
    fn lookup<'v>(&self, path: &str, scopes: &[Scope<'v>]) -> Result<&'v Value, TemplateError> {
        let mut segments = path.split('.');
        let head = segments.next().unwrap_or_default();

        let root = if head == "this" {
            scopes.last().map(|s| s.value)
        } else {
            scopes
                .iter()
                .rev()
                .find_map(|s| s.value.as_object().and_then(|o| o.get(head)))
        };

        let mut current = root.ok_or_else(|| self.render_err(path, "is not present in the template data"))?;
        for segment in segments {
            current = current
                .as_object()
                .and_then(|o| o.get(segment))
                .ok_or_else(|| self.render_err(path, "is not present in the template data"))?;
        }
        Ok(current)
    }

    fn render_err(&self, field: &str, reason: &str) -> TemplateError {
        TemplateError::Render {
            template: self.name.clone(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

struct Scope<'v> {
    value: &'v Value,
    index: Option<usize>,
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Number(_) | Value::Object(_) => true,
    }
}

fn syntax(name: &str, line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        template: name.to_string(),
        line,
        message: message.into(),
    }
}

// ----------------------------------------------------------------------------
// Tokenizer
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum Token {
    /// Byte range into the source. Ranges shrink when a standalone block tag
    /// swallows its line.
    Text { start: usize, end: usize, text: String },
    Tag { body: String, line: usize },
}

fn tokenize(name: &str, source: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut line = 1;

    while let Some(offset) = source[pos..].find("{{") {
        let open = pos + offset;
        if open > pos {
            tokens.push(Token::Text {
                start: pos,
                end: open,
                text: String::new(),
            });
        }
        line += source[pos..open].matches('\n').count();

        let inner_start = open + 2;
        let close = source[inner_start..]
            .find("}}")
            .map(|o| inner_start + o)
            .ok_or_else(|| syntax(name, line, "unterminated tag, missing `}}`"))?;
        let body = source[inner_start..close].trim();
        if body.is_empty() {
            return Err(syntax(name, line, "empty tag"));
        }
        if body.contains("{{") {
            return Err(syntax(name, line, "nested `{{` inside tag"));
        }
        tokens.push(Token::Tag {
            body: body.to_string(),
            line,
        });
        line += source[open..close].matches('\n').count();
        pos = close + 2;
    }
    if pos < source.len() {
        tokens.push(Token::Text {
            start: pos,
            end: source.len(),
            text: String::new(),
        });
    }

    strip_standalone_lines(source, &mut tokens);

    for token in &mut tokens {
        if let Token::Text { start, end, text } = token {
            *text = source[*start..(*end).max(*start)].to_string();
        }
    }
    Ok(tokens)
}

fn is_block_tag(body: &str) -> bool {
    body.starts_with('#') || body.starts_with('/') || body == "else"
}

/// A block tag that is alone on its line removes that whole line, so
/// templates can put `{{#each}}` and friends on their own lines without
/// leaving blank lines in the output.
fn strip_standalone_lines(source: &str, tokens: &mut [Token]) {
    for i in 0..tokens.len() {
        let Token::Tag { body, .. } = &tokens[i] else {
            continue;
        };
        if !is_block_tag(body) {
            continue;
        }

        // Where the previous line break ends, if the tag starts its line.
        let before = match i.checked_sub(1).map(|p| &tokens[p]) {
            None => Some(None),
            Some(Token::Text { start, end, .. }) => {
                let original = &source[*start..*end];
                match original.rfind('\n') {
                    Some(nl) if original[nl + 1..].trim().is_empty() => Some(Some(start + nl + 1)),
                    None if i == 1 && original.trim().is_empty() => Some(Some(*start)),
                    _ => None,
                }
            }
            Some(Token::Tag { .. }) => None,
        };
        let Some(before) = before else { continue };

        // Where the current line ends, if nothing but whitespace follows the tag.
        let after = match tokens.get(i + 1) {
            None => Some(None),
            Some(Token::Text { start, end, .. }) => {
                let original = &source[*start..*end];
                match original.find('\n') {
                    Some(nl) if original[..nl].trim().is_empty() => Some(Some(start + nl + 1)),
                    None if i + 2 == tokens.len() && original.trim().is_empty() => Some(Some(*end)),
                    _ => None,
                }
            }
            Some(Token::Tag { .. }) => None,
        };
        let Some(after) = after else { continue };

        if let Some(cut) = before {
            if let Token::Text { end, .. } = &mut tokens[i - 1] {
                *end = (*end).min(cut);
            }
        }
        if let Some(cut) = after {
            if let Token::Text { start, .. } = &mut tokens[i + 1] {
                *start = (*start).max(cut);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Parser
// ----------------------------------------------------------------------------

enum Stop {
    Eof,
    Else(usize),
    Close(String, usize),
}

struct Parser<'a> {
    name: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn parse_nodes(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();

        while self.pos < self.tokens.len() {
            let index = self.pos;
            self.pos += 1;

            let (body, line) = match &self.tokens[index] {
                Token::Text { text, .. } => {
                    if !text.is_empty() {
                        nodes.push(Node::Text(text.clone()));
                    }
                    continue;
                }
                Token::Tag { body, line } => (body.clone(), *line),
            };

            if body == "else" {
                return Ok((nodes, Stop::Else(line)));
            }
            if let Some(kind) = body.strip_prefix('/') {
                let kind = kind.trim();
                if kind != "each" && kind != "if" {
                    return Err(syntax(self.name, line, format!("unknown closing tag `/{kind}`")));
                }
                return Ok((nodes, Stop::Close(kind.to_string(), line)));
            }
            if let Some(rest) = body.strip_prefix('#') {
                let (keyword, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let path = self.path(arg.trim(), line)?;
                match keyword {
                    "each" => {
                        let (inner, stop) = self.parse_nodes()?;
                        self.expect_close("each", line, stop)?;
                        nodes.push(Node::Each { path, body: inner });
                    }
                    "if" => {
                        let (then, stop) = self.parse_nodes()?;
                        let otherwise = match stop {
                            Stop::Else(_) => {
                                let (otherwise, stop) = self.parse_nodes()?;
                                self.expect_close("if", line, stop)?;
                                otherwise
                            }
                            other => {
                                self.expect_close("if", line, other)?;
                                Vec::new()
                            }
                        };
                        nodes.push(Node::If {
                            path,
                            then,
                            otherwise,
                        });
                    }
                    other => {
                        return Err(syntax(self.name, line, format!("unknown block `#{other}`")));
                    }
                }
                continue;
            }

            let path = self.path(&body, line)?;
            nodes.push(Node::Var(path));
        }

        Ok((nodes, Stop::Eof))
    }

    fn expect_close(&self, kind: &str, opened: usize, stop: Stop) -> Result<(), TemplateError> {
        match stop {
            Stop::Close(found, _) if found == kind => Ok(()),
            Stop::Close(found, line) => Err(syntax(
                self.name,
                line,
                format!("expected {{{{/{kind}}}}} for block opened on line {opened}, found {{{{/{found}}}}}"),
            )),
            Stop::Else(line) => Err(syntax(
                self.name,
                line,
                format!("{{{{else}}}} is not allowed inside #{kind}"),
            )),
            Stop::Eof => Err(syntax(
                self.name,
                opened,
                format!("unclosed #{kind} block"),
            )),
        }
    }

    fn path(&self, raw: &str, line: usize) -> Result<String, TemplateError> {
        if raw.is_empty() {
            return Err(syntax(self.name, line, "missing field name"));
        }
        if raw == "@index" {
            return Ok(raw.to_string());
        }
        let valid = raw.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
        if !valid {
            return Err(syntax(self.name, line, format!("invalid field reference `{raw}`")));
        }
        Ok(raw.to_string())
    }
}
