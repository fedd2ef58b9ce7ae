use effects::normalize_id;
use engine::{ParamValue, Params, RESERVED_BINDINGS};

use crate::ChainError;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    pub effect: String,
    pub params: Params,
    /// 1-based source line the step was read from.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChainProgram {
    steps: Vec<ChainStep>,
}

impl ChainProgram {
    pub fn parse(source: &str) -> Result<Self, ChainError> {
        let mut steps = Vec::new();
        let mut lines = 0;
        for (index, text) in source.lines().enumerate() {
            lines = index + 1;
            if let Some(step) = parse_line(text, index + 1)? {
                steps.push(step);
            }
        }

        if steps.is_empty() {
            return Err(ChainError::Parse {
                line: lines.max(1),
                column: 1,
                message: "chain has no steps".to_string(),
            });
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Parses a single `key=value` parameter as given on the command line. Values
/// follow the chain file rules, except that unquoted values may contain
/// spaces.
pub fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    check_key(key)?;

    let value = if value.starts_with('"') {
        let mut cursor = LineCursor::new(value);
        let text = read_quoted(&mut cursor).map_err(|(_, message)| message)?;
        if cursor.peek().is_some() {
            return Err(format!("unexpected text after closing quote in '{raw}'"));
        }
        ParamValue::Str(text)
    } else {
        ParamValue::parse_literal(value)
    };
    Ok((key.to_string(), value))
}

/// Column plus message; the caller attaches the line.
type Located = (usize, String);

fn parse_line(text: &str, line: usize) -> Result<Option<ChainStep>, ChainError> {
    let located = |(column, message): Located| ChainError::Parse {
        line,
        column,
        message,
    };

    let mut cursor = LineCursor::new(text);
    cursor.skip_whitespace();
    if cursor.at_line_end() {
        return Ok(None);
    }

    let column = cursor.column();
    let raw_id = cursor.take_while(|c| !is_delimiter(c));
    let effect = normalize_id(&raw_id)
        .map_err(|_| located((column, format!("invalid effect id '{raw_id}'"))))?;

    let mut params = Params::new();
    loop {
        cursor.skip_whitespace();
        if cursor.at_line_end() {
            break;
        }
        let (key, value) = parse_assignment(&mut cursor, &params).map_err(located)?;
        params.insert(key, value);
    }

    Ok(Some(ChainStep {
        effect,
        params,
        line,
    }))
}

fn parse_assignment(cursor: &mut LineCursor, seen: &Params) -> Result<(String, ParamValue), Located> {
    let key_column = cursor.column();
    let key = cursor.take_while(|c| c != '=' && !is_delimiter(c));
    check_key(&key).map_err(|message| (key_column, message))?;
    if seen.contains_key(&key) {
        return Err((key_column, format!("duplicate parameter '{key}'")));
    }
    if cursor.peek() != Some('=') {
        return Err((cursor.column(), format!("expected '=' after parameter '{key}'")));
    }
    cursor.bump();

    let value_column = cursor.column();
    let value = if cursor.peek() == Some('"') {
        let text = read_quoted(cursor)?;
        if !cursor.at_delimiter() {
            return Err((cursor.column(), "unexpected character after closing quote".to_string()));
        }
        ParamValue::Str(text)
    } else {
        let raw = cursor.take_while(|c| !is_delimiter(c));
        if raw.is_empty() {
            return Err((value_column, format!("missing value for parameter '{key}'")));
        }
        ParamValue::parse_literal(&raw)
    };
    Ok((key, value))
}

fn read_quoted(cursor: &mut LineCursor) -> Result<String, Located> {
    let open = cursor.column();
    cursor.bump();
    let mut text = String::new();
    loop {
        match cursor.bump() {
            None => return Err((open, "unterminated string".to_string())),
            Some('"') => return Ok(text),
            Some('\\') => {
                let escape_column = cursor.column() - 1;
                match cursor.bump() {
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(other) => {
                        return Err((escape_column, format!("unknown escape '\\{other}'")))
                    }
                    None => return Err((open, "unterminated string".to_string())),
                }
            }
            Some(c) => text.push(c),
        }
    }
}

fn check_key(key: &str) -> Result<(), String> {
    let mut chars = key.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => return Err("expected a parameter name".to_string()),
    };
    if !valid {
        return Err(format!("invalid parameter name '{key}'"));
    }
    if RESERVED_BINDINGS.contains(&key) {
        return Err(format!("parameter name '{key}' is reserved"));
    }
    Ok(())
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c == '#'
}

struct LineCursor {
    chars: Vec<char>,
    pos: usize,
}

impl LineCursor {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// 1-based column of the next character.
    fn column(&self) -> usize {
        self.pos + 1
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// End of input or the start of a comment.
    fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some('#'))
    }

    fn at_delimiter(&self) -> bool {
        self.peek().map_or(true, is_delimiter)
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}
