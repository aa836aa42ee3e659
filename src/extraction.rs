//! Path expressions for pulling values out of nested notifications.
//!
//! A [`FieldPath`] is compiled once from a JSONPath-style expression and then
//! evaluated against any number of notification bodies. Evaluation never
//! fails: absent branches simply produce no matches.
//!
//! Supported syntax:
//!
//! - `payload.instance_id` - dotted field access (optional leading `$`)
//! - `payload.*`, `payload.items[*]` - every value of a mapping or sequence
//! - `payload.items[0]`, `payload.items.[0]` - sequence index
//! - `payload..host` - `host` at any depth below `payload`
//! - `'odd key'` / `"odd key"` - quoted field names
//! - `(payload.a)|(payload.b)` - alternation, matches concatenated left to right

use std::fmt;

use serde_json::Value;

use crate::error::PathSyntaxError;

/// A compiled path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw expression string
    pub raw: String,
    /// One segment chain per alternative, in declaration order
    pub alternatives: Vec<Vec<PathSegment>>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field (e.g., "payload", "tenant_id")
    Field(String),
    /// A sequence index (e.g., [0], [5])
    Index(usize),
    /// Every child of a mapping or sequence
    Wildcard,
    /// A named field at any depth below the current node
    Descendant(String),
}

/// One value found by evaluating a [`FieldPath`].
#[derive(Debug, Clone, PartialEq)]
pub struct PathMatch {
    /// Dotted locator of the value, e.g. `payload.items.[0].name`
    pub path: String,
    pub value: Value,
}

impl PathMatch {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

impl FieldPath {
    /// Compile a path expression.
    ///
    /// # Example
    ///
    /// ```
    /// use distiller::FieldPath;
    ///
    /// let path = FieldPath::parse("payload.image_meta.disk_gb").unwrap();
    /// assert_eq!(path.alternatives[0].len(), 3);
    /// ```
    pub fn parse(path: &str) -> Result<Self, PathSyntaxError> {
        let mut parser = PathParser::new(path);
        let alternatives = parser.parse()?;

        Ok(Self {
            raw: path.to_string(),
            alternatives,
        })
    }

    /// Compile a list of paths into one alternation.
    ///
    /// A single-element list compiles exactly like that element; longer
    /// lists become `(a)|(b)|...`, keeping the list order as precedence.
    pub fn from_list<S: AsRef<str>>(paths: &[S]) -> Result<Self, PathSyntaxError> {
        match paths {
            [] => Err(PathSyntaxError {
                path: String::new(),
                position: 0,
                reason: "empty list of paths".to_string(),
            }),
            [single] => Self::parse(single.as_ref()),
            many => {
                let joined = many
                    .iter()
                    .map(|p| format!("({})", p.as_ref()))
                    .collect::<Vec<_>>()
                    .join("|");
                Self::parse(&joined)
            }
        }
    }

    /// Evaluate the path against a notification body.
    ///
    /// Matches whose value is `null` are skipped.
    pub fn find(&self, body: &Value) -> Vec<PathMatch> {
        let mut matches = Vec::new();
        let mut locator = Vec::new();
        for segments in &self.alternatives {
            walk(segments, body, &mut locator, &mut matches);
        }
        matches
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn walk(
    segments: &[PathSegment],
    node: &Value,
    locator: &mut Vec<String>,
    out: &mut Vec<PathMatch>,
) {
    let Some((segment, rest)) = segments.split_first() else {
        if !node.is_null() {
            out.push(PathMatch::new(locator.join("."), node.clone()));
        }
        return;
    };

    match segment {
        PathSegment::Field(name) => {
            if let Some(child) = node.as_object().and_then(|map| map.get(name)) {
                locator.push(name.clone());
                walk(rest, child, locator, out);
                locator.pop();
            }
        }
        PathSegment::Index(index) => {
            if let Some(child) = node.as_array().and_then(|items| items.get(*index)) {
                locator.push(format!("[{}]", index));
                walk(rest, child, locator, out);
                locator.pop();
            }
        }
        PathSegment::Wildcard => match node {
            Value::Object(map) => {
                for (key, child) in map {
                    locator.push(key.clone());
                    walk(rest, child, locator, out);
                    locator.pop();
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    locator.push(format!("[{}]", index));
                    walk(rest, child, locator, out);
                    locator.pop();
                }
            }
            _ => {}
        },
        PathSegment::Descendant(name) => descend(name, rest, node, locator, out),
    }
}

fn descend(
    name: &str,
    rest: &[PathSegment],
    node: &Value,
    locator: &mut Vec<String>,
    out: &mut Vec<PathMatch>,
) {
    match node {
        Value::Object(map) => {
            if let Some(child) = map.get(name) {
                locator.push(name.to_string());
                walk(rest, child, locator, out);
                locator.pop();
            }
            for (key, child) in map {
                locator.push(key.clone());
                descend(name, rest, child, locator, out);
                locator.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                locator.push(format!("[{}]", index));
                descend(name, rest, child, locator, out);
                locator.pop();
            }
        }
        _ => {}
    }
}

/// Recursive-descent parser for path expressions.
///
/// ```text
/// union := term ('|' term)*
/// term  := '(' union ')' | chain
/// chain := ['$'] step (('.' step) | ('..' name) | bracket)*
/// step  := name | '*' | bracket
/// ```
struct PathParser<'a> {
    raw: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            chars: raw.chars().collect(),
            pos: 0,
        }
    }

    fn parse(&mut self) -> Result<Vec<Vec<PathSegment>>, PathSyntaxError> {
        self.skip_ws();
        if self.peek().is_none() {
            return Err(self.error("empty path expression"));
        }
        let alternatives = self.parse_union()?;
        self.skip_ws();
        match self.peek() {
            None => Ok(alternatives),
            Some(c) => Err(self.error(format!("unexpected character '{}'", c))),
        }
    }

    fn parse_union(&mut self) -> Result<Vec<Vec<PathSegment>>, PathSyntaxError> {
        let mut alternatives = self.parse_term()?;
        loop {
            self.skip_ws();
            if self.peek() != Some('|') {
                return Ok(alternatives);
            }
            self.pos += 1;
            alternatives.extend(self.parse_term()?);
        }
    }

    fn parse_term(&mut self) -> Result<Vec<Vec<PathSegment>>, PathSyntaxError> {
        self.skip_ws();
        if self.peek() == Some('(') {
            self.pos += 1;
            let inner = self.parse_union()?;
            self.skip_ws();
            if self.peek() != Some(')') {
                return Err(self.error("expected ')'"));
            }
            self.pos += 1;
            return Ok(inner);
        }
        Ok(vec![self.parse_chain()?])
    }

    fn parse_chain(&mut self) -> Result<Vec<PathSegment>, PathSyntaxError> {
        let mut segments = Vec::new();

        if self.peek() == Some('$') {
            self.pos += 1;
            match self.peek() {
                Some('.') if self.peek_at(1) != Some('.') => self.pos += 1,
                Some('.') | Some('[') => {}
                _ => return Ok(segments),
            }
            if self.peek() != Some('.') {
                self.parse_step(&mut segments)?;
            }
        } else {
            self.parse_step(&mut segments)?;
        }

        loop {
            match self.peek() {
                Some('.') if self.peek_at(1) == Some('.') => {
                    self.pos += 2;
                    let name = self.parse_name()?;
                    segments.push(PathSegment::Descendant(name));
                }
                Some('.') => {
                    self.pos += 1;
                    self.parse_step(&mut segments)?;
                }
                Some('[') => self.parse_bracket(&mut segments)?,
                _ => return Ok(segments),
            }
        }
    }

    fn parse_step(&mut self, segments: &mut Vec<PathSegment>) -> Result<(), PathSyntaxError> {
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                segments.push(PathSegment::Wildcard);
                Ok(())
            }
            Some('[') => self.parse_bracket(segments),
            _ => {
                let name = self.parse_name()?;
                segments.push(PathSegment::Field(name));
                Ok(())
            }
        }
    }

    fn parse_bracket(&mut self, segments: &mut Vec<PathSegment>) -> Result<(), PathSyntaxError> {
        // consume '['
        self.pos += 1;
        let segment = if self.peek() == Some('*') {
            self.pos += 1;
            PathSegment::Wildcard
        } else {
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
            if start == self.pos {
                return Err(self.error("expected index or '*' inside brackets"));
            }
            let digits: String = self.chars[start..self.pos].iter().collect();
            let index = digits
                .parse::<usize>()
                .map_err(|e| self.error(format!("invalid index '{}': {}", digits, e)))?;
            PathSegment::Index(index)
        };
        if self.peek() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        self.pos += 1;
        segments.push(segment);
        Ok(())
    }

    fn parse_name(&mut self) -> Result<String, PathSyntaxError> {
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unterminated quoted field name"));
                }
                let name: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(name)
            }
            _ => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if is_name_char(c)) {
                    self.pos += 1;
                }
                if start == self.pos {
                    return Err(match self.peek() {
                        Some(c) => self.error(format!("expected field name, found '{}'", c)),
                        None => self.error("expected field name, found end of expression"),
                    });
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, reason: impl Into<String>) -> PathSyntaxError {
        PathSyntaxError {
            path: self.raw.to_string(),
            position: self.pos,
            reason: reason.into(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '@')
}
