//! Query parameter shapes and the binder that attaches them to statements.
//!
//! # Invariants
//! - Positional element `i` binds to placeholder `i + 1`.
//! - Integer keys bind by placeholder index; string keys bind by name.
//! - `ParamKey::Other` keys are skipped and never raise.
//! - Property fields with no matching placeholder are skipped.
//! - A statement with an unbound placeholder is never executed.

use crate::repo::error::{RepoError, RepoResult};
use log::debug;
use rusqlite::types::Value;
use rusqlite::Statement;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

const NAME_SIGILS: [char; 4] = [':', '@', '$', '?'];

/// Key of one entry in a [`QueryParams::Keyed`] map.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKey {
    /// One-based placeholder index.
    Index(usize),
    /// Placeholder name, with or without its sigil.
    Name(String),
    /// Any other key. Ignored during binding.
    Other(Value),
}

impl From<usize> for ParamKey {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl From<&str> for ParamKey {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for ParamKey {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

/// Named fields bound by exact placeholder-name match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    fields: Vec<(String, Value)>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name`, replacing an earlier value for the same field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builds a bag from the top-level fields of a serializable struct or map.
    ///
    /// Nested arrays and objects are bound as their JSON text.
    pub fn from_serialize<S: Serialize + ?Sized>(source: &S) -> RepoResult<Self> {
        let json = serde_json::to_value(source)
            .map_err(|err| RepoError::Properties(err.to_string()))?;
        let JsonValue::Object(map) = json else {
            return Err(RepoError::Properties(format!(
                "expected a struct or map, got `{json}`"
            )));
        };

        let fields = map
            .into_iter()
            .map(|(name, value)| (name, json_to_sql(value)))
            .collect();
        Ok(Self { fields })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parameters for one query call, tagged by binding style.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryParams {
    #[default]
    None,
    Positional(Vec<Value>),
    Indexed(BTreeMap<usize, Value>),
    Named(BTreeMap<String, Value>),
    /// Mixed map whose key kind decides the binding style per entry.
    Keyed(Vec<(ParamKey, Value)>),
    Properties(PropertyBag),
}

impl QueryParams {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn indexed<I, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (usize, V)>,
        V: Into<Value>,
    {
        Self::Indexed(
            entries
                .into_iter()
                .map(|(index, value)| (index, value.into()))
                .collect(),
        )
    }

    pub fn named<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Named(
            entries
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    pub fn keyed<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParamKey>,
        V: Into<Value>,
    {
        Self::Keyed(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn properties<S: Serialize + ?Sized>(source: &S) -> RepoResult<Self> {
        PropertyBag::from_serialize(source).map(Self::Properties)
    }

    /// Number of supplied values, used for log metadata.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(values) => values.len(),
            Self::Indexed(map) => map.len(),
            Self::Named(map) => map.len(),
            Self::Keyed(entries) => entries.len(),
            Self::Properties(bag) => bag.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<PropertyBag> for QueryParams {
    fn from(value: PropertyBag) -> Self {
        Self::Properties(value)
    }
}

/// Placeholder indexes that received a value.
#[derive(Debug, Default)]
pub(crate) struct Binding {
    bound: BTreeSet<usize>,
}

impl Binding {
    /// Fails when any placeholder the statement references is still unbound.
    ///
    /// Unnamed indexes are either bare `?` placeholders or gaps left between
    /// `?NNN` placeholders. Only the former are read, so `sql` is scanned to
    /// tell them apart.
    pub(crate) fn ensure_complete(&self, stmt: &Statement<'_>, sql: &str) -> RepoResult<()> {
        let anonymous = anonymous_placeholders(sql);
        for index in 1..=stmt.parameter_count() {
            if self.bound.contains(&index) {
                continue;
            }
            match stmt.parameter_name(index) {
                Some(name) => return Err(RepoError::UnboundParameter(name.to_string())),
                None if anonymous.contains(&index) => {
                    return Err(RepoError::UnboundParameter(format!("?{index}")))
                }
                None => continue,
            }
        }
        Ok(())
    }
}

/// Indexes SQLite assigns to bare `?` placeholders in `sql`.
///
/// Follows SQLite's numbering: `?NNN` raises the high-water mark, a new name
/// or a bare `?` takes the next index, and a repeated name reuses its own.
/// Literals, quoted identifiers and comments are skipped.
fn anonymous_placeholders(sql: &str) -> BTreeSet<usize> {
    let chars: Vec<char> = sql.chars().collect();
    let mut anonymous = BTreeSet::new();
    let mut names: BTreeMap<String, usize> = BTreeMap::new();
    let mut highest = 0usize;
    let mut pos = 0;

    while pos < chars.len() {
        match chars[pos] {
            quote @ ('\'' | '"' | '`') => pos = skip_past(&chars, pos + 1, quote),
            '[' => pos = skip_past(&chars, pos + 1, ']'),
            '-' if chars.get(pos + 1) == Some(&'-') => {
                pos = skip_past(&chars, pos + 2, '\n');
            }
            '/' if chars.get(pos + 1) == Some(&'*') => {
                pos += 2;
                while pos < chars.len() && !(chars[pos] == '*' && chars.get(pos + 1) == Some(&'/')) {
                    pos += 1;
                }
                pos += 2;
            }
            '?' => {
                let start = pos + 1;
                pos = start;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                if pos == start {
                    highest += 1;
                    anonymous.insert(highest);
                } else {
                    let digits: String = chars[start..pos].iter().collect();
                    if let Ok(number) = digits.parse::<usize>() {
                        highest = highest.max(number);
                    }
                }
            }
            sigil @ (':' | '@' | '$') => {
                let start = pos + 1;
                pos = start;
                while pos < chars.len() && is_name_char(chars[pos]) {
                    pos += 1;
                }
                if pos > start {
                    let name: String = std::iter::once(sigil)
                        .chain(chars[start..pos].iter().copied())
                        .collect();
                    names.entry(name).or_insert_with(|| {
                        highest += 1;
                        highest
                    });
                }
            }
            _ => pos += 1,
        }
    }
    anonymous
}

/// Position just after the next `close` at or after `from`.
fn skip_past(chars: &[char], from: usize, close: char) -> usize {
    chars[from.min(chars.len())..]
        .iter()
        .position(|c| *c == close)
        .map_or(chars.len(), |offset| from + offset + 1)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

/// Binds `params` onto a freshly prepared statement.
pub(crate) fn bind(stmt: &mut Statement<'_>, params: &QueryParams) -> rusqlite::Result<Binding> {
    let mut binding = Binding::default();
    match params {
        QueryParams::None => {}
        QueryParams::Positional(values) => {
            for (position, value) in values.iter().enumerate() {
                bind_index(stmt, &mut binding, position + 1, value)?;
            }
        }
        QueryParams::Indexed(map) => {
            for (index, value) in map {
                bind_index(stmt, &mut binding, *index, value)?;
            }
        }
        QueryParams::Named(map) => {
            for (name, value) in map {
                bind_required_name(stmt, &mut binding, name, value)?;
            }
        }
        QueryParams::Keyed(entries) => {
            for (key, value) in entries {
                match key {
                    ParamKey::Index(index) => bind_index(stmt, &mut binding, *index, value)?,
                    ParamKey::Name(name) => bind_required_name(stmt, &mut binding, name, value)?,
                    ParamKey::Other(key) => {
                        debug!(
                            "event=param_skip module=repo reason=unsupported_key key_type={}",
                            key.data_type()
                        );
                    }
                }
            }
        }
        QueryParams::Properties(bag) => {
            for (name, value) in bag.fields() {
                if let Some(index) = resolve_name(stmt, name)? {
                    bind_index(stmt, &mut binding, index, value)?;
                }
            }
        }
    }
    Ok(binding)
}

fn bind_index(
    stmt: &mut Statement<'_>,
    binding: &mut Binding,
    index: usize,
    value: &Value,
) -> rusqlite::Result<()> {
    stmt.raw_bind_parameter(index, value)?;
    binding.bound.insert(index);
    Ok(())
}

fn bind_required_name(
    stmt: &mut Statement<'_>,
    binding: &mut Binding,
    name: &str,
    value: &Value,
) -> rusqlite::Result<()> {
    let index = resolve_name(stmt, name)?
        .ok_or_else(|| rusqlite::Error::InvalidParameterName(name.to_string()))?;
    bind_index(stmt, binding, index, value)
}

fn resolve_name(stmt: &Statement<'_>, name: &str) -> rusqlite::Result<Option<usize>> {
    if name.starts_with(NAME_SIGILS) {
        return stmt.parameter_index(name);
    }
    for sigil in [':', '@', '$'] {
        if let Some(index) = stmt.parameter_index(&format!("{sigil}{name}"))? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn json_to_sql(value: JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(flag) => Value::Integer(i64::from(flag)),
        JsonValue::Number(number) => match number.as_i64() {
            Some(integer) => Value::Integer(integer),
            None => number.as_f64().map_or(Value::Null, Value::Real),
        },
        JsonValue::String(text) => Value::Text(text),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => Value::Text(nested.to_string()),
    }
}
