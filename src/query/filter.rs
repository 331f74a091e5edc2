//! Compiles caller-supplied `(field, operator, value)` tokens into a [`QuerySpec`].

use serde::{Deserialize, Serialize};

use super::{Attribute, Comparator, Filter, FilterError, QuerySpec, Value, ValueKind};

/// Untrusted clause as received from the request layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Field token, e.g. `"CITY"`.
    pub field: String,
    /// Operator token, e.g. `"GTEQ"`.
    pub operator: String,
    /// Raw operand text.
    pub value: String,
}

impl Clause {
    /// Builds a clause from its three tokens.
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

impl Attribute {
    /// Maps a public field token; only these four attributes are user-filterable.
    pub fn from_field_token(token: &str) -> Option<Self> {
        match token {
            "CITY" => Some(Self::City),
            "TOPIC" => Some(Self::Topics),
            "MONTH" => Some(Self::Month),
            "MAX_ATTENDEES" => Some(Self::MaxAttendees),
            _ => None,
        }
    }
}

impl Comparator {
    /// Maps a public operator token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "EQ" => Some(Self::Eq),
            "GT" => Some(Self::Gt),
            "GTEQ" => Some(Self::Ge),
            "LT" => Some(Self::Lt),
            "LTEQ" => Some(Self::Le),
            "NE" => Some(Self::Ne),
            _ => None,
        }
    }
}

/// Validates and types `clauses`, failing on the first bad one.
///
/// # Errors
///
/// [`FilterError`] for an unknown field or operator, a non-integer operand on an
/// integer attribute, or range constraints on two different attributes.
pub fn compile_filters(clauses: &[Clause]) -> Result<QuerySpec, FilterError> {
    let filters = clauses
        .iter()
        .map(compile_clause)
        .collect::<Result<Vec<_>, _>>()?;
    QuerySpec::from_filters(filters)
}

fn compile_clause(clause: &Clause) -> Result<Filter, FilterError> {
    let attribute = Attribute::from_field_token(&clause.field)
        .ok_or_else(|| FilterError::InvalidField(clause.field.clone()))?;
    let comparator = Comparator::from_token(&clause.operator)
        .ok_or_else(|| FilterError::InvalidOperator(clause.operator.clone()))?;

    let value = match attribute.value_kind() {
        ValueKind::Str => Value::Str(clause.value.clone()),
        ValueKind::Int => clause
            .value
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| FilterError::InvalidValue {
                attribute,
                value: clause.value.clone(),
            })?,
    };

    Ok(Filter::new(attribute, comparator, value))
}
