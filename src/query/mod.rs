//! Structured event search: clause compilation and in-memory execution.
//!
//! The store behind a [`QuerySpec`] keeps a consistent sort order only when at most one
//! attribute carries a range (non-equality) constraint and that attribute leads the sort.
//! [`QuerySpec::from_filters`] enforces both rules for every spec, however it is built.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token-level clause compiler.
pub mod filter;
/// Filter matching and ordering over event records.
pub mod exec;

pub use filter::{Clause, compile_filters};

/// Rejected query; always fixable by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Unknown field token.
    #[error("invalid filter field: {0:?}")]
    InvalidField(String),
    /// Unknown operator token.
    #[error("invalid filter operator: {0:?}")]
    InvalidOperator(String),
    /// Value does not fit the attribute's type.
    #[error("invalid value {value:?} for {attribute}")]
    InvalidValue {
        /// Target attribute.
        attribute: Attribute,
        /// Offending value text.
        value: String,
    },
    /// Range constraints on two different attributes.
    #[error("range filters on both {first} and {second}; only one attribute may be range-constrained")]
    ConflictingRangeFields {
        /// Attribute that became the range field first.
        first: Attribute,
        /// Attribute that tried to become a second range field.
        second: Attribute,
    },
}

/// Queryable event attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    /// `name`, the tie-breaking sort key.
    Name,
    /// `city`.
    City,
    /// `topics`, multi-valued.
    Topics,
    /// `month`.
    Month,
    /// `maxAttendees`.
    MaxAttendees,
    /// `seatsAvailable`.
    SeatsAvailable,
}

/// Value type an attribute compares as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Text.
    Str,
    /// Base-10 integer.
    Int,
}

impl Attribute {
    /// Store-facing attribute name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::City => "city",
            Self::Topics => "topics",
            Self::Month => "month",
            Self::MaxAttendees => "maxAttendees",
            Self::SeatsAvailable => "seatsAvailable",
        }
    }

    /// Type filter values must have.
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Name | Self::City | Self::Topics => ValueKind::Str,
            Self::Month | Self::MaxAttendees | Self::SeatsAvailable => ValueKind::Int,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison applied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `!=`
    Ne,
}

impl Comparator {
    /// Every comparator except equality constrains a range.
    pub fn is_range(self) -> bool {
        self != Self::Eq
    }

    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Ne => "!=",
        }
    }

    /// Whether `stored.cmp(operand)` satisfies this comparator.
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Ne => ord != Ordering::Equal,
        }
    }
}

/// Typed filter operand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Integer operand.
    Int(i64),
    /// Text operand.
    Str(String),
}

impl Value {
    fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Str(_) => ValueKind::Str,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
        }
    }
}

/// One validated `(attribute, comparator, value)` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Constrained attribute.
    pub attribute: Attribute,
    /// Comparison.
    pub comparator: Comparator,
    /// Operand, typed per [`Attribute::value_kind`].
    pub value: Value,
}

impl Filter {
    /// Builds a filter.
    pub fn new(attribute: Attribute, comparator: Comparator, value: Value) -> Self {
        Self {
            attribute,
            comparator,
            value,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One component of a result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Attribute sorted on.
    pub attribute: Attribute,
    /// Direction.
    pub direction: Direction,
}

impl SortKey {
    /// Ascending sort on `attribute`.
    pub fn asc(attribute: Attribute) -> Self {
        Self {
            attribute,
            direction: Direction::Ascending,
        }
    }
}

/// Validated, executable query: filters plus the sort order the store must honor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    filters: Vec<Filter>,
    order: Vec<SortKey>,
    range_field: Option<Attribute>,
}

impl QuerySpec {
    /// Validates typed filters and derives the range field and sort order.
    pub fn from_filters(filters: Vec<Filter>) -> Result<Self, FilterError> {
        let mut range_field: Option<Attribute> = None;

        for filter in &filters {
            if filter.value.kind() != filter.attribute.value_kind() {
                return Err(FilterError::InvalidValue {
                    attribute: filter.attribute,
                    value: filter.value.to_string(),
                });
            }
            if !filter.comparator.is_range() {
                continue;
            }
            match range_field {
                Some(first) if first != filter.attribute => {
                    return Err(FilterError::ConflictingRangeFields {
                        first,
                        second: filter.attribute,
                    });
                }
                _ => range_field = Some(filter.attribute),
            }
        }

        let order = match range_field {
            Some(field) if field != Attribute::Name => {
                vec![SortKey::asc(field), SortKey::asc(Attribute::Name)]
            }
            _ => vec![SortKey::asc(Attribute::Name)],
        };

        Ok(Self {
            filters,
            order,
            range_field,
        })
    }

    /// Unfiltered query ordered by name.
    pub fn all() -> Self {
        Self {
            filters: Vec::new(),
            order: vec![SortKey::asc(Attribute::Name)],
            range_field: None,
        }
    }

    /// Validated filters, in input order.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Result ordering.
    pub fn order(&self) -> &[SortKey] {
        &self.order
    }

    /// The single range-constrained attribute, if any.
    pub fn range_field(&self) -> Option<Attribute> {
        self.range_field
    }
}
