//! Boolean column expressions for class-level state queries.
//!
//! Conditions are rendered to SQL text and never evaluated here; the
//! persistence layer decides what to do with them.

use std::fmt;
use std::ops::Not;

use crate::labeled_enum::{StateEnum, StateValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq { column: String, value: String },
    In { column: String, values: Vec<String> },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// Expression text supplied by the caller.
    Raw(String),
}

impl Condition {
    #[must_use]
    pub fn equals<V: StateValue>(column: impl Into<String>, value: &V) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.sql_literal(),
        }
    }

    #[must_use]
    pub fn is_in<'a, V, I>(column: impl Into<String>, values: I) -> Self
    where
        V: StateValue,
        I: IntoIterator<Item = &'a V>,
    {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(StateValue::sql_literal).collect(),
        }
    }

    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut items) => {
                items.push(other);
                Self::And(items)
            }
            first => Self::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut items) => {
                items.push(other);
                Self::Or(items)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[must_use]
    pub fn any_of(items: Vec<Self>) -> Self {
        match <[Self; 1]>::try_from(items) {
            Ok([single]) => single,
            Err(items) => Self::Or(items),
        }
    }

    fn write_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(_) | Self::Or(_) | Self::Raw(_) => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }

    fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Self], op: &str) -> fmt::Result {
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                write!(f, " {op} ")?;
            }
            item.write_nested(f)?;
        }
        Ok(())
    }
}

impl Not for Condition {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { column, value } => write!(f, "{column} = {value}"),
            Self::In { column, values } => write!(f, "{column} IN ({})", values.join(", ")),
            Self::And(items) => Self::write_joined(f, items, "AND"),
            Self::Or(items) => Self::write_joined(f, items, "OR"),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
            Self::Raw(sql) => f.write_str(sql),
        }
    }
}

/// CHECK constraint admitting exactly the values of `lenum`.
#[must_use]
pub fn check_constraint<V: StateValue>(column: &str, lenum: &StateEnum<V>) -> Condition {
    Condition::is_in(column, lenum.values())
}
