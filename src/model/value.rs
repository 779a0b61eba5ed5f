use std::cmp::Ordering;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};

/**
 * Reference to a row of another entity, resolved to its display label.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Related {
    pub id: i64,
    pub label: String,
}

impl Related {
    pub fn new(id: i64, label: String) -> Self {
        Related { id, label }
    }
}

/**
 * A single column value of a row.
 *
 * References are stored as `Integer` ids and turned into `Related` once the
 * referenced row has been looked up.
 */
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Related(Related),
    Collection(Vec<Related>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(value) => Some(*value),
            Value::Integer(value) => Some(Decimal::from(*value)),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(value) => Some(*value),
            _ => None,
        }
    }

    /**
     * Id of the referenced row, for both stored and resolved references.
     */
    pub fn reference_id(&self) -> Option<i64> {
        match self {
            Value::Integer(id) => Some(*id),
            Value::Related(related) => Some(related.id),
            _ => None,
        }
    }

    /**
     * Numeric view of the value used by aggregates. Anything that is not a
     * finite number yields `None` and is left out of the aggregate.
     */
    pub fn as_number(&self) -> Option<f64> {
        let number = match self {
            Value::Integer(value) => *value as f64,
            Value::Float(value) => *value,
            Value::Decimal(value) => value.to_f64()?,
            _ => return None,
        };
        number.is_finite().then_some(number)
    }

    /**
     * Human readable rendition of the value.
     */
    pub fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Decimal(value) => value.to_string(),
            Value::Text(value) => value.clone(),
            Value::Date(value) => value.format("%Y-%m-%d").to_string(),
            Value::Related(related) => related.label.clone(),
            Value::Collection(items) => items.iter().map(|item| item.label.as_str()).collect::<Vec<&str>>().join(", "),
        }
    }

    /**
     * Total order over values. Nulls sort first, numbers compare numerically
     * across integer, float and decimal, references compare by label and then id.
     * Collections compare by their sorted labels.
     */
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Text(left), Value::Text(right)) => left.cmp(right),
            (Value::Date(left), Value::Date(right)) => left.cmp(right),
            (Value::Related(left), Value::Related(right)) => left.label.cmp(&right.label).then(left.id.cmp(&right.id)),
            (Value::Collection(left), Value::Collection(right)) => sorted_labels(left).cmp(&sorted_labels(right)),
            (left, right) if left.rank() == 1 && right.rank() == 1 => {
                let left = left.sort_number();
                let right = right.sort_number();
                left.total_cmp(&right)
            }
            (left, right) => left.rank().cmp(&right.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Float(_) | Value::Decimal(_) => 1,
            Value::Text(_) => 2,
            Value::Date(_) => 3,
            Value::Related(_) => 4,
            Value::Collection(_) => 5,
        }
    }

    fn sort_number(&self) -> f64 {
        match self {
            Value::Integer(value) => *value as f64,
            Value::Float(value) => *value,
            Value::Decimal(value) => value.to_f64().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }
}

fn sorted_labels(items: &[Related]) -> Vec<&str> {
    let mut labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
    labels.sort_unstable();
    labels
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Float(value) => serializer.serialize_f64(*value),
            Value::Decimal(value) => serializer.serialize_str(&value.to_string()),
            Value::Text(value) => serializer.serialize_str(value),
            Value::Date(value) => serializer.serialize_str(&value.format("%Y-%m-%d").to_string()),
            Value::Related(related) => related.serialize(serializer),
            Value::Collection(items) => items.serialize(serializer),
        }
    }
}
