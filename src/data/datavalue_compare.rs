use crate::data::datatable::DataValue;
use std::cmp::Ordering;

/// Rank used to order values of different types:
/// Null < Boolean < Integer/Float < String < DateTime
fn type_rank(value: &DataValue) -> u8 {
    match value {
        DataValue::Null => 0,
        DataValue::Boolean(_) => 1,
        DataValue::Integer(_) | DataValue::Float(_) => 2,
        DataValue::String(_) => 3,
        DataValue::DateTime(_) => 4,
    }
}

/// Compare two DataValues with a total, consistent ordering.
///
/// Numbers compare by value across Integer/Float; everything else that is
/// cross-typed falls back to the type rank.
pub fn compare_datavalues(a: &DataValue, b: &DataValue) -> Ordering {
    match (a, b) {
        (DataValue::Integer(a), DataValue::Integer(b)) => a.cmp(b),
        (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (DataValue::Integer(i), DataValue::Float(f)) => {
            (*i as f64).partial_cmp(f).unwrap_or(Ordering::Equal)
        }
        (DataValue::Float(f), DataValue::Integer(i)) => {
            f.partial_cmp(&(*i as f64)).unwrap_or(Ordering::Equal)
        }
        (DataValue::String(a), DataValue::String(b)) => a.cmp(b),
        (DataValue::Boolean(a), DataValue::Boolean(b)) => a.cmp(b),
        (DataValue::DateTime(a), DataValue::DateTime(b)) => a.cmp(b),
        (DataValue::Null, DataValue::Null) => Ordering::Equal,
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Same as [`compare_datavalues`] but string content compares case-insensitively
pub fn compare_datavalues_ignore_case(a: &DataValue, b: &DataValue) -> Ordering {
    match (a, b) {
        (DataValue::String(a), DataValue::String(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        _ => compare_datavalues(a, b),
    }
}

/// Compare DataValues with optional values (handling None)
pub fn compare_optional_datavalues(a: Option<&DataValue>, b: Option<&DataValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_datavalues(a, b),
    }
}
