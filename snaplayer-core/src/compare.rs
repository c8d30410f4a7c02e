//! Total ordering over BSON values.
//!
//! Values of different types are ordered by type bracket, following the MongoDB
//! comparison order. Numbers of any width compare numerically with each other.
//! A missing value sorts before everything, including `null`.

use std::cmp::Ordering;
use bson::Bson;


/// Rank of a value's type bracket in the cross-type ordering.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::MaxKey => 12,
        _ => 11,
    }
}

/// Returns the numeric value of an integer or double.
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(*value as f64),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

fn compare_f64(left: f64, right: f64) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

/// Compares two values under the total cross-type ordering.
pub fn compare_values(left: &Bson, right: &Bson) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    match (left, right) {
        (Bson::String(a), Bson::String(b)) => a.cmp(b),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a
            .timestamp_millis()
            .cmp(&b.timestamp_millis()),
        (Bson::Timestamp(a), Bson::Timestamp(b)) => (a.time, a.increment).cmp(&(b.time, b.increment)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
        (Bson::Binary(a), Bson::Binary(b)) => a.bytes
            .len()
            .cmp(&b.bytes.len())
            .then_with(|| a.bytes.cmp(&b.bytes)),
        (Bson::Array(a), Bson::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ordering = compare_values(x, y);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        },
        (Bson::Document(a), Bson::Document(b)) => {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                // Per field: value type bracket, then field name, then value.
                let ordering = type_rank(va)
                    .cmp(&type_rank(vb))
                    .then_with(|| ka.cmp(kb))
                    .then_with(|| compare_values(va, vb));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        },
        _ => match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => compare_f64(a, b),
            _ => Ordering::Equal,
        },
    }
}

/// Compares two optional values, placing absent values first.
pub fn compare_optional(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

/// Compares two values only when they share a type bracket.
///
/// Range operators never match across brackets, so `{ $gt: 1 }` does not match a string.
pub fn compare_bracketed(left: &Bson, right: &Bson) -> Option<Ordering> {
    if type_rank(left) != type_rank(right) {
        return None;
    }

    Some(compare_values(left, right))
}

/// Returns `true` if both values are equal under the total ordering.
pub fn values_equal(left: &Bson, right: &Bson) -> bool {
    compare_values(left, right) == Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numbers_compare_across_widths() {
        assert!(values_equal(&Bson::Int32(2), &Bson::Double(2.0)));
        assert_eq!(compare_values(&Bson::Int64(1), &Bson::Double(1.5)), Ordering::Less);
    }

    #[test]
    fn brackets_follow_type_order() {
        assert_eq!(compare_values(&Bson::Null, &Bson::Int32(0)), Ordering::Less);
        assert_eq!(compare_values(&Bson::Int32(100), &Bson::String("a".into())), Ordering::Less);
        assert_eq!(compare_values(&Bson::String("z".into()), &Bson::Boolean(false)), Ordering::Less);
    }

    #[test]
    fn absent_sorts_before_null() {
        assert_eq!(compare_optional(None, Some(&Bson::Null)), Ordering::Less);
        assert_eq!(compare_optional(None, None), Ordering::Equal);
    }

    #[test]
    fn bracketed_comparison_rejects_mixed_types() {
        assert_eq!(compare_bracketed(&Bson::Int32(1), &Bson::String("1".into())), None);
        assert_eq!(compare_bracketed(&Bson::Int32(3), &Bson::Int64(2)), Some(Ordering::Greater));
    }

    #[test]
    fn documents_compare_field_by_field() {
        let a = Bson::Document(doc! { "x": 1, "y": 2 });
        let b = Bson::Document(doc! { "x": 1, "y": 3 });

        assert_eq!(compare_values(&a, &b), Ordering::Less);
        assert!(values_equal(&a, &a.clone()));
    }

    #[test]
    fn documents_compare_field_names_before_values() {
        let a = Bson::Document(doc! { "a": 5 });
        let b = Bson::Document(doc! { "b": 1 });

        assert_eq!(compare_values(&a, &b), Ordering::Less);
        assert_eq!(compare_values(&b, &a), Ordering::Greater);
    }
}
