//! Ordering-aware range selection over partition-value tuples.
//!
//! Tuples are compared column by column up to the shorter length, so a longer
//! tuple whose prefix matches a bound is treated as equal to it: `1/2/3` sits
//! inside the bound `1/2`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// How one partition column is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionOrder {
    /// String comparison.
    #[default]
    Lex,
    /// Parse both sides as numbers and compare numerically.
    Num,
}

fn parse_number(value: &str) -> Result<f64, SchedulerError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| !n.is_nan())
        .ok_or_else(|| SchedulerError::InvalidPartitionValue {
            value: value.to_string(),
        })
}

/// Compare two partition tuples.
///
/// Columns beyond `orders` compare lexicographically. The first non-equal column
/// decides; if the shorter tuple runs out first the tuples compare equal.
///
/// # Errors
///
/// Returns `InvalidPartitionValue` when a numeric column does not parse.
pub fn compare_partitions<A, B>(
    left: &[A],
    right: &[B],
    orders: &[PartitionOrder],
) -> Result<Ordering, SchedulerError>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    for (i, (l, r)) in left.iter().zip(right).enumerate() {
        let (l, r) = (l.as_ref(), r.as_ref());
        let ord = match orders.get(i).copied().unwrap_or_default() {
            PartitionOrder::Lex => l.cmp(r),
            PartitionOrder::Num => {
                let (l, r) = (parse_number(l)?, parse_number(r)?);
                l.partial_cmp(&r).unwrap_or(Ordering::Equal)
            }
        };
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(Ordering::Equal)
}

/// Whether `value` falls inside `[begin, end]`.
///
/// Bounds given in descending order are swapped first. When the bounds compare
/// equal under the prefix rule, matching either orientation counts, so the
/// result never depends on the order the bounds were given in.
///
/// # Errors
///
/// Returns `InvalidPartitionValue` when a numeric column does not parse.
pub fn in_range<V, B>(
    value: &[V],
    begin: &[B],
    end: &[B],
    orders: &[PartitionOrder],
) -> Result<bool, SchedulerError>
where
    V: AsRef<str>,
    B: AsRef<str>,
{
    let within = |lo: &[B], hi: &[B]| -> Result<bool, SchedulerError> {
        Ok(compare_partitions(value, lo, orders)? != Ordering::Less
            && compare_partitions(value, hi, orders)? != Ordering::Greater)
    };

    match compare_partitions(begin, end, orders)? {
        Ordering::Less => within(begin, end),
        Ordering::Greater => within(end, begin),
        Ordering::Equal => Ok(within(begin, end)? || within(end, begin)?),
    }
}

/// Range filter built once per migration request and applied to many
/// partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRangeFilter {
    begin: Vec<String>,
    end: Vec<String>,
    orders: Vec<PartitionOrder>,
}

impl PartitionRangeFilter {
    /// Build a filter; bounds are validated and stored in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartitionValue` when a numeric bound column does not parse.
    pub fn new(
        begin: Vec<String>,
        end: Vec<String>,
        orders: Vec<PartitionOrder>,
    ) -> Result<Self, SchedulerError> {
        let descending =
            compare_partitions(begin.as_slice(), end.as_slice(), &orders)? == Ordering::Greater;
        let (begin, end) = if descending { (end, begin) } else { (begin, end) };
        Ok(Self { begin, end, orders })
    }

    /// Lower bound.
    #[must_use]
    pub fn begin(&self) -> &[String] {
        &self.begin
    }

    /// Upper bound.
    #[must_use]
    pub fn end(&self) -> &[String] {
        &self.end
    }

    /// Whether a partition tuple falls inside the range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartitionValue` when a numeric column of `value` does not
    /// parse.
    pub fn contains<V: AsRef<str>>(&self, value: &[V]) -> Result<bool, SchedulerError> {
        in_range(value, self.begin.as_slice(), self.end.as_slice(), &self.orders)
    }

    /// Keep only the partitions inside the range, preserving order.
    ///
    /// # Errors
    ///
    /// Fails on the first partition with an unparsable numeric column.
    pub fn filter_partitions<V: AsRef<str>>(
        &self,
        partitions: Vec<Vec<V>>,
    ) -> Result<Vec<Vec<V>>, SchedulerError> {
        let mut selected = Vec::with_capacity(partitions.len());
        for partition in partitions {
            if self.contains(partition.as_slice())? {
                selected.push(partition);
            }
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use PartitionOrder::{Lex, Num};

    #[test]
    fn test_prefix_compares_equal() {
        assert_eq!(
            compare_partitions(&["1", "2", "3"], &["1", "2"], &[Lex, Lex, Lex]).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_lex_range_with_prefix_value() {
        let orders = [Lex];
        assert!(in_range(&["1", "2"], &["1", "2"], &["2", "1"], &orders).unwrap());
        assert!(in_range(&["1", "2", "3"], &["1", "2"], &["2", "1"], &orders).unwrap());
        assert!(!in_range(&["3"], &["1", "2"], &["2", "1"], &orders).unwrap());
    }

    #[test]
    fn test_numeric_bounds_swapped() {
        assert!(in_range(&["5"], &["10"], &["2"], &[Num]).unwrap());
        assert!(!in_range(&["11"], &["10"], &["2"], &[Num]).unwrap());
        // Lexicographically "5" sorts after "2".
        assert!(!in_range(&["5"], &["10"], &["2"], &[Lex]).unwrap());
    }

    #[test]
    fn test_missing_orders_default_to_lex() {
        assert!(in_range(&["2024", "b"], &["2024", "a"], &["2024", "c"], &[Num]).unwrap());
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let err = in_range(&["abc"], &["1"], &["2"], &[Num]).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidPartitionValue { ref value } if value == "abc"));
    }

    #[test]
    fn test_equal_bounds_are_symmetric() {
        let orders = [Lex, Lex, Lex];
        let a = ["1", "2"];
        let b = ["1", "2", "3"];
        let v = ["1", "2", "4"];
        assert_eq!(
            in_range(&v, &a, &b, &orders).unwrap(),
            in_range(&v, &b, &a, &orders).unwrap()
        );
    }

    #[test]
    fn test_filter_orders_bounds_and_selects() {
        let filter = PartitionRangeFilter::new(
            vec!["20240301".into()],
            vec!["20240101".into()],
            vec![Num],
        )
        .unwrap();
        assert_eq!(filter.begin().to_vec(), vec!["20240101".to_string()]);

        let selected = filter
            .filter_partitions(vec![vec!["20231231"], vec!["20240215"], vec!["20240301"]])
            .unwrap();
        assert_eq!(selected, vec![vec!["20240215"], vec!["20240301"]]);
    }
}
