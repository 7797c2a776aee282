//! Number × Number transforms. Concurrent adds commute; a set overrides any
//! concurrent change.

use crate::operation::NumberOperation;

pub(super) fn transform(
    s: &NumberOperation,
    c: &NumberOperation,
) -> (Option<NumberOperation>, Option<NumberOperation>) {
    use NumberOperation::*;
    match (s, c) {
        (SetValue { .. }, _) => (Some(s.clone()), None),
        (Add { .. }, SetValue { .. }) => (None, Some(c.clone())),
        (Add { .. }, Add { .. }) => (Some(s.clone()), Some(c.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(n: f64, op: &Option<NumberOperation>) -> f64 {
        match op {
            None => n,
            Some(NumberOperation::Add { value }) => n + value,
            Some(NumberOperation::SetValue { value }) => *value,
        }
    }

    fn converge(n: f64, s: NumberOperation, c: NumberOperation) -> f64 {
        let (s2, c2) = transform(&s, &c);
        let left = apply(apply(n, &Some(c.clone())), &s2);
        let right = apply(apply(n, &Some(s.clone())), &c2);
        assert_eq!(left, right);
        left
    }

    #[test]
    fn concurrent_adds_sum() {
        let out = converge(10.0, NumberOperation::Add { value: 5.0 }, NumberOperation::Add { value: -2.0 });
        assert_eq!(out, 13.0);
    }

    #[test]
    fn set_wins_over_add_on_either_side() {
        let set = NumberOperation::SetValue { value: 20.0 };
        let add = NumberOperation::Add { value: 5.0 };
        assert_eq!(converge(10.0, set.clone(), add.clone()), 20.0);
        assert_eq!(converge(10.0, add, set.clone()), 20.0);
        assert_eq!(converge(10.0, set, NumberOperation::SetValue { value: 1.0 }), 20.0);
    }
}
