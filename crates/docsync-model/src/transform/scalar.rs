//! Boolean and date transforms. Both kinds only have a set, so the server
//! side always wins.

use crate::operation::{BooleanOperation, DateOperation};

pub(super) fn transform_boolean(
    s: &BooleanOperation,
    _c: &BooleanOperation,
) -> (Option<BooleanOperation>, Option<BooleanOperation>) {
    (Some(s.clone()), None)
}

pub(super) fn transform_date(
    s: &DateOperation,
    _c: &DateOperation,
) -> (Option<DateOperation>, Option<DateOperation>) {
    (Some(s.clone()), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn server_set_wins() {
        let s = BooleanOperation::SetValue { value: true };
        let c = BooleanOperation::SetValue { value: false };
        assert_eq!(transform_boolean(&s, &c), (Some(s.clone()), None));

        let s = DateOperation::SetValue {
            value: Utc.timestamp_millis_opt(1).unwrap(),
        };
        let c = DateOperation::SetValue {
            value: Utc.timestamp_millis_opt(2).unwrap(),
        };
        assert_eq!(transform_date(&s, &c), (Some(s.clone()), None));
    }
}
