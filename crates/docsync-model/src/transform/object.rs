//! Object × Object transforms. Keys never shift, so only operations on the
//! same property interact.

use crate::operation::ObjectOperation;

type Pair = (Option<ObjectOperation>, Option<ObjectOperation>);

pub(super) fn transform(s: &ObjectOperation, c: &ObjectOperation) -> Pair {
    use ObjectOperation::*;
    match (s, c) {
        (SetValue { .. }, _) => (Some(s.clone()), None),
        (_, SetValue { .. }) => (None, Some(c.clone())),
        _ if prop(s) != prop(c) => (Some(s.clone()), Some(c.clone())),

        (Remove { .. }, Remove { .. }) => (None, None),
        // The client already holds its own value under the key, so the
        // server's value arrives as a replacement.
        (Add { prop, value } | Set { prop, value }, Add { .. } | Set { .. }) => (
            Some(Set {
                prop: prop.clone(),
                value: value.clone(),
            }),
            None,
        ),
        // A write concurrent with a remove keeps the key alive.
        (Add { prop, value } | Set { prop, value }, Remove { .. }) => (
            Some(Add {
                prop: prop.clone(),
                value: value.clone(),
            }),
            None,
        ),
        (Remove { .. }, Add { prop, value } | Set { prop, value }) => (
            None,
            Some(Add {
                prop: prop.clone(),
                value: value.clone(),
            }),
        ),
    }
}

fn prop(op: &ObjectOperation) -> Option<&str> {
    match op {
        ObjectOperation::Add { prop, .. }
        | ObjectOperation::Set { prop, .. }
        | ObjectOperation::Remove { prop } => Some(prop),
        ObjectOperation::SetValue { .. } => None,
    }
}
