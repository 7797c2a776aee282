//! String × String transforms. Positions count chars.

use crate::operation::StringOperation;

type Pair = (Option<StringOperation>, Option<StringOperation>);

pub(super) fn transform(s: &StringOperation, c: &StringOperation) -> Pair {
    use StringOperation::*;
    match (s, c) {
        (SetValue { .. }, _) => (Some(s.clone()), None),
        (_, SetValue { .. }) => (None, Some(c.clone())),

        (Insert { index: si, value: sv }, Insert { index: ci, value: cv }) => {
            if si <= ci {
                (Some(s.clone()), Some(insert(ci.saturating_add(char_len(sv)), cv)))
            } else {
                (Some(insert(si.saturating_add(char_len(cv)), sv)), Some(c.clone()))
            }
        }

        (Insert { index, value }, Remove { index: ri, value: rv }) => {
            let (ins, rem) = insert_remove(*index, value, *ri, rv);
            (ins, Some(rem))
        }
        (Remove { index: ri, value: rv }, Insert { index, value }) => {
            let (ins, rem) = insert_remove(*index, value, *ri, rv);
            (Some(rem), ins)
        }

        (Remove { index: si, value: sv }, Remove { index: ci, value: cv }) => {
            remove_remove(*si, sv, *ci, cv)
        }
    }
}

/// An insert strictly inside a removed range is absorbed by the remove.
fn insert_remove(
    index: usize,
    text: &str,
    r_index: usize,
    removed: &str,
) -> (Option<StringOperation>, StringOperation) {
    let r_len = char_len(removed);
    if index <= r_index {
        (
            Some(insert(index, text)),
            remove(r_index.saturating_add(char_len(text)), removed.to_string()),
        )
    } else if index >= r_index.saturating_add(r_len) {
        (Some(insert(index - r_len, text)), remove(r_index, removed.to_string()))
    } else {
        let split = index - r_index;
        let mut grown: String = removed.chars().take(split).collect();
        grown.push_str(text);
        grown.extend(removed.chars().skip(split));
        (None, remove(r_index, grown))
    }
}

/// Each side keeps only the chars the other did not already remove.
fn remove_remove(s_index: usize, s_value: &str, c_index: usize, c_value: &str) -> Pair {
    let s_end = s_index.saturating_add(char_len(s_value));
    let c_end = c_index.saturating_add(char_len(c_value));

    if s_end <= c_index {
        return (
            Some(remove(s_index, s_value.to_string())),
            Some(remove(c_index - char_len(s_value), c_value.to_string())),
        );
    }
    if c_end <= s_index {
        return (
            Some(remove(s_index - char_len(c_value), s_value.to_string())),
            Some(remove(c_index, c_value.to_string())),
        );
    }

    let start = s_index.min(c_index);
    let s_rest = outside(s_value, s_index, c_index, c_end);
    let c_rest = outside(c_value, c_index, s_index, s_end);
    (
        (!s_rest.is_empty()).then(|| remove(start, s_rest)),
        (!c_rest.is_empty()).then(|| remove(start, c_rest)),
    )
}

/// Chars of `value` (which starts at `index`) outside `[other_start, other_end)`.
fn outside(value: &str, index: usize, other_start: usize, other_end: usize) -> String {
    value
        .chars()
        .enumerate()
        .filter(|(offset, _)| {
            let pos = index.saturating_add(*offset);
            pos < other_start || pos >= other_end
        })
        .map(|(_, ch)| ch)
        .collect()
}

fn insert(index: usize, value: &str) -> StringOperation {
    StringOperation::Insert {
        index,
        value: value.to_string(),
    }
}

fn remove(index: usize, value: String) -> StringOperation {
    StringOperation::Remove { index, value }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
