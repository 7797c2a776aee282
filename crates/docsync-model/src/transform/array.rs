//! Array × Array transforms.
//!
//! Moves are resolved by looking at the array with the moved element(s)
//! taken out: every other element keeps its relative order, so both sides
//! agree on that base and only need to agree where the moved or inserted
//! elements land in it. When two of them land in the same gap, the server's
//! element goes first.

use crate::data_value::DataValue;
use crate::operation::ArrayOperation;

type Pair = (Option<ArrayOperation>, Option<ArrayOperation>);

pub(super) fn transform(s: &ArrayOperation, c: &ArrayOperation) -> Pair {
    use ArrayOperation::*;
    match (s, c) {
        (SetValue { .. }, _) => (Some(s.clone()), None),
        (_, SetValue { .. }) => (None, Some(c.clone())),

        // ── insert ──
        (Insert { index: si, value: sv }, Insert { index: ci, value: cv }) => {
            if si <= ci {
                (Some(s.clone()), Some(insert(ci.saturating_add(1), cv)))
            } else {
                (Some(insert(si.saturating_add(1), sv)), Some(c.clone()))
            }
        }
        (Insert { index: si, value }, Remove { index: ci }) => {
            if si <= ci {
                (Some(s.clone()), Some(Remove { index: ci.saturating_add(1) }))
            } else {
                (Some(insert(si - 1, value)), Some(c.clone()))
            }
        }
        (Insert { index: si, .. }, Replace { index: ci, value }) => {
            let ci = if ci >= si { ci.saturating_add(1) } else { *ci };
            (Some(s.clone()), Some(replace(ci, value)))
        }
        (Insert { index, value }, Move { from_index, to_index }) => {
            let (ins, mv) = insert_move(*index, value, *from_index, *to_index, true);
            (Some(ins), Some(mv))
        }

        // ── remove ──
        (Remove { index: si }, Insert { index: ci, value }) => {
            if ci <= si {
                (Some(Remove { index: si.saturating_add(1) }), Some(c.clone()))
            } else {
                (Some(s.clone()), Some(insert(ci - 1, value)))
            }
        }
        (Remove { index: si }, Remove { index: ci }) => {
            if si == ci {
                (None, None)
            } else if si < ci {
                (Some(s.clone()), Some(Remove { index: ci - 1 }))
            } else {
                (Some(Remove { index: si - 1 }), Some(c.clone()))
            }
        }
        (Remove { index: si }, Replace { index: ci, value }) => {
            if si == ci {
                // The replacement survives: it re-enters as an insert.
                (None, Some(insert(*ci, value)))
            } else if si < ci {
                (Some(s.clone()), Some(replace(ci - 1, value)))
            } else {
                (Some(s.clone()), Some(c.clone()))
            }
        }
        (Remove { index }, Move { from_index, to_index }) => {
            remove_move(*index, *from_index, *to_index)
        }

        // ── replace ──
        (Replace { index: si, value }, Insert { index: ci, .. }) => {
            let si = if si >= ci { si.saturating_add(1) } else { *si };
            (Some(replace(si, value)), Some(c.clone()))
        }
        (Replace { index: si, value }, Remove { index: ci }) => {
            if si == ci {
                (Some(insert(*si, value)), None)
            } else if ci < si {
                (Some(replace(si - 1, value)), Some(c.clone()))
            } else {
                (Some(s.clone()), Some(c.clone()))
            }
        }
        (Replace { index: si, .. }, Replace { index: ci, .. }) => {
            if si == ci {
                (Some(s.clone()), None)
            } else {
                (Some(s.clone()), Some(c.clone()))
            }
        }
        (Replace { index, value }, Move { from_index, to_index }) => (
            Some(replace(element_after_move(*index, *from_index, *to_index), value)),
            Some(c.clone()),
        ),

        // ── move ──
        (Move { from_index, to_index }, Insert { index, value }) => {
            let (ins, mv) = insert_move(*index, value, *from_index, *to_index, false);
            (Some(mv), Some(ins))
        }
        (Move { from_index, to_index }, Remove { index }) => {
            let (rem, mv) = remove_move(*index, *from_index, *to_index);
            (mv, rem)
        }
        (Move { from_index, to_index }, Replace { index, value }) => (
            Some(s.clone()),
            Some(replace(element_after_move(*index, *from_index, *to_index), value)),
        ),
        (
            Move {
                from_index: sf,
                to_index: st,
            },
            Move {
                from_index: cf,
                to_index: ct,
            },
        ) => move_move(*sf, *st, *cf, *ct),
    }
}

/// Where the element at `index` ends up after `move(from, to)`.
pub(super) fn element_after_move(index: usize, from: usize, to: usize) -> usize {
    if index == from {
        return to;
    }
    let mut i = index;
    if i > from {
        i -= 1;
    }
    if i >= to {
        i = i.saturating_add(1);
    }
    i
}

/// Insert at `index` against `move(from, to)`. Returns the insert as seen
/// after the move and the move as seen after the insert.
fn insert_move(
    index: usize,
    value: &DataValue,
    from: usize,
    to: usize,
    insert_first: bool,
) -> (ArrayOperation, ArrayOperation) {
    let gap = if index > from { index - 1 } else { index };
    let inserted_before = gap < to || (gap == to && insert_first);
    let (insert_pos, moved_pos) = if inserted_before {
        (gap, to.saturating_add(1))
    } else {
        (gap.saturating_add(1), to)
    };
    let from = if from >= index { from.saturating_add(1) } else { from };
    (
        insert(insert_pos, value),
        ArrayOperation::Move {
            from_index: from,
            to_index: moved_pos,
        },
    )
}

/// Remove at `index` against `move(from, to)`. Returns the remove as seen
/// after the move and the move as seen after the remove.
fn remove_move(index: usize, from: usize, to: usize) -> Pair {
    if index == from {
        return (Some(ArrayOperation::Remove { index: to }), None);
    }
    let removed_at = element_after_move(index, from, to);
    let moved_to = if removed_at < to { to - 1 } else { to };
    let from = if from > index { from - 1 } else { from };
    (
        Some(ArrayOperation::Remove { index: removed_at }),
        Some(ArrayOperation::Move {
            from_index: from,
            to_index: moved_to,
        }),
    )
}

fn move_move(sf: usize, st: usize, cf: usize, ct: usize) -> Pair {
    if sf == cf {
        // Same element: the server's destination wins.
        return (
            Some(ArrayOperation::Move {
                from_index: ct,
                to_index: st,
            }),
            None,
        );
    }
    let c_elem_after_s = element_after_move(cf, sf, st);
    let s_elem_after_c = element_after_move(sf, cf, ct);
    let s_gap = if c_elem_after_s < st { st - 1 } else { st };
    let c_gap = if s_elem_after_c < ct { ct - 1 } else { ct };
    let (s_pos, c_pos) = if s_gap <= c_gap {
        (s_gap, c_gap.saturating_add(1))
    } else {
        (s_gap.saturating_add(1), c_gap)
    };
    (
        Some(ArrayOperation::Move {
            from_index: s_elem_after_c,
            to_index: s_pos,
        }),
        Some(ArrayOperation::Move {
            from_index: c_elem_after_s,
            to_index: c_pos,
        }),
    )
}

fn insert(index: usize, value: &DataValue) -> ArrayOperation {
    ArrayOperation::Insert {
        index,
        value: value.clone(),
    }
}

fn replace(index: usize, value: &DataValue) -> ArrayOperation {
    ArrayOperation::Replace {
        index,
        value: value.clone(),
    }
}
