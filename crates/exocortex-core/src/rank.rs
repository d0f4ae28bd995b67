/// Returns `ids` reordered so that `moved` sits exactly at `target` and every
/// other id keeps its relative order. The index of each id in the result is
/// its new dense rank.
///
/// `None` when `moved` is not among `ids` or `target` is past the end.
pub fn move_to_rank(ids: &[i64], moved: i64, target: usize) -> Option<Vec<i64>> {
    if target >= ids.len() || !ids.contains(&moved) {
        return None;
    }
    let mut order = Vec::with_capacity(ids.len());
    let mut others = ids.iter().copied().filter(|id| *id != moved);
    for slot in 0..ids.len() {
        if slot == target {
            order.push(moved);
        } else if let Some(id) = others.next() {
            order.push(id);
        }
    }
    Some(order)
}

/// Position a new row lands at among `len` siblings.
pub fn insertion_rank(requested: usize, len: usize) -> usize {
    requested.min(len)
}
