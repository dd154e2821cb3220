use shared::domain::{GroupId, SiteId};

/// Which collection is currently reorderable. At most one scope is ever
/// active; the sorting variants carry the pre-session order so cancel can
/// put the entity store back the way it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortScope {
    Idle,
    Groups { snapshot: Vec<GroupId> },
    Sites { group_id: GroupId, snapshot: Vec<SiteId> },
}

impl SortScope {
    pub fn is_idle(&self) -> bool {
        matches!(self, SortScope::Idle)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            SortScope::Idle => "idle",
            SortScope::Groups { .. } => "group sort",
            SortScope::Sites { .. } => "site sort",
        }
    }
}

/// Remove the element at `from` and reinsert it at `to`. Elements between
/// the two indices shift by exactly one slot; everything else keeps its
/// relative order. Out-of-range indices leave the slice untouched.
pub fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from == to || from >= items.len() || to >= items.len() {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

/// Reorder `items` to match the id order recorded in `snapshot`. Snapshot
/// ids that no longer resolve are skipped; items the snapshot does not name
/// keep their current relative order at the tail.
pub fn restore_order_by<T, I, F>(items: &mut Vec<T>, snapshot: &[I], id_of: F)
where
    I: PartialEq + Copy,
    F: Fn(&T) -> I,
{
    let mut restored = Vec::with_capacity(items.len());
    for &id in snapshot {
        if let Some(index) = items.iter().position(|item| id_of(item) == id) {
            restored.push(items.remove(index));
        }
    }
    restored.append(items);
    *items = restored;
}
