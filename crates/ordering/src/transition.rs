//! Pure order arithmetic over `(item, order)` pairs.
//!
//! Every function takes a queue whose orders are exactly `{1, ..., N}` and
//! returns a queue with the same property, sorted by order. Inputs are never
//! mutated; validation failures leave nothing half-applied.

use std::collections::HashMap;

use shared::domain::QueueItemId;

use crate::OrderingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderedItem {
    pub item_id: QueueItemId,
    pub order: u32,
}

impl OrderedItem {
    pub fn new(item_id: QueueItemId, order: u32) -> Self {
        Self { item_id, order }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderChange {
    pub item_id: QueueItemId,
    pub from: u32,
    pub to: u32,
}

/// The per-item writes that take a queue from one assignment to another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub removed: Option<QueueItemId>,
    pub changes: Vec<OrderChange>,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.removed.is_none() && self.changes.is_empty()
    }
}

/// Order the next appended item receives.
pub fn next_order(items: &[OrderedItem]) -> u32 {
    u32::try_from(items.len()).map_or(u32::MAX, |len| len.saturating_add(1))
}

pub fn append(items: &[OrderedItem], new_item: QueueItemId) -> Vec<OrderedItem> {
    let mut next = sorted(items.to_vec());
    next.push(OrderedItem::new(new_item, next_order(items)));
    next
}

pub fn remove(items: &[OrderedItem], item_id: QueueItemId) -> Result<Vec<OrderedItem>, OrderingError> {
    let removed = find(items, item_id)?.order;
    let next = items
        .iter()
        .filter(|item| item.item_id != item_id)
        .map(|item| {
            if item.order > removed {
                OrderedItem::new(item.item_id, item.order - 1)
            } else {
                *item
            }
        })
        .collect();
    Ok(sorted(next))
}

/// Shifts the interval between the old and new rank by one and drops the item
/// into the vacated slot. Moving onto the current rank is a no-op.
pub fn move_item(
    items: &[OrderedItem],
    item_id: QueueItemId,
    new_order: u32,
) -> Result<Vec<OrderedItem>, OrderingError> {
    let old_order = find(items, item_id)?.order;
    if new_order == 0 || new_order as usize > items.len() {
        return Err(OrderingError::InvalidTarget {
            requested: new_order,
            len: items.len(),
        });
    }

    let next = items
        .iter()
        .map(|item| {
            let order = if item.item_id == item_id {
                new_order
            } else if new_order > old_order && item.order > old_order && item.order <= new_order {
                item.order - 1
            } else if new_order < old_order && item.order >= new_order && item.order < old_order {
                item.order + 1
            } else {
                item.order
            };
            OrderedItem::new(item.item_id, order)
        })
        .collect();
    Ok(sorted(next))
}

pub fn is_dense(items: &[OrderedItem]) -> bool {
    let mut orders: Vec<u32> = items.iter().map(|item| item.order).collect();
    orders.sort_unstable();
    orders
        .iter()
        .enumerate()
        .all(|(index, order)| *order as usize == index + 1)
}

/// Renumbers to `1..=N`, keeping relative order. Ties break on item id.
pub fn compact(items: &[OrderedItem]) -> Vec<OrderedItem> {
    let mut next = items.to_vec();
    next.sort_by_key(|item| (item.order, item.item_id));
    next.iter()
        .zip(1u32..)
        .map(|(item, order)| OrderedItem::new(item.item_id, order))
        .collect()
}

pub fn diff(before: &[OrderedItem], after: &[OrderedItem]) -> Transition {
    let previous: HashMap<QueueItemId, u32> = before
        .iter()
        .map(|item| (item.item_id, item.order))
        .collect();
    let removed = before
        .iter()
        .find(|item| !after.iter().any(|next| next.item_id == item.item_id))
        .map(|item| item.item_id);
    let changes = after
        .iter()
        .filter_map(|item| {
            let from = *previous.get(&item.item_id)?;
            (from != item.order).then_some(OrderChange {
                item_id: item.item_id,
                from,
                to: item.order,
            })
        })
        .collect();
    Transition { removed, changes }
}

/// Whether two lists assign the same order to the same items.
pub fn same_assignment(left: &[OrderedItem], right: &[OrderedItem]) -> bool {
    let mut left = left.to_vec();
    let mut right = right.to_vec();
    left.sort_by_key(|item| item.item_id);
    right.sort_by_key(|item| item.item_id);
    left == right
}

fn find(items: &[OrderedItem], item_id: QueueItemId) -> Result<&OrderedItem, OrderingError> {
    items
        .iter()
        .find(|item| item.item_id == item_id)
        .ok_or(OrderingError::NotFound(item_id))
}

fn sorted(mut items: Vec<OrderedItem>) -> Vec<OrderedItem> {
    items.sort_by_key(|item| item.order);
    items
}

#[cfg(test)]
#[path = "tests/transition_tests.rs"]
mod tests;
