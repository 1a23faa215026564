//! Local item collection owned by the engine.
//!
//! Identifiers stay unique at every point, including while adds are waiting on
//! the store. Reconciliation helpers touch a single item so that one mutation
//! settling never clobbers another mutation's local change.

use std::collections::{HashMap, HashSet};

use shared::domain::{Item, ItemId};

/// Stable handle for an item whose identifier is not yet confirmed by the store.
/// The identifier itself may be re-keyed; the handle does not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProvisionalKey(u64);

/// Prior value of one item and its place in the list order, taken before a
/// local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub item: Item,
    rank: u64,
}

/// Items in list order. `ranks` runs parallel to `items` and only ever grows
/// along the list, so a removed item can be put back between the same
/// neighbours even after other items around it came and went.
#[derive(Debug, Default, Clone)]
pub struct Collection {
    items: Vec<Item>,
    ranks: Vec<u64>,
    next_rank: u64,
    provisional: HashMap<ProvisionalKey, ItemId>,
    next_key: u64,
    high_water: Option<ItemId>,
}

impl Collection {
    pub fn new(items: Vec<Item>) -> Self {
        let mut collection = Self::default();
        collection.reset(items);
        collection
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn is_provisional(&self, id: ItemId) -> bool {
        self.provisional.values().any(|provisional| *provisional == id)
    }

    pub fn provisional_id(&self, key: ProvisionalKey) -> Option<ItemId> {
        self.provisional.get(&key).copied()
    }

    /// One past the highest identifier this collection has held, or the seed
    /// when it has never held one. `None` once that would overflow.
    pub fn next_provisional_id(&self) -> Option<ItemId> {
        match self
            .items
            .iter()
            .map(|item| item.id)
            .chain(self.high_water)
            .max()
        {
            Some(highest) => highest.next(),
            None => Some(ItemId::PROVISIONAL_SEED),
        }
    }

    /// Replaces everything with store truth. Outstanding provisional handles
    /// are forgotten; their adds settle against whatever is present later.
    pub fn reset(&mut self, items: Vec<Item>) {
        let mut seen = HashSet::new();
        self.items.clear();
        self.ranks.clear();
        for item in items {
            if seen.insert(item.id) {
                self.push(item);
            }
        }
        self.provisional.clear();
        let max = self.items.iter().map(|item| item.id).max();
        self.high_water = self.high_water.max(max);
    }

    /// Appends a new item under a provisional identifier. Returns `None`, and
    /// leaves the collection untouched, when no identifier is left to hand out.
    pub fn insert_provisional(
        &mut self,
        task: impl Into<String>,
    ) -> Option<(ProvisionalKey, Item)> {
        let id = self.next_provisional_id()?;
        let item = Item::new(id, task);
        let key = ProvisionalKey(self.next_key);
        self.next_key += 1;

        self.provisional.insert(key, id);
        self.observe(id);
        self.push(item.clone());
        Some((key, item))
    }

    /// Swaps the provisional item for the store's representation, in place.
    pub fn confirm(&mut self, key: ProvisionalKey, confirmed: Item) {
        let slot = self
            .provisional
            .remove(&key)
            .and_then(|provisional_id| self.position(provisional_id));

        if let Some(existing) = self
            .position(confirmed.id)
            .filter(|existing| Some(*existing) != slot)
        {
            if self.is_provisional(confirmed.id) {
                self.rekey(confirmed.id);
            } else if let Some(slot) = slot {
                // Already present as confirmed (a refresh got there first).
                self.items[existing] = confirmed.clone();
                self.remove_at(slot);
                self.observe(confirmed.id);
                return;
            }
        }

        self.observe(confirmed.id);
        match slot {
            Some(slot) => self.items[slot] = confirmed,
            None => match self.position(confirmed.id) {
                Some(existing) => self.items[existing] = confirmed,
                None => self.push(confirmed),
            },
        }
    }

    /// Drops the provisional item behind `key`, if it is still here.
    pub fn discard(&mut self, key: ProvisionalKey) -> Option<Item> {
        let id = self.provisional.remove(&key)?;
        let index = self.position(id)?;
        Some(self.remove_at(index).item)
    }

    pub fn take(&mut self, id: ItemId) -> Option<ItemSnapshot> {
        let index = self.position(id)?;
        Some(self.remove_at(index))
    }

    /// Puts `item` in place of the entry with the same identifier and returns
    /// the prior entry.
    pub fn replace(&mut self, item: Item) -> Option<ItemSnapshot> {
        let index = self.position(item.id)?;
        let prior = std::mem::replace(&mut self.items[index], item);
        Some(ItemSnapshot {
            item: prior,
            rank: self.ranks[index],
        })
    }

    /// Applies store truth to the entry with the same identifier. An entry that
    /// is gone locally stays gone.
    pub fn merge(&mut self, item: Item) -> bool {
        match self.position(item.id) {
            Some(index) => {
                self.items[index] = item;
                true
            }
            None => false,
        }
    }

    /// Reinstates a snapshot: overwrites the entry with the same identifier, or
    /// reinserts it after every item that preceded it when it was taken.
    pub fn restore(&mut self, snapshot: ItemSnapshot) {
        let ItemSnapshot { item, rank } = snapshot;
        if self.is_provisional(item.id) {
            self.rekey(item.id);
        }

        match self.position(item.id) {
            Some(existing) => self.items[existing] = item,
            None => {
                let index = self.ranks.partition_point(|existing| *existing < rank);
                self.items.insert(index, item);
                self.ranks.insert(index, rank);
            }
        }
    }

    fn push(&mut self, item: Item) {
        self.items.push(item);
        self.ranks.push(self.next_rank);
        self.next_rank += 1;
    }

    fn remove_at(&mut self, index: usize) -> ItemSnapshot {
        ItemSnapshot {
            item: self.items.remove(index),
            rank: self.ranks.remove(index),
        }
    }

    fn observe(&mut self, id: ItemId) {
        self.high_water = self.high_water.max(Some(id));
    }

    /// Moves a pending add off `id`. When the identifier space above the high
    /// water mark is used up, the lowest free identifier is taken instead.
    fn rekey(&mut self, id: ItemId) {
        let fresh = self
            .next_provisional_id()
            .unwrap_or_else(|| self.lowest_free_id());
        if let Some(provisional) = self.provisional.values_mut().find(|value| **value == id) {
            *provisional = fresh;
        }
        if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
            item.id = fresh;
        }
        self.observe(fresh);
    }

    fn lowest_free_id(&self) -> ItemId {
        let taken: HashSet<ItemId> = self.items.iter().map(|item| item.id).collect();
        (ItemId::PROVISIONAL_SEED.0..)
            .map(ItemId)
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or(ItemId::PROVISIONAL_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, task: &str) -> Item {
        Item::new(ItemId(id), task)
    }

    fn ids(collection: &Collection) -> Vec<i64> {
        collection.items().iter().map(|item| item.id.0).collect()
    }

    #[test]
    fn provisional_id_follows_last_identifier() {
        let mut collection = Collection::new(vec![item(1, "a"), item(2, "b")]);
        let (_, provisional) = collection
            .insert_provisional("c")
            .expect("identifier available");
        assert_eq!(provisional.id, ItemId(3));
        assert!(!provisional.completed);
        assert_eq!(ids(&collection), vec![1, 2, 3]);
    }

    #[test]
    fn empty_collection_uses_seed_identifier() {
        let mut collection = Collection::default();
        let (_, provisional) = collection
            .insert_provisional("first")
            .expect("identifier available");
        assert_eq!(provisional.id, ItemId::PROVISIONAL_SEED);
    }

    #[test]
    fn provisional_ids_do_not_reuse_removed_identifiers() {
        let mut collection = Collection::new(vec![item(1, "a"), item(2, "b")]);
        let snapshot = collection.take(ItemId(2)).expect("present");
        let (_, provisional) = collection
            .insert_provisional("c")
            .expect("identifier available");
        assert_eq!(provisional.id, ItemId(3));

        collection.restore(snapshot);
        assert_eq!(ids(&collection), vec![1, 2, 3]);
    }

    #[test]
    fn confirm_replaces_provisional_in_place() {
        let mut collection = Collection::new(vec![item(1, "a")]);
        let (key, _) = collection
            .insert_provisional("b")
            .expect("identifier available");
        collection.push_for_test(item(5, "c"));

        collection.confirm(key, item(9, "b"));
        assert_eq!(ids(&collection), vec![1, 9, 5]);
        assert!(!collection.is_provisional(ItemId(9)));
    }

    #[test]
    fn confirm_rekeys_colliding_provisional_item() {
        let mut collection = Collection::new(vec![item(1, "a")]);
        let (first, _) = collection
            .insert_provisional("b")
            .expect("identifier available");
        let (second, _) = collection
            .insert_provisional("c")
            .expect("identifier available");
        assert_eq!(collection.provisional_id(second), Some(ItemId(3)));

        collection.confirm(first, item(3, "b"));
        let rekeyed = collection.provisional_id(second).expect("still pending");
        assert_ne!(rekeyed, ItemId(3));
        assert_eq!(ids(&collection), vec![1, 3, rekeyed.0]);

        collection.confirm(second, item(4, "c"));
        assert_eq!(ids(&collection), vec![1, 3, 4]);
    }

    #[test]
    fn confirm_after_reset_does_not_duplicate() {
        let mut collection = Collection::new(vec![item(1, "a")]);
        let (key, _) = collection
            .insert_provisional("b")
            .expect("identifier available");
        collection.reset(vec![item(1, "a"), item(2, "b")]);

        collection.confirm(key, item(2, "b"));
        assert_eq!(ids(&collection), vec![1, 2]);
    }

    #[test]
    fn discard_after_reset_leaves_store_items_alone() {
        let mut collection = Collection::new(vec![item(1, "a")]);
        let (key, provisional) = collection
            .insert_provisional("b")
            .expect("identifier available");
        collection.reset(vec![item(1, "a"), item(provisional.id.0, "other")]);

        assert_eq!(collection.discard(key), None);
        assert_eq!(ids(&collection), vec![1, 2]);
    }

    #[test]
    fn restore_reinserts_at_original_position() {
        let mut collection =
            Collection::new(vec![item(1, "a"), item(2, "b"), item(3, "c")]);
        let before = collection.items().to_vec();
        let snapshot = collection.take(ItemId(2)).expect("present");
        assert_eq!(ids(&collection), vec![1, 3]);

        collection.restore(snapshot);
        assert_eq!(collection.items(), before.as_slice());
    }

    #[test]
    fn restore_with_missing_neighbours_keeps_list_order() {
        let mut collection =
            Collection::new(vec![item(1, "a"), item(2, "b"), item(3, "c")]);
        let snapshot = collection.take(ItemId(3)).expect("present");
        collection.take(ItemId(2)).expect("present");

        collection.restore(snapshot);
        assert_eq!(ids(&collection), vec![1, 3]);
    }

    #[test]
    fn overlapping_takes_restore_in_either_order() {
        let original = vec![item(1, "a"), item(2, "b"), item(3, "c"), item(4, "d")];

        for restore_later_first in [false, true] {
            let mut collection = Collection::new(original.clone());
            let third = collection.take(ItemId(3)).expect("present");
            let second = collection.take(ItemId(2)).expect("present");
            assert_eq!(ids(&collection), vec![1, 4]);

            if restore_later_first {
                collection.restore(second);
                collection.restore(third);
            } else {
                collection.restore(third);
                collection.restore(second);
            }
            assert_eq!(collection.items(), original.as_slice());
        }
    }

    #[test]
    fn restore_lands_before_items_added_later() {
        let mut collection = Collection::new(vec![item(1, "a"), item(2, "b")]);
        let snapshot = collection.take(ItemId(2)).expect("present");
        collection
            .insert_provisional("c")
            .expect("identifier available");

        collection.restore(snapshot);
        assert_eq!(ids(&collection), vec![1, 2, 3]);
    }

    #[test]
    fn provisional_id_is_refused_at_the_top_of_the_range() {
        let mut collection = Collection::new(vec![item(i64::MAX, "last")]);
        assert_eq!(collection.next_provisional_id(), None);
        assert_eq!(collection.insert_provisional("overflow"), None);
        assert_eq!(ids(&collection), vec![i64::MAX]);
    }

    #[test]
    fn rekey_falls_back_to_a_free_identifier_at_the_top_of_the_range() {
        let mut collection = Collection::new(vec![item(1, "a")]);
        let (first, _) = collection
            .insert_provisional("b")
            .expect("identifier available");
        let (second, _) = collection
            .insert_provisional("c")
            .expect("identifier available");
        collection.push_for_test(item(i64::MAX, "z"));

        collection.confirm(first, item(3, "b"));
        assert_eq!(collection.provisional_id(second), Some(ItemId(0)));
        assert_eq!(ids(&collection), vec![1, 3, 0, i64::MAX]);
    }

    #[test]
    fn merge_ignores_items_removed_locally() {
        let mut collection = Collection::new(vec![item(1, "a")]);
        assert!(!collection.merge(item(2, "b")));
        assert!(collection.merge(item(1, "a2")));
        assert_eq!(collection.get(ItemId(1)).map(|i| i.task.as_str()), Some("a2"));
    }

    #[test]
    fn reset_drops_duplicate_identifiers() {
        let collection = Collection::new(vec![item(1, "a"), item(1, "dup"), item(2, "b")]);
        assert_eq!(ids(&collection), vec![1, 2]);
        assert_eq!(collection.get(ItemId(1)).map(|i| i.task.as_str()), Some("a"));
    }

    impl Collection {
        fn push_for_test(&mut self, item: Item) {
            self.observe(item.id);
            self.push(item);
        }
    }
}
