//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::PoolMap;
use crate::arena_key;
use crate::group::{GroupNodeId, GroupRegistry, NodePayload};
use crate::ir::{Block, Inst, Reg};
use crate::utility::SaHashMap;
use log::trace;
use smallvec::SmallVec;

arena_key! {
    /// Refers to a [`CopyRecord`] inside of an [`EquivalenceCache`].
    pub struct CopyRecordId;
}

/// A register that holds a copy of some other value.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CopyRecord {
    /// The value being held. This is the register (or immediate, or
    /// constant) the copy was made from.
    pub value: Reg,
    /// The register holding the copy.
    pub dest: Reg,
    /// The node of `dest`.
    pub node: GroupNodeId,
    /// The instruction that made the copy, if the pass inserted one.
    pub def: Option<Inst>,
    /// Ordinal of the last instruction in the block that reads `dest`.
    pub last_use: u32,
    /// Whether the pass created `dest` and nothing outside of the block
    /// can observe it, so it can be overwritten once it is dead.
    pub owned: bool,
}

/// Tracks which registers hold the same value inside of a single block.
///
/// Copies are grouped into classes keyed by the value they hold. A class
/// stays valid until the value is redefined, the copy itself is redefined,
/// or the block reaches a descheduling point. Every record also marks the
/// node of its destination with [`NodePayload::Copy`], so the cache has to
/// be [finished](Self::finish) before the block is left.
#[derive(Debug)]
pub struct EquivalenceCache {
    block: Block,
    records: PoolMap<CopyRecordId, CopyRecord>,
    classes: SaHashMap<Reg, SmallVec<[CopyRecordId; 2]>>,
}

impl EquivalenceCache {
    /// Creates an empty cache for `block`.
    pub fn new(block: Block) -> Self {
        Self {
            block,
            records: PoolMap::new(),
            classes: SaHashMap::default(),
        }
    }

    /// The block the cache belongs to.
    #[inline]
    pub fn block(&self) -> Block {
        self.block
    }

    /// How many copies are known.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no copies are known.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Gets a record.
    #[inline]
    pub fn record(&self, id: CopyRecordId) -> &CopyRecord {
        &self.records[id]
    }

    /// Remembers that `dest` now holds `value`, as of the instruction with
    /// ordinal `at`.
    ///
    /// Whatever `dest` held before is forgotten. Array members are never
    /// recorded, since a dynamic index can read or write them at any time.
    pub fn record_copy(
        &mut self,
        registry: &mut GroupRegistry,
        value: Reg,
        dest: Reg,
        def: Option<Inst>,
        at: u32,
        owned: bool,
    ) -> Option<CopyRecordId> {
        if value == dest || !dest.is_virtual() {
            return None;
        }

        let node = registry.find_or_create(dest);

        match registry.node(node).payload() {
            NodePayload::ArrayMember(_) => return None,
            NodePayload::Copy(old) => self.remove(registry, old),
            NodePayload::Empty => {}
        }

        let id = self.records.insert(CopyRecord {
            value,
            dest,
            node,
            def,
            last_use: at,
            owned,
        });

        self.classes.entry(value).or_default().push(id);
        registry.node_mut(node).payload = NodePayload::Copy(id);

        trace!("{dest} holds a copy of {value} in {:?}", self.block);

        Some(id)
    }

    /// The value `reg` holds a copy of, if it is known to hold one.
    pub fn value_of(&self, registry: &GroupRegistry, reg: Reg) -> Option<Reg> {
        self.record_for(registry, reg).map(|(_, record)| record.value)
    }

    /// The record for the copy held in `reg`.
    pub fn record_for(&self, registry: &GroupRegistry, reg: Reg) -> Option<(CopyRecordId, &CopyRecord)> {
        let node = registry.find(reg)?;

        match registry.node(node).payload() {
            NodePayload::Copy(id) => self.records.get(id).map(|record| (id, record)),
            _ => None,
        }
    }

    /// Every register known to hold `value`, oldest copy first.
    pub fn holders(&self, value: Reg) -> impl Iterator<Item = &CopyRecord> + '_ {
        self.classes
            .get(&value)
            .into_iter()
            .flat_map(move |ids| ids.iter().map(move |&id| &self.records[id]))
    }

    /// Notes that the instruction with ordinal `at` reads `reg`.
    pub fn note_use(&mut self, registry: &GroupRegistry, reg: Reg, at: u32) {
        if let Some((id, _)) = self.record_for(registry, reg) {
            let record = &mut self.records[id];

            record.last_use = record.last_use.max(at);
        }
    }

    /// Notes that `reg` is written. Copies of its old value are stale, and
    /// if `reg` held a copy it no longer does.
    pub fn note_def(&mut self, registry: &mut GroupRegistry, reg: Reg) {
        if let Some(ids) = self.classes.get(&reg).cloned() {
            for id in ids {
                self.remove(registry, id);
            }
        }

        if let Some((id, _)) = self.record_for(registry, reg) {
            self.remove(registry, id);
        }
    }

    /// Forgets a single copy.
    pub fn remove(&mut self, registry: &mut GroupRegistry, id: CopyRecordId) {
        let Some(record) = self.records.remove(id) else {
            return;
        };

        if let Some(class) = self.classes.get_mut(&record.value) {
            class.retain(|&mut other| other != id);

            if class.is_empty() {
                self.classes.remove(&record.value);
            }
        }

        if let Some(node) = registry.nodes.get_mut(record.node) {
            if node.payload == NodePayload::Copy(id) {
                node.payload = NodePayload::Empty;
            }
        }
    }

    /// Forgets every copy. Used at descheduling points, where registers
    /// can't be assumed to survive.
    pub fn clear(&mut self, registry: &mut GroupRegistry) {
        let ids: SmallVec<[CopyRecordId; 8]> = self.records.keys().collect();

        for id in ids {
            self.remove(registry, id);
        }

        debug_assert!(self.classes.is_empty());
    }

    /// Ends the block, removing every payload the cache put on nodes.
    pub fn finish(mut self, registry: &mut GroupRegistry) {
        trace!("dropping {} copies at the end of {:?}", self.len(), self.block);

        self.clear(registry);
    }

    /// Copies the pass made whose last read happened before the
    /// instruction with ordinal `current`, oldest first.
    pub fn dead_copies(&self, current: u32) -> impl Iterator<Item = (CopyRecordId, &CopyRecord)> + '_ {
        self.records
            .iter()
            .filter(move |(_, record)| record.owned && record.last_use < current)
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::ArenaKey;
    use crate::group::tests::registry;
    use crate::group::*;
    use crate::ir::*;

    fn cache() -> EquivalenceCache {
        EquivalenceCache::new(Block::key_new(0))
    }

    #[test]
    fn copies_are_found_by_value() {
        let mut reg = registry();
        let mut cache = cache();
        let zero = Reg::imm_f32(0.0);

        let id = cache.record_copy(&mut reg, zero, Reg::temp(8), None, 0, true).unwrap();

        assert_eq!(cache.value_of(&reg, Reg::temp(8)), Some(zero));
        assert_eq!(cache.holders(zero).map(|r| r.dest).collect::<Vec<_>>(), [Reg::temp(8)]);
        assert_eq!(
            reg.node(reg.find(Reg::temp(8)).unwrap()).payload(),
            NodePayload::Copy(id)
        );

        cache.finish(&mut reg);

        assert_eq!(reg.node(reg.find(Reg::temp(8)).unwrap()).payload(), NodePayload::Empty);
    }

    #[test]
    fn redefinitions_invalidate() {
        let mut reg = registry();
        let mut cache = cache();

        cache.record_copy(&mut reg, Reg::temp(1), Reg::temp(8), None, 0, true);
        cache.record_copy(&mut reg, Reg::temp(1), Reg::temp(9), None, 0, true);
        cache.record_copy(&mut reg, Reg::temp(2), Reg::temp(10), None, 0, true);

        // writing the value kills every copy of it
        cache.note_def(&mut reg, Reg::temp(1));

        assert_eq!(cache.holders(Reg::temp(1)).count(), 0);
        assert_eq!(cache.len(), 1);

        // writing the copy kills that copy
        cache.note_def(&mut reg, Reg::temp(10));

        assert!(cache.is_empty());
        assert_eq!(cache.value_of(&reg, Reg::temp(10)), None);
    }

    #[test]
    fn recording_over_a_copy_replaces_it() {
        let mut reg = registry();
        let mut cache = cache();

        cache.record_copy(&mut reg, Reg::temp(1), Reg::temp(8), None, 0, true);
        cache.record_copy(&mut reg, Reg::temp(2), Reg::temp(8), None, 1, true);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.value_of(&reg, Reg::temp(8)), Some(Reg::temp(2)));
        assert_eq!(cache.holders(Reg::temp(1)).count(), 0);
    }

    #[test]
    fn array_members_are_never_cached() {
        let mut reg = registry();
        let mut cache = cache();
        let id = reg.find_or_create(Reg::temp(8));

        reg.node_mut(id).payload = NodePayload::ArrayMember(Binding::key_new(0));

        assert_eq!(cache.record_copy(&mut reg, Reg::temp(1), Reg::temp(8), None, 0, true), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn deschedule_clears_everything() {
        let mut reg = registry();
        let mut cache = cache();

        cache.record_copy(&mut reg, Reg::temp(1), Reg::temp(8), None, 0, true);
        cache.record_copy(&mut reg, Reg::imm(0), Reg::temp(9), None, 0, false);
        cache.clear(&mut reg);

        assert!(cache.is_empty());
        assert_eq!(cache.holders(Reg::imm(0)).count(), 0);
    }

    #[test]
    fn dead_copies_follow_last_use() {
        let mut reg = registry();
        let mut cache = cache();

        cache.record_copy(&mut reg, Reg::temp(1), Reg::temp(8), None, 0, true);
        cache.record_copy(&mut reg, Reg::temp(2), Reg::temp(9), None, 0, true);
        cache.record_copy(&mut reg, Reg::temp(3), Reg::temp(10), None, 0, false);

        cache.note_use(&reg, Reg::temp(9), 3);

        let dead: Vec<Reg> = cache.dead_copies(2).map(|(_, r)| r.dest).collect();

        assert_eq!(dead, [Reg::temp(8)]);
        assert_eq!(cache.dead_copies(4).count(), 2);
    }
}
