//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::arena::SecondaryMap;
use crate::ir::{Block, Inst};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct InstNode {
    prev: Option<Inst>,
    next: Option<Inst>,
    block: Block,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct BlockNode {
    next: Option<Block>,
    first: Option<Inst>,
    last: Option<Inst>,
}

/// Allows the blocks in a layout to be iterated over in program order.
#[derive(Copy, Clone, Debug)]
pub struct BlockIter<'layout> {
    next: Option<Block>,
    layout: &'layout Layout,
}

impl<'l> Iterator for BlockIter<'l> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|block| {
            self.next = self.layout.blocks[block].next;

            block
        })
    }
}

/// Allows all of the instructions in a given block to be iterated over.
#[derive(Copy, Clone, Debug)]
pub struct InstIter<'layout> {
    next: Option<Inst>,
    layout: &'layout Layout,
}

impl<'l> Iterator for InstIter<'l> {
    type Item = Inst;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|inst| {
            self.next = self.layout.nodes[inst].next;

            inst
        })
    }
}

/// Models the order of every block and instruction in a function.
///
/// Each block is a doubly-linked list of instructions, so copies can be
/// spliced in around an instruction without invalidating anything that
/// refers to the instructions already there.
#[derive(Default, Clone, Debug)]
pub struct Layout {
    blocks: SecondaryMap<Block, BlockNode>,
    nodes: SecondaryMap<Inst, InstNode>,
    head: Option<Block>,
    tail: Option<Block>,
}

impl Layout {
    /// Creates an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block to the end of the program order.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(
            !self.blocks.contains(block),
            "cannot insert block that is already inserted"
        );

        match self.tail.replace(block) {
            Some(prev) => self.blocks[prev].next = Some(block),
            None => self.head = Some(block),
        }

        self.blocks.insert(
            block,
            BlockNode {
                next: None,
                first: None,
                last: None,
            },
        );
    }

    /// Adds a block that holds instructions but is not part of the program
    /// order, e.g. a preamble.
    pub fn add_detached_block(&mut self, block: Block) {
        debug_assert!(!self.blocks.contains(block));

        self.blocks.insert(
            block,
            BlockNode {
                next: None,
                first: None,
                last: None,
            },
        );
    }

    /// Appends an instruction to the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert!(
            !self.nodes.contains(inst),
            "cannot insert same inst multiple times"
        );

        let node = &mut self.blocks[block];
        let prev = node.last.replace(inst);

        match prev {
            Some(prev) => self.nodes[prev].next = Some(inst),
            None => node.first = Some(inst),
        }

        self.nodes.insert(
            inst,
            InstNode {
                prev,
                next: None,
                block,
            },
        );
    }

    /// Inserts `inst` at the start of `block`.
    pub fn prepend_inst(&mut self, inst: Inst, block: Block) {
        match self.blocks[block].first {
            Some(first) => self.insert_inst_before(inst, first),
            None => self.append_inst(inst, block),
        }
    }

    /// Inserts `inst` into the same block as `before`, directly before it.
    pub fn insert_inst_before(&mut self, inst: Inst, before: Inst) {
        debug_assert!(
            !self.nodes.contains(inst),
            "cannot insert same inst multiple times"
        );

        let InstNode { prev, block, .. } = self.nodes[before];

        self.nodes[before].prev = Some(inst);

        // no previous instruction means we're the new head of the block
        match prev {
            Some(prev) => self.nodes[prev].next = Some(inst),
            None => self.blocks[block].first = Some(inst),
        }

        self.nodes.insert(
            inst,
            InstNode {
                prev,
                next: Some(before),
                block,
            },
        );
    }

    /// Inserts `inst` into the same block as `after`, directly after it.
    pub fn insert_inst_after(&mut self, inst: Inst, after: Inst) {
        debug_assert!(
            !self.nodes.contains(inst),
            "cannot insert same inst multiple times"
        );

        let InstNode { next, block, .. } = self.nodes[after];

        self.nodes[after].next = Some(inst);

        match next {
            Some(next) => self.nodes[next].prev = Some(inst),
            None => self.blocks[block].last = Some(inst),
        }

        self.nodes.insert(
            inst,
            InstNode {
                prev: Some(after),
                next,
                block,
            },
        );
    }

    /// Removes an instruction from the layout.
    pub fn remove_inst(&mut self, inst: Inst) {
        let Some(node) = self.nodes.remove(inst) else {
            debug_assert!(false, "removing {inst:?} which is not in the layout");
            return;
        };

        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.blocks[node.block].first = node.next,
        }

        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.blocks[node.block].last = node.prev,
        }
    }

    /// Checks if an instruction is currently in the layout.
    pub fn is_inst_inserted(&self, inst: Inst) -> bool {
        self.nodes.contains(inst)
    }

    /// The blocks in program order. Detached blocks are not included.
    pub fn blocks(&self) -> BlockIter<'_> {
        BlockIter {
            next: self.head,
            layout: self,
        }
    }

    /// Every instruction in `block`, in order.
    pub fn insts_in_block(&self, block: Block) -> InstIter<'_> {
        InstIter {
            next: self.blocks[block].first,
            layout: self,
        }
    }

    /// The first block in program order.
    pub fn entry_block(&self) -> Option<Block> {
        self.head
    }

    /// The last block in program order.
    pub fn exit_block(&self) -> Option<Block> {
        self.tail
    }

    /// Gets the first instruction in `block`
    pub fn block_first_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].first
    }

    /// Gets the last instruction in `block`
    pub fn block_last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last
    }

    /// Gets the instruction that comes after `inst`
    pub fn inst_next(&self, inst: Inst) -> Option<Inst> {
        self.nodes[inst].next
    }

    /// Gets the instruction that comes before `inst`
    pub fn inst_prev(&self, inst: Inst) -> Option<Inst> {
        self.nodes[inst].prev
    }

    /// Gets the block that an instruction is in
    pub fn inst_block(&self, inst: Inst) -> Block {
        self.nodes[inst].block
    }
}
