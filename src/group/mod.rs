//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Resolution of consecutive-register requirements.
//!
//! Some instructions read or write several registers whose hardware numbers
//! have to follow each other, sometimes starting at an even or odd number.
//! Before physical allocation runs, every such requirement is recorded as a
//! chain of [`GroupNode`]s. When two requirements disagree about a register,
//! the instruction is repaired: its operands are reordered, replaced by
//! constants or earlier copies, the instruction is given a simpler encoding,
//! or the operands are copied into fresh registers.
//!
//! [`run_grouping`] drives the whole thing and hands back the frozen
//! [`GroupChains`] that the physical allocator has to obey.

mod chains;
mod context;
mod equiv;
mod link;
mod node;
mod options;
mod pass;
mod registry;
mod repair;
mod seed;
mod validate;

pub use chains::GroupChains;
pub use context::{GroupingContext, RepairStats};
pub use equiv::{CopyRecord, CopyRecordId, EquivalenceCache};
pub use node::{FixedBinding, GroupNode, GroupNodeId, NodePayload};
pub use options::GroupingOptions;
pub use pass::{run_grouping, GroupingOutput};
pub use registry::{ChainIter, GroupRegistry, Segment};
pub use seed::{seed_binding, seed_fixed_bindings};
pub use validate::{Conflict, Slot, Validation};

pub(crate) use repair::{PendingCopy, RepairEngine};
