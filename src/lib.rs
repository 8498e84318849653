//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

#![deny(
    unreachable_pub,
    missing_docs,
    missing_abi,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links
)]

//! # Regroup
//!
//! Resolves the consecutive-register requirements of a shader function
//! before physical register allocation.
//!
//! A front-end builds an [`ir::Function`], declares its fixed register
//! descriptors, and calls [`run_grouping`] with a [`isa::ShaderTarget`].
//! The function is repaired in place until every requirement can be met
//! at once, and the resulting [`GroupChains`] are handed to the physical
//! allocator.
//!
//! ```
//! # use regroup::ir::*;
//! # use regroup::isa::UscTarget;
//! # use regroup::{run_grouping, GroupingOptions};
//! let mut func = Function::new("main");
//! let entry = func.create_block("entry");
//! let regs: Vec<Reg> = (0..4).map(Reg::temp).collect();
//!
//! func.append(entry, InstData::smp(&regs[..2], &regs[2..]));
//!
//! let output = run_grouping(&mut func, &UscTarget::new(), GroupingOptions::default()).unwrap();
//!
//! assert_eq!(output.stats.groups_repaired, 0);
//! ```

pub mod arena;
pub mod error;
pub mod group;
pub mod ir;
pub mod isa;
pub mod utility;

pub use error::{GroupError, GroupResult};
pub use group::{run_grouping, GroupChains, GroupingOptions, GroupingOutput, RepairStats};
