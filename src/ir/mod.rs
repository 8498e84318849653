//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! The instruction model the grouping pass operates on.
//!
//! Functions are blocks of instructions over virtual registers, plus the
//! fixed register descriptors a front-end attaches and a preamble for values
//! that are the same in every invocation.

mod binding;
mod entities;
mod function;
mod inst;
mod layout;
mod reg;

pub use binding::*;
pub use entities::*;
pub use function::*;
pub use inst::*;
pub use layout::*;
pub use reg::*;
