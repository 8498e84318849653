//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Errors that abort the grouping pass.

use std::error::Error;
use std::fmt;

/// The ways the grouping pass can fail. All of them abort the compile of
/// the current function, there is no partial recovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupError {
    /// Fresh virtual registers were needed and the function ran out.
    OutOfRegisters {
        /// How many registers were asked for in the failing request.
        requested: usize,
    },
    /// A copy or replacement instruction could not be created.
    OutOfInstructions,
    /// An invariant of the constraint graph was violated, or a fixed-binding
    /// conflict could not be resolved. This is always a bug somewhere.
    Internal(String),
}

impl GroupError {
    /// Shorthand for [`GroupError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        GroupError::Internal(message.into())
    }
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupError::OutOfRegisters { requested } => {
                write!(f, "out of virtual registers (requested {requested})")
            }
            GroupError::OutOfInstructions => write!(f, "unable to allocate instruction"),
            GroupError::Internal(message) => write!(f, "internal grouping error: {message}"),
        }
    }
}

impl Error for GroupError {}

/// Result alias used throughout the crate.
pub type GroupResult<T> = Result<T, GroupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            GroupError::OutOfRegisters { requested: 3 }.to_string(),
            "out of virtual registers (requested 3)"
        );
        assert_eq!(
            GroupError::internal("cycle").to_string(),
            "internal grouping error: cycle"
        );
    }
}
