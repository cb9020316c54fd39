// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Support containers used across the daemons.
//!
//! All of them keep their elements in an arena (`Vec`) and link by index
//! rather than pointer, so ownership stays with the container and the
//! back references (`prev`, `parent`) cost nothing to keep sound.

mod links;
mod pathtree;
mod rbtree;
mod seq;

pub use links::{LinkId, LinkList, TiePolicy};
pub use pathtree::{NodeId, PathTree};
pub use rbtree::RbTree;
pub use seq::Sequence;
