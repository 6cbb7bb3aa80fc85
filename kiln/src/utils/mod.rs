//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the scheduler.
//! In particular, it exposes a [`Slab`] allocator backing the future arena:
//! every future lives in one slot and is addressed by its index.

mod slab;

pub(crate) use slab::Slab;
