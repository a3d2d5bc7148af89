//! Resource-control (RC) entropy partitioning: a recursive
//! tree that carves the shared 64-bit entropy keyspace into named
//! sub-accounts, mirroring the original source's `BlockChainEnv`/
//! `KeySpace` hierarchy. This module touches only entropy-offset
//! bookkeeping — it is never consulted by [`crate::signing`],
//! [`crate::level`], [`crate::ots`] or [`crate::validator`], and is unit
//! tested independently of the signing hot path.
//!
//! The original's duck-typed `__getitem__` path walking becomes a plain
//! `child`/`path` lookup over an immutable, `BTreeMap`-backed value.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::index;

/// One node of a resource-control tree: either a leaf account (its own
/// hypertree of `heights`) or an internal node that additionally
/// reserves entropy for named children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcNode {
    heights: Vec<usize>,
    reserve_bits: Option<u32>,
    children: BTreeMap<String, RcNode>,
}

impl RcNode {
    /// A leaf node: an account with its own hypertree `heights` and no
    /// delegated sub-accounts.
    pub fn leaf(heights: Vec<usize>) -> Self {
        Self {
            heights,
            reserve_bits: None,
            children: BTreeMap::new(),
        }
    }

    /// Attaches a named child. Later calls with the same `name` replace
    /// the earlier child.
    pub fn with_child(mut self, name: impl Into<String>, child: RcNode) -> Self {
        self.children.insert(name.into(), child);
        self
    }

    /// Reserves a fixed, shared `2^bits`-slot pool for this node's
    /// children, instead of letting each child's reservation be sized
    /// exactly to its own worst-case usage ("allocated vs shared"
    /// distinction). Every child's combined usage must still fit inside
    /// the reserved pool; [`Self::keyspace_usage`] enforces this.
    pub fn reserving(mut self, bits: u32) -> Self {
        self.reserve_bits = Some(bits);
        self
    }

    pub fn heights(&self) -> &[usize] {
        &self.heights
    }

    /// Looks up an immediate child by name.
    pub fn child(&self, name: &str) -> Option<&RcNode> {
        self.children.get(name)
    }

    /// Walks a dotted path of child names, returning the node at the end
    /// (or `None` if any segment is missing).
    pub fn path(&self, segments: &[&str]) -> Option<&RcNode> {
        let mut node = self;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Worst-case total entropy this node and everything beneath it
    /// could consume, mirroring `_keyspace_usage`/`_sub_keyspace_usage`
    /// of the grounding source:
    ///
    ///   - a leaf (no children) is exactly [`index::keyspace_usage`] over
    ///     its own `heights`;
    ///   - an internal node is its own `heights`' usage plus a
    ///     reservation for its children: either the fixed `2^bits` pool
    ///     from [`Self::reserving`] (shared — must be large enough for
    ///     every child's combined worst case), or, if unreserved, the sum
    ///     of each child's own worst case (allocated individually).
    ///
    /// Returns `Error::ConfigInvalid` if the total would not fit in 64
    /// bits, or if an explicit reservation is too small for its children.
    pub fn keyspace_usage(&self, hashlen: usize, otsbits: usize) -> Result<u64, Error> {
        let own = index::keyspace_usage(hashlen, otsbits, &self.heights, None)? as u128;

        if self.children.is_empty() {
            return Ok(own as u64);
        }

        let mut child_sum: u128 = 0;
        for child in self.children.values() {
            child_sum += child.keyspace_usage(hashlen, otsbits)? as u128;
        }

        let reserved = match self.reserve_bits {
            Some(bits) => {
                let pool = 1u128 << bits;
                if pool < child_sum {
                    return Err(Error::ConfigInvalid(format!(
                        "reserved pool of 2^{} slots is too small for children's combined usage of {}",
                        bits, child_sum
                    )));
                }
                pool
            }
            None => child_sum,
        };

        let total = own + reserved;
        if total > u64::MAX as u128 {
            return Err(Error::ConfigInvalid(format!(
                "resource-control tree's worst-case usage ({}) exceeds 64 bits",
                total
            )));
        }
        Ok(total as u64)
    }
}
