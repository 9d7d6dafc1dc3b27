// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Intrusive circular doubly-linked queues over an index arena.
//!
//! Every queue participant is a [`Node`] in one [`Pool`]: signal roots, the
//! per-task membership link, per-task joined roots, the scheduler's system
//! sets, and short-lived scratch roots. A queue is a cycle of nodes through
//! one *root*; the root's `next` is the oldest member, and [`Pool::append`]
//! inserts before the root, so walking `next` from the root visits members in
//! FIFO order.
//!
//! Using arena indices instead of pointers keeps the structure in safe code
//! while preserving the two properties the scheduler is built on: a member
//! can unlink itself in O(1) without knowing which queue it is in, and an
//! entire queue can be spliced onto a different root in O(1)
//! ([`Pool::replace`]).
//!
//! A node with `prev == None` is **invalidated**: the terminal state of a
//! deleted signal and of the joined queue of a completed task. Appending to
//! an invalidated root is a no-op, which is how "cannot wait on a deleted
//! signal" falls out of the representation.

use core::fmt;
use slab::Slab;

/// Index of a node in a [`Pool`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeRef(usize);

/// What a node stands for, so a queue walk can map members back to tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeOwner {
    /// A queue root: a signal, a joined queue, a system set or a scratch
    /// queue. Roots are never members of another queue.
    Root,
    /// The membership link of the task at this slot index.
    Task(usize),
}

#[derive(Debug)]
struct Node {
    /// `None` marks an invalidated node; otherwise both links are always set
    /// and a solitary node is linked to itself.
    prev: Option<NodeRef>,
    next: Option<NodeRef>,
    owner: NodeOwner,
}

/// The arena all queue nodes live in.
#[derive(Debug, Default)]
pub(crate) struct Pool {
    nodes: Slab<Node>,
}

// === impl NodeRef ===

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

// === impl Pool ===

impl Pool {
    pub(crate) fn new() -> Self {
        Self { nodes: Slab::new() }
    }

    /// Allocate a fresh, self-linked node.
    pub(crate) fn alloc(&mut self, owner: NodeOwner) -> NodeRef {
        let key = self.nodes.insert(Node {
            prev: None,
            next: None,
            owner,
        });
        let n = NodeRef(key);
        self.init(n);
        n
    }

    /// Return a node to the arena. The node must not be linked to others.
    pub(crate) fn free(&mut self, n: NodeRef) {
        debug_assert!(!self.is_linked(n), "freed node is still queued");
        self.nodes.remove(n.0);
    }

    pub(crate) fn owner(&self, n: NodeRef) -> Option<NodeOwner> {
        self.nodes.get(n.0).map(|node| node.owner)
    }

    /// The task owning `n`, if `n` is a task membership link.
    pub(crate) fn owner_task(&self, n: NodeRef) -> Option<usize> {
        match self.owner(n) {
            Some(NodeOwner::Task(idx)) => Some(idx),
            _ => None,
        }
    }

    /// (Re-)initialize `n` as an empty, self-linked queue.
    pub(crate) fn init(&mut self, n: NodeRef) {
        if let Some(node) = self.nodes.get_mut(n.0) {
            node.prev = Some(n);
            node.next = Some(n);
        }
    }

    /// A node is valid while its links are intact.
    pub(crate) fn is_valid(&self, n: NodeRef) -> bool {
        self.nodes.get(n.0).is_some_and(|node| node.prev.is_some())
    }

    pub(crate) fn invalidate(&mut self, n: NodeRef) {
        if let Some(node) = self.nodes.get_mut(n.0) {
            node.prev = None;
            node.next = None;
        }
    }

    /// True when `n` is linked into a cycle with at least one other node.
    /// For a root this means the queue is non-empty.
    pub(crate) fn is_linked(&self, n: NodeRef) -> bool {
        self.nodes
            .get(n.0)
            .is_some_and(|node| node.prev.is_some() && node.prev != Some(n))
    }

    /// Unlink `n` from its queue. Idempotent, and a no-op for invalidated
    /// nodes. The node's own links are deliberately left untouched so an
    /// in-flight walk that snapshotted `n` can still read its old `next`.
    pub(crate) fn remove_self(&mut self, n: NodeRef) {
        let Some(node) = self.nodes.get(n.0) else {
            return;
        };
        let (Some(prev), Some(next)) = (node.prev, node.next) else {
            return;
        };
        if prev == n {
            return;
        }
        self.nodes[prev.0].next = Some(next);
        self.nodes[next.0].prev = Some(prev);
    }

    /// Move `n` to the tail of the queue rooted at `to`, preserving FIFO
    /// order at `to`. `n` is unlinked from its previous queue first. When
    /// `to` has been invalidated, `n` ends up unlinked.
    pub(crate) fn append(&mut self, n: NodeRef, to: NodeRef) {
        debug_assert_ne!(n, to);
        self.remove_self(n);
        let Some(last) = self.nodes[to.0].prev else {
            // the target was deleted; leave `n` out of any queue
            self.init(n);
            return;
        };
        self.nodes[n.0].prev = Some(last);
        self.nodes[last.0].next = Some(n);
        self.nodes[n.0].next = Some(to);
        self.nodes[to.0].prev = Some(n);
    }

    /// Re-root the cycle of `from` at `into`, invalidating `from`. An empty
    /// or already invalidated `from` leaves `into` empty; `into`'s previous
    /// links are overwritten.
    pub(crate) fn replace(&mut self, into: NodeRef, from: NodeRef) {
        debug_assert_ne!(into, from);
        if self.is_linked(from) {
            let Some(node) = self.nodes.get(from.0) else {
                return;
            };
            let (Some(first), Some(last)) = (node.next, node.prev) else {
                return;
            };
            self.nodes[into.0].prev = Some(last);
            self.nodes[last.0].next = Some(into);
            self.nodes[into.0].next = Some(first);
            self.nodes[first.0].prev = Some(into);
            self.invalidate(from);
        } else {
            self.init(into);
            if self.is_valid(from) {
                self.invalidate(from);
            }
        }
    }

    /// The first (oldest) member of `root`, or `None` when the queue is
    /// empty or the root has been invalidated.
    pub(crate) fn first(&self, root: NodeRef) -> Option<NodeRef> {
        self.walk(root, None)
    }

    /// The member after `curr`, or the first member when `curr` is `None`;
    /// `None` once the walk wraps around to the root.
    ///
    /// `curr` may have been unlinked since it was returned, as long as its
    /// own links have not been rewritten; callers that re-park the current
    /// member must snapshot its successor first.
    pub(crate) fn walk(&self, root: NodeRef, curr: Option<NodeRef>) -> Option<NodeRef> {
        if curr.is_none() && !self.is_linked(root) {
            return None;
        }
        let at = curr.unwrap_or(root);
        let next = self.nodes.get(at.0)?.next?;
        if next == root { None } else { Some(next) }
    }

    pub(crate) fn count(&self, root: NodeRef) -> usize {
        let mut n = 0;
        let mut curr = None;
        while let Some(node) = self.walk(root, curr) {
            n += 1;
            curr = Some(node);
        }
        n
    }

    /// Member at position `idx`. Negative indices count from the tail, so
    /// `-1` is the newest member. `None` for out-of-range positions and for
    /// invalidated roots.
    pub(crate) fn index(&self, root: NodeRef, idx: isize) -> Option<NodeRef> {
        if !self.is_valid(root) {
            return None;
        }
        if idx >= 0 {
            let mut curr = None;
            for _ in 0..=idx {
                curr = Some(self.walk(root, curr)?);
            }
            curr
        } else {
            let mut at = root;
            let mut idx = idx;
            while idx < 0 {
                let prev = self.nodes.get(at.0)?.prev?;
                if prev == root {
                    return None;
                }
                at = prev;
                idx += 1;
            }
            Some(at)
        }
    }
}
