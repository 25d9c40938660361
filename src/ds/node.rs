//! Node arena with intrusive circular list links.
//!
//! Stores every cache node in a `Vec` and links them by 32-bit index,
//! enabling stable handles and O(1) splice/move operations without raw
//! pointers.
//!
//! ## Architecture
//!
//! ```text
//!   pool (Vec<Node<K, V>>)
//!   ┌─────────┬──────────────────────────────────────────────────────┐
//!   │ NodeRef │ Node { prev, next, hash_next, refs, hash, key, value}│
//!   ├─────────┼──────────────────────────────────────────────────────┤
//!   │ 0       │ list sentinel (prev/next only)                       │
//!   │ 1       │ { key: A, prev: 0, next: 2, ... }                    │
//!   │ 2       │ { key: B, prev: 1, next: 0, ... }                    │
//!   └─────────┴──────────────────────────────────────────────────────┘
//!
//!   sentinel ──► [1] ◄──► [2] ◄── sentinel   (circular; sentinel.next is
//!                oldest        newest          the oldest entry)
//! ```
//!
//! Each node participates in exactly one doubly-linked list at a time via
//! `prev`/`next`, and in at most one hash-bucket chain via the separate
//! `hash_next` link. The list and the chain never share links.
//!
//! Indices stay valid for the lifetime of the pool: nodes are never removed
//! from the `Vec`, only re-threaded between lists, so the backing storage may
//! grow (e.g. on `install`) without invalidating outstanding [`Handle`]s.

use std::fmt;

/// Index of a node inside a [`NodePool`].
///
/// `NONE` is the chain terminator for `hash_next`; list links are always
/// valid indices because every list is circular with a sentinel head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeRef(pub(crate) u32);

impl NodeRef {
    pub(crate) const NONE: NodeRef = NodeRef(u32::MAX);

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque, copyable reference to a live cache node.
///
/// A handle is only meaningful together with the cache that issued it; the
/// cache exposes the node's key and value through accessor methods. Handles
/// compare equal exactly when they refer to the same slot of the same pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) NodeRef);

/// One tracked key: intrusive list links, hash-chain link, refcount, and the
/// caller-owned value slot.
///
/// The value slot is deliberately not reset when a node is recycled: the
/// slot models a stable physical resource (e.g. a frame pointer) whose
/// identity outlives any particular key. Callers overwrite it after
/// (re)insertion.
pub(crate) struct Node<K, V> {
    pub(crate) prev: NodeRef,
    pub(crate) next: NodeRef,
    pub(crate) hash_next: NodeRef,
    pub(crate) refs: u32,
    pub(crate) hash: u32,
    pub(crate) key: K,
    pub(crate) value: V,
}

impl<K, V> Node<K, V> {
    /// Re-keys the node for a (re)insertion. The value slot is untouched.
    #[inline]
    pub(crate) fn rekey(&mut self, key: K, hash: u32) {
        self.refs = 1;
        self.hash = hash;
        self.key = key;
    }
}

/// Growable arena of [`Node`]s addressed by [`NodeRef`].
pub struct NodePool<K, V> {
    nodes: Vec<Node<K, V>>,
}

impl<K, V> NodePool<K, V> {
    /// Creates an empty pool with room for `capacity` nodes before the
    /// backing vector reallocates.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Number of nodes ever allocated, sentinels included.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub(crate) fn get(&self, r: NodeRef) -> &Node<K, V> {
        &self.nodes[r.index()]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, r: NodeRef) -> &mut Node<K, V> {
        &mut self.nodes[r.index()]
    }

    #[inline]
    pub(crate) fn next_of(&self, r: NodeRef) -> NodeRef {
        self.nodes[r.index()].next
    }

    #[inline]
    pub(crate) fn prev_of(&self, r: NodeRef) -> NodeRef {
        self.nodes[r.index()].prev
    }
}

impl<K: Default, V: Default> NodePool<K, V> {
    /// Allocates a fresh node with no list membership.
    pub(crate) fn alloc_detached(&mut self) -> NodeRef {
        let r = NodeRef(u32::try_from(self.nodes.len()).expect("node pool exceeds u32 index space"));
        self.nodes.push(Node {
            prev: NodeRef::NONE,
            next: NodeRef::NONE,
            hash_next: NodeRef::NONE,
            refs: 0,
            hash: 0,
            key: K::default(),
            value: V::default(),
        });
        r
    }

    /// Allocates a sentinel that heads an empty circular list.
    pub(crate) fn new_list_head(&mut self) -> NodeRef {
        let r = self.alloc_detached();
        let node = self.get_mut(r);
        node.prev = r;
        node.next = r;
        r
    }
}

impl<K, V> NodePool<K, V> {
    /// Returns `true` if the circular list headed by `head` has no entries.
    #[inline]
    pub(crate) fn list_is_empty(&self, head: NodeRef) -> bool {
        self.next_of(head) == head
    }

    /// Unlinks `e` from whichever circular list holds it. `e`'s own links are
    /// left dangling; the next append rewrites them.
    #[inline]
    pub(crate) fn list_remove(&mut self, e: NodeRef) {
        let (prev, next) = {
            let node = self.get(e);
            (node.prev, node.next)
        };
        self.get_mut(prev).next = next;
        self.get_mut(next).prev = prev;
    }

    /// Links `e` just before `head`, making it the newest entry of the list.
    #[inline]
    pub(crate) fn list_append(&mut self, head: NodeRef, e: NodeRef) {
        let tail = self.prev_of(head);
        {
            let node = self.get_mut(e);
            node.next = head;
            node.prev = tail;
        }
        self.get_mut(tail).next = e;
        self.get_mut(head).prev = e;
    }

    /// Number of entries in the circular list headed by `head`. O(n).
    pub(crate) fn list_len(&self, head: NodeRef) -> usize {
        let mut count = 0;
        let mut cur = self.next_of(head);
        while cur != head {
            count += 1;
            cur = self.next_of(cur);
        }
        count
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn debug_validate_list(&self, head: NodeRef) {
        let mut count = 0;
        let mut cur = self.next_of(head);
        while cur != head {
            let node = self.get(cur);
            assert_eq!(self.get(node.next).prev, cur, "broken forward link");
            assert_eq!(self.get(node.prev).next, cur, "broken backward link");
            count += 1;
            assert!(count <= self.nodes.len(), "cycle without sentinel");
            cur = node.next;
        }
    }
}

impl<K, V> fmt::Debug for NodePool<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("len", &self.nodes.len())
            .finish_non_exhaustive()
    }
}
