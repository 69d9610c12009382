//! A sorted, singly linked set of integer keys.
//!
//! The set does no synchronization of its own. To share one between threads, put it in an
//! [`RwLock`]: membership tests go through a read guard, inserts and removals through a write
//! guard.
//!
//! [`RwLock`]: ../rwlock/struct.RwLock.html

use std::alloc::{self, Layout};
use std::fmt;

use crate::error::SetError;

type Link = Option<Box<Node>>;

struct Node {
    key: i64,
    next: Link,
}

/// A collection of unique `i64` keys kept in ascending order in a singly linked chain.
///
/// Each node is owned by its predecessor, and the set owns the first node. Every operation is a
/// linear scan from the front, stopping at the first key that is not smaller than the one being
/// looked for.
///
/// `OrderedSet` is not internally synchronized. `contains` takes `&self` and `insert`/`remove`
/// take `&mut self`, so when the set lives inside an [`RwLock`] the borrow rules line up with the
/// lock modes: readers can test membership together, and a writer gets the set to itself.
///
/// [`RwLock`]: ../rwlock/struct.RwLock.html
///
/// # Example
///
/// ```
/// use rwfair::OrderedSet;
///
/// let mut set = OrderedSet::new();
/// assert!(set.insert(5).unwrap());
/// assert!(set.insert(3).unwrap());
/// assert!(set.insert(8).unwrap());
/// assert!(!set.insert(5).unwrap());
///
/// assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 5, 8]);
///
/// assert!(set.remove(5));
/// assert!(!set.contains(5));
/// assert_eq!(set.len(), 2);
/// ```
pub struct OrderedSet {
    head: Link,
    len: usize,
}

impl OrderedSet {
    /// Creates a new, empty `OrderedSet`.
    pub fn new() -> OrderedSet {
        OrderedSet { head: None, len: 0 }
    }

    /// Returns the number of keys in the set.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the set has no keys.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns whether `key` is in the set.
    pub fn contains(&self, key: i64) -> bool {
        self.iter().find(|&k| k >= key) == Some(key)
    }

    /// Adds `key` to the set at its sorted position, returning whether it was newly added.
    ///
    /// If `key` is already present, the set is left unchanged and this returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// If memory for the new node can't be allocated, this returns `SetError::Alloc` and the set
    /// is left unchanged.
    pub fn insert(&mut self, key: i64) -> Result<bool, SetError> {
        let link = self.seek(key);

        if link.as_ref().map_or(false, |node| node.key == key) {
            return Ok(false);
        }

        let mut node = alloc_node(key)?;
        node.next = link.take();
        *link = Some(node);

        self.len += 1;
        Ok(true)
    }

    /// Removes `key` from the set, returning whether it was present.
    ///
    /// If `key` is absent, the set is left unchanged and this returns `false`.
    pub fn remove(&mut self, key: i64) -> bool {
        let link = self.seek(key);

        match link.take() {
            Some(node) if node.key == key => {
                // the removed node's successor moves up into its predecessor's link
                let Node { next, .. } = *node;
                *link = next;

                self.len -= 1;
                true
            }
            other => {
                *link = other;
                false
            }
        }
    }

    /// Removes every key, freeing all the nodes.
    pub fn clear(&mut self) {
        let mut link = self.head.take();
        while let Some(mut node) = link {
            link = node.next.take();
        }
        self.len = 0;
    }

    /// Returns an iterator over the keys in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    // The link holding the first node whose key is not smaller than `key`, or the trailing
    // `None` if every key is smaller.
    fn seek(&mut self, key: i64) -> &mut Link {
        let mut link = &mut self.head;
        while link.as_ref().map_or(false, |node| node.key < key) {
            if let Some(node) = link {
                link = &mut node.next;
            }
        }
        link
    }
}

// Box::new aborts the process when the allocator comes back empty, so nodes are allocated by
// hand to report that as an error instead.
fn alloc_node(key: i64) -> Result<Box<Node>, SetError> {
    let layout = Layout::new::<Node>();

    // Node is never zero-sized
    let ptr = unsafe { alloc::alloc(layout) } as *mut Node;
    if ptr.is_null() {
        return Err(SetError::Alloc {
            size: layout.size(),
        });
    }

    unsafe {
        ptr.write(Node { key: key, next: None });
        Ok(Box::from_raw(ptr))
    }
}

impl Default for OrderedSet {
    fn default() -> OrderedSet {
        OrderedSet::new()
    }
}

/// Frees the chain one node at a time, so dropping a long set can't overflow the stack.
impl Drop for OrderedSet {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for OrderedSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a OrderedSet {
    type Item = i64;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Iterator over the keys of an [`OrderedSet`], in ascending order.
///
/// [`OrderedSet`]: struct.OrderedSet.html
pub struct Iter<'a> {
    next: Option<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        self.next.map(|node| {
            self.next = node.next.as_deref();
            node.key
        })
    }
}
