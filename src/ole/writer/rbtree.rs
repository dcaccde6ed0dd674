//! Red-black tree used to index the children of a storage
//!
//! Every storage in a compound file points at the root of a red-black tree
//! of its immediate children, and each child record carries its own left
//! and right sibling links and color. [`RbTree`] maintains that structure
//! while entries are added and removed so it can be serialized as-is.
//!
//! # Implementation Notes
//!
//! - Nodes live in a dense arena and link to each other by index; a missing
//!   child is `None` and counts as a black leaf
//! - Removing a node moves the last arena slot into the hole and patches
//!   the links that pointed at the moved node
//! - Insert and delete fixups are the textbook ones (uncle recoloring,
//!   rotate-and-recolor), with the parent of a vanished leaf tracked
//!   explicitly during delete
//! - Iterators walk with an explicit stack and start from a fresh path
//!   each time; the tree cannot be mutated while one is alive

use crate::common::{Error, Result};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// Node color, as stored in the directory record (red = 0, black = 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Red = 0,
    Black = 1,
}

#[derive(Debug, Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    color: Color,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
}

/// Structural view of one node, for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLinks<K> {
    pub color: Color,
    pub left: Option<K>,
    pub right: Option<K>,
}

/// Ordered map implemented as a red-black tree over an index arena.
#[derive(Debug, Clone)]
pub struct RbTree<K, V> {
    nodes: Vec<Node<K, V>>,
    root: Option<usize>,
}

impl<K, V> Default for RbTree<K, V> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }
}

impl<K: Ord + Copy + fmt::Display, V> RbTree<K, V> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Key stored at the root, if any.
    pub fn root_key(&self) -> Option<K> {
        self.root.map(|i| self.nodes[i].key)
    }

    /// Insert `key` with `value`.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if `key` is already present; the tree is unchanged.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        let mut parent = None;
        let mut cursor = self.root;
        let mut goes_left = false;

        while let Some(current) = cursor {
            parent = Some(current);
            match key.cmp(&self.nodes[current].key) {
                Ordering::Less => {
                    goes_left = true;
                    cursor = self.nodes[current].left;
                },
                Ordering::Greater => {
                    goes_left = false;
                    cursor = self.nodes[current].right;
                },
                Ordering::Equal => return Err(Error::DuplicateKey(key.to_string())),
            }
        }

        let index = self.nodes.len();
        self.nodes.push(Node {
            key,
            value,
            color: Color::Red,
            parent,
            left: None,
            right: None,
        });

        match parent {
            None => self.root = Some(index),
            Some(p) if goes_left => self.nodes[p].left = Some(index),
            Some(p) => self.nodes[p].right = Some(index),
        }

        self.insert_fixup(index);
        Ok(())
    }

    /// Remove `key`, returning its value. Absent keys are ignored.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let z = self.find(key)?;
        let mut removed_color = self.nodes[z].color;
        let x;
        let x_parent;

        match (self.nodes[z].left, self.nodes[z].right) {
            (None, right) => {
                x = right;
                x_parent = self.nodes[z].parent;
                self.transplant(z, right);
            },
            (left, None) => {
                x = left;
                x_parent = self.nodes[z].parent;
                self.transplant(z, left);
            },
            (Some(z_left), Some(z_right)) => {
                let y = self.minimum(z_right);
                removed_color = self.nodes[y].color;
                x = self.nodes[y].right;

                if self.nodes[y].parent == Some(z) {
                    x_parent = Some(y);
                } else {
                    x_parent = self.nodes[y].parent;
                    self.transplant(y, x);
                    self.nodes[y].right = Some(z_right);
                    self.nodes[z_right].parent = Some(y);
                }

                self.transplant(z, Some(y));
                self.nodes[y].left = Some(z_left);
                self.nodes[z_left].parent = Some(y);
                self.nodes[y].color = self.nodes[z].color;
            },
        }

        if removed_color == Color::Black {
            self.delete_fixup(x, x_parent);
        }

        Some(self.release(z))
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|i| &self.nodes[i].value)
    }

    /// Mutable value stored under `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.find(key).map(|i| &mut self.nodes[i].value)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Smallest key and its value.
    pub fn min(&self) -> Option<(&K, &V)> {
        self.root.map(|r| {
            let node = &self.nodes[self.minimum(r)];
            (&node.key, &node.value)
        })
    }

    /// Largest key and its value.
    pub fn max(&self) -> Option<(&K, &V)> {
        self.root.map(|r| {
            let node = &self.nodes[self.maximum(r)];
            (&node.key, &node.value)
        })
    }

    /// Color and child keys of the node holding `key`.
    pub fn links(&self, key: &K) -> Option<NodeLinks<K>> {
        self.find(key).map(|i| {
            let node = &self.nodes[i];
            NodeLinks {
                color: node.color,
                left: node.left.map(|l| self.nodes[l].key),
                right: node.right.map(|r| self.nodes[r].key),
            }
        })
    }

    /// Ascending iteration over `(key, value)` pairs.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self, false)
    }

    /// Descending iteration over `(key, value)` pairs.
    pub fn iter_rev(&self) -> Iter<'_, K, V> {
        Iter::new(self, true)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| *k)
    }

    fn find(&self, key: &K) -> Option<usize> {
        let mut cursor = self.root;
        while let Some(current) = cursor {
            cursor = match key.cmp(&self.nodes[current].key) {
                Ordering::Less => self.nodes[current].left,
                Ordering::Greater => self.nodes[current].right,
                Ordering::Equal => return Some(current),
            };
        }
        None
    }

    fn minimum(&self, mut index: usize) -> usize {
        while let Some(left) = self.nodes[index].left {
            index = left;
        }
        index
    }

    fn maximum(&self, mut index: usize) -> usize {
        while let Some(right) = self.nodes[index].right {
            index = right;
        }
        index
    }

    #[inline]
    fn is_red(&self, index: Option<usize>) -> bool {
        index.is_some_and(|i| self.nodes[i].color == Color::Red)
    }

    #[inline]
    fn paint(&mut self, index: Option<usize>, color: Color) {
        if let Some(i) = index {
            self.nodes[i].color = color;
        }
    }

    /// Point `old`'s parent at `new` instead of `old`.
    fn replace_child(&mut self, parent: Option<usize>, old: usize, new: Option<usize>) {
        match parent {
            None => self.root = new,
            Some(p) if self.nodes[p].left == Some(old) => self.nodes[p].left = new,
            Some(p) => self.nodes[p].right = new,
        }
    }

    fn transplant(&mut self, old: usize, new: Option<usize>) {
        let parent = self.nodes[old].parent;
        self.replace_child(parent, old, new);
        if let Some(n) = new {
            self.nodes[n].parent = parent;
        }
    }

    fn rotate_left(&mut self, x: usize) {
        let Some(y) = self.nodes[x].right else {
            return;
        };
        let inner = self.nodes[y].left;
        self.nodes[x].right = inner;
        if let Some(i) = inner {
            self.nodes[i].parent = Some(x);
        }
        self.transplant(x, Some(y));
        self.nodes[y].left = Some(x);
        self.nodes[x].parent = Some(y);
    }

    fn rotate_right(&mut self, x: usize) {
        let Some(y) = self.nodes[x].left else {
            return;
        };
        let inner = self.nodes[y].right;
        self.nodes[x].left = inner;
        if let Some(i) = inner {
            self.nodes[i].parent = Some(x);
        }
        self.transplant(x, Some(y));
        self.nodes[y].right = Some(x);
        self.nodes[x].parent = Some(y);
    }

    fn insert_fixup(&mut self, mut z: usize) {
        loop {
            let Some(p) = self.nodes[z].parent else {
                break;
            };
            if self.nodes[p].color == Color::Black {
                break;
            }
            // A red parent is never the root, so the grandparent exists
            let Some(g) = self.nodes[p].parent else {
                break;
            };

            if self.nodes[g].left == Some(p) {
                let uncle = self.nodes[g].right;
                if self.is_red(uncle) {
                    self.nodes[p].color = Color::Black;
                    self.paint(uncle, Color::Black);
                    self.nodes[g].color = Color::Red;
                    z = g;
                    continue;
                }
                let mut p = p;
                if self.nodes[p].right == Some(z) {
                    self.rotate_left(p);
                    z = p;
                    p = self.nodes[z].parent.unwrap_or(g);
                }
                self.nodes[p].color = Color::Black;
                self.nodes[g].color = Color::Red;
                self.rotate_right(g);
            } else {
                let uncle = self.nodes[g].left;
                if self.is_red(uncle) {
                    self.nodes[p].color = Color::Black;
                    self.paint(uncle, Color::Black);
                    self.nodes[g].color = Color::Red;
                    z = g;
                    continue;
                }
                let mut p = p;
                if self.nodes[p].left == Some(z) {
                    self.rotate_right(p);
                    z = p;
                    p = self.nodes[z].parent.unwrap_or(g);
                }
                self.nodes[p].color = Color::Black;
                self.nodes[g].color = Color::Red;
                self.rotate_left(g);
            }
        }
        self.paint(self.root, Color::Black);
    }

    fn delete_fixup(&mut self, mut x: Option<usize>, mut x_parent: Option<usize>) {
        while x != self.root && !self.is_red(x) {
            let Some(p) = x_parent else {
                break;
            };

            if x == self.nodes[p].left {
                let mut w = self.nodes[p].right;
                if self.is_red(w) {
                    self.paint(w, Color::Black);
                    self.nodes[p].color = Color::Red;
                    self.rotate_left(p);
                    w = self.nodes[p].right;
                }
                // The sibling of a doubly-black node always exists
                let Some(s) = w else {
                    break;
                };
                if !self.is_red(self.nodes[s].left) && !self.is_red(self.nodes[s].right) {
                    self.nodes[s].color = Color::Red;
                    x = Some(p);
                    x_parent = self.nodes[p].parent;
                } else {
                    let mut s = s;
                    if !self.is_red(self.nodes[s].right) {
                        self.paint(self.nodes[s].left, Color::Black);
                        self.nodes[s].color = Color::Red;
                        self.rotate_right(s);
                        s = match self.nodes[p].right {
                            Some(s) => s,
                            None => break,
                        };
                    }
                    self.nodes[s].color = self.nodes[p].color;
                    self.nodes[p].color = Color::Black;
                    self.paint(self.nodes[s].right, Color::Black);
                    self.rotate_left(p);
                    x = self.root;
                    x_parent = None;
                }
            } else {
                let mut w = self.nodes[p].left;
                if self.is_red(w) {
                    self.paint(w, Color::Black);
                    self.nodes[p].color = Color::Red;
                    self.rotate_right(p);
                    w = self.nodes[p].left;
                }
                let Some(s) = w else {
                    break;
                };
                if !self.is_red(self.nodes[s].left) && !self.is_red(self.nodes[s].right) {
                    self.nodes[s].color = Color::Red;
                    x = Some(p);
                    x_parent = self.nodes[p].parent;
                } else {
                    let mut s = s;
                    if !self.is_red(self.nodes[s].left) {
                        self.paint(self.nodes[s].right, Color::Black);
                        self.nodes[s].color = Color::Red;
                        self.rotate_left(s);
                        s = match self.nodes[p].left {
                            Some(s) => s,
                            None => break,
                        };
                    }
                    self.nodes[s].color = self.nodes[p].color;
                    self.nodes[p].color = Color::Black;
                    self.paint(self.nodes[s].left, Color::Black);
                    self.rotate_right(p);
                    x = self.root;
                    x_parent = None;
                }
            }
        }
        self.paint(x, Color::Black);
    }

    /// Drop the unlinked node at `index` from the arena.
    fn release(&mut self, index: usize) -> V {
        let last = self.nodes.len() - 1;
        if index != last {
            let (parent, left, right) = {
                let moved = &self.nodes[last];
                (moved.parent, moved.left, moved.right)
            };
            self.replace_child(parent, last, Some(index));
            if let Some(l) = left {
                self.nodes[l].parent = Some(index);
            }
            if let Some(r) = right {
                self.nodes[r].parent = Some(index);
            }
        }
        self.nodes.swap_remove(index).value
    }

    /// Check the red-black invariants, returning the black height.
    #[cfg(test)]
    pub(crate) fn verify(&self) -> std::result::Result<usize, String> {
        if self.is_red(self.root) {
            return Err("root is red".to_string());
        }
        if self.root.is_some_and(|r| self.nodes[r].parent.is_some()) {
            return Err("root has a parent".to_string());
        }
        self.verify_from(self.root, None, None)
    }

    #[cfg(test)]
    fn verify_from(
        &self,
        index: Option<usize>,
        low: Option<K>,
        high: Option<K>,
    ) -> std::result::Result<usize, String> {
        let Some(i) = index else {
            return Ok(1);
        };
        let node = &self.nodes[i];
        if low.is_some_and(|l| node.key <= l) || high.is_some_and(|h| node.key >= h) {
            return Err(format!("key {} out of order", node.key));
        }
        for child in [node.left, node.right].into_iter().flatten() {
            if self.nodes[child].parent != Some(i) {
                return Err(format!("broken parent link under {}", node.key));
            }
            if node.color == Color::Red && self.nodes[child].color == Color::Red {
                return Err(format!("red node {} has a red child", node.key));
            }
        }
        let left = self.verify_from(node.left, low, Some(node.key))?;
        let right = self.verify_from(node.right, Some(node.key), high)?;
        if left != right {
            return Err(format!("black height differs under {}", node.key));
        }
        Ok(left + usize::from(node.color == Color::Black))
    }
}

/// Stack-based in-order iterator over an [`RbTree`].
pub struct Iter<'a, K, V> {
    tree: &'a RbTree<K, V>,
    stack: SmallVec<[usize; 32]>,
    descending: bool,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn new(tree: &'a RbTree<K, V>, descending: bool) -> Self {
        let mut iter = Self {
            tree,
            stack: SmallVec::new(),
            descending,
        };
        iter.descend(tree.root);
        iter
    }

    /// Push the path from `index` to the first node in iteration order.
    fn descend(&mut self, mut index: Option<usize>) {
        while let Some(i) = index {
            self.stack.push(i);
            let node = &self.tree.nodes[i];
            index = if self.descending { node.right } else { node.left };
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.stack.pop()?;
        let node = &self.tree.nodes[index];
        self.descend(if self.descending { node.left } else { node.right });
        Some((&node.key, &node.value))
    }
}

impl<'a, K: Ord + Copy + fmt::Display, V> IntoIterator for &'a RbTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_tree() {
        let tree: RbTree<u32, ()> = RbTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.root_key(), None);
        assert!(tree.min().is_none());
        assert!(tree.iter().next().is_none());
    }

    #[test]
    fn test_sequential_inserts_stay_balanced() {
        let mut tree = RbTree::new();
        for id in 1..=100u32 {
            tree.insert(id, id * 10).unwrap();
        }
        let height = tree.verify().unwrap();
        // Black height is bounded by log2(n + 1), plus the leaf level
        assert!(height <= 8);
        assert_eq!(tree.len(), 100);
        assert_eq!(tree.min(), Some((&1, &10)));
        assert_eq!(tree.max(), Some((&100, &1000)));
        assert_eq!(tree.links(&tree.root_key().unwrap()).unwrap().color, Color::Black);
    }

    #[test]
    fn test_duplicate_key_leaves_tree_unchanged() {
        let mut tree = RbTree::new();
        tree.insert(3u32, "a").unwrap();
        tree.insert(5u32, "b").unwrap();
        let err = tree.insert(3, "c").unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(ref k) if k == "3"));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(&3), Some(&"a"));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut tree = RbTree::new();
        tree.insert(1u32, ()).unwrap();
        assert_eq!(tree.remove(&9), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut tree = RbTree::new();
        for id in 0..20u32 {
            tree.insert(id, id).unwrap();
        }
        for id in [0u32, 7, 8, 19, 10] {
            assert_eq!(tree.remove(&id), Some(id));
            tree.verify().unwrap();
        }
        let keys: Vec<u32> = tree.keys().collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6, 9, 11, 12, 13, 14, 15, 16, 17, 18]);
        assert_eq!(tree.get(&11), Some(&11));
    }

    #[test]
    fn test_iterators_are_restartable() {
        let mut tree = RbTree::new();
        for id in [4u32, 2, 6, 1, 3, 5, 7] {
            tree.insert(id, ()).unwrap();
        }
        let forward: Vec<u32> = tree.iter().map(|(k, _)| *k).collect();
        let again: Vec<u32> = tree.iter().map(|(k, _)| *k).collect();
        let backward: Vec<u32> = tree.iter_rev().map(|(k, _)| *k).collect();
        assert_eq!(forward, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(forward, again);
        assert_eq!(backward, vec![7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_links_of_three_nodes() {
        let mut tree = RbTree::new();
        for id in 1..=3u32 {
            tree.insert(id, ()).unwrap();
        }
        // Inserting 1, 2, 3 rotates 2 to the root
        assert_eq!(tree.root_key(), Some(2));
        let root = tree.links(&2).unwrap();
        assert_eq!(root.left, Some(1));
        assert_eq!(root.right, Some(3));
        assert_eq!(root.color, Color::Black);
        assert_eq!(tree.links(&1).unwrap().color, Color::Red);
        assert_eq!(tree.links(&3).unwrap().color, Color::Red);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_invariants_hold_under_mixed_operations(
            ops in prop::collection::vec((any::<bool>(), 0u32..64), 1..200)
        ) {
            let mut tree = RbTree::new();
            let mut model = std::collections::BTreeMap::new();

            for (insert, key) in ops {
                if insert {
                    let expected_ok = !model.contains_key(&key);
                    prop_assert_eq!(tree.insert(key, key).is_ok(), expected_ok);
                    model.entry(key).or_insert(key);
                } else {
                    prop_assert_eq!(tree.remove(&key), model.remove(&key));
                }
                prop_assert!(tree.verify().is_ok(), "{:?}", tree.verify());
            }

            let keys: Vec<u32> = tree.keys().collect();
            let expected: Vec<u32> = model.keys().copied().collect();
            prop_assert_eq!(&keys, &expected);

            let mut reversed: Vec<u32> = tree.iter_rev().map(|(k, _)| *k).collect();
            reversed.reverse();
            prop_assert_eq!(reversed, expected);
        }
    }
}
