//! Tree traversal.
//!
//! [`TreeWalker`] is a stack-based walk that reports every node three
//! times: on the way down, after its left subtree and after its right
//! subtree. [`InOrderCursor`] stops only at the second of those, which
//! gives ascending key order, and can step backwards or skip a whole
//! subtree. The public [`Iter`] and [`Cursor`] wrap an in-order cursor and
//! hand out values from a retained tree.

use std::fmt;
use std::iter::FusedIterator;

use crate::info::ImutInfo;
use crate::node::{NodeId, NodeTable};
use crate::tree::TreeFactory;

/// How far the walk has progressed through a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    Unvisited,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    visit: Visit,
}

/// Depth-first walk visiting each node before, between and after its
/// children.
#[derive(Debug, Clone, Default)]
pub(crate) struct TreeWalker {
    stack: Vec<Frame>,
}

impl TreeWalker {
    pub(crate) fn new(root: Option<NodeId>) -> Self {
        let mut stack = Vec::new();
        if let Some(node) = root {
            stack.push(Frame {
                node,
                visit: Visit::Unvisited,
            });
        }
        TreeWalker { stack }
    }

    pub(crate) fn current(&self) -> Option<NodeId> {
        self.stack.last().map(|frame| frame.node)
    }

    pub(crate) fn visit(&self) -> Option<Visit> {
        self.stack.last().map(|frame| frame.visit)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.stack.is_empty()
    }

    pub(crate) fn at_beginning(&self) -> bool {
        self.stack.len() == 1 && self.visit() == Some(Visit::Unvisited)
    }

    fn push(&mut self, node: NodeId, visit: Visit) {
        self.stack.push(Frame { node, visit });
    }

    /// Abandons the current subtree and resumes at its parent.
    pub(crate) fn skip_to_parent(&mut self) {
        debug_assert!(!self.at_end(), "skip_to_parent past the end");
        self.stack.pop();
        if let Some(top) = self.stack.last_mut() {
            top.visit = match top.visit {
                Visit::Unvisited => Visit::Left,
                Visit::Left => Visit::Right,
                Visit::Right => unreachable!("parent already fully visited"),
            };
        }
    }

    pub(crate) fn advance<V>(&mut self, table: &NodeTable<V>) {
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        let node = table.get(top.node);
        match top.visit {
            Visit::Unvisited => match node.left() {
                Some(left) => self.push(left, Visit::Unvisited),
                None => top.visit = Visit::Left,
            },
            Visit::Left => match node.right() {
                Some(right) => self.push(right, Visit::Unvisited),
                None => top.visit = Visit::Right,
            },
            Visit::Right => self.skip_to_parent(),
        }
    }

    pub(crate) fn retreat<V>(&mut self, table: &NodeTable<V>) {
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        let node = table.get(top.node);
        match top.visit {
            Visit::Unvisited => {
                self.stack.pop();
            }
            Visit::Left => {
                top.visit = Visit::Unvisited;
                if let Some(left) = node.left() {
                    self.push(left, Visit::Right);
                }
            }
            Visit::Right => {
                top.visit = Visit::Left;
                if let Some(right) = node.right() {
                    self.push(right, Visit::Right);
                }
            }
        }
    }
}

/// Ascending-order position in a tree.
///
/// Besides the elements themselves there are two positions with no
/// current node: past the end, and before the first element (reached by
/// stepping back from it).
#[derive(Debug, Clone)]
pub(crate) struct InOrderCursor {
    root: Option<NodeId>,
    walker: TreeWalker,
}

impl InOrderCursor {
    /// Positions the cursor at the smallest element.
    pub(crate) fn new<V>(table: &NodeTable<V>, root: Option<NodeId>) -> Self {
        let mut cursor = InOrderCursor {
            root,
            walker: TreeWalker::new(root),
        };
        if root.is_some() {
            cursor.advance(table);
        }
        cursor
    }

    fn is_stop(&self) -> bool {
        self.walker.visit() == Some(Visit::Left)
    }

    pub(crate) fn current(&self) -> Option<NodeId> {
        if self.is_stop() {
            self.walker.current()
        } else {
            None
        }
    }

    pub(crate) fn at_end(&self) -> bool {
        self.walker.at_end()
    }

    pub(crate) fn advance<V>(&mut self, table: &NodeTable<V>) {
        loop {
            self.walker.advance(table);
            if self.walker.at_end() || self.is_stop() {
                break;
            }
        }
    }

    /// Steps to the previous element. From the end this is the largest
    /// element; from the first element it is the before-first position.
    pub(crate) fn retreat<V>(&mut self, table: &NodeTable<V>) {
        if self.walker.at_beginning() {
            return;
        }
        if self.walker.at_end() {
            let Some(root) = self.root else {
                return;
            };
            self.walker.push(root, Visit::Right);
        }
        loop {
            self.walker.retreat(table);
            if self.walker.at_beginning() || self.is_stop() {
                break;
            }
        }
    }

    /// Moves past every element in the current node's right subtree.
    pub(crate) fn skip_sub_tree<V>(&mut self, table: &NodeTable<V>) {
        if self.walker.at_end() {
            return;
        }
        self.walker.skip_to_parent();
        while !self.walker.at_end() && !self.is_stop() {
            self.walker.advance(table);
        }
    }
}

/// Iterator over the values of a tree in ascending key order.
pub struct Iter<'s, I: ImutInfo> {
    factory: &'s TreeFactory<'s, I>,
    cursor: InOrderCursor,
}

impl<'s, I: ImutInfo> Iter<'s, I> {
    /// The caller must keep `root` retained for `'s`.
    pub(crate) fn new(factory: &'s TreeFactory<'s, I>, root: Option<NodeId>) -> Self {
        let state = factory.state();
        let cursor = InOrderCursor::new(&state.table, root);
        drop(state);
        Iter { factory, cursor }
    }
}

impl<'s, I: ImutInfo> Iterator for Iter<'s, I> {
    type Item = &'s I::Value;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.factory.state();
        let id = self.cursor.current()?;
        self.cursor.advance(&state.table);
        // SAFETY: the tree being walked is retained by the set or map that
        // created this iterator, which is borrowed for 's.
        Some(unsafe { state.table.value_detached(id) })
    }
}

impl<I: ImutInfo> FusedIterator for Iter<'_, I> {}

impl<I: ImutInfo> Clone for Iter<'_, I> {
    fn clone(&self) -> Self {
        Iter {
            factory: self.factory,
            cursor: self.cursor.clone(),
        }
    }
}

impl<I: ImutInfo> fmt::Debug for Iter<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("current", &self.cursor.current())
            .finish_non_exhaustive()
    }
}

/// Bidirectional in-order position in a set or map.
///
/// Unlike [`Iter`], a cursor can step back and can skip the remainder of
/// the current node's subtree, which is how two trees that share structure
/// are compared without visiting the shared part.
pub struct Cursor<'s, I: ImutInfo> {
    factory: &'s TreeFactory<'s, I>,
    cursor: InOrderCursor,
}

impl<'s, I: ImutInfo> Cursor<'s, I> {
    /// The caller must keep `root` retained for `'s`.
    pub(crate) fn new(factory: &'s TreeFactory<'s, I>, root: Option<NodeId>) -> Self {
        let state = factory.state();
        let cursor = InOrderCursor::new(&state.table, root);
        drop(state);
        Cursor { factory, cursor }
    }

    /// Value at the cursor, or `None` before the first or past the last
    /// element.
    pub fn current(&self) -> Option<&'s I::Value> {
        let id = self.cursor.current()?;
        let state = self.factory.state();
        // SAFETY: see `Iter::next`.
        Some(unsafe { state.table.value_detached(id) })
    }

    /// Node at the cursor.
    pub fn node(&self) -> Option<NodeId> {
        self.cursor.current()
    }

    pub fn at_end(&self) -> bool {
        self.cursor.at_end()
    }

    pub fn move_next(&mut self) {
        let state = self.factory.state();
        self.cursor.advance(&state.table);
    }

    pub fn move_prev(&mut self) {
        let state = self.factory.state();
        self.cursor.retreat(&state.table);
    }

    /// Skips everything remaining below the current node, landing on the
    /// next element outside its subtree.
    pub fn skip_sub_tree(&mut self) {
        let state = self.factory.state();
        self.cursor.skip_sub_tree(&state.table);
    }
}

impl<I: ImutInfo> fmt::Debug for Cursor<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("current", &self.cursor.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use polar_mem::BumpPtrAllocator;

    /// Builds:
    ///
    /// ```text
    ///       4
    ///     /   \
    ///    2     5
    ///   / \
    ///  1   3
    /// ```
    fn sample(allocator: &BumpPtrAllocator) -> (NodeTable<u32>, NodeId) {
        let mut table = NodeTable::new();
        let n1 = table.insert(allocator, Node::new(None, 1, None, 1));
        let n3 = table.insert(allocator, Node::new(None, 3, None, 1));
        let n2 = table.insert(allocator, Node::new(Some(n1), 2, Some(n3), 2));
        let n5 = table.insert(allocator, Node::new(None, 5, None, 1));
        let n4 = table.insert(allocator, Node::new(Some(n2), 4, Some(n5), 3));
        (table, n4)
    }

    fn collect(table: &NodeTable<u32>, cursor: &mut InOrderCursor) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(id) = cursor.current() {
            out.push(*table.get(id).value());
            cursor.advance(table);
        }
        out
    }

    #[test]
    fn test_in_order() {
        let allocator = BumpPtrAllocator::new();
        let (table, root) = sample(&allocator);
        let mut cursor = InOrderCursor::new(&table, Some(root));
        assert_eq!(collect(&table, &mut cursor), vec![1, 2, 3, 4, 5]);
        assert!(cursor.at_end());
    }

    #[test]
    fn test_empty() {
        let table = NodeTable::<u32>::new();
        let mut cursor = InOrderCursor::new(&table, None);
        assert!(cursor.at_end());
        assert_eq!(cursor.current(), None);
        cursor.retreat(&table);
        assert!(cursor.at_end());
    }

    #[test]
    fn test_retreat_from_end() {
        let allocator = BumpPtrAllocator::new();
        let (table, root) = sample(&allocator);
        let mut cursor = InOrderCursor::new(&table, Some(root));
        collect(&table, &mut cursor);

        let mut out = Vec::new();
        loop {
            cursor.retreat(&table);
            match cursor.current() {
                Some(id) => out.push(*table.get(id).value()),
                None => break,
            }
        }
        assert_eq!(out, vec![5, 4, 3, 2, 1]);

        // Before the first element; stepping forward returns to it.
        cursor.advance(&table);
        assert_eq!(cursor.current().map(|id| *table.get(id).value()), Some(1));
    }

    #[test]
    fn test_skip_sub_tree() {
        let allocator = BumpPtrAllocator::new();
        let (table, root) = sample(&allocator);
        let mut cursor = InOrderCursor::new(&table, Some(root));

        // At 1 (a leaf): skipping lands on its parent.
        cursor.skip_sub_tree(&table);
        assert_eq!(cursor.current().map(|id| *table.get(id).value()), Some(2));

        // At 2: skipping passes 3 and lands on 4.
        cursor.skip_sub_tree(&table);
        assert_eq!(cursor.current().map(|id| *table.get(id).value()), Some(4));

        // At the root: skipping ends the walk.
        cursor.skip_sub_tree(&table);
        assert!(cursor.at_end());
    }

    #[test]
    fn test_walker_visits_each_node_three_times() {
        let allocator = BumpPtrAllocator::new();
        let (table, root) = sample(&allocator);
        let mut walker = TreeWalker::new(Some(root));
        let mut steps = 0;
        while !walker.at_end() {
            walker.advance(&table);
            steps += 1;
        }
        // Three states per node; the last advance pops the root.
        assert_eq!(steps, 5 * 3);
    }
}
