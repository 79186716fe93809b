//! Tree Index
//!
//! Unbalanced binary search tree over object ids, stored as tree nodes
//! linked by file offsets. The file is the arena; every offset is validated
//! (position, cycle, key ordering) when it is dereferenced.
//!
//! ## Responsibilities
//! - Locate an id, or the empty slot where it would be inserted
//! - Link a written node into its slot
//! - Standard BST removal (successor relinking, no rebalancing)
//! - In-order traversal
//!
//! Insertion order decides the shape. Strictly increasing ids degrade the
//! tree into a list, which is why every descent is bounded by `max_depth`.

use std::collections::HashSet;

use crate::error::{ParcelError, Result};
use crate::file::ParcelFile;
use crate::format::{Header, TreeNode, HEADER_SIZE, TREE_NODE_SIZE};
use crate::zuid::Zuid;

/// Which child pointer of a parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// A node found by a descent, with its parent link
#[derive(Debug, Clone)]
pub struct Located {
    pub node: TreeNode,
    pub parent: Option<(TreeNode, Side)>,
    pub depth: u32,
}

/// Validated insertion point for a new id
#[derive(Debug, Clone)]
pub struct Slot {
    pub key: Zuid,
    pub parent: Option<(TreeNode, Side)>,
    pub depth: u32,
}

/// Result of a removal
#[derive(Debug, Clone)]
pub struct Removal {
    /// The detached node; its range (and payload) can now be freed
    pub node: TreeNode,
    /// Ids of the nodes whose child links were rewritten
    pub relinked: Vec<Zuid>,
}

enum Descent {
    Found(Located),
    Vacant(Slot),
}

/// Tree view over an open parcel's file and header
pub struct TreeIndex<'a, F: ParcelFile + ?Sized> {
    file: &'a mut F,
    header: &'a mut Header,
    max_depth: u16,
}

impl<'a, F: ParcelFile + ?Sized> TreeIndex<'a, F> {
    pub fn new(file: &'a mut F, header: &'a mut Header, max_depth: u16) -> Self {
        Self {
            file,
            header,
            max_depth,
        }
    }

    /// Find the node for `key`
    pub fn search(&mut self, key: Zuid) -> Result<Located> {
        match self.descend(key)? {
            Descent::Found(located) => Ok(located),
            Descent::Vacant(_) => Err(ParcelError::NoExist(key)),
        }
    }

    /// Find where `key` would be inserted, without writing anything
    ///
    /// Fails with `Exists` if the key is present and `MaxDepth` if the new
    /// node would sit deeper than the configured limit.
    pub fn find_slot(&mut self, key: Zuid) -> Result<Slot> {
        match self.descend(key)? {
            Descent::Found(_) => Err(ParcelError::Exists(key)),
            Descent::Vacant(slot) if slot.depth > u32::from(self.max_depth) => {
                Err(ParcelError::MaxDepth(self.max_depth))
            }
            Descent::Vacant(slot) => Ok(slot),
        }
    }

    /// Link the node at `node_offset` into a slot returned by `find_slot`
    pub fn link(&mut self, slot: Slot, node_offset: u64) -> Result<()> {
        match slot.parent {
            None => {
                self.header.treehead = node_offset;
                self.header.write(self.file)
            }
            Some((mut parent, side)) => {
                match side {
                    Side::Left => parent.lnode = node_offset,
                    Side::Right => parent.rnode = node_offset,
                }
                parent.write(self.file)
            }
        }
    }

    /// Insert an already written node
    pub fn insert(&mut self, key: Zuid, node_offset: u64) -> Result<()> {
        let slot = self.find_slot(key)?;
        self.link(slot, node_offset)
    }

    /// Detach the node for `key` from the tree
    ///
    /// All nodes involved are read before the first write.
    pub fn remove(&mut self, key: Zuid) -> Result<Removal> {
        let Located { node, parent, .. } = self.search(key)?;
        let mut relinked = Vec::new();

        let replacement = match (node.lnode, node.rnode) {
            (0, child) | (child, 0) => child,
            (left, right) => {
                // In-order successor: leftmost node of the right subtree
                let mut seen = HashSet::new();
                seen.insert(node.offset);
                let mut succ_parent: Option<TreeNode> = None;
                let mut succ = self.load(right, &mut seen)?;
                let mut steps = 0u32;
                while succ.lnode != 0 {
                    steps += 1;
                    if steps > u32::from(self.max_depth) {
                        return Err(ParcelError::MaxDepth(self.max_depth));
                    }
                    let next = self.load(succ.lnode, &mut seen)?;
                    succ_parent = Some(succ);
                    succ = next;
                }

                if let Some(mut sp) = succ_parent {
                    sp.lnode = succ.rnode;
                    sp.write(self.file)?;
                    relinked.push(sp.key);
                    succ.rnode = right;
                }
                succ.lnode = left;
                succ.write(self.file)?;
                relinked.push(succ.key);
                succ.offset
            }
        };

        match parent {
            None => {
                self.header.treehead = replacement;
                self.header.write(self.file)?;
            }
            Some((mut p, side)) => {
                match side {
                    Side::Left => p.lnode = replacement,
                    Side::Right => p.rnode = replacement,
                }
                p.write(self.file)?;
                relinked.push(p.key);
            }
        }

        tracing::debug!(id = %key, offset = node.offset, "tree node detached");
        Ok(Removal { node, relinked })
    }

    /// In-order traversal: every node with its depth, ids strictly ascending
    pub fn walk(&mut self) -> Result<Vec<(TreeNode, u32)>> {
        let mut seen = HashSet::new();
        let mut out: Vec<(TreeNode, u32)> = Vec::new();
        let mut stack: Vec<(TreeNode, u32)> = Vec::new();
        let mut cursor = self.header.treehead;
        let mut depth = 1u32;

        loop {
            while cursor != 0 {
                if depth > u32::from(self.max_depth) {
                    return Err(ParcelError::MaxDepth(self.max_depth));
                }
                let node = self.load(cursor, &mut seen)?;
                cursor = node.lnode;
                stack.push((node, depth));
                depth += 1;
            }

            let Some((node, node_depth)) = stack.pop() else {
                break;
            };
            if let Some((last, _)) = out.last() {
                if last.key >= node.key {
                    return Err(ParcelError::Tree(format!(
                        "node {} at {} is out of order",
                        node.key, node.offset
                    )));
                }
            }
            cursor = node.rnode;
            depth = node_depth + 1;
            out.push((node, node_depth));
        }

        Ok(out)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Walk from the root towards `key`
    ///
    /// Besides position and cycle checks, every node must fall inside the key
    /// bounds set by its ancestors, otherwise a child pointer has been
    /// corrupted into some other subtree.
    fn descend(&mut self, key: Zuid) -> Result<Descent> {
        let mut seen = HashSet::new();
        let mut parent: Option<(TreeNode, Side)> = None;
        let mut cursor = self.header.treehead;
        let mut depth = 1u32;
        let mut lower: Option<Zuid> = None;
        let mut upper: Option<Zuid> = None;

        loop {
            if cursor == 0 {
                return Ok(Descent::Vacant(Slot { key, parent, depth }));
            }
            if depth > u32::from(self.max_depth) {
                return Err(ParcelError::MaxDepth(self.max_depth));
            }

            let node = self.load(cursor, &mut seen)?;
            let below = lower.is_some_and(|lo| node.key <= lo);
            let above = upper.is_some_and(|hi| node.key >= hi);
            if below || above {
                return Err(ParcelError::Tree(format!(
                    "node {} at {} violates ordering of its parent",
                    node.key, node.offset
                )));
            }

            tracing::trace!(id = %node.key, offset = node.offset, depth, "descend");

            match key.cmp(&node.key) {
                std::cmp::Ordering::Equal => {
                    return Ok(Descent::Found(Located {
                        node,
                        parent,
                        depth,
                    }));
                }
                std::cmp::Ordering::Less => {
                    upper = Some(node.key);
                    cursor = node.lnode;
                    parent = Some((node, Side::Left));
                }
                std::cmp::Ordering::Greater => {
                    lower = Some(node.key);
                    cursor = node.rnode;
                    parent = Some((node, Side::Right));
                }
            }
            depth += 1;
        }
    }

    /// Read a tree node, checking its position and that the current walk
    /// has not visited it before
    fn load(&mut self, offset: u64, seen: &mut HashSet<u64>) -> Result<TreeNode> {
        if offset < HEADER_SIZE || offset + TREE_NODE_SIZE > self.header.tailptr {
            return Err(ParcelError::Tree(format!(
                "tree node offset {} outside file",
                offset
            )));
        }
        if !seen.insert(offset) {
            return Err(ParcelError::Tree(format!("cycle at offset {}", offset)));
        }
        TreeNode::read_at(self.file, offset)
    }
}
