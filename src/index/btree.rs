//! In-memory B-tree
//!
//! Order-16 B-tree (at most 15 keys and 16 children per node) mapping a
//! field's textual value to the offsets of every record carrying it.
//! Full nodes are split on the way down, so the tree grows at the root and
//! stays balanced.
//!
//! Nodes live in an arena (`Vec<Node>`) and refer to children by index.

/// Fan-out of every node
pub const ORDER: usize = 16;

/// Most keys a node can hold
const MAX_KEYS: usize = ORDER - 1;

/// Index of the median key moved up on a split
const SPLIT_AT: usize = MAX_KEYS / 2;

#[derive(Debug, Default, Clone)]
struct Node {
    keys: Vec<String>,
    /// Record offsets per key, in insertion order
    postings: Vec<Vec<u64>>,
    /// Empty for leaves
    children: Vec<usize>,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn is_full(&self) -> bool {
        self.keys.len() >= MAX_KEYS
    }
}

/// B-tree from key to record offsets
#[derive(Debug, Clone)]
pub struct BTree {
    nodes: Vec<Node>,
    root: usize,
    key_count: usize,
    entry_count: usize,
}

impl Default for BTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            root: 0,
            key_count: 0,
            entry_count: 0,
        }
    }

    /// Record that `key` appears at `offset`
    pub fn insert(&mut self, key: &str, offset: u64) {
        self.entry_count += 1;

        if let Some(postings) = self.postings_mut(key) {
            postings.push(offset);
            return;
        }
        self.key_count += 1;

        if self.nodes[self.root].is_full() {
            let old_root = self.root;
            self.nodes.push(Node {
                children: vec![old_root],
                ..Node::default()
            });
            self.root = self.nodes.len() - 1;
            self.split_child(self.root, 0);
        }

        let mut node = self.root;
        loop {
            let pos = match self.nodes[node].keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(_) => unreachable!("existing keys are handled above"),
                Err(pos) => pos,
            };

            if self.nodes[node].is_leaf() {
                let leaf = &mut self.nodes[node];
                leaf.keys.insert(pos, key.to_string());
                leaf.postings.insert(pos, vec![offset]);
                return;
            }

            let mut child_pos = pos;
            let child = self.nodes[node].children[pos];
            if self.nodes[child].is_full() {
                self.split_child(node, pos);
                if key > self.nodes[node].keys[pos].as_str() {
                    child_pos += 1;
                }
            }
            node = self.nodes[node].children[child_pos];
        }
    }

    /// First offset recorded for `key`
    pub fn search(&self, key: &str) -> Option<u64> {
        self.search_all(key).and_then(|postings| postings.first().copied())
    }

    /// Every offset recorded for `key`, oldest first
    pub fn search_all(&self, key: &str) -> Option<&[u64]> {
        let mut node = &self.nodes[self.root];
        loop {
            match node.keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(pos) => return Some(&node.postings[pos]),
                Err(pos) => {
                    if node.is_leaf() {
                        return None;
                    }
                    node = &self.nodes[node.children[pos]];
                }
            }
        }
    }

    /// Distinct keys
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// Total (key, offset) pairs
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.key_count == 0
    }

    /// Levels from root to leaves (1 for a lone root)
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = &self.nodes[self.root];
        while let Some(&child) = node.children.first() {
            height += 1;
            node = &self.nodes[child];
        }
        height
    }

    /// All keys in ascending order
    pub fn keys(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(self.key_count);
        self.collect_keys(self.root, &mut out);
        out
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn postings_mut(&mut self, key: &str) -> Option<&mut Vec<u64>> {
        let mut node = self.root;
        loop {
            match self.nodes[node].keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(pos) => return Some(&mut self.nodes[node].postings[pos]),
                Err(pos) => {
                    if self.nodes[node].is_leaf() {
                        return None;
                    }
                    node = self.nodes[node].children[pos];
                }
            }
        }
    }

    /// Split the full child at `parent.children[index]`, moving its median
    /// key up into `parent`.
    fn split_child(&mut self, parent: usize, index: usize) {
        let child = self.nodes[parent].children[index];

        let (median_key, median_postings, right) = {
            let left = &mut self.nodes[child];
            let right_keys = left.keys.split_off(SPLIT_AT + 1);
            let right_postings = left.postings.split_off(SPLIT_AT + 1);
            let right_children = if left.is_leaf() {
                Vec::new()
            } else {
                left.children.split_off(SPLIT_AT + 1)
            };
            let median_key = left.keys.pop();
            let median_postings = left.postings.pop();
            (
                median_key,
                median_postings,
                Node {
                    keys: right_keys,
                    postings: right_postings,
                    children: right_children,
                },
            )
        };

        let (Some(median_key), Some(median_postings)) = (median_key, median_postings) else {
            unreachable!("split_child called on a node that is not full");
        };

        self.nodes.push(right);
        let right_index = self.nodes.len() - 1;

        let parent_node = &mut self.nodes[parent];
        parent_node.keys.insert(index, median_key);
        parent_node.postings.insert(index, median_postings);
        parent_node.children.insert(index + 1, right_index);
    }

    fn collect_keys<'a>(&'a self, node: usize, out: &mut Vec<&'a str>) {
        let node = &self.nodes[node];
        for (i, key) in node.keys.iter().enumerate() {
            if let Some(&child) = node.children.get(i) {
                self.collect_keys(child, out);
            }
            out.push(key.as_str());
        }
        if let Some(&last) = node.children.get(node.keys.len()) {
            self.collect_keys(last, out);
        }
    }
}
