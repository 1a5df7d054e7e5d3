//! FILENAME: core/pivot-layout/src/hierarchy.rs
//! Axis trees.
//!
//! Nodes live in an arena owned by their `Hierarchy`; children and parent are
//! `NodeKey` indices into it, so there is exactly one owner per node and no
//! reference cycles. Subtrees hidden by collapse stay in the arena; only the
//! visible projection (leaf sequence and per-level lists) is recomputed.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::data::{DataSourceId, Query};
use crate::definition::{Aggregation, EXTRA_FIELD, ID_SEPARATOR, ROOT_ID};

/// Which header a hierarchy describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Row,
    Col,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => f.write_str("row"),
            Axis::Col => f.write_str("column"),
        }
    }
}

/// Index of a node inside its hierarchy's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(pub u32);

impl NodeKey {
    pub const ROOT: NodeKey = NodeKey(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// NODE
// ============================================================================

/// One value of one field at one tree level.
#[derive(Debug, Clone)]
pub struct Node {
    pub key: NodeKey,

    /// Ancestor values joined by `ID_SEPARATOR`, unique within the hierarchy.
    pub id: String,

    pub field: String,

    /// The dimension value (or the configured label for totals).
    pub value: String,

    /// Display label (measure nodes use the field's meta name).
    pub label: String,

    /// Depth from the root; the root is 0, the first field is 1.
    pub level: usize,

    pub is_grand_total: bool,
    pub is_sub_total: bool,
    pub is_collapsed: bool,

    pub children: Vec<NodeKey>,
    pub parent: Option<NodeKey>,

    /// Conjunction of ancestor field values.
    pub query: Query,

    /// Rows backing this node, when cached during grouping.
    pub rows: Option<Vec<usize>>,

    /// Data set the rows index into.
    pub source: DataSourceId,

    /// Data source of drill-down children, if this node was drilled.
    pub drill_source: Option<DataSourceId>,

    /// Aggregation method of a total node.
    pub aggregation: Option<Aggregation>,

    /// Precomputed per-measure aggregates of a total node.
    pub aggregates: SmallVec<[(String, Option<f64>); 4]>,

    pub remark: Option<String>,

    /// Position in the leaf sequence, when the node is indexed.
    pub index: Option<usize>,

    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,

    detached: bool,
}

impl Node {
    fn root() -> Self {
        Node {
            key: NodeKey::ROOT,
            id: ROOT_ID.to_string(),
            field: String::new(),
            value: String::new(),
            label: String::new(),
            level: 0,
            is_grand_total: false,
            is_sub_total: false,
            is_collapsed: false,
            children: Vec::new(),
            parent: None,
            query: Query::new(),
            rows: None,
            source: DataSourceId::BASE,
            drill_source: None,
            aggregation: None,
            aggregates: SmallVec::new(),
            remark: None,
            index: None,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            detached: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.key == NodeKey::ROOT
    }

    pub fn is_totals(&self) -> bool {
        self.is_grand_total || self.is_sub_total
    }

    pub fn is_measure(&self) -> bool {
        self.field == EXTRA_FIELD
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Precomputed aggregate of a total node for `measure`.
    pub fn aggregate(&self, measure: &str) -> Option<f64> {
        self.aggregates
            .iter()
            .find(|(m, _)| m == measure)
            .and_then(|(_, v)| *v)
    }
}

/// What the builder knows about a node before it is attached.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub field: String,
    pub value: String,
    pub label: String,
    /// Id segment; defaults to `value`.
    pub segment: Option<String>,
    pub query: Query,
    pub rows: Option<Vec<usize>>,
    pub source: DataSourceId,
}

impl NewNode {
    pub fn new(field: &str, value: String, query: Query) -> Self {
        NewNode {
            field: field.to_string(),
            label: value.clone(),
            value,
            segment: None,
            query,
            rows: None,
            source: DataSourceId::BASE,
        }
    }
}

// ============================================================================
// HIERARCHY
// ============================================================================

/// One axis's dimension tree plus its visible projection.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    axis: Axis,
    fields: Vec<String>,
    nodes: Vec<Node>,
    leaves: Vec<NodeKey>,
    levels: Vec<Vec<NodeKey>>,
    ids: FxHashMap<String, NodeKey>,
    /// Every visible node takes an index (tree-mode rows).
    index_every_node: bool,
    /// Arena slots held by detached nodes.
    detached: usize,
}

impl Hierarchy {
    pub fn new(axis: Axis, fields: Vec<String>) -> Self {
        let mut ids = FxHashMap::default();
        ids.insert(ROOT_ID.to_string(), NodeKey::ROOT);
        Hierarchy {
            axis,
            fields,
            nodes: vec![Node::root()],
            leaves: Vec::new(),
            levels: Vec::new(),
            ids,
            index_every_node: false,
            detached: 0,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Resolved fields of this axis, outer to inner.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn node(&self, key: NodeKey) -> &Node {
        &self.nodes[key.index()]
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> &mut Node {
        &mut self.nodes[key.index()]
    }

    /// Node by path id.
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.ids.get(id).map(|&k| self.node(k))
    }

    pub fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.ids.get(id).copied()
    }

    pub fn children(&self, key: NodeKey) -> impl Iterator<Item = &Node> {
        self.node(key).children.iter().map(move |&k| self.node(k))
    }

    /// Ancestors from the parent up to (and including) the root.
    pub fn ancestors(&self, key: NodeKey) -> impl Iterator<Item = &Node> {
        let mut next = self.node(key).parent;
        std::iter::from_fn(move || {
            let current = next?;
            next = self.node(current).parent;
            Some(self.node(current))
        })
    }

    pub fn is_ancestor(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        self.ancestors(key).any(|n| n.key == ancestor)
    }

    /// All attached nodes except the root, in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().skip(1).filter(|n| !n.detached)
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Arena slots in use, detached nodes included.
    pub(crate) fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// The indexed node sequence of this axis.
    pub fn leaf_nodes(&self) -> &[NodeKey] {
        &self.leaves
    }

    pub fn leaf(&self, index: usize) -> Option<&Node> {
        self.leaves.get(index).map(|&k| self.node(k))
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Visible nodes of a level (1 = outermost field), in pre-order.
    pub fn nodes_at_level(&self, level: usize) -> &[NodeKey] {
        level
            .checked_sub(1)
            .and_then(|i| self.levels.get(i))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Deepest visible level.
    pub fn max_level(&self) -> usize {
        self.levels.len()
    }

    /// Whether no collapsed ancestor hides the node.
    pub fn is_visible(&self, key: NodeKey) -> bool {
        !self.node(key).detached && self.ancestors(key).all(|a| !a.is_collapsed)
    }

    pub fn index_every_node(&self) -> bool {
        self.index_every_node
    }

    pub(crate) fn set_index_every_node(&mut self, every_node: bool) {
        self.index_every_node = every_node;
    }

    // ------------------------------------------------------------------------
    // MUTATION
    // ------------------------------------------------------------------------

    /// Attaches a new node as the last child of `parent`.
    pub(crate) fn add_child(&mut self, parent: NodeKey, node: NewNode) -> NodeKey {
        let position = self.node(parent).children.len();
        self.insert_child(parent, position, node)
    }

    /// Attaches a new node at `position` among the children of `parent`.
    pub(crate) fn insert_child(&mut self, parent: NodeKey, position: usize, node: NewNode) -> NodeKey {
        let key = NodeKey(self.nodes.len() as u32);
        let (parent_id, parent_level) = {
            let p = self.node(parent);
            (p.id.clone(), p.level)
        };
        let segment = node.segment.as_deref().unwrap_or(&node.value);
        let id = format!("{}{}{}", parent_id, ID_SEPARATOR, segment);

        let mut created = Node::root();
        created.key = key;
        created.id = id.clone();
        created.field = node.field;
        created.value = node.value;
        created.label = node.label;
        created.level = parent_level + 1;
        created.parent = Some(parent);
        created.query = node.query;
        created.rows = node.rows;
        created.source = node.source;

        self.nodes.push(created);
        self.ids.entry(id).or_insert(key);
        let children = &mut self.node_mut(parent).children;
        let position = position.min(children.len());
        children.insert(position, key);
        key
    }

    /// Detaches every descendant of `key`; the node itself stays.
    pub(crate) fn remove_descendants(&mut self, key: NodeKey) {
        let children = std::mem::take(&mut self.node_mut(key).children);
        let mut stack = children;
        while let Some(k) = stack.pop() {
            self.detached += 1;
            let node = self.node_mut(k);
            node.detached = true;
            node.index = None;
            let grand_children = std::mem::take(&mut node.children);
            let id = node.id.clone();
            stack.extend(grand_children);
            if self.ids.get(&id) == Some(&k) {
                self.ids.remove(&id);
            }
        }
    }

    /// Drops detached nodes from the arena once they outnumber the attached
    /// ones. Keys are renumbered; ids, leaves and levels are remapped.
    pub(crate) fn compact(&mut self) -> bool {
        if self.detached == 0 || self.detached < self.nodes.len() - self.detached {
            return false;
        }
        let mut remap: Vec<Option<NodeKey>> = vec![None; self.nodes.len()];
        let mut next = 0u32;
        for (slot, node) in remap.iter_mut().zip(&self.nodes) {
            if !node.detached {
                *slot = Some(NodeKey(next));
                next += 1;
            }
        }
        let map = |k: NodeKey| remap[k.index()];

        let nodes = std::mem::take(&mut self.nodes);
        self.nodes = nodes
            .into_iter()
            .filter(|n| !n.detached)
            .map(|mut n| {
                n.key = map(n.key).unwrap_or(n.key);
                n.parent = n.parent.and_then(map);
                n.children = n.children.iter().filter_map(|&c| map(c)).collect();
                n
            })
            .collect();
        self.leaves = self.leaves.iter().filter_map(|&k| map(k)).collect();
        for level in self.levels.iter_mut() {
            *level = level.iter().filter_map(|&k| map(k)).collect();
        }
        for key in self.ids.values_mut() {
            if let Some(k) = map(*key) {
                *key = k;
            }
        }
        log::debug!("{} hierarchy compacted: {} detached nodes dropped", self.axis, self.detached);
        self.detached = 0;
        true
    }

    // ------------------------------------------------------------------------
    // PROJECTION
    // ------------------------------------------------------------------------

    /// Indexed nodes of the subtree rooted at `key`, in pre-order.
    pub fn visible_sequence(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        if key == NodeKey::ROOT {
            for &child in &self.root().children {
                self.collect_visible(child, &mut out, &mut None);
            }
        } else {
            self.collect_visible(key, &mut out, &mut None);
        }
        out
    }

    fn collect_visible(
        &self,
        key: NodeKey,
        out: &mut Vec<NodeKey>,
        levels: &mut Option<&mut Vec<Vec<NodeKey>>>,
    ) {
        let node = self.node(key);
        if let Some(levels) = levels.as_mut() {
            while levels.len() < node.level {
                levels.push(Vec::new());
            }
            levels[node.level - 1].push(key);
        }
        if self.index_every_node || node.children.is_empty() || node.is_collapsed {
            out.push(key);
        }
        if !node.is_collapsed {
            for &child in &node.children {
                self.collect_visible(child, out, levels);
            }
        }
    }

    /// Recomputes the leaf sequence, per-level lists and node indices.
    pub(crate) fn project(&mut self) {
        for node in self.nodes.iter_mut() {
            node.index = None;
        }
        let mut leaves = Vec::new();
        let mut levels = Vec::new();
        for &child in &self.root().children {
            self.collect_visible(child, &mut leaves, &mut Some(&mut levels));
        }
        for (i, &key) in leaves.iter().enumerate() {
            self.nodes[key.index()].index = Some(i);
        }
        self.leaves = leaves;
        self.levels = levels;
    }

    /// Replaces the leaves `old` (contiguous, starting at `old[0]`'s index)
    /// with the current visible sequence of `key` and renumbers what follows.
    pub(crate) fn splice_leaves(&mut self, key: NodeKey, old: &[NodeKey]) -> (usize, usize) {
        let start = old
            .first()
            .and_then(|&k| self.leaves.iter().position(|&l| l == k))
            .unwrap_or(self.leaves.len());
        for &k in old {
            self.nodes[k.index()].index = None;
        }
        let fresh = self.visible_sequence(key);
        let end = (start + old.len()).min(self.leaves.len());
        let inserted = fresh.len();
        self.leaves.splice(start..end, fresh);
        for i in start..self.leaves.len() {
            let k = self.leaves[i];
            self.nodes[k.index()].index = Some(i);
        }

        let mut levels = Vec::new();
        let mut scratch = Vec::new();
        for &child in &self.root().children {
            self.collect_visible(child, &mut scratch, &mut Some(&mut levels));
        }
        self.levels = levels;
        (start, inserted)
    }
}
