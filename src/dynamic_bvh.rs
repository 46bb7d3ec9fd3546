//! Dynamic AABB Tree (Incremental BVH)
//!
//! Self-balancing binary tree of fat AABBs backing the broad phase. Unlike
//! [`crate::bvh::LinearBvh`] (build once), proxies can be inserted, moved and
//! removed in O(log n).
//!
//! # Features
//!
//! - **Fat AABBs**: leaves store an enlarged box so small motions never touch
//!   the tree
//! - **SAH insertion**: the sibling is chosen by surface-area cost
//! - **AVL rotations**: keeps the height logarithmic
//! - **Deterministic**: node allocation is LIFO and every query result is
//!   sorted by user data, so the tree shape never leaks into results

use crate::collider::AABB;
use crate::fixed::Fix64;
use crate::math::Vec3Fix;

/// Null node sentinel
pub const NULL_NODE: u32 = u32::MAX;

/// Default fat margin added on every side of a reinserted leaf
pub const DEFAULT_FAT_MARGIN: Fix64 = Fix64::from_ratio(1, 10);

/// Proxy handle returned by [`DynamicAabbTree::insert`]
pub type ProxyId = u32;

#[derive(Clone, Debug)]
struct Node {
    aabb: AABB,
    parent: u32,
    /// `[NULL_NODE; 2]` for leaves
    children: [u32; 2],
    /// 0 for leaves, -1 for free nodes
    height: i32,
    /// User data for leaves
    data: u32,
}

impl Node {
    const FREE: Self = Self {
        aabb: AABB::new(Vec3Fix::ZERO, Vec3Fix::ZERO),
        parent: NULL_NODE,
        children: [NULL_NODE; 2],
        height: -1,
        data: NULL_NODE,
    };

    #[inline]
    fn is_leaf(&self) -> bool {
        self.children[0] == NULL_NODE
    }
}

/// Dynamic AABB tree
#[derive(Clone, Debug)]
pub struct DynamicAabbTree {
    nodes: Vec<Node>,
    free_list: Vec<u32>,
    root: u32,
    proxy_count: usize,
    /// Margin added to every side when a leaf is (re)inserted
    pub margin: Fix64,
}

impl Default for DynamicAabbTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicAabbTree {
    /// Empty tree with the default margin
    pub fn new() -> Self {
        Self::with_margin(DEFAULT_FAT_MARGIN)
    }

    /// Empty tree with a custom fat margin
    pub fn with_margin(margin: Fix64) -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            proxy_count: 0,
            margin,
        }
    }

    /// Insert a box; the stored leaf is fattened by `margin`
    pub fn insert(&mut self, aabb: AABB, data: u32) -> ProxyId {
        let leaf = self.alloc_node();
        let node = &mut self.nodes[leaf as usize];
        node.aabb = aabb.expanded(self.margin);
        node.height = 0;
        node.data = data;
        self.insert_leaf(leaf);
        self.proxy_count += 1;
        leaf
    }

    /// Remove a proxy (unknown or already free ids are ignored)
    pub fn remove(&mut self, proxy: ProxyId) {
        if !self.is_live_leaf(proxy) {
            return;
        }
        self.remove_leaf(proxy);
        self.free_node(proxy);
        self.proxy_count -= 1;
    }

    /// Move a proxy. Reinserts only if `aabb` escaped the stored fat box.
    ///
    /// Returns `true` when the tree was modified.
    pub fn update(&mut self, proxy: ProxyId, aabb: AABB) -> bool {
        if !self.is_live_leaf(proxy) || self.nodes[proxy as usize].aabb.contains(&aabb) {
            return false;
        }
        self.remove_leaf(proxy);
        self.nodes[proxy as usize].aabb = aabb.expanded(self.margin);
        self.insert_leaf(proxy);
        true
    }

    #[inline]
    fn is_live_leaf(&self, proxy: ProxyId) -> bool {
        self.nodes
            .get(proxy as usize)
            .map_or(false, |n| n.height == 0 && n.is_leaf())
    }

    /// User data of a proxy
    #[inline]
    pub fn data(&self, proxy: ProxyId) -> u32 {
        self.nodes[proxy as usize].data
    }

    /// Stored fat AABB of a proxy
    #[inline]
    pub fn fat_aabb(&self, proxy: ProxyId) -> AABB {
        self.nodes[proxy as usize].aabb
    }

    /// Number of live proxies
    #[inline]
    pub fn len(&self) -> usize {
        self.proxy_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.proxy_count == 0
    }

    /// Root height (0 for empty or single-leaf trees)
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Visit every leaf whose fat box overlaps `aabb` (traversal order)
    pub fn query_callback<F: FnMut(u32)>(&self, aabb: &AABB, mut callback: F) {
        self.traverse(|node| node.aabb.intersects(aabb), |node| callback(node.data));
    }

    /// User data of every leaf overlapping `aabb`, ascending
    pub fn query(&self, aabb: &AABB) -> Vec<u32> {
        let mut out = Vec::new();
        self.query_callback(aabb, |d| out.push(d));
        out.sort_unstable();
        out
    }

    /// User data of every leaf whose fat box the ray segment touches, ascending
    pub fn ray_query(&self, origin: Vec3Fix, direction: Vec3Fix, max_t: Fix64) -> Vec<u32> {
        let mut out = Vec::new();
        self.traverse(
            |node| node.aabb.ray_intersect(origin, direction, max_t).is_some(),
            |node| out.push(node.data),
        );
        out.sort_unstable();
        out
    }

    /// All overlapping leaf pairs `(low, high)` by user data, sorted and deduplicated
    pub fn find_pairs(&self) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        for node in self.nodes.iter().filter(|n| n.height == 0 && n.is_leaf()) {
            let a = node.data;
            self.query_callback(&node.aabb, |b| {
                if a < b {
                    pairs.push((a, b));
                }
            });
        }
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    fn traverse(&self, mut visit: impl FnMut(&Node) -> bool, mut leaf: impl FnMut(&Node)) {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if !visit(node) {
                continue;
            }
            if node.is_leaf() {
                leaf(node);
            } else {
                stack.extend_from_slice(&node.children);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Node pool
    // ------------------------------------------------------------------------

    fn alloc_node(&mut self) -> u32 {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id as usize] = Node::FREE;
            id
        } else {
            self.nodes.push(Node::FREE);
            (self.nodes.len() - 1) as u32
        }
    }

    fn free_node(&mut self, id: u32) {
        self.nodes[id as usize] = Node::FREE;
        self.free_list.push(id);
    }

    // ------------------------------------------------------------------------
    // Insertion / removal
    // ------------------------------------------------------------------------

    /// Cost of descending into `child` when inserting `leaf_aabb`
    fn descend_cost(&self, child: u32, leaf_aabb: &AABB, inherited: Fix64) -> Fix64 {
        let node = &self.nodes[child as usize];
        let merged = leaf_aabb.union(&node.aabb).surface_area();
        if node.is_leaf() {
            merged + inherited
        } else {
            merged - node.aabb.surface_area() + inherited
        }
    }

    fn insert_leaf(&mut self, leaf: u32) {
        self.nodes[leaf as usize].parent = NULL_NODE;
        if self.root == NULL_NODE {
            self.root = leaf;
            return;
        }

        // Surface-area heuristic walk
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut sibling = self.root;
        while !self.nodes[sibling as usize].is_leaf() {
            let node = &self.nodes[sibling as usize];
            let area = node.aabb.surface_area();
            let merged = leaf_aabb.union(&node.aabb).surface_area();
            let here = merged.double();
            let inherited = (merged - area).double();
            let [left, right] = node.children;
            let cost_left = self.descend_cost(left, &leaf_aabb, inherited);
            let cost_right = self.descend_cost(right, &leaf_aabb, inherited);
            if here < cost_left && here < cost_right {
                break;
            }
            sibling = if cost_left <= cost_right { left } else { right };
        }

        let old_parent = self.nodes[sibling as usize].parent;
        let parent = self.alloc_node();
        {
            let sib = &self.nodes[sibling as usize];
            let merged = leaf_aabb.union(&sib.aabb);
            let height = sib.height + 1;
            let node = &mut self.nodes[parent as usize];
            node.parent = old_parent;
            node.aabb = merged;
            node.height = height;
            node.children = [sibling, leaf];
        }
        self.replace_child(old_parent, sibling, parent);
        self.nodes[sibling as usize].parent = parent;
        self.nodes[leaf as usize].parent = parent;

        self.refit_upwards(parent);
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }
        let parent = self.nodes[leaf as usize].parent;
        let grand_parent = self.nodes[parent as usize].parent;
        let [c0, c1] = self.nodes[parent as usize].children;
        let sibling = if c0 == leaf { c1 } else { c0 };

        self.replace_child(grand_parent, parent, sibling);
        self.nodes[sibling as usize].parent = grand_parent;
        self.free_node(parent);
        self.nodes[leaf as usize].parent = NULL_NODE;

        if grand_parent != NULL_NODE {
            self.refit_upwards(grand_parent);
        }
    }

    /// Point `parent`'s link from `old` to `new` (or the root if `parent` is null)
    fn replace_child(&mut self, parent: u32, old: u32, new: u32) {
        if parent == NULL_NODE {
            self.root = new;
            return;
        }
        let children = &mut self.nodes[parent as usize].children;
        if children[0] == old {
            children[0] = new;
        } else {
            children[1] = new;
        }
    }

    fn recompute(&mut self, id: u32) {
        let [l, r] = self.nodes[id as usize].children;
        let (ln, rn) = (&self.nodes[l as usize], &self.nodes[r as usize]);
        let aabb = ln.aabb.union(&rn.aabb);
        let height = 1 + ln.height.max(rn.height);
        let node = &mut self.nodes[id as usize];
        node.aabb = aabb;
        node.height = height;
    }

    fn refit_upwards(&mut self, start: u32) {
        let mut id = start;
        while id != NULL_NODE {
            id = self.balance(id);
            self.recompute(id);
            id = self.nodes[id as usize].parent;
        }
    }

    /// Rotate `a` if its subtrees differ in height by more than one
    fn balance(&mut self, a: u32) -> u32 {
        let node = &self.nodes[a as usize];
        if node.is_leaf() || node.height < 2 {
            return a;
        }
        let [l, r] = node.children;
        let skew = self.nodes[r as usize].height - self.nodes[l as usize].height;
        if skew > 1 {
            self.rotate(a, 1)
        } else if skew < -1 {
            self.rotate(a, 0)
        } else {
            a
        }
    }

    /// Promote `a`'s child on `side` above `a`; returns the new subtree root
    fn rotate(&mut self, a: u32, side: usize) -> u32 {
        let c = self.nodes[a as usize].children[side];
        let [f, g] = self.nodes[c as usize].children;
        let parent = self.nodes[a as usize].parent;

        self.nodes[c as usize].parent = parent;
        self.replace_child(parent, a, c);
        self.nodes[a as usize].parent = c;

        let (tall, short) = if self.nodes[f as usize].height > self.nodes[g as usize].height {
            (f, g)
        } else {
            (g, f)
        };
        let mut c_children = [NULL_NODE; 2];
        c_children[1 - side] = a;
        c_children[side] = tall;
        self.nodes[c as usize].children = c_children;
        self.nodes[tall as usize].parent = c;
        self.nodes[a as usize].children[side] = short;
        self.nodes[short as usize].parent = a;

        self.recompute(a);
        self.recompute(c);
        c
    }

    /// Check parent links, heights and box containment
    pub fn validate(&self) -> bool {
        if self.root == NULL_NODE {
            return self.proxy_count == 0;
        }
        if self.nodes[self.root as usize].parent != NULL_NODE {
            return false;
        }
        let mut leaves = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if node.is_leaf() {
                leaves += 1;
                continue;
            }
            for &child in &node.children {
                let c = &self.nodes[child as usize];
                if c.parent != id || !node.aabb.contains(&c.aabb) {
                    return false;
                }
                stack.push(child);
            }
            let [l, r] = node.children;
            let (lh, rh) = (self.nodes[l as usize].height, self.nodes[r as usize].height);
            if node.height != 1 + lh.max(rh) {
                return false;
            }
        }
        leaves == self.proxy_count
    }
}
