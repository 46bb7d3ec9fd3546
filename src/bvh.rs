//! Linear Bounding Volume Hierarchy (LBVH) - Stackless Edition
//!
//! Static acceleration structure for triangle meshes.
//!
//! # Features
//!
//! - Morton code-based construction (deterministic, stable sort)
//! - Flat array storage in depth-first order
//! - Stackless traversal using escape pointers (no heap allocation during query)
//! - Node bounds compressed to conservative integer floor/ceil
//! - Results returned in ascending primitive order

use crate::collider::AABB;
use crate::fixed::Fix64;
use crate::math::Vec3Fix;

// ============================================================================
// Morton Codes (Z-order curve)
// ============================================================================

/// Expand 21-bit integer to 63 bits for 3D Morton code
#[inline]
fn expand_bits(mut v: u64) -> u64 {
    v = (v | (v << 32)) & 0x001F00000000FFFF;
    v = (v | (v << 16)) & 0x001F0000FF0000FF;
    v = (v | (v << 8)) & 0x100F00F00F00F00F;
    v = (v | (v << 4)) & 0x10C30C30C30C30C3;
    v = (v | (v << 2)) & 0x1249249249249249;
    v
}

/// 63-bit Morton code from coordinates in `[0, 2^21)`
#[inline]
pub fn morton_code(x: u64, y: u64, z: u64) -> u64 {
    let x = x.min((1 << 21) - 1);
    let y = y.min((1 << 21) - 1);
    let z = z.min((1 << 21) - 1);
    expand_bits(x) | (expand_bits(y) << 1) | (expand_bits(z) << 2)
}

/// Quantize `t = (v - lo) / size` to 21 bits
#[inline]
fn quantize(v: Fix64, lo: Fix64, size: Fix64) -> u64 {
    if size.is_zero() {
        return 0;
    }
    let t = (v - lo) / size;
    if t.is_negative() {
        0
    } else if t >= Fix64::ONE {
        0x1FFFFF
    } else {
        // 32 fractional bits, keep the top 21
        ((t.raw() as u64) >> 11) & 0x1FFFFF
    }
}

/// Morton code of a point within a bounding box
pub fn point_to_morton(point: Vec3Fix, bounds: &AABB) -> u64 {
    let size = bounds.max - bounds.min;
    morton_code(
        quantize(point.x, bounds.min.x, size.x),
        quantize(point.y, bounds.min.y, size.y),
        quantize(point.z, bounds.min.z, size.z),
    )
}

// ============================================================================
// BVH Node (Stackless-Ready)
// ============================================================================

/// Sentinel value for "no escape" (end of traversal)
pub const ESCAPE_NONE: u32 = 0x00FF_FFFF;

/// BVH node
///
/// Nodes are laid out depth-first, so an internal node's left child is
/// always the next node. `first_child_or_prim` holds the right child for
/// internal nodes and the first primitive slot for leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BvhNode {
    /// Bounding box minimum (floored to i32)
    pub aabb_min: [i32; 3],
    /// Right child index (internal) or primitive start (leaf)
    pub first_child_or_prim: u32,
    /// Bounding box maximum (ceiled to i32)
    pub aabb_max: [i32; 3],
    /// Packed: upper 8 bits = primitive count (0 = internal), lower 24 bits = escape index
    pub prim_count_escape: u32,
}

impl BvhNode {
    /// Maximum primitives per leaf (fits in 8 bits)
    pub const MAX_PRIMS_PER_LEAF: u32 = 255;

    /// Create internal node
    #[inline]
    pub fn internal(aabb: &AABB, right_child: u32, escape_idx: u32) -> Self {
        Self {
            aabb_min: aabb_to_i32_min(aabb),
            first_child_or_prim: right_child,
            aabb_max: aabb_to_i32_max(aabb),
            prim_count_escape: escape_idx & ESCAPE_NONE,
        }
    }

    /// Create leaf node; `count` saturates at [`Self::MAX_PRIMS_PER_LEAF`]
    #[inline]
    pub fn leaf(aabb: &AABB, first_prim: u32, count: u32, escape_idx: u32) -> Self {
        let clamped = count.min(Self::MAX_PRIMS_PER_LEAF);
        Self {
            aabb_min: aabb_to_i32_min(aabb),
            first_child_or_prim: first_prim,
            aabb_max: aabb_to_i32_max(aabb),
            prim_count_escape: (clamped << 24) | (escape_idx & ESCAPE_NONE),
        }
    }

    /// Check if this is a leaf node
    #[inline]
    pub fn is_leaf(&self) -> bool {
        (self.prim_count_escape >> 24) > 0
    }

    /// Primitive count (0 for internal nodes)
    #[inline]
    pub fn prim_count(&self) -> u32 {
        self.prim_count_escape >> 24
    }

    /// Next node to visit on AABB miss
    #[inline]
    pub fn escape_idx(&self) -> u32 {
        self.prim_count_escape & ESCAPE_NONE
    }

    #[inline]
    fn set_escape(&mut self, escape: u32) {
        self.prim_count_escape = (self.prim_count_escape & 0xFF00_0000) | (escape & ESCAPE_NONE);
    }

    /// Integer AABB overlap test
    #[inline]
    pub fn intersects_i32(&self, query_min: &[i32; 3], query_max: &[i32; 3]) -> bool {
        self.aabb_min[0] <= query_max[0]
            && self.aabb_max[0] >= query_min[0]
            && self.aabb_min[1] <= query_max[1]
            && self.aabb_max[1] >= query_min[1]
            && self.aabb_min[2] <= query_max[2]
            && self.aabb_max[2] >= query_min[2]
    }

    /// Reconstructed (conservative) bounds
    pub fn get_aabb(&self) -> AABB {
        let v = |c: [i32; 3]| Vec3Fix::from_int(c[0] as i64, c[1] as i64, c[2] as i64);
        AABB::new(v(self.aabb_min), v(self.aabb_max))
    }
}

/// Floor to i32 (arithmetic shift floors negatives too)
#[inline]
fn fix_floor_i32(v: Fix64) -> i32 {
    (v.raw() >> 32) as i32
}

/// Ceil to i32, clamped
#[inline]
fn fix_ceil_i32(v: Fix64) -> i32 {
    let floor = v.raw() >> 32;
    let ceil = if v.raw() & 0xFFFF_FFFF != 0 { floor + 1 } else { floor };
    ceil.min(i32::MAX as i64) as i32
}

#[inline]
fn aabb_to_i32_min(aabb: &AABB) -> [i32; 3] {
    [
        fix_floor_i32(aabb.min.x),
        fix_floor_i32(aabb.min.y),
        fix_floor_i32(aabb.min.z),
    ]
}

#[inline]
fn aabb_to_i32_max(aabb: &AABB) -> [i32; 3] {
    [
        fix_ceil_i32(aabb.max.x),
        fix_ceil_i32(aabb.max.y),
        fix_ceil_i32(aabb.max.z),
    ]
}

// ============================================================================
// Linear BVH with Stackless Traversal
// ============================================================================

/// Primitive entry for BVH construction
#[derive(Clone, Copy, Debug)]
pub struct BvhPrimitive {
    /// AABB of the primitive
    pub aabb: AABB,
    /// Caller's index (e.g. triangle index)
    pub index: u32,
    /// Morton code (computed during build)
    pub morton: u64,
}

impl BvhPrimitive {
    /// New primitive; the Morton code is filled in by [`LinearBvh::build`]
    #[inline]
    pub fn new(aabb: AABB, index: u32) -> Self {
        Self {
            aabb,
            index,
            morton: 0,
        }
    }
}

/// Linear BVH (flat array storage with stackless traversal)
#[derive(Clone, Debug, Default)]
pub struct LinearBvh {
    /// Flat array of nodes (depth-first order with escape pointers)
    pub nodes: Vec<BvhNode>,
    /// Primitive indices in Morton order
    pub primitives: Vec<u32>,
    /// Exact bounds of all primitives
    pub bounds: AABB,
}

impl LinearBvh {
    /// Primitives per leaf
    const LEAF_SIZE: usize = 4;

    /// Build BVH from primitives
    pub fn build(mut primitives: Vec<BvhPrimitive>) -> Self {
        let Some(first) = primitives.first() else {
            return Self::default();
        };

        let mut bounds = first.aabb;
        for prim in &primitives[1..] {
            bounds = bounds.union(&prim.aabb);
        }

        for prim in &mut primitives {
            prim.morton = point_to_morton(prim.aabb.center(), &bounds);
        }

        // Stable sort: equal codes keep input order
        primitives.sort_by_key(|p| p.morton);

        let mut nodes = Vec::with_capacity(2 * primitives.len() / Self::LEAF_SIZE + 1);
        Self::build_recursive(&mut nodes, &primitives, 0, primitives.len());
        Self::assign_escapes(&mut nodes, 0, ESCAPE_NONE);

        Self {
            nodes,
            primitives: primitives.iter().map(|p| p.index).collect(),
            bounds,
        }
    }

    fn build_recursive(nodes: &mut Vec<BvhNode>, primitives: &[BvhPrimitive], start: usize, end: usize) {
        let node_idx = nodes.len();

        let mut aabb = primitives[start].aabb;
        for prim in &primitives[start + 1..end] {
            aabb = aabb.union(&prim.aabb);
        }

        if end - start <= Self::LEAF_SIZE {
            nodes.push(BvhNode::leaf(&aabb, start as u32, (end - start) as u32, ESCAPE_NONE));
            return;
        }

        nodes.push(BvhNode::internal(&aabb, 0, ESCAPE_NONE));
        let mid = Self::find_split(primitives, start, end);
        Self::build_recursive(nodes, primitives, start, mid);
        let right_idx = nodes.len() as u32;
        Self::build_recursive(nodes, primitives, mid, end);
        nodes[node_idx].first_child_or_prim = right_idx;
    }

    /// Left subtree escapes to the right sibling, right subtree to the parent's escape
    fn assign_escapes(nodes: &mut [BvhNode], idx: usize, escape: u32) {
        nodes[idx].set_escape(escape);
        if !nodes[idx].is_leaf() {
            let right = nodes[idx].first_child_or_prim;
            Self::assign_escapes(nodes, idx + 1, right);
            Self::assign_escapes(nodes, right as usize, escape);
        }
    }

    /// Split at the highest differing Morton bit
    fn find_split(primitives: &[BvhPrimitive], start: usize, end: usize) -> usize {
        let first_code = primitives[start].morton;
        let last_code = primitives[end - 1].morton;

        if first_code == last_code {
            return (start + end) / 2;
        }

        let highest_bit = 63 - (first_code ^ last_code).leading_zeros() as usize;
        let first_bit = (first_code >> highest_bit) & 1;

        let mut lo = start;
        let mut hi = end - 1;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if (primitives[mid].morton >> highest_bit) & 1 == first_bit {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        lo.max(start + 1).min(end - 1)
    }

    /// All primitives whose bounds may intersect `aabb`, ascending by index
    pub fn query(&self, aabb: &AABB) -> Vec<u32> {
        let mut result = Vec::new();
        self.query_callback(aabb, |i| result.push(i));
        result.sort_unstable();
        result
    }

    /// Visit candidates in traversal order (no allocation)
    pub fn query_callback<F>(&self, aabb: &AABB, mut callback: F)
    where
        F: FnMut(u32),
    {
        if self.nodes.is_empty() {
            return;
        }

        let query_min = aabb_to_i32_min(aabb);
        let query_max = aabb_to_i32_max(aabb);

        let mut idx = 0u32;
        while idx != ESCAPE_NONE {
            let node = &self.nodes[idx as usize];
            if node.intersects_i32(&query_min, &query_max) {
                if node.is_leaf() {
                    let start = node.first_child_or_prim as usize;
                    let count = node.prim_count() as usize;
                    for &p in &self.primitives[start..start + count] {
                        callback(p);
                    }
                    idx = node.escape_idx();
                } else {
                    idx += 1;
                }
            } else {
                idx = node.escape_idx();
            }
        }
    }

    /// Number of primitives
    #[inline]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// `true` if no primitives were added
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Get statistics about the BVH
    pub fn stats(&self) -> BvhStats {
        let mut stats = BvhStats {
            node_count: self.nodes.len(),
            primitive_count: self.primitives.len(),
            ..BvhStats::default()
        };
        for node in &self.nodes {
            if node.is_leaf() {
                stats.leaf_count += 1;
                stats.max_leaf_prims = stats.max_leaf_prims.max(node.prim_count() as usize);
            } else {
                stats.internal_count += 1;
            }
        }
        stats
    }
}

/// BVH statistics
#[derive(Clone, Copy, Debug, Default)]
pub struct BvhStats {
    /// Total number of nodes
    pub node_count: usize,
    /// Number of leaf nodes
    pub leaf_count: usize,
    /// Number of internal nodes
    pub internal_count: usize,
    /// Total number of primitives stored
    pub primitive_count: usize,
    /// Maximum primitives in any leaf
    pub max_leaf_prims: usize,
}
