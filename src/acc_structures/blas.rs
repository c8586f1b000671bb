use glam::*;

use std::sync::Arc;

use super::{Blas, BuildOptions};
use crate::{AccelError, Hit, PacketWidth, Ray, RayPacket, Result, SupportedPacketWidth, Timer, Triangle, AABB};

const MAX_BINS: usize = 32;
const MAX_DEPTH: u32 = 60;
const STACK_SIZE: usize = 64;

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

/// Binned SAH bounding volume hierarchy over a shared triangle cache.
///
/// Nodes live in one flat arena with the root at index 0. Children of an
/// interior node are stored next to each other, so a node only records the
/// index of its left child. Leaves reference a contiguous range of `indices`,
/// which is a permutation of the triangle cache.
pub struct SoftwareBlas {
    triangles: Arc<[Triangle]>,
    options: BuildOptions,
    nodes: Vec<Node>,
    indices: Vec<u32>,
    built: bool
}

/*****************************************************************************
*                               PRIVATE STRUCTS
******************************************************************************/

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Node {
    pub(crate) bounds: AABB,
    /// First triangle slot for leaves, left child index otherwise.
    pub(crate) left_first: u32,
    /// Zero for interior nodes.
    pub(crate) tri_count: u32
}

#[derive(Clone, Copy, Debug, Default)]
struct Bin {
    bounds: AABB,
    tri_count: u32
}

#[derive(Clone, Copy, Debug)]
struct Split {
    axis: usize,
    /// Triangles whose bin is at most `bin` go left.
    bin: usize,
    cost: f32,
    origin: f32,
    inv_scale: f32
}

struct Builder<'a> {
    triangles: &'a [Triangle],
    bin_count: usize,
    max_leaf_size: u32,
    parallel: bool,
    parallel_threshold: usize
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl SoftwareBlas {
    pub fn new(triangles: Arc<[Triangle]>, options: BuildOptions) -> Self {
        SoftwareBlas {
            triangles,
            options,
            nodes: Vec::new(),
            indices: Vec::new(),
            built: false
        }
    }

    #[inline]
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Triangle permutation referenced by the leaves.
    #[inline]
    pub fn triangle_indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> u32 {
        fn depth_of(nodes: &[Node], idx: usize) -> u32 {
            let node = &nodes[idx];
            if node.is_leaf() {
                1
            } else {
                let left = node.left_first as usize;
                1 + depth_of(nodes, left).max(depth_of(nodes, left + 1))
            }
        }

        if self.nodes.is_empty() {
            0
        } else {
            depth_of(&self.nodes, 0)
        }
    }

    fn assert_built(&self) {
        assert!(self.built, "BLAS queried before a successful build()");
    }

    /// Ordered stack traversal. `on_record` sees every hit accepted into the record.
    fn traverse(&self, ray: &mut Ray, on_record: &mut impl FnMut(&Hit)) {
        self.assert_built();

        let mut stack = [(0u32, 0.0f32); STACK_SIZE];
        let mut stack_idx = 0;
        let mut heat = 1;

        if self.nodes[0].bounds.intersect(ray) == f32::INFINITY {
            ray.add_heat(heat);
            return;
        }
        let mut node = &self.nodes[0];

        loop {
            if node.is_leaf() {
                for i in node.left_first..(node.left_first + node.tri_count) {
                    let tri_idx = self.indices[i as usize];
                    let triangle = &self.triangles[tri_idx as usize];
                    if let Some(solution) = triangle.intersect(ray) {
                        if ray.record(triangle.hit_record(&solution, tri_idx)) {
                            on_record(&ray.hit);
                            if ray.any_hit() {
                                ray.add_heat(heat);
                                return;
                            }
                        }
                    }
                }
            } else {
                let lchild_idx = node.left_first;
                let mut child1 = lchild_idx;
                let mut child2 = lchild_idx + 1;

                let mut dist1 = self.nodes[child1 as usize].bounds.intersect(ray);
                let mut dist2 = self.nodes[child2 as usize].bounds.intersect(ray);

                if dist1 > dist2 {
                    std::mem::swap(&mut dist1, &mut dist2);
                    std::mem::swap(&mut child1, &mut child2);
                }

                if dist1 != f32::INFINITY {
                    if dist2 != f32::INFINITY {
                        stack[stack_idx] = (child2, dist2);
                        stack_idx += 1;
                    }
                    heat += 1;
                    node = &self.nodes[child1 as usize];
                    continue;
                }
            }

            // Pop, skipping subtrees that start beyond the closest hit.
            let mut next = None;
            while stack_idx > 0 {
                stack_idx -= 1;
                let (idx, dist) = stack[stack_idx];
                if dist <= ray.t_max() {
                    next = Some(idx);
                    break;
                }
            }

            match next {
                Some(idx) => {
                    heat += 1;
                    node = &self.nodes[idx as usize];
                }
                None => break
            }
        }

        ray.add_heat(heat);
    }
}

impl Blas for SoftwareBlas {
    fn build(&mut self) -> Result<()> {
        self.built = false;
        if self.triangles.is_empty() {
            return Err(AccelError::EmptyMesh);
        }
        if self.triangles.iter().all(Triangle::is_degenerate) {
            return Err(AccelError::DegenerateMesh);
        }

        let timer = Timer::new();
        let builder = Builder {
            triangles: &self.triangles,
            bin_count: self.options.quality.bin_count(),
            max_leaf_size: self.options.max_leaf_size.max(1),
            parallel: self.options.parallel,
            parallel_threshold: self.options.parallel_threshold.max(2)
        };

        let mut indices: Vec<u32> = (0..self.triangles.len() as u32).collect();
        let nodes = builder.build_subtree(&mut indices, 0, 0);

        self.nodes = nodes;
        self.indices = indices;
        self.built = true;

        log::debug!(
            "BLAS build over {} triangles in: {:.2}ms ({} nodes)",
            self.triangles.len(), timer.elapsed_ms(), self.nodes.len()
        );
        Ok(())
    }

    #[inline]
    fn is_built(&self) -> bool {
        self.built
    }

    fn intersect(&self, ray: &mut Ray) {
        self.traverse(ray, &mut |_| {});
    }

    fn intersect_packet<const SIZE: usize>(&self, packet: &mut RayPacket<SIZE>)
    where PacketWidth<SIZE>: SupportedPacketWidth {
        self.assert_built();

        let mut active = packet.active_lanes();
        let mut stack = [0u32; STACK_SIZE];
        let mut stack_idx = 0;
        let mut node_idx = 0u32;

        loop {
            let node = &self.nodes[node_idx as usize];
            let dists = node.bounds.intersect_packet(packet, &active);
            let lanes = dists.map(|d| d != f32::INFINITY);

            if lanes.iter().any(|l| *l) {
                for (i, lane) in lanes.iter().enumerate() {
                    if *lane {
                        packet.ray_mut(i).add_heat(1);
                    }
                }

                if node.is_leaf() {
                    for (lane, ray_active) in active.iter_mut().enumerate() {
                        if !lanes[lane] {
                            continue;
                        }
                        let ray = packet.ray_mut(lane);
                        for i in node.left_first..(node.left_first + node.tri_count) {
                            let tri_idx = self.indices[i as usize];
                            let triangle = &self.triangles[tri_idx as usize];
                            if let Some(solution) = triangle.intersect(ray) {
                                ray.record(triangle.hit_record(&solution, tri_idx));
                                if ray.any_hit() {
                                    *ray_active = false;
                                    break;
                                }
                            }
                        }
                    }
                } else {
                    let left = node.left_first;
                    let right = left + 1;
                    let near = |child: u32| {
                        self.nodes[child as usize]
                            .bounds
                            .intersect_packet(packet, &lanes)
                            .into_iter()
                            .fold(f32::INFINITY, f32::min)
                    };

                    let (first, second) = if near(left) <= near(right) {
                        (left, right)
                    } else {
                        (right, left)
                    };
                    stack[stack_idx] = second;
                    stack_idx += 1;
                    node_idx = first;
                    continue;
                }
            }

            if stack_idx == 0 {
                break;
            }
            stack_idx -= 1;
            node_idx = stack[stack_idx];
        }
    }

    fn aabb(&self) -> AABB {
        if self.built {
            self.nodes[0].bounds
        } else {
            let mut aabb = AABB::default();
            for triangle in self.triangles.iter() {
                triangle.expand_aabb(&mut aabb);
            }
            aabb
        }
    }

    #[inline]
    fn triangles(&self) -> &Arc<[Triangle]> {
        &self.triangles
    }
}

impl Node {
    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.tri_count > 0
    }
}

impl<'a> Builder<'a> {
    fn bounds(&self, indices: &[u32]) -> AABB {
        let mut aabb = AABB::default();
        for i in indices {
            self.triangles[*i as usize].expand_aabb(&mut aabb);
        }
        aabb
    }

    /// Builds the subtree over `indices` into its own arena with the subtree
    /// root at index 0. `first` is the position of `indices` in the full
    /// permutation.
    fn build_subtree(&self, indices: &mut [u32], first: u32, depth: u32) -> Vec<Node> {
        let mut nodes = Vec::with_capacity(2 * indices.len() - 1);
        nodes.push(Node {
            bounds: self.bounds(indices),
            left_first: first,
            tri_count: indices.len() as u32
        });
        self.subdivide(0, &mut nodes, indices, depth);
        nodes
    }

    fn subdivide(&self, idx: usize, nodes: &mut Vec<Node>, indices: &mut [u32], depth: u32) {
        let node = nodes[idx];
        if node.tri_count <= self.max_leaf_size || depth >= MAX_DEPTH {
            return;
        }

        let Some(split) = self.best_split(indices) else {
            return;
        };
        let parent_cost = node.tri_count as f32 * node.bounds.surface_area();
        if split.cost >= parent_cost {
            return;
        }

        let left_count = self.partition(indices, &split);
        if left_count == 0 || left_count == indices.len() {
            return;
        }

        let parallel = self.parallel && indices.len() >= self.parallel_threshold;
        let (left, right) = indices.split_at_mut(left_count);
        let first = node.left_first;
        let right_first = first + left_count as u32;

        if parallel {
            let (left_nodes, right_nodes) = rayon::join(
                || self.build_subtree(left, first, depth + 1),
                || self.build_subtree(right, right_first, depth + 1)
            );
            Self::attach(idx, nodes, left_nodes, right_nodes);
        } else {
            let lchild = nodes.len();
            nodes[idx].left_first = lchild as u32;
            nodes[idx].tri_count = 0;
            nodes.push(Node {
                bounds: self.bounds(left),
                left_first: first,
                tri_count: left.len() as u32
            });
            nodes.push(Node {
                bounds: self.bounds(right),
                left_first: right_first,
                tri_count: right.len() as u32
            });

            self.subdivide(lchild, nodes, left, depth + 1);
            self.subdivide(lchild + 1, nodes, right, depth + 1);
        }
    }

    /// Splices two independently built subtrees under `nodes[idx]`, laying them
    /// out exactly as a depth-first serial build would have.
    fn attach(idx: usize, nodes: &mut Vec<Node>, left: Vec<Node>, right: Vec<Node>) {
        let lchild = nodes.len() as u32;
        let left_len = left.len() as u32;
        nodes[idx].left_first = lchild;
        nodes[idx].tri_count = 0;

        // Local index 0 is the subtree root and never appears as a child.
        let relocate = |mut node: Node, rest: u32| {
            if !node.is_leaf() {
                node.left_first = rest + node.left_first - 1;
            }
            node
        };

        let left_rest = lchild + 2;
        let right_rest = lchild + 2 + (left_len - 1);
        nodes.reserve(left.len() + right.len());
        nodes.push(relocate(left[0], left_rest));
        nodes.push(relocate(right[0], right_rest));
        nodes.extend(left[1..].iter().map(|n| relocate(*n, left_rest)));
        nodes.extend(right[1..].iter().map(|n| relocate(*n, right_rest)));
    }

    #[inline]
    fn bin_of(&self, centroid: f32, origin: f32, inv_scale: f32) -> usize {
        (self.bin_count - 1).min(((centroid - origin) * inv_scale) as usize)
    }

    fn best_split(&self, indices: &[u32]) -> Option<Split> {
        let mut tight_bounds = AABB::default();
        for i in indices {
            tight_bounds.grow_vec3(&self.triangles[*i as usize].centroid);
        }
        let extent = tight_bounds.extent();

        let bin_count = self.bin_count;
        let mut best: Option<Split> = None;

        for axis in 0..3 {
            if !(extent[axis] > 0.0) || !extent[axis].is_finite() {
                continue;
            }
            let origin = tight_bounds.min[axis];
            let inv_scale = bin_count as f32 / extent[axis];

            let mut bin = [Bin::default(); MAX_BINS];
            for i in indices {
                let triangle = &self.triangles[*i as usize];
                let bin_idx = self.bin_of(triangle.centroid[axis], origin, inv_scale);
                bin[bin_idx].tri_count += 1;
                triangle.expand_aabb(&mut bin[bin_idx].bounds);
            }

            let mut left_area   = [0.0; MAX_BINS - 1];
            let mut right_area  = [0.0; MAX_BINS - 1];
            let mut left_count  = [0;   MAX_BINS - 1];
            let mut right_count = [0;   MAX_BINS - 1];

            let mut left_aabb = AABB::default();
            let mut right_aabb = AABB::default();
            let mut left_sum = 0;
            let mut right_sum = 0;
            for i in 0..(bin_count - 1) {
                left_sum += bin[i].tri_count;
                left_count[i] = left_sum;
                left_aabb.grow_aabb(&bin[i].bounds);
                left_area[i] = left_aabb.surface_area();

                right_sum += bin[bin_count - 1 - i].tri_count;
                right_count[bin_count - 2 - i] = right_sum;
                right_aabb.grow_aabb(&bin[bin_count - 1 - i].bounds);
                right_area[bin_count - 2 - i] = right_aabb.surface_area();
            }

            for i in 0..(bin_count - 1) {
                if left_count[i] == 0 || right_count[i] == 0 {
                    continue;
                }
                let cost = (left_count[i] as f32 * left_area[i]) + (right_count[i] as f32 * right_area[i]);
                if best.map_or(true, |b| cost < b.cost) {
                    best = Some(Split { axis, bin: i, cost, origin, inv_scale });
                }
            }
        }

        best
    }

    /// Moves triangles left of `split` to the front, returning their count.
    fn partition(&self, indices: &mut [u32], split: &Split) -> usize {
        let mut i = 0;
        let mut j = indices.len();
        while i < j {
            let centroid = self.triangles[indices[i] as usize].centroid[split.axis];
            if self.bin_of(centroid, split.origin, split.inv_scale) <= split.bin {
                i += 1;
            } else {
                j -= 1;
                indices.swap(i, j);
            }
        }
        i
    }
}
