use glam::*;

use std::collections::HashMap;
use std::sync::Arc;

use super::Blas;
use crate::{
    AccelError, Frustum, Hit, InstanceId, MeshId, PacketWidth, Ray, RayFlags, RayPacket, Result,
    SupportedPacketWidth, Timer, AABB, OBB
};

/// Instance counts up to this stay a flat leaf list under `TlasLayout::Auto`.
const FLAT_LIMIT: usize = 8;

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlasLayout {
    /// Every leaf is tested against every ray.
    Flat,
    /// Agglomerative clustering over the leaves' world AABBs.
    Hierarchy,
    #[default]
    Auto
}

/// One placed instance of a built BLAS.
pub struct TlasLeaf<B: Blas> {
    blas: Arc<B>,
    local_to_world: Mat4,
    world_to_local: Mat4,
    normal_matrix: Mat3,
    aabb: AABB,
    mesh: MeshId,
    instance: InstanceId,
    dirty: bool
}

/// Top level acceleration structure over instance leaves.
///
/// Any change to the instance set or to a transform leaves the TLAS stale
/// until `compile` runs. Queries against a stale TLAS panic.
#[allow(clippy::upper_case_acronyms)]
pub struct Tlas<B: Blas> {
    leaves: Vec<TlasLeaf<B>>,
    /// Index into `leaves` per instance.
    slots: HashMap<InstanceId, usize>,
    nodes: Vec<Node>,
    layout: TlasLayout,
    next_instance: u32,
    stale: bool
}

/*****************************************************************************
*                               PRIVATE STRUCTS
******************************************************************************/

#[derive(Clone, Copy, Debug)]
struct Node {
    bounds: AABB,
    left: u32,
    right: u32,
    leaf: u32
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl TlasLayout {
    #[inline]
    pub fn is_hierarchical(&self, instance_count: usize) -> bool {
        match self {
            TlasLayout::Flat => false,
            TlasLayout::Hierarchy => true,
            TlasLayout::Auto => instance_count > FLAT_LIMIT
        }
    }
}

impl<B: Blas> TlasLeaf<B> {
    fn new(blas: Arc<B>, transform: &Mat4, mesh: MeshId, instance: InstanceId) -> Self {
        TlasLeaf {
            blas,
            local_to_world: *transform,
            world_to_local: Mat4::IDENTITY,
            normal_matrix: Mat3::IDENTITY,
            aabb: AABB::default(),
            mesh,
            instance,
            dirty: true
        }
    }

    #[inline]
    pub fn blas(&self) -> &Arc<B> {
        &self.blas
    }

    #[inline]
    pub fn local_to_world(&self) -> &Mat4 {
        &self.local_to_world
    }

    /// Cached inverse of `local_to_world`; only valid while the leaf is not dirty.
    #[inline]
    pub fn world_to_local(&self) -> &Mat4 {
        &self.world_to_local
    }

    /// World space bounds of the instance.
    #[inline]
    pub fn aabb(&self) -> &AABB {
        &self.aabb
    }

    #[inline]
    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    #[inline]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn obb(&self) -> OBB {
        OBB::from_aabb(&self.blas.aabb(), &self.local_to_world)
    }

    fn refresh(&mut self) {
        assert!(self.blas.is_built(), "TLAS compiled over an unbuilt BLAS");

        self.world_to_local = self.local_to_world.inverse();
        self.normal_matrix = Mat3::from_mat4(self.local_to_world).inverse().transpose();
        self.aabb = self.blas.aabb().transformed(&self.local_to_world);
        self.dirty = false;
    }

    /// Object space hit converted back to world space and tagged with this leaf's ids.
    fn world_hit(&self, local: &Hit) -> Hit {
        Hit {
            position: self.local_to_world.transform_point3(local.position),
            face_normal: (self.normal_matrix * local.face_normal).normalize_or_zero(),
            shading_normal: (self.normal_matrix * local.shading_normal).normalize_or_zero(),
            mesh: self.mesh,
            instance: self.instance,
            ..*local
        }
    }

    /// Returns true when the world ray took a closer hit from this instance.
    fn intersect(&self, ray: &mut Ray) -> bool {
        let mut local = ray.transformed(&self.world_to_local);
        self.blas.intersect(&mut local);
        ray.add_heat(local.heat());

        local.is_hit() && ray.record(self.world_hit(&local.hit))
    }

    fn intersect_packet<const SIZE: usize>(&self, packet: &mut RayPacket<SIZE>, lanes: &[bool; SIZE])
    where PacketWidth<SIZE>: SupportedPacketWidth {
        let mut local = packet.transformed(&self.world_to_local);
        self.blas.intersect_packet(&mut local);

        for (i, lane) in lanes.iter().enumerate() {
            if !*lane {
                continue;
            }
            let local_ray = local.ray(i);
            let ray = packet.ray_mut(i);
            ray.add_heat(local_ray.heat());
            if local_ray.is_hit() {
                ray.record(self.world_hit(&local_ray.hit));
            }
        }
    }
}

impl<B: Blas> Default for Tlas<B> {
    fn default() -> Self {
        Tlas::new(TlasLayout::default())
    }
}

impl<B: Blas> Tlas<B> {
    pub fn new(layout: TlasLayout) -> Self {
        Tlas {
            leaves: Vec::new(),
            slots: HashMap::new(),
            nodes: Vec::new(),
            layout,
            next_instance: 0,
            stale: true
        }
    }

    #[inline]
    pub fn layout(&self) -> TlasLayout {
        self.layout
    }

    pub fn set_layout(&mut self, layout: TlasLayout) {
        self.layout = layout;
        self.stale = true;
    }

    #[inline]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    #[inline]
    pub fn leaves(&self) -> &[TlasLeaf<B>] {
        &self.leaves
    }

    pub fn leaf(&self, instance: InstanceId) -> Option<&TlasLeaf<B>> {
        self.slots.get(&instance).map(|slot| &self.leaves[*slot])
    }

    fn leaf_mut(&mut self, instance: InstanceId) -> Result<&mut TlasLeaf<B>> {
        let slot = *self.slots.get(&instance).ok_or(AccelError::UnknownInstance(instance))?;
        Ok(&mut self.leaves[slot])
    }

    pub fn add_instance(&mut self, blas: Arc<B>, transform: &Mat4, mesh: MeshId) -> InstanceId {
        let instance = InstanceId(self.next_instance);
        self.insert_instance(instance, blas, transform, mesh);
        instance
    }

    /// Places an instance under a caller chosen id, replacing any leaf already using it.
    pub fn insert_instance(&mut self, instance: InstanceId, blas: Arc<B>, transform: &Mat4, mesh: MeshId) {
        let leaf = TlasLeaf::new(blas, transform, mesh, instance);
        match self.slots.get(&instance) {
            Some(slot) => self.leaves[*slot] = leaf,
            None => {
                self.slots.insert(instance, self.leaves.len());
                self.leaves.push(leaf);
            }
        }
        self.next_instance = self.next_instance.max(instance.0 + 1);
        self.stale = true;
    }

    pub fn remove_instance(&mut self, instance: InstanceId) -> Result<()> {
        let idx = self.slots.remove(&instance).ok_or(AccelError::UnknownInstance(instance))?;
        self.leaves.remove(idx);
        for (slot, leaf) in self.leaves.iter().enumerate().skip(idx) {
            self.slots.insert(leaf.instance, slot);
        }
        self.stale = true;
        Ok(())
    }

    pub fn set_transform(&mut self, instance: InstanceId, transform: &Mat4) -> Result<()> {
        let leaf = self.leaf_mut(instance)?;
        leaf.local_to_world = *transform;
        leaf.dirty = true;
        self.stale = true;
        Ok(())
    }

    /// Points an instance at a rebuilt BLAS.
    pub fn set_blas(&mut self, instance: InstanceId, blas: Arc<B>) -> Result<()> {
        let leaf = self.leaf_mut(instance)?;
        leaf.blas = blas;
        leaf.dirty = true;
        self.stale = true;
        Ok(())
    }

    /// Refreshes dirty leaves and rebuilds the top level hierarchy. Every
    /// referenced BLAS must already be built.
    pub fn compile(&mut self) {
        let timer = Timer::new();

        let mut refreshed = 0;
        for leaf in self.leaves.iter_mut().filter(|leaf| leaf.dirty) {
            leaf.refresh();
            refreshed += 1;
        }

        if self.layout.is_hierarchical(self.leaves.len()) {
            self.rebuild_hierarchy();
        } else {
            self.nodes.clear();
        }
        self.stale = false;

        log::debug!(
            "TLAS build over {} instances in: {:.2}ms ({} refreshed, {} nodes)",
            self.leaves.len(), timer.elapsed_ms(), refreshed, self.nodes.len()
        );
    }

    fn rebuild_hierarchy(&mut self) {
        self.nodes.clear();
        if self.leaves.is_empty() {
            return;
        }

        self.nodes.reserve(self.leaves.len() * 2);
        self.nodes.push(Node::default());

        let mut node_indices = vec![0; self.leaves.len()];
        let mut index_count = self.leaves.len();

        for (i, leaf) in self.leaves.iter().enumerate() {
            node_indices[i] = self.nodes.len();
            self.nodes.push(Node {
                bounds: leaf.aabb,
                left: 0,
                right: 0,
                leaf: i as u32
            });
        }

        let mut a = 0;
        let mut b = Self::find_best_match(&self.nodes, &node_indices, index_count, a);
        while index_count > 1 {
            let c = Self::find_best_match(&self.nodes, &node_indices, index_count, b);
            if a == c {
                let node_idx_a = node_indices[a];
                let node_idx_b = node_indices[b];

                let bounds = self.nodes[node_idx_a].bounds.union(&self.nodes[node_idx_b].bounds);
                node_indices[a] = self.nodes.len();
                self.nodes.push(Node {
                    bounds,
                    left: node_idx_a as u32,
                    right: node_idx_b as u32,
                    leaf: 0
                });

                node_indices[b] = node_indices[index_count - 1];
                index_count -= 1;
                if a == index_count {
                    a = b;
                }
                b = Self::find_best_match(&self.nodes, &node_indices, index_count, a);
            } else {
                a = b;
                b = c;
            }
        }
        self.nodes[0] = self.nodes[node_indices[a]];
    }

    fn find_best_match(nodes: &[Node], indices: &[usize], n: usize, a: usize) -> usize {
        let mut smallest = f32::INFINITY;
        let mut best_b = if a == 0 { 1 } else { 0 };
        for b in 0..n {
            if b != a {
                let surface_area = nodes[indices[a]].bounds.union(&nodes[indices[b]].bounds).surface_area();
                if surface_area < smallest {
                    smallest = surface_area;
                    best_b = b;
                }
            }
        }
        best_b
    }

    fn assert_compiled(&self) {
        assert!(!self.stale, "TLAS queried while stale; call compile() first");
    }

    /// Closest-hit query in world space (or first-hit for `RayFlags::AnyHit`).
    pub fn intersect(&self, ray: &mut Ray) {
        self.assert_compiled();

        if self.nodes.is_empty() {
            for leaf in &self.leaves {
                if leaf.aabb.intersect(ray) != f32::INFINITY && leaf.intersect(ray) && ray.any_hit() {
                    return;
                }
            }
            return;
        }

        let mut stack = Vec::with_capacity(32);
        let mut node = &self.nodes[0];
        if node.bounds.intersect(ray) == f32::INFINITY {
            return;
        }

        loop {
            ray.add_heat(1);
            if node.is_leaf() {
                if self.leaves[node.leaf as usize].intersect(ray) && ray.any_hit() {
                    return;
                }
            } else {
                let mut child1 = &self.nodes[node.left as usize];
                let mut child2 = &self.nodes[node.right as usize];
                let mut dist1 = child1.bounds.intersect(ray);
                let mut dist2 = child2.bounds.intersect(ray);

                if dist1 > dist2 {
                    std::mem::swap(&mut dist1, &mut dist2);
                    std::mem::swap(&mut child1, &mut child2);
                }

                if dist1 != f32::INFINITY {
                    if dist2 != f32::INFINITY {
                        stack.push((child2, dist2));
                    }
                    node = child1;
                    continue;
                }
            }

            let mut next = None;
            while let Some((candidate, dist)) = stack.pop() {
                if dist <= ray.t_max() {
                    next = Some(candidate);
                    break;
                }
            }
            match next {
                Some(candidate) => node = candidate,
                None => break
            }
        }
    }

    pub fn occluded(&self, ray: &Ray) -> bool {
        let mut shadow = ray.with_flags(ray.flags() | RayFlags::AnyHit);
        self.intersect(&mut shadow);
        shadow.is_hit()
    }

    pub fn intersect_packet<const SIZE: usize>(&self, packet: &mut RayPacket<SIZE>)
    where PacketWidth<SIZE>: SupportedPacketWidth {
        self.assert_compiled();

        if self.nodes.is_empty() {
            for leaf in &self.leaves {
                let lanes = leaf.aabb.intersect_packet(packet, &packet.active_lanes()).map(|d| d != f32::INFINITY);
                if lanes.iter().any(|l| *l) {
                    leaf.intersect_packet(packet, &lanes);
                }
            }
            return;
        }

        let mut stack = Vec::with_capacity(32);
        stack.push(0u32);
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx as usize];
            let lanes = node.bounds
                .intersect_packet(packet, &packet.active_lanes())
                .map(|d| d != f32::INFINITY);
            if !lanes.iter().any(|l| *l) {
                continue;
            }

            if node.is_leaf() {
                self.leaves[node.leaf as usize].intersect_packet(packet, &lanes);
            } else {
                stack.push(node.right);
                stack.push(node.left);
            }
        }
    }

    /// Instances whose oriented bounds are not entirely outside `frustum`.
    pub fn visible_instances(&self, frustum: &Frustum) -> Vec<InstanceId> {
        self.assert_compiled();

        if self.nodes.is_empty() {
            return self.leaves
                .iter()
                .filter(|leaf| leaf.obb().intersect_frustum(frustum))
                .map(|leaf| leaf.instance)
                .collect();
        }

        let mut visible = Vec::new();
        let mut stack = vec![0u32];
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx as usize];
            if !node.bounds.intersect_frustum(frustum) {
                continue;
            }

            if node.is_leaf() {
                let leaf = &self.leaves[node.leaf as usize];
                if leaf.obb().intersect_frustum(frustum) {
                    visible.push(leaf.instance);
                }
            } else {
                stack.push(node.right);
                stack.push(node.left);
            }
        }
        visible.sort_unstable();
        visible
    }

    pub fn aabb(&self) -> AABB {
        self.leaves.iter().fold(AABB::default(), |aabb, leaf| aabb.union(&leaf.aabb))
    }
}

impl Default for Node {
    #[inline]
    fn default() -> Self {
        Node {
            bounds: AABB::default(),
            left: 0,
            right: 0,
            leaf: 0
        }
    }
}

impl Node {
    /// The root sits at index 0 and is never anyone's child.
    #[inline]
    fn is_leaf(&self) -> bool {
        self.left == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crate::{BuildOptions, Mesh, SoftwareBlas};

    fn built(mesh: &Mesh) -> Arc<SoftwareBlas> {
        let mut blas = SoftwareBlas::new(mesh.triangles().clone(), BuildOptions::default());
        blas.build().unwrap();
        Arc::new(blas)
    }

    fn random_transform(rng: &mut rand::rngs::StdRng) -> Mat4 {
        use rand::Rng;
        let axis = random_vec3(rng, 1.0).try_normalize().unwrap_or(Vec3::Y);
        Mat4::from_scale_rotation_translation(
            Vec3::new(rng.gen_range(0.5..2.0), rng.gen_range(0.5..2.0), rng.gen_range(0.5..2.0)),
            Quat::from_axis_angle(axis, rng.gen_range(0.0..6.0)),
            random_vec3(rng, 20.0)
        )
    }

    fn check_bounds(tlas: &Tlas<SoftwareBlas>, idx: usize) -> Vec<u32> {
        let node = tlas.nodes[idx];
        let leaves = if node.is_leaf() {
            vec![node.leaf]
        } else {
            let mut leaves = check_bounds(tlas, node.left as usize);
            leaves.extend(check_bounds(tlas, node.right as usize));
            leaves
        };
        for leaf in &leaves {
            assert!(node.bounds.contains_aabb(tlas.leaves[*leaf as usize].aabb()));
        }
        leaves
    }

    #[test]
    fn two_instances_of_one_mesh_report_independent_hits() {
        let cube = built(&unit_cube());
        let mut tlas = Tlas::new(TlasLayout::Flat);
        let left = tlas.add_instance(cube.clone(), &Mat4::from_translation(Vec3::new(-3.0, 0.0, 0.0)), MeshId(0));
        let right = tlas.add_instance(
            cube,
            &Mat4::from_scale_rotation_translation(Vec3::splat(2.0), Quat::IDENTITY, Vec3::new(3.0, 0.0, 0.0)),
            MeshId(0)
        );
        tlas.compile();

        let mut ray = Ray::new(&Vec3::new(-3.0, 0.1, 10.0), &Vec3::NEG_Z);
        tlas.intersect(&mut ray);
        assert_eq!(ray.hit.instance, left);
        assert_eq!(ray.hit.mesh, MeshId(0));
        assert!((ray.hit.t - 9.5).abs() < 1e-5);
        assert!(ray.hit.position.abs_diff_eq(Vec3::new(-3.0, 0.1, 0.5), 1e-5));

        let mut ray = Ray::new(&Vec3::new(3.0, 0.1, 10.0), &Vec3::NEG_Z);
        tlas.intersect(&mut ray);
        assert_eq!(ray.hit.instance, right);
        assert!((ray.hit.t - 9.0).abs() < 1e-5);
        assert!(ray.hit.position.abs_diff_eq(Vec3::new(3.0, 0.1, 1.0), 1e-5));
        assert!(ray.hit.face_normal.abs_diff_eq(Vec3::Z, 1e-5));

        let mut ray = Ray::new(&Vec3::new(0.0, 0.1, 10.0), &Vec3::NEG_Z);
        tlas.intersect(&mut ray);
        assert!(!ray.is_hit());
    }

    #[test]
    fn instanced_hits_match_baked_geometry() {
        let mut rng = seeded_rng(17);
        let mesh = random_soup(&mut rng, 400, 3.0, 1.0);
        let blas = built(&mesh);

        for _ in 0..10 {
            let transform = random_transform(&mut rng);
            let mut baked = mesh.clone();
            baked.apply_transform(&transform);
            baked.construct_triangles();

            let mut tlas = Tlas::new(TlasLayout::Flat);
            tlas.add_instance(blas.clone(), &transform, MeshId(1));
            tlas.compile();

            let leaf = &tlas.leaves()[0];
            assert!((*leaf.world_to_local() * *leaf.local_to_world()).abs_diff_eq(Mat4::IDENTITY, 1e-4));

            for _ in 0..100 {
                let target = transform.transform_point3(random_vec3(&mut rng, 3.0));
                let origin = target + random_vec3(&mut rng, 1.0).normalize_or_zero() * 40.0;
                let mut ray = Ray::new(&origin, &(target - origin).normalize());
                let expected = brute_force(baked.triangles(), &ray);
                tlas.intersect(&mut ray);

                assert_eq!(ray.is_hit(), expected.is_some());
                if let Some((t, triangle)) = expected {
                    assert!((ray.hit.t - t).abs() < 1e-3 * t, "t {} != {}", ray.hit.t, t);
                    if ray.hit.triangle == triangle {
                        let normal = baked.triangles()[triangle as usize].face_normal;
                        assert!(ray.hit.face_normal.abs_diff_eq(normal, 1e-3));
                    }
                    assert!(ray.hit.position.abs_diff_eq(ray.at(ray.hit.t), 1e-2));
                }
            }
        }
    }

    #[test]
    fn flat_and_hierarchy_agree() {
        let mut rng = seeded_rng(23);
        let mesh = random_soup(&mut rng, 200, 2.0, 1.0);
        let blas = built(&mesh);

        let mut flat = Tlas::new(TlasLayout::Flat);
        let mut hierarchy = Tlas::new(TlasLayout::Hierarchy);
        for _ in 0..40 {
            let transform = random_transform(&mut rng);
            flat.add_instance(blas.clone(), &transform, MeshId(0));
            hierarchy.add_instance(blas.clone(), &transform, MeshId(0));
        }
        flat.compile();
        hierarchy.compile();

        let mut covered = check_bounds(&hierarchy, 0);
        covered.sort_unstable();
        assert_eq!(covered, (0..40).collect::<Vec<u32>>());

        for _ in 0..500 {
            let ray = random_ray(&mut rng, 20.0);
            let mut a = ray;
            let mut b = ray;
            flat.intersect(&mut a);
            hierarchy.intersect(&mut b);
            assert_eq!(a.is_hit(), b.is_hit());
            if a.is_hit() {
                assert!((a.hit.t - b.hit.t).abs() < 1e-4 * a.hit.t.max(1.0));
            }
            assert_eq!(flat.occluded(&ray), hierarchy.occluded(&ray));
        }
    }

    #[test]
    fn packets_match_single_rays() {
        let mut rng = seeded_rng(29);
        let mesh = random_soup(&mut rng, 200, 2.0, 1.0);
        let blas = built(&mesh);

        for layout in [TlasLayout::Flat, TlasLayout::Hierarchy] {
            let mut tlas = Tlas::new(layout);
            for _ in 0..12 {
                tlas.add_instance(blas.clone(), &random_transform(&mut rng), MeshId(0));
            }
            tlas.compile();

            for _ in 0..20 {
                let rays: [Ray; 8] = std::array::from_fn(|_| random_ray(&mut rng, 20.0));
                let mut packet = RayPacket::new(rays);
                tlas.intersect_packet(&mut packet);
                for (i, ray) in rays.iter().enumerate() {
                    let mut single = *ray;
                    tlas.intersect(&mut single);
                    assert_eq!(single.hit, packet.ray(i).hit);
                }

                let mut shadow = RayPacket::new(rays).with_flags(RayFlags::AnyHit);
                tlas.intersect_packet(&mut shadow);
                for (i, ray) in rays.iter().enumerate() {
                    assert_eq!(shadow.ray(i).is_hit(), tlas.occluded(ray));
                }
            }
        }
    }

    #[test]
    #[should_panic]
    fn query_on_stale_tlas_panics() {
        let mut tlas = Tlas::new(TlasLayout::Auto);
        tlas.add_instance(built(&unit_cube()), &Mat4::IDENTITY, MeshId(0));
        let mut ray = Ray::new(&Vec3::new(0.0, 0.0, 5.0), &Vec3::NEG_Z);
        tlas.intersect(&mut ray);
    }

    #[test]
    fn instance_lookup_survives_removal_and_replacement() {
        let cube = built(&unit_cube());
        let mut tlas = Tlas::new(TlasLayout::Hierarchy);
        let ids: Vec<InstanceId> = (0..20)
            .map(|i| tlas.add_instance(cube.clone(), &Mat4::from_translation(Vec3::X * (i as f32 * 3.0)), MeshId(i)))
            .collect();

        tlas.remove_instance(ids[4]).unwrap();
        tlas.remove_instance(ids[11]).unwrap();
        assert_eq!(tlas.remove_instance(ids[4]), Err(AccelError::UnknownInstance(ids[4])));
        tlas.insert_instance(ids[7], cube.clone(), &Mat4::from_translation(Vec3::Y * 50.0), MeshId(99));
        tlas.compile();

        assert_eq!(tlas.len(), 18);
        assert!(tlas.leaf(ids[4]).is_none());
        assert!(tlas.leaf(ids[11]).is_none());
        assert_eq!(tlas.leaf(ids[7]).unwrap().mesh(), MeshId(99));
        for (i, id) in ids.iter().enumerate() {
            if let Some(leaf) = tlas.leaf(*id) {
                assert_eq!(leaf.instance(), *id);
                if i != 7 {
                    assert_eq!(leaf.mesh(), MeshId(i as u32));
                }
            }
        }

        let mut ray = Ray::new(&Vec3::new(39.0, 0.1, 10.0), &Vec3::NEG_Z);
        tlas.intersect(&mut ray);
        assert_eq!(ray.hit.instance, ids[13]);
    }

    #[test]
    fn transform_update_requires_recompile() {
        let mut tlas = Tlas::new(TlasLayout::Auto);
        let instance = tlas.add_instance(built(&unit_cube()), &Mat4::IDENTITY, MeshId(0));
        tlas.compile();
        assert!(!tlas.is_stale());

        tlas.set_transform(instance, &Mat4::from_translation(Vec3::X * 10.0)).unwrap();
        assert!(tlas.is_stale());
        assert!(tlas.leaf(instance).unwrap().is_dirty());
        assert_eq!(
            tlas.set_transform(InstanceId(99), &Mat4::IDENTITY),
            Err(AccelError::UnknownInstance(InstanceId(99)))
        );

        tlas.compile();
        let mut ray = Ray::new(&Vec3::new(10.0, 0.0, 5.0), &Vec3::NEG_Z);
        tlas.intersect(&mut ray);
        assert!(ray.is_hit());
        assert_eq!(tlas.aabb(), AABB::new(&Vec3::new(9.5, -0.5, -0.5), &Vec3::new(10.5, 0.5, 0.5)));

        tlas.remove_instance(instance).unwrap();
        tlas.compile();
        let mut ray = Ray::new(&Vec3::new(10.0, 0.0, 5.0), &Vec3::NEG_Z);
        tlas.intersect(&mut ray);
        assert!(!ray.is_hit());
    }

    #[test]
    fn empty_tlas_misses() {
        for layout in [TlasLayout::Flat, TlasLayout::Hierarchy] {
            let mut tlas: Tlas<SoftwareBlas> = Tlas::new(layout);
            tlas.compile();
            let mut ray = Ray::new(&Vec3::ZERO, &Vec3::X);
            tlas.intersect(&mut ray);
            assert!(!ray.is_hit());
        }
    }

    #[test]
    fn frustum_culls_instances() {
        let cube = built(&unit_cube());
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let frustum = Frustum::from_view_projection(&(Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0) * view));

        for layout in [TlasLayout::Flat, TlasLayout::Hierarchy] {
            let mut tlas = Tlas::new(layout);
            let front = tlas.add_instance(cube.clone(), &Mat4::IDENTITY, MeshId(0));
            tlas.add_instance(cube.clone(), &Mat4::from_translation(Vec3::new(0.0, 0.0, 30.0)), MeshId(0));
            let side = tlas.add_instance(cube.clone(), &Mat4::from_translation(Vec3::new(2.0, 1.0, -5.0)), MeshId(0));
            tlas.add_instance(cube.clone(), &Mat4::from_translation(Vec3::new(80.0, 0.0, 0.0)), MeshId(0));
            tlas.compile();

            assert_eq!(tlas.visible_instances(&frustum), vec![front, side]);
        }
    }
}
