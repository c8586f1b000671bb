use glam::*;
use rayon::prelude::*;
use uuid::Uuid;

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    AccelError, Blas, BlasBackend, BuildOptions, Frustum, InstanceId, Mesh, MeshId, PacketWidth, Ray, RayPacket,
    Result, SupportedPacketWidth, Timer, Tlas, TlasLayout, Transform
};

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneState {
    /// Never compiled successfully.
    Building,
    Ready,
    /// Edited since the last compile.
    Stale,
    Recompiling
}

/// Meshes and their placed instances, compiled into one two-level
/// acceleration structure. Queries are only valid in `SceneState::Ready`.
pub struct Scene<B: BlasBackend> {
    backend: B,
    options: BuildOptions,
    meshes: HashMap<Uuid, MeshEntry<B::Blas>>,
    instances: HashMap<InstanceId, InstanceEntry>,
    tlas: Tlas<B::Blas>,
    state: SceneState,
    next_mesh: u32,
    next_instance: u32
}

/*****************************************************************************
*                               PRIVATE STRUCTS
******************************************************************************/

struct MeshEntry<T: Blas> {
    mesh: Mesh,
    id: MeshId,
    blas: Option<Arc<T>>,
    dirty: bool,
    rebuilt: bool
}

struct InstanceEntry {
    mesh: Uuid,
    transform: Transform,
    dirty: bool
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl<B: BlasBackend> Scene<B> {
    pub fn new(backend: B, options: BuildOptions) -> Self {
        Scene {
            backend,
            options,
            meshes: HashMap::new(),
            instances: HashMap::new(),
            tlas: Tlas::default(),
            state: SceneState::Building,
            next_mesh: 0,
            next_instance: 0
        }
    }

    pub fn with_layout(mut self, layout: TlasLayout) -> Self {
        self.tlas.set_layout(layout);
        self
    }

    #[inline]
    pub fn state(&self) -> SceneState {
        self.state
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn tlas(&self) -> &Tlas<B::Blas> {
        &self.tlas
    }

    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn invalidate(&mut self) {
        if self.state == SceneState::Ready {
            self.state = SceneState::Stale;
        }
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> Uuid {
        let uuid = mesh.get_id();
        let id = MeshId(self.next_mesh);
        self.next_mesh += 1;

        self.meshes.insert(uuid, MeshEntry {
            mesh,
            id,
            blas: None,
            dirty: true,
            rebuilt: false
        });
        self.invalidate();
        uuid
    }

    pub fn mesh(&self, mesh: &Uuid) -> Option<&Mesh> {
        self.meshes.get(mesh).map(|entry| &entry.mesh)
    }

    /// Identifier reported in hit records for `mesh`.
    pub fn mesh_id(&self, mesh: &Uuid) -> Option<MeshId> {
        self.meshes.get(mesh).map(|entry| entry.id)
    }

    /// Mutable access to a mesh; its BLAS is rebuilt on the next compile.
    pub fn mesh_mut(&mut self, mesh: &Uuid) -> Result<&mut Mesh> {
        self.invalidate();
        let entry = self.meshes.get_mut(mesh).ok_or(AccelError::UnknownMesh(*mesh))?;
        entry.dirty = true;
        Ok(&mut entry.mesh)
    }

    /// Removes a mesh together with every instance of it.
    pub fn remove_mesh(&mut self, mesh: &Uuid) -> Result<Mesh> {
        let entry = self.meshes.remove(mesh).ok_or(AccelError::UnknownMesh(*mesh))?;

        let orphans: Vec<InstanceId> = self.instances
            .iter()
            .filter(|(_, instance)| instance.mesh == *mesh)
            .map(|(id, _)| *id)
            .collect();
        for id in orphans {
            self.remove_instance(id)?;
        }

        self.invalidate();
        Ok(entry.mesh)
    }

    pub fn add_instance(&mut self, mesh: &Uuid, transform: Transform) -> Result<InstanceId> {
        if !self.meshes.contains_key(mesh) {
            return Err(AccelError::UnknownMesh(*mesh));
        }

        let id = InstanceId(self.next_instance);
        self.next_instance += 1;
        self.instances.insert(id, InstanceEntry {
            mesh: *mesh,
            transform,
            dirty: true
        });
        self.invalidate();
        Ok(id)
    }

    pub fn remove_instance(&mut self, instance: InstanceId) -> Result<()> {
        self.instances.remove(&instance).ok_or(AccelError::UnknownInstance(instance))?;
        if self.tlas.leaf(instance).is_some() {
            self.tlas.remove_instance(instance)?;
        }
        self.invalidate();
        Ok(())
    }

    pub fn transform(&self, instance: InstanceId) -> Option<&Transform> {
        self.instances.get(&instance).map(|entry| &entry.transform)
    }

    /// Mutable access to an instance transform; marks the instance dirty.
    pub fn transform_mut(&mut self, instance: InstanceId) -> Result<&mut Transform> {
        self.invalidate();
        let entry = self.instances.get_mut(&instance).ok_or(AccelError::UnknownInstance(instance))?;
        entry.dirty = true;
        Ok(&mut entry.transform)
    }

    pub fn set_transform(&mut self, instance: InstanceId, transform: Transform) -> Result<()> {
        *self.transform_mut(instance)? = transform;
        Ok(())
    }

    /// Re-triangulates and rebuilds every dirty mesh, then refreshes the TLAS.
    /// On failure the scene keeps its previous state and must be compiled again.
    pub fn compile(&mut self) -> Result<()> {
        let previous = self.state;
        if previous == SceneState::Ready {
            return Ok(());
        }
        if previous == SceneState::Stale {
            self.state = SceneState::Recompiling;
        }

        let timer = Timer::new();
        let result = self.compile_inner();
        match &result {
            Ok(rebuilt) => {
                self.state = SceneState::Ready;
                log::info!(
                    "Scene compiled in: {:.2}ms ({} BLAS rebuilt with the {} backend, {} instances)",
                    timer.elapsed_ms(), rebuilt, self.backend.name(), self.instances.len()
                );
            }
            Err(error) => {
                self.state = previous;
                log::error!("Scene compile failed: {}", error);
            }
        }
        result.map(|_| ())
    }

    fn compile_inner(&mut self) -> Result<usize> {
        for entry in self.meshes.values_mut() {
            if entry.mesh.is_modified() {
                entry.mesh.construct_triangles();
                entry.dirty = true;
            }
        }

        let backend = &self.backend;
        let options = &self.options;
        self.meshes
            .par_iter_mut()
            .filter(|(_, entry)| entry.dirty)
            .try_for_each(|(_, entry)| {
                let mut blas = backend.create_blas(entry.mesh.triangles().clone(), options);
                blas.build()?;
                entry.blas = Some(Arc::new(blas));
                entry.dirty = false;
                entry.rebuilt = true;
                Ok::<(), AccelError>(())
            })?;

        for (id, instance) in self.instances.iter_mut() {
            let entry = &self.meshes[&instance.mesh];
            let blas = match &entry.blas {
                Some(blas) => blas.clone(),
                None => continue
            };

            if self.tlas.leaf(*id).is_none() {
                let transform = *instance.transform.get_local_to_world();
                self.tlas.insert_instance(*id, blas, &transform, entry.id);
            } else {
                if entry.rebuilt {
                    self.tlas.set_blas(*id, blas)?;
                }
                if instance.dirty {
                    self.tlas.set_transform(*id, instance.transform.get_local_to_world())?;
                }
            }
            instance.dirty = false;
        }

        let mut rebuilt = 0;
        for entry in self.meshes.values_mut() {
            rebuilt += entry.rebuilt as usize;
            entry.rebuilt = false;
        }

        self.tlas.compile();
        Ok(rebuilt)
    }

    fn assert_ready(&self) {
        assert_eq!(self.state, SceneState::Ready, "scene queried before compile()");
    }

    pub fn intersect(&self, ray: &mut Ray) {
        self.assert_ready();
        self.tlas.intersect(ray);
    }

    pub fn occluded(&self, ray: &Ray) -> bool {
        self.assert_ready();
        self.tlas.occluded(ray)
    }

    pub fn intersect_packet<const SIZE: usize>(&self, packet: &mut RayPacket<SIZE>)
    where PacketWidth<SIZE>: SupportedPacketWidth {
        self.assert_ready();
        self.tlas.intersect_packet(packet);
    }

    /// Intersects every ray, spreading the work over the rayon pool.
    pub fn intersect_batch(&self, rays: &mut [Ray]) {
        self.assert_ready();
        rays.par_iter_mut().for_each(|ray| self.tlas.intersect(ray));
    }

    pub fn occluded_batch(&self, rays: &[Ray]) -> Vec<bool> {
        self.assert_ready();
        rays.par_iter().map(|ray| self.tlas.occluded(ray)).collect()
    }

    pub fn visible_instances(&self, frustum: &Frustum) -> Vec<InstanceId> {
        self.assert_ready();
        self.tlas.visible_instances(frustum)
    }

    /// Frustum from a point light towards an instance's bounds, for culling shadow casters.
    pub fn shadow_frustum(&self, instance: InstanceId, light_position: &Vec3) -> Result<Frustum> {
        self.assert_ready();
        let leaf = self.tlas.leaf(instance).ok_or(AccelError::UnknownInstance(instance))?;
        Ok(Frustum::shadow(&leaf.obb(), light_position))
    }
}
