use glam::*;

use std::sync::Arc;

use super::{Blas, BlasBackend, BuildOptions, BuildQuality};
use crate::{
    AccelError, BackendError, PacketWidth, Ray, RayFlags, RayPacket, Result, SupportedPacketWidth, Timer,
    Triangle, TriangleHit, AABB, INVALID_TRIANGLE
};

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

/// Ray and hit layout exchanged with an external ray tracing library.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceRayHit {
    pub org: Vec3,
    pub dir: Vec3,
    pub tnear: f32,
    pub tfar: f32,
    pub u: f32,
    pub v: f32,
    /// `INVALID_TRIANGLE` until a primitive is hit.
    pub prim_id: u32,
    /// Unnormalized geometric normal.
    pub ng: Vec3,
    /// Skip primitives whose front face points away from `org`.
    pub cull_back_faces: bool
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceBuildOptions {
    pub quality: BuildQuality,
    pub robust: bool
}

/// Minimal surface of a hardware or vendor accelerated triangle intersector.
pub trait RayTracingDevice: Send + Sync {
    type Geometry: Send + Sync;

    fn build_geometry(
        &self,
        positions: &[Vec3],
        indices: &[[u32; 3]],
        options: &DeviceBuildOptions
    ) -> std::result::Result<Self::Geometry, BackendError>;

    /// Shrinks `ray.tfar` and fills the hit fields when a closer primitive is found.
    fn intersect(&self, geometry: &Self::Geometry, ray: &mut DeviceRayHit);

    fn occluded(&self, geometry: &Self::Geometry, ray: &mut DeviceRayHit) -> bool {
        self.intersect(geometry, ray);
        ray.prim_id != INVALID_TRIANGLE
    }

    fn intersect_stream(&self, geometry: &Self::Geometry, rays: &mut [DeviceRayHit], active: &[bool]) {
        for (ray, active) in rays.iter_mut().zip(active) {
            if *active {
                self.intersect(geometry, ray);
            }
        }
    }
}

/// BLAS delegating to a `RayTracingDevice`. Degenerate triangles are left out
/// of the device geometry and device primitive ids are mapped back to
/// triangle cache indices.
pub struct HardwareBlas<D: RayTracingDevice> {
    device: Arc<D>,
    triangles: Arc<[Triangle]>,
    options: BuildOptions,
    geometry: Option<D::Geometry>,
    prim_map: Vec<u32>,
    aabb: AABB
}

pub struct HardwareBackend<D: RayTracingDevice> {
    device: Arc<D>
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl DeviceRayHit {
    pub fn from_ray(ray: &Ray) -> Self {
        DeviceRayHit {
            org: *ray.origin(),
            dir: *ray.direction(),
            tnear: ray.t_min(),
            tfar: ray.t_max(),
            u: 0.0,
            v: 0.0,
            prim_id: INVALID_TRIANGLE,
            ng: Vec3::ZERO,
            cull_back_faces: ray.flags().contains(RayFlags::CullBackFaces)
        }
    }
}

impl From<&BuildOptions> for DeviceBuildOptions {
    fn from(options: &BuildOptions) -> Self {
        DeviceBuildOptions {
            quality: options.quality,
            robust: options.robust
        }
    }
}

impl<D: RayTracingDevice> HardwareBlas<D> {
    pub fn new(device: Arc<D>, triangles: Arc<[Triangle]>, options: BuildOptions) -> Self {
        HardwareBlas {
            device,
            triangles,
            options,
            geometry: None,
            prim_map: Vec::new(),
            aabb: AABB::default()
        }
    }

    fn geometry(&self) -> &D::Geometry {
        match &self.geometry {
            Some(geometry) => geometry,
            None => panic!("BLAS queried before a successful build()")
        }
    }

    /// Writes a device result back into `ray` if it is a hit.
    fn resolve(&self, ray: &mut Ray, device_ray: &DeviceRayHit) {
        if device_ray.prim_id == INVALID_TRIANGLE {
            return;
        }

        let tri_idx = self.prim_map[device_ray.prim_id as usize];
        let triangle = &self.triangles[tri_idx as usize];
        let solution = TriangleHit {
            t: device_ray.tfar,
            u: device_ray.u,
            v: device_ray.v
        };
        ray.record(triangle.hit_record(&solution, tri_idx));
    }
}

impl<D: RayTracingDevice> Blas for HardwareBlas<D> {
    fn build(&mut self) -> Result<()> {
        self.geometry = None;
        if self.triangles.is_empty() {
            return Err(AccelError::EmptyMesh);
        }

        let timer = Timer::new();
        let mut positions = Vec::with_capacity(self.triangles.len() * 3);
        let mut indices = Vec::with_capacity(self.triangles.len());
        let mut prim_map = Vec::with_capacity(self.triangles.len());
        let mut aabb = AABB::default();

        for (i, triangle) in self.triangles.iter().enumerate() {
            triangle.expand_aabb(&mut aabb);
            if triangle.is_degenerate() {
                continue;
            }

            let base = positions.len() as u32;
            positions.extend(triangle.vert.iter().map(|v| v.position));
            indices.push([base, base + 1, base + 2]);
            prim_map.push(i as u32);
        }
        if indices.is_empty() {
            return Err(AccelError::DegenerateMesh);
        }

        let geometry = self.device
            .build_geometry(&positions, &indices, &DeviceBuildOptions::from(&self.options))
            .map_err(|error| {
                log::error!("Hardware BLAS build over {} triangles failed: {}", self.triangles.len(), error);
                AccelError::from(error)
            })?;

        self.geometry = Some(geometry);
        self.prim_map = prim_map;
        self.aabb = aabb;

        log::debug!(
            "Hardware BLAS build over {} triangles in: {:.2}ms ({} skipped as degenerate)",
            self.triangles.len(), timer.elapsed_ms(), self.triangles.len() - self.prim_map.len()
        );
        Ok(())
    }

    #[inline]
    fn is_built(&self) -> bool {
        self.geometry.is_some()
    }

    fn intersect(&self, ray: &mut Ray) {
        let geometry = self.geometry();
        let mut device_ray = DeviceRayHit::from_ray(ray);
        if ray.any_hit() {
            self.device.occluded(geometry, &mut device_ray);
        } else {
            self.device.intersect(geometry, &mut device_ray);
        }
        ray.add_heat(1);
        self.resolve(ray, &device_ray);
    }

    fn intersect_packet<const SIZE: usize>(&self, packet: &mut RayPacket<SIZE>)
    where PacketWidth<SIZE>: SupportedPacketWidth {
        let geometry = self.geometry();
        let active = packet.active_lanes();
        let mut device_rays = packet.rays().map(|ray| DeviceRayHit::from_ray(&ray));

        self.device.intersect_stream(geometry, &mut device_rays, &active);

        for (i, device_ray) in device_rays.iter().enumerate() {
            if active[i] {
                let ray = packet.ray_mut(i);
                ray.add_heat(1);
                self.resolve(ray, device_ray);
            }
        }
    }

    fn aabb(&self) -> AABB {
        if self.is_built() {
            self.aabb
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

impl<D: RayTracingDevice> HardwareBackend<D> {
    pub fn new(device: Arc<D>) -> Self {
        HardwareBackend {
            device
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }
}

impl<D: RayTracingDevice> BlasBackend for HardwareBackend<D> {
    type Blas = HardwareBlas<D>;

    fn name(&self) -> &'static str {
        "hardware"
    }

    fn create_blas(&self, triangles: Arc<[Triangle]>, options: &BuildOptions) -> HardwareBlas<D> {
        HardwareBlas::new(self.device.clone(), triangles, *options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crate::{Mesh, SoftwareBlas, Vertex};

    fn hardware_blas(mesh: &Mesh) -> HardwareBlas<ReferenceDevice> {
        let backend = HardwareBackend::new(Arc::new(ReferenceDevice::default()));
        let mut blas = backend.create_blas(mesh.triangles().clone(), &BuildOptions::default());
        blas.build().unwrap();
        blas
    }

    #[test]
    fn agrees_with_software_blas() {
        let mut rng = seeded_rng(21);
        let mesh = random_soup(&mut rng, 800, 8.0, 1.0);
        let hardware = hardware_blas(&mesh);
        let mut software = SoftwareBlas::new(mesh.triangles().clone(), BuildOptions::default());
        software.build().unwrap();

        for _ in 0..500 {
            let ray = random_ray(&mut rng, 8.0);
            let mut a = ray;
            let mut b = ray;
            hardware.intersect(&mut a);
            software.intersect(&mut b);
            assert_eq!(a.is_hit(), b.is_hit());
            if a.is_hit() {
                assert!((a.hit.t - b.hit.t).abs() < 1e-4);
                assert_eq!(a.hit.triangle, b.hit.triangle);
            }
            assert_eq!(hardware.occluded(&ray), b.is_hit());

            let culled = ray.with_flags(RayFlags::CullBackFaces);
            let mut a = culled;
            let mut b = culled;
            hardware.intersect(&mut a);
            software.intersect(&mut b);
            assert_eq!(a.hit.triangle, b.hit.triangle);
        }
        assert_eq!(hardware.aabb(), software.aabb());

        let rays: [Ray; 8] = std::array::from_fn(|_| random_ray(&mut rng, 8.0));
        let mut a = RayPacket::new(rays).with_flags(RayFlags::CullBackFaces);
        let mut b = a;
        hardware.intersect_packet(&mut a);
        software.intersect_packet(&mut b);
        for i in 0..8 {
            assert_eq!(a.ray(i).hit.triangle, b.ray(i).hit.triangle);
        }
    }

    #[test]
    fn back_faces_are_culled_on_the_device() {
        let cube = unit_cube();
        let hardware = hardware_blas(&cube);
        let mut software = SoftwareBlas::new(cube.triangles().clone(), BuildOptions::default());
        software.build().unwrap();

        let inside = Ray::new(&Vec3::new(0.1, 0.2, 0.0), &Vec3::X);
        let culled = inside.with_flags(RayFlags::CullBackFaces);
        assert!(!software.occluded(&culled));
        assert!(!hardware.occluded(&culled));

        let mut ray = culled;
        hardware.intersect(&mut ray);
        assert!(!ray.is_hit());

        let mut ray = inside;
        hardware.intersect(&mut ray);
        assert!((ray.hit.t - 0.4).abs() < 1e-5);

        let mut packet = RayPacket::new([culled; 4]);
        hardware.intersect_packet(&mut packet);
        assert!(packet.rays().iter().all(|ray| !ray.is_hit()));

        let mut front = Ray::new(&Vec3::new(0.1, 0.2, 5.0), &Vec3::NEG_Z).with_flags(RayFlags::CullBackFaces);
        hardware.intersect(&mut front);
        assert!((front.hit.t - 4.5).abs() < 1e-5);
    }

    #[test]
    fn all_degenerate_mesh_fails_to_build() {
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::X * 2.0]
            .map(|position| Vertex { position, ..Default::default() })
            .to_vec();
        let mesh = Mesh::new(vertices, vec![0, 1, 2, 2, 1, 0]).unwrap();
        let mut blas = HardwareBlas::new(Arc::new(ReferenceDevice::default()), mesh.triangles().clone(), BuildOptions::default());
        assert_eq!(blas.build(), Err(AccelError::DegenerateMesh));
        assert!(!blas.is_built());
    }

    #[test]
    fn degenerate_triangles_keep_their_cache_index() {
        let vertices = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0)
        ].map(|position| Vertex { position, ..Default::default() }).to_vec();
        let mesh = Mesh::new(vertices, vec![0, 1, 2, 0, 1, 3]).unwrap();
        let blas = hardware_blas(&mesh);

        let mut ray = Ray::new(&Vec3::new(0.25, 0.25, 1.0), &Vec3::NEG_Z);
        blas.intersect(&mut ray);
        assert!(ray.is_hit());
        assert_eq!(ray.hit.triangle, 1);
        assert!((ray.hit.t - 1.0).abs() < 1e-6);
    }

    #[test]
    fn device_failure_surfaces_as_error() {
        let device = ReferenceDevice { fail_with: Some(BackendError::OutOfMemory) };
        let mut blas = HardwareBlas::new(Arc::new(device), unit_cube().triangles().clone(), BuildOptions::default());
        assert_eq!(blas.build(), Err(AccelError::Backend(BackendError::OutOfMemory)));
        assert!(!blas.is_built());
    }

    #[test]
    #[should_panic]
    fn query_before_build_panics() {
        let blas = HardwareBlas::new(Arc::new(ReferenceDevice::default()), unit_cube().triangles().clone(), BuildOptions::default());
        let mut ray = Ray::new(&Vec3::new(0.0, 0.0, 5.0), &Vec3::NEG_Z);
        blas.intersect(&mut ray);
    }

    #[test]
    fn packets_match_single_rays() {
        let mut rng = seeded_rng(4);
        let mesh = random_soup(&mut rng, 300, 5.0, 1.0);
        let blas = hardware_blas(&mesh);

        let rays: [Ray; 4] = std::array::from_fn(|_| random_ray(&mut rng, 5.0));
        let mut packet = RayPacket::new(rays);
        blas.intersect_packet(&mut packet);
        for (i, ray) in rays.iter().enumerate() {
            let mut single = *ray;
            blas.intersect(&mut single);
            assert_eq!(single.hit, packet.ray(i).hit);
        }

        let mut shadow = RayPacket::new(rays).with_flags(RayFlags::AnyHit);
        blas.intersect_packet(&mut shadow);
        for (i, ray) in rays.iter().enumerate() {
            assert_eq!(shadow.ray(i).is_hit(), blas.occluded(ray));
        }
    }
}
