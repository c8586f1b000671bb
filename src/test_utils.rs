use glam::*;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::*;

/// Axis aligned unit cube centered at the origin, 24 vertices and 12 triangles.
pub fn unit_cube() -> Mesh {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for normal in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
        let u = if normal.x != 0.0 {
            Vec3::Y
        } else if normal.y != 0.0 {
            Vec3::Z
        } else {
            Vec3::X
        };
        let v = normal.cross(u);
        let center = normal * 0.5;

        let base = vertices.len() as u32;
        for (s, t) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            vertices.push(Vertex {
                position: center + u * s + v * t,
                normal,
                uv: Vec2::new(s + 0.5, t + 0.5),
                ..Default::default()
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh::new(vertices, indices).unwrap()
}

/// Random triangles with vertices inside `[-extent, extent]^3`, each roughly `size` across.
pub fn random_soup(rng: &mut StdRng, count: usize, extent: f32, size: f32) -> Mesh {
    let mut vertices = Vec::with_capacity(count * 3);
    for _ in 0..count {
        let center = random_vec3(rng, extent);
        for _ in 0..3 {
            vertices.push(Vertex {
                position: center + random_vec3(rng, size),
                ..Default::default()
            });
        }
    }
    let indices = (0..vertices.len() as u32).collect();
    Mesh::new(vertices, indices).unwrap()
}

pub fn random_vec3(rng: &mut StdRng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent)
    )
}

/// Ray from outside `[-extent, extent]^3` aimed near the middle, or off to the side
/// so that a share of the suite misses everything.
pub fn random_ray(rng: &mut StdRng, extent: f32) -> Ray {
    let origin = random_vec3(rng, extent * 3.0);
    let target = random_vec3(rng, extent * 1.5);
    Ray::new(&origin, &(target - origin).normalize())
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Closest hit by testing every triangle.
pub fn brute_force(triangles: &[Triangle], ray: &Ray) -> Option<(f32, u32)> {
    let mut nearest = *ray;
    let mut closest = None;
    for (i, triangle) in triangles.iter().enumerate() {
        if let Some(hit) = triangle.intersect(&nearest) {
            nearest.hit.t = hit.t;
            closest = Some((hit.t, i as u32));
        }
    }
    closest
}

pub fn assert_same_hit(expected: Option<(f32, u32)>, actual: &Hit) {
    match expected {
        Some((t, _)) => {
            assert!(actual.is_hit(), "expected hit at {t}");
            assert!((actual.t - t).abs() <= 1e-4 * t.max(1.0), "t {} != {}", actual.t, t);
        }
        None => assert!(!actual.is_hit(), "unexpected hit at {}", actual.t)
    }
}

/// Software stand-in for an external ray tracing library.
#[derive(Default)]
pub struct ReferenceDevice {
    pub fail_with: Option<BackendError>
}

pub struct ReferenceGeometry {
    triangles: Vec<[Vec3; 3]>
}

impl RayTracingDevice for ReferenceDevice {
    type Geometry = ReferenceGeometry;

    fn build_geometry(&self, positions: &[Vec3], indices: &[[u32; 3]], _options: &DeviceBuildOptions) -> std::result::Result<ReferenceGeometry, BackendError> {
        if let Some(error) = self.fail_with {
            return Err(error);
        }

        let triangles = indices
            .iter()
            .map(|i| [positions[i[0] as usize], positions[i[1] as usize], positions[i[2] as usize]])
            .collect();
        Ok(ReferenceGeometry { triangles })
    }

    fn intersect(&self, geometry: &ReferenceGeometry, ray: &mut DeviceRayHit) {
        for (prim, p) in geometry.triangles.iter().enumerate() {
            let e1 = p[1] - p[0];
            let e2 = p[2] - p[0];
            let pvec = ray.dir.cross(e2);
            let det = e1.dot(pvec);
            if ray.cull_back_faces {
                if det < 1e-8 {
                    continue;
                }
            } else if det.abs() < 1e-8 {
                continue;
            }
            let inv_det = 1.0 / det;
            let tvec = ray.org - p[0];
            let u = tvec.dot(pvec) * inv_det;
            if !(0.0..=1.0).contains(&u) {
                continue;
            }
            let qvec = tvec.cross(e1);
            let v = ray.dir.dot(qvec) * inv_det;
            if v < 0.0 || u + v > 1.0 {
                continue;
            }
            let t = e2.dot(qvec) * inv_det;
            if t >= ray.tnear && t < ray.tfar {
                ray.tfar = t;
                ray.u = u;
                ray.v = v;
                ray.prim_id = prim as u32;
                ray.ng = e1.cross(e2);
            }
        }
    }
}
