use std::sync::Arc;

use crate::{Ray, RayFlags, RayPacket, PacketWidth, SupportedPacketWidth, Result, Triangle, AABB};

pub mod blas;
pub use blas::*;
pub mod hardware;
pub use hardware::*;
pub mod tlas;
pub use tlas::*;

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildQuality {
    Low,
    Medium,
    High
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildOptions {
    pub quality: BuildQuality,
    /// Nodes with at most this many triangles become leaves.
    pub max_leaf_size: u32,
    pub parallel: bool,
    /// Minimum triangle count of a node whose subtrees are built on separate tasks.
    pub parallel_threshold: usize,
    /// Hint for hardware backends to favour robust over fast builds.
    pub robust: bool
}

/// Bottom level acceleration structure over one mesh's triangle cache.
///
/// Built once, then immutable: any number of threads may query it
/// concurrently. Querying before a successful `build` panics.
pub trait Blas: Send + Sync {
    fn build(&mut self) -> Result<()>;

    fn is_built(&self) -> bool;

    /// Closest-hit query (or first-hit when the ray carries `RayFlags::AnyHit`),
    /// updating `ray.hit` in place.
    fn intersect(&self, ray: &mut Ray);

    fn intersect_packet<const SIZE: usize>(&self, packet: &mut RayPacket<SIZE>)
    where PacketWidth<SIZE>: SupportedPacketWidth;

    fn aabb(&self) -> AABB;

    fn triangles(&self) -> &Arc<[Triangle]>;

    fn occluded(&self, ray: &Ray) -> bool {
        let mut shadow = ray.with_flags(ray.flags() | RayFlags::AnyHit);
        self.intersect(&mut shadow);
        shadow.is_hit()
    }
}

/// Creates the BLAS flavour used for every mesh of a scene.
pub trait BlasBackend: Send + Sync {
    type Blas: Blas;

    fn name(&self) -> &'static str;

    fn create_blas(&self, triangles: Arc<[Triangle]>, options: &BuildOptions) -> Self::Blas;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareBackend;

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl BuildQuality {
    #[inline]
    pub fn bin_count(&self) -> usize {
        match self {
            BuildQuality::Low => 8,
            BuildQuality::Medium => 16,
            BuildQuality::High => 32
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            quality: BuildQuality::High,
            max_leaf_size: 2,
            parallel: true,
            parallel_threshold: 4096,
            robust: true
        }
    }
}

impl BuildOptions {
    pub fn serial() -> Self {
        BuildOptions {
            parallel: false,
            ..Default::default()
        }
    }
}

impl BlasBackend for SoftwareBackend {
    type Blas = SoftwareBlas;

    fn name(&self) -> &'static str {
        "software"
    }

    fn create_blas(&self, triangles: Arc<[Triangle]>, options: &BuildOptions) -> SoftwareBlas {
        SoftwareBlas::new(triangles, *options)
    }
}
