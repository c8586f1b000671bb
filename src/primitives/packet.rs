use glam::*;

use super::{Hit, Ray, RayFlags};
use crate::{AccelError, Result};

/*****************************************************************************
*                               PUB STRUCTS
******************************************************************************/

pub struct PacketWidth<const SIZE: usize>;
pub trait SupportedPacketWidth {}

impl SupportedPacketWidth for PacketWidth<4> {}
impl SupportedPacketWidth for PacketWidth<8> {}
impl SupportedPacketWidth for PacketWidth<16> {}

/// Fixed width group of rays traversed together. Every lane ends with exactly
/// the hit record it would get from a single-ray query.
#[derive(Clone, Copy, Debug)]
pub struct RayPacket<const SIZE: usize>
where PacketWidth<SIZE>: SupportedPacketWidth {
    rays: [Ray; SIZE]
}

/*****************************************************************************
*                               IMPLEMENTATIONS
******************************************************************************/

impl<const SIZE: usize> RayPacket<SIZE>
where PacketWidth<SIZE>: SupportedPacketWidth {
    #[inline]
    pub fn new(rays: [Ray; SIZE]) -> Self {
        RayPacket {
            rays
        }
    }

    pub fn from_slice(rays: &[Ray]) -> Result<Self> {
        if rays.len() != SIZE {
            return Err(AccelError::PacketSize { expected: SIZE, actual: rays.len() });
        }

        let mut packet = [Ray::default(); SIZE];
        packet.copy_from_slice(rays);
        Ok(RayPacket::new(packet))
    }

    pub fn from_origins_directions(origins: &[Vec3; SIZE], directions: &[Vec3; SIZE]) -> Self {
        let mut rays = [Ray::default(); SIZE];
        for (i, ray) in rays.iter_mut().enumerate() {
            *ray = Ray::new(&origins[i], &directions[i]);
        }
        RayPacket::new(rays)
    }

    #[inline]
    pub fn width(&self) -> usize {
        SIZE
    }

    #[inline]
    pub fn ray(&self, i: usize) -> &Ray {
        &self.rays[i]
    }

    #[inline]
    pub fn ray_mut(&mut self, i: usize) -> &mut Ray {
        &mut self.rays[i]
    }

    #[inline]
    pub fn rays(&self) -> &[Ray; SIZE] {
        &self.rays
    }

    #[inline]
    pub fn into_rays(self) -> [Ray; SIZE] {
        self.rays
    }

    pub fn hits(&self) -> [Hit; SIZE] {
        self.rays.map(|ray| ray.hit)
    }

    pub fn with_flags(mut self, flags: RayFlags) -> Self {
        for ray in self.rays.iter_mut() {
            *ray = ray.with_flags(flags);
        }
        self
    }

    /// Lanes that can still change: all of them for closest-hit, unresolved ones for any-hit.
    pub(crate) fn active_lanes(&self) -> [bool; SIZE] {
        self.rays.map(|ray| !(ray.any_hit() && ray.is_hit()))
    }

    pub(crate) fn transformed(&self, transform: &Mat4) -> Self {
        RayPacket::new(self.rays.map(|ray| ray.transformed(transform)))
    }
}
