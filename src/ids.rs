#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u32);

impl MeshId {
    pub const INVALID: MeshId = MeshId(u32::MAX);
}

impl InstanceId {
    pub const INVALID: InstanceId = InstanceId(u32::MAX);
}

/// Slot into a mesh's material list.
pub type MaterialIndex = u16;

pub const INVALID_TRIANGLE: u32 = u32::MAX;
