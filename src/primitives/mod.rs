pub mod aabb;
pub use aabb::*;
pub mod obb;
pub use obb::*;
pub mod triangle;
pub use triangle::*;
pub mod frustum;
pub use frustum::*;
pub mod ray;
pub use ray::*;
pub mod packet;
pub use packet::*;
