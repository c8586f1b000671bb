#![allow(clippy::collapsible_else_if)]

mod error;
pub use error::*;
mod ids;
pub use ids::*;

mod primitives;
pub use primitives::*;
mod mesh;
pub use mesh::*;
mod transform;
pub use transform::*;

mod acc_structures;
pub use acc_structures::*;
mod scene;
pub use scene::*;

mod timer;
pub use timer::Timer;

#[cfg(test)]
mod test_utils;
