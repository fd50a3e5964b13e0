mod bounds;
mod grid;
mod math;

pub use bounds::{compute_bounding_volume, BoundingVolume};
pub use grid::{CubeBlock, CubeGrid};
pub use math::{Base6Direction, BlockOrientation, PositionAndOrientation, Quaternion, Vec3, Vec3I};

#[cfg(test)]
pub(crate) use grid::fixtures;
