use serde::Serialize;

use super::grid::CubeGrid;
use super::math::{Vec3, Vec3I};

/// Axis-aligned box in world units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingVolume {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingVolume {
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn translated(self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

/// Envelope of the grid's block minimum corners, scaled to world units,
/// anchored at the origin and moved to the grid's world position.
///
/// Only the `min` corner of each block is considered; a block's own extent is
/// not added, so a single block yields a zero-size volume. Orientation is
/// ignored. A grid without blocks yields a zero-size volume at its position.
pub fn compute_bounding_volume(grid: &CubeGrid) -> BoundingVolume {
    let position = grid.position();
    let Some((min, max)) = block_extent(grid) else {
        return BoundingVolume {
            min: position,
            max: position,
        };
    };

    let span = Vec3::new(
        (max.x as i64 - min.x as i64) as f64,
        (max.y as i64 - min.y as i64) as f64,
        (max.z as i64 - min.z as i64) as f64,
    );
    let size = span.scale(grid.grid_size.length());
    BoundingVolume {
        min: Vec3::ZERO,
        max: size,
    }
    .translated(position)
}

/// Component-wise min and max over block minimum corners, `None` for an empty grid.
fn block_extent(grid: &CubeGrid) -> Option<(Vec3I, Vec3I)> {
    let mut min = Vec3I::splat(i32::MAX);
    let mut max = Vec3I::splat(i32::MIN);
    for block in &grid.blocks {
        min = min.component_min(block.min);
        max = max.component_max(block.min);
    }
    if grid.blocks.is_empty() {
        None
    } else {
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{CubeSize, ObjectType};
    use crate::world::{CubeBlock, PositionAndOrientation};

    fn grid_at(position: Vec3, grid_size: CubeSize, mins: &[Vec3I]) -> CubeGrid {
        CubeGrid {
            grid_size,
            position_and_orientation: Some(PositionAndOrientation {
                position,
                ..PositionAndOrientation::default()
            }),
            blocks: mins
                .iter()
                .map(|min| CubeBlock::new(ObjectType::CubeBlock, "LargeBlockArmorBlock", *min))
                .collect(),
            ..CubeGrid::default()
        }
    }

    #[test]
    fn empty_grid_is_zero_volume_at_position() {
        let position = Vec3::new(10.0, -4.0, 2.0);
        let volume = compute_bounding_volume(&grid_at(position, CubeSize::Large, &[]));
        assert_eq!(volume.min, position);
        assert_eq!(volume.size(), Vec3::ZERO);
    }

    #[test]
    fn empty_grid_without_placement_is_at_origin() {
        let volume = compute_bounding_volume(&CubeGrid::default());
        assert_eq!(volume, BoundingVolume::default());
    }

    #[test]
    fn single_block_at_origin_is_zero_size_at_position() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let volume = compute_bounding_volume(&grid_at(
            position,
            CubeSize::Large,
            &[Vec3I::new(0, 0, 0)],
        ));
        assert_eq!(volume.min, position);
        assert_eq!(volume.max, position);
    }

    #[test]
    fn span_is_scaled_by_cube_length_and_translated() {
        let position = Vec3::new(100.0, 0.0, -50.0);
        let volume = compute_bounding_volume(&grid_at(
            position,
            CubeSize::Large,
            &[Vec3I::new(-2, 0, 1), Vec3I::new(3, 4, -1), Vec3I::new(0, 1, 0)],
        ));
        assert_eq!(volume.size(), Vec3::new(12.5, 10.0, 5.0));
        assert_eq!(volume.min, position);
        assert_eq!(volume.max, Vec3::new(112.5, 10.0, -45.0));

        let small = compute_bounding_volume(&grid_at(
            Vec3::ZERO,
            CubeSize::Small,
            &[Vec3I::new(0, 0, 0), Vec3I::new(4, 2, 0)],
        ));
        assert_eq!(small.size(), Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn extreme_coordinates_do_not_overflow() {
        let volume = compute_bounding_volume(&grid_at(
            Vec3::ZERO,
            CubeSize::Small,
            &[Vec3I::splat(i32::MIN), Vec3I::splat(i32::MAX)],
        ));
        let expected = (i32::MAX as f64 - i32::MIN as f64) * 0.5;
        assert_eq!(volume.size(), Vec3::new(expected, expected, expected));
    }
}
