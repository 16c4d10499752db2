use glam::IVec3;

use engine::voxels::coord::ChunkPos;

/// Offsets of a cube of chunks, nearest first.
pub fn desired_chunk_offsets(radius: i32) -> Vec<IVec3> {
    let mut offsets = Vec::new();

    for x in -radius..=radius {
        for y in -radius..=radius {
            for z in -radius..=radius {
                offsets.push(IVec3::new(x, y, z));
            }
        }
    }

    offsets.sort_unstable_by_key(|offset| offset.length_squared());
    offsets
}

pub fn desired_chunks_iter(
    center: ChunkPos,
    offsets: &[IVec3],
) -> impl Iterator<Item = ChunkPos> + '_ {
    offsets
        .iter()
        .map(move |offset| center + ChunkPos(*offset))
}

pub fn is_out_of_range(center: ChunkPos, pos: ChunkPos, radius: i32) -> bool {
    center.chebyshev_distance(pos) > radius as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_cover_the_cube_nearest_first() {
        let offsets = desired_chunk_offsets(2);
        assert_eq!(offsets.len(), 125);
        assert_eq!(offsets[0], IVec3::ZERO);
        assert!(
            offsets
                .windows(2)
                .all(|pair| pair[0].length_squared() <= pair[1].length_squared())
        );
    }

    #[test]
    fn chunks_follow_the_center() {
        let offsets = desired_chunk_offsets(1);
        let center = ChunkPos::new(10, -3, 4);
        let chunks: Vec<_> = desired_chunks_iter(center, &offsets).collect();

        assert_eq!(chunks[0], center);
        assert!(chunks.iter().all(|pos| !is_out_of_range(center, *pos, 1)));
        assert!(is_out_of_range(center, ChunkPos::new(12, -3, 4), 1));
    }
}
