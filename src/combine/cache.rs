//! Vertex reordering for rasterization cache locality.
//!
//! Vertices are reordered by first use in the index stream so that indices
//! referencing nearby vertices land nearby in the buffer. Unreferenced
//! vertices are appended in their original order, which is how an
//! instance's vertex span can end up as multiple disjoint ranges.

use super::VertexRange;

/// Bidirectional vertex permutation.
pub(crate) struct CacheReorder {
    /// old index -> new index
    pub remap: Vec<u32>,
    /// new index -> old index
    pub order: Vec<u32>,
}

pub(crate) fn first_use_order(vertex_count: usize, indices: &[u32]) -> CacheReorder {
    const UNSEEN: u32 = u32::MAX;
    let mut remap = vec![UNSEEN; vertex_count];
    let mut order = Vec::with_capacity(vertex_count);

    for &index in indices {
        let slot = &mut remap[index as usize];
        if *slot == UNSEEN {
            *slot = order.len() as u32;
            order.push(index);
        }
    }
    for old in 0..vertex_count as u32 {
        if remap[old as usize] == UNSEEN {
            remap[old as usize] = order.len() as u32;
            order.push(old);
        }
    }

    CacheReorder { remap, order }
}

/// Map a contiguous pre-reorder vertex range through the permutation and
/// coalesce the result into maximal consecutive runs.
pub(crate) fn ranges_after_reorder(range: &VertexRange, remap: &[u32]) -> Vec<VertexRange> {
    let mut mapped: Vec<u32> = (range.start..range.start + range.count)
        .map(|old| remap[old as usize])
        .collect();
    mapped.sort_unstable();

    let mut runs = Vec::new();
    let mut iter = mapped.into_iter();
    let Some(first) = iter.next() else {
        return runs;
    };
    let mut start = first;
    let mut end = first;
    for v in iter {
        if v == end + 1 {
            end = v;
        } else {
            runs.push(VertexRange {
                start,
                count: end - start + 1,
            });
            start = v;
            end = v;
        }
    }
    runs.push(VertexRange {
        start,
        count: end - start + 1,
    });
    runs
}
