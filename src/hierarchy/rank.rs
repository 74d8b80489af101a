//! Layer sizing for hierarchical graphs.

use rand::Rng;

/// Target vertex count per layer for a hierarchy over `size` vertices.
///
/// Layer 0 holds everything, the top layer holds `top_rank_size` and every layer in
/// between is `shrink_factor` times its parent. The number of layers is
/// `max(1, 1 + ceil(log(size / top_rank_size) / log(shrink_factor)))`.
pub fn rank_distribution(size: usize, top_rank_size: usize, shrink_factor: f32) -> Vec<usize> {
    let top = top_rank_size.max(1) as f64;
    let factor = f64::from(shrink_factor).max(1.0 + f64::EPSILON);
    let ratio = size as f64 / top;
    let ranks = if ratio <= 1.0 {
        1
    } else {
        (1.0 + (ratio.ln() / factor.ln()).ceil()).max(1.0) as usize
    };

    let mut sizes = vec![0usize; ranks];
    sizes[0] = size;
    if ranks > 1 {
        sizes[ranks - 1] = top_rank_size;
        for i in (1..ranks - 1).rev() {
            sizes[i] = (sizes[i + 1] as f64 * factor) as usize;
        }
    }
    sizes
}

/// Draw the highest layer of a new vertex: layer `l` is reached with probability
/// `shrink_factor^-l`, never above `max_level`.
pub fn draw_level<R: Rng + ?Sized>(rng: &mut R, shrink_factor: f32, max_level: usize) -> usize {
    let promote = 1.0 / shrink_factor.max(1.0);
    let mut level = 0;
    while level < max_level && rng.gen::<f32>() < promote {
        level += 1;
    }
    level
}
