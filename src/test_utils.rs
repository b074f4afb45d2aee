//! Synthetic point cloud generators for testing.
//!
//! Provides planar clouds with known ground truth: a regular lattice for the
//! optimiser scenarios and a lidar-like room scan for the correlative and
//! robust ones.

/// Regular planar lattice of `nx × ny` points with the given spacing,
/// anchored at the origin, z = 0.
pub fn make_lattice_pcd(nx: usize, ny: usize, spacing: f32) -> Vec<[f32; 3]> {
    let mut points = Vec::with_capacity(nx * ny);
    for iy in 0..ny {
        for ix in 0..nx {
            points.push([ix as f32 * spacing, iy as f32 * spacing, 0.0]);
        }
    }
    points
}

/// Lidar-like scan of a rectangular room seen from its center.
///
/// Walls of an 8 m × 5 m room sampled at 0.1 m, plus a small square pillar
/// off-center so the scan has no rotational symmetry.
pub fn make_room_scan() -> Vec<[f32; 3]> {
    let mut points = Vec::new();
    let step = 0.1_f32;
    let half_w = 4.0_f32;
    let half_h = 2.5_f32;

    let nx = (2.0 * half_w / step) as usize;
    for i in 0..=nx {
        let x = -half_w + i as f32 * step;
        points.push([x, -half_h, 0.0]);
        points.push([x, half_h, 0.0]);
    }
    let ny = (2.0 * half_h / step) as usize;
    for i in 1..ny {
        let y = -half_h + i as f32 * step;
        points.push([-half_w, y, 0.0]);
        points.push([half_w, y, 0.0]);
    }

    // Pillar at (1.5, 0.8), 0.6 m square.
    let pillar = 0.3_f32;
    let np = (2.0 * pillar / step) as usize;
    for i in 0..=np {
        let d = -pillar + i as f32 * step;
        points.push([1.5 + d, 0.8 - pillar, 0.0]);
        points.push([1.5 + d, 0.8 + pillar, 0.0]);
        points.push([1.5 - pillar, 0.8 + d, 0.0]);
        points.push([1.5 + pillar, 0.8 + d, 0.0]);
    }

    points
}

/// Perturb the planar coordinates of a cloud with seeded Gaussian noise.
#[cfg(test)]
pub fn add_gaussian_noise(cloud: &mut [[f32; 3]], sigma: f64, seed: u64) {
    use rand::prelude::*;
    use rand_distr::Normal;

    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Normal::new(0.0, sigma).expect("sigma is positive");

    for p in cloud.iter_mut() {
        p[0] += dist.sample(&mut rng) as f32;
        p[1] += dist.sample(&mut rng) as f32;
    }
}
