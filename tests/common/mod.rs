#![allow(dead_code)]

use std::path::PathBuf;

use nalgebra::Point2;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use perch::{
    constants::BirdSet,
    observations::{
        csv_reader::{read_relocations, RelocationColumns},
        BirdSetExt,
    },
    projection::{project_relocations, UtmProjection},
};

pub const TEST_PROJ: &str = "+proj=utm +zone=17 +datum=WGS84 +units=m +no_defs";

pub fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Isotropic Gaussian point cloud around `center`.
pub fn gaussian_cloud(rng: &mut StdRng, n: usize, center: Point2<f64>, sigma: f64) -> Vec<Point2<f64>> {
    let normal = Normal::new(0.0, sigma).unwrap();
    (0..n)
        .map(|_| Point2::new(center.x + normal.sample(rng), center.y + normal.sample(rng)))
        .collect()
}

/// Load and project the territory fixture.
pub fn fixture_birds() -> BirdSet {
    let projection: UtmProjection = TEST_PROJ.parse().unwrap();
    let raw = read_relocations(
        data_path("territories.csv"),
        &RelocationColumns::default(),
        b',',
    )
    .unwrap();
    let (observations, _) = project_relocations(&projection, &raw);
    BirdSet::from_observations(observations, None).unwrap()
}
