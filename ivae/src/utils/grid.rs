use std::path::Path;

use anyhow::Context;
use image::{GrayImage, Luma};

pub const GRID_SIDE: usize = 4;
const GAP: usize = 1;

/// Saves the first 16 rows as a 4x4 grid of `side x side` grayscale tiles.
/// Every tile is min-max normalized on its own.
pub fn save_image_grid(rows: &[Vec<f32>], side: usize, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    let extent = (GRID_SIDE * side + (GRID_SIDE - 1) * GAP) as u32;
    let mut img = GrayImage::from_pixel(extent, extent, Luma([255]));

    for (k, row) in rows.iter().take(GRID_SIDE * GRID_SIDE).enumerate() {
        anyhow::ensure!(
            row.len() == side * side,
            "image {k} has {} pixels, expected {}",
            row.len(),
            side * side
        );
        let min = row.iter().copied().fold(f32::INFINITY, f32::min);
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = if max > min { max - min } else { 1.0 };

        let x0 = (k % GRID_SIDE) * (side + GAP);
        let y0 = (k / GRID_SIDE) * (side + GAP);
        for (p, v) in row.iter().enumerate() {
            let c = ((v - min) / range * 255.0).round() as u8;
            img.put_pixel((x0 + p % side) as u32, (y0 + p / side) as u32, Luma([c]));
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    img.save(path)
        .with_context(|| format!("saving image grid {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid/000_samples.png");

        let rows = (0..20)
            .map(|k| (0..4).map(|p| (k * 10 + p) as f32).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        save_image_grid(&rows, 2, &path).unwrap();

        let img = image::open(&path).unwrap().into_luma8();
        assert_eq!(img.dimensions(), (11, 11));
        // first tile
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 1)[0], 255);
        // gap between tiles
        assert_eq!(img.get_pixel(2, 0)[0], 255);
        // last tile, bottom left pixel
        assert_eq!(img.get_pixel(9, 10)[0], 170);
    }

    #[test]
    fn rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![vec![0.0; 5]];
        assert!(save_image_grid(&rows, 2, dir.path().join("x.png")).is_err());
    }
}
