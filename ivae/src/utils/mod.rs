use anyhow::{Context, Result};

pub mod grid;
pub mod logger;

pub fn get_env(key: &str) -> Result<String> {
    std::env::var(key).context(format!("getting env variable `{key}`"))
}

/// Prints a grayscale image with values in `[0, 1]` using terminal background colors.
pub fn show_image_terminal(pixels: &[f32], width: usize) {
    for row in pixels.chunks(width) {
        for p in row {
            let c = (p.clamp(0.0, 1.0) * 255.0) as u8;
            print!("{}  ", termion::color::Bg(termion::color::Rgb(c, c, c)));
        }
        println!("{}", termion::color::Bg(termion::color::Reset));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub dim: usize,
    pub count: usize,
    pub value_range: [f32; 2],
    pub mean: f32,
    pub var: f32,
    pub stddev: f32,
}

impl Stats {
    pub fn from_iter(iter: impl Iterator<Item = Vec<f32>>) -> Self {
        let mut s = 0.0;
        let mut s2 = 0.0;
        let mut count = 0;
        let mut dim = 0;
        let mut value_range = [f32::INFINITY, f32::NEG_INFINITY];
        for item in iter {
            dim = item.len();
            let d = dim.max(1) as f32;
            item.iter().for_each(|x| {
                value_range[0] = value_range[0].min(*x);
                value_range[1] = value_range[1].max(*x);
            });

            s += item.iter().sum::<f32>() / d;
            s2 += item.iter().map(|x| x * x).sum::<f32>() / d;
            count += 1;
        }
        let count_f32 = count.max(1) as f32;
        let mean = s / count_f32;
        let var = (s2 / count_f32) - mean * mean;
        let stddev = var.max(0.0).sqrt();
        Self {
            dim,
            count,
            value_range,
            mean,
            var,
            stddev,
        }
    }
}
