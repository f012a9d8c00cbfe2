use burn::data::dataset::{
    transform::{Mapper, MapperDataset},
    vision::{MnistDataset, MnistItem},
    Dataset,
};

use super::{one_hot, DataDims, IvaeItem};

pub const IMG_WIDTH: usize = 28;
pub const IMG_HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

/// Flattens the image into `x` with pixels scaled to `[0, 1]` and one-hot
/// encodes the digit into `u`.
#[derive(Debug, Clone, Copy, Default)]
struct ImageToIvae;

impl Mapper<MnistItem, IvaeItem> for ImageToIvae {
    fn map(&self, item: &MnistItem) -> IvaeItem {
        let x = item
            .image
            .iter()
            .flatten()
            .map(|pixel| pixel / 255.0)
            .collect();

        IvaeItem {
            x,
            u: one_hot(item.label as usize, NUM_CLASSES),
            s: None,
        }
    }
}

pub struct MnistIvaeDataset {
    dataset: MapperDataset<MnistDataset, ImageToIvae, MnistItem>,
}

impl MnistIvaeDataset {
    pub fn train() -> Self {
        Self::new(MnistDataset::train())
    }

    fn new(dataset: MnistDataset) -> Self {
        log::info!("loaded mnist with {} images", dataset.len());
        Self {
            dataset: MapperDataset::new(dataset, ImageToIvae),
        }
    }

    pub fn dims(latent_dim: usize) -> DataDims {
        DataDims::new(IMG_WIDTH * IMG_HEIGHT, latent_dim, NUM_CLASSES)
    }
}

impl Dataset<IvaeItem> for MnistIvaeDataset {
    fn get(&self, index: usize) -> Option<IvaeItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_pixels_and_label() {
        let mut image = [[0.0; IMG_WIDTH]; IMG_HEIGHT];
        image[0][1] = 255.0;
        image[27][27] = 51.0;
        let item = ImageToIvae.map(&MnistItem { image, label: 3 });

        assert_eq!(item.x.len(), IMG_WIDTH * IMG_HEIGHT);
        assert_eq!(item.x[1], 1.0);
        assert!((item.x[783] - 0.2).abs() < 1e-6);
        assert_eq!(item.u, one_hot(3, NUM_CLASSES));
        assert!(item.s.is_none());
    }
}
