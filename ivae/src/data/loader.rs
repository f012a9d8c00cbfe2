use std::sync::Arc;

use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    tensor::{backend::Backend, Data, Int, Shape, Tensor},
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::{IvaeBatch, IvaeBatcher, IvaeItem};

/// Source of shuffled training batches, one pass over the data per epoch.
pub trait TrainLoader<B: Backend> {
    fn num_batches(&self) -> usize;

    fn epoch(&mut self) -> Box<dyn Iterator<Item = IvaeBatch<B>> + '_>;
}

/// Items are batched on the fly by burn's data loader workers.
pub struct StreamingLoader<B: Backend> {
    loader: Arc<dyn DataLoader<IvaeBatch<B>>>,
    num_batches: usize,
}

impl<B: Backend> StreamingLoader<B> {
    pub fn new<D>(
        dataset: D,
        batch_size: usize,
        num_workers: usize,
        seed: u64,
        device: B::Device,
    ) -> Self
    where
        D: Dataset<IvaeItem> + 'static,
    {
        let num_batches = dataset.len().div_ceil(batch_size);
        let loader = DataLoaderBuilder::new(IvaeBatcher::<B>::new(device))
            .batch_size(batch_size)
            .shuffle(seed)
            .num_workers(num_workers)
            .build(dataset);

        Self {
            loader,
            num_batches,
        }
    }
}

impl<B: Backend> TrainLoader<B> for StreamingLoader<B> {
    fn num_batches(&self) -> usize {
        self.num_batches
    }

    fn epoch(&mut self) -> Box<dyn Iterator<Item = IvaeBatch<B>> + '_> {
        Box::new(self.loader.iter())
    }
}

/// The whole dataset lives on the device; each epoch draws a new permutation
/// and gathers the batches from it.
pub struct PreloadedLoader<B: Backend> {
    data: IvaeBatch<B>,
    len: usize,
    batch_size: usize,
    rng: StdRng,
}

impl<B: Backend> PreloadedLoader<B> {
    pub fn new<D>(dataset: &D, batch_size: usize, seed: u64, device: &B::Device) -> Self
    where
        D: Dataset<IvaeItem>,
    {
        let items: Vec<IvaeItem> = dataset.iter().collect();
        let len = items.len();
        let data = IvaeBatcher::<B>::new(device.clone()).batch(items);
        log::info!("preloaded {len} items on {device:?}");

        Self {
            data,
            len,
            batch_size,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn gather(&self, indices: Vec<i32>) -> IvaeBatch<B> {
        let device = self.data.x.device();
        let len = indices.len();
        let indices = Tensor::<B, 1, Int>::from_ints(Data::new(indices, Shape::new([len])), &device);

        IvaeBatch {
            x: self.data.x.clone().select(0, indices.clone()),
            u: self.data.u.clone().select(0, indices.clone()),
            s: self.data.s.clone().map(|s| s.select(0, indices)),
        }
    }
}

impl<B: Backend> TrainLoader<B> for PreloadedLoader<B> {
    fn num_batches(&self) -> usize {
        self.len.div_ceil(self.batch_size)
    }

    fn epoch(&mut self) -> Box<dyn Iterator<Item = IvaeBatch<B>> + '_> {
        let mut indices: Vec<i32> = (0..self.len as i32).collect();
        indices.shuffle(&mut self.rng);

        let chunks: Vec<Vec<i32>> = indices
            .chunks(self.batch_size)
            .map(<[i32]>::to_vec)
            .collect();

        let this = &*self;
        Box::new(chunks.into_iter().map(move |chunk| this.gather(chunk)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::npz::NpzDataset;
    use ndarray::Array2;

    type B = burn::backend::NdArray;

    fn dataset(n: usize) -> NpzDataset {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f32);
        let u = Array2::from_shape_fn((n, 3), |(i, j)| if i % 3 == j { 1.0 } else { 0.0 });
        let s = Array2::from_shape_fn((n, 1), |(i, _)| i as f32);
        NpzDataset::from_arrays("test.npz", x, u, Some(s)).unwrap()
    }

    fn epoch_sources<L: TrainLoader<B>>(loader: &mut L) -> (Vec<usize>, Vec<f32>) {
        let mut sizes = Vec::new();
        let mut sources = Vec::new();
        for batch in loader.epoch() {
            let [rows, _] = batch.x.dims();
            sizes.push(rows);

            // x rows stay aligned with their sources
            let x = batch.x.into_data().value;
            let s = batch.s.unwrap().into_data().value;
            for (row, source) in x.chunks(2).zip(&s) {
                assert_eq!(row[0], source * 2.0);
            }
            sources.extend(s);
        }
        sources.sort_by(f32::total_cmp);
        (sizes, sources)
    }

    #[test]
    fn preloaded_covers_every_item_once() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let mut loader = PreloadedLoader::<B>::new(&dataset(10), 4, 0, &device);
        assert_eq!(loader.len(), 10);
        assert_eq!(loader.num_batches(), 3);

        let expected: Vec<f32> = (0..10).map(|i| i as f32).collect();
        for _ in 0..2 {
            let (sizes, sources) = epoch_sources(&mut loader);
            assert_eq!(sizes, vec![4, 4, 2]);
            assert_eq!(sources, expected);
        }
    }

    #[test]
    fn streaming_covers_every_item_once() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let mut loader = StreamingLoader::<B>::new(dataset(10), 4, 1, 0, device);
        assert_eq!(loader.num_batches(), 3);

        let (sizes, sources) = epoch_sources(&mut loader);
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        assert_eq!(sources, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }
}
