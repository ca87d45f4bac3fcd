// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Iterate over a dataset by batches.
//!
//! A batch is only assembled once all its samples are loaded,
//! and the first failing sample fails the whole batch.
//! `Subsets` opens the train, val and test subsets of one configuration
//! and hands out their loaders.

use log::debug;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;

use crate::config::{BatchingConfig, Config, Subset};
use crate::core::batch::{Batch, BatchAssembler, Sample};
use crate::dataset::track::PlaceRecognitionDataset;
use crate::error::{Error, Result};

/// Split dataset indices into batches, sequentially or shuffled.
#[derive(Debug, Clone)]
pub struct BatchSampler {
    dataset_len: usize,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    rng: StdRng,
}

impl BatchSampler {
    pub fn new(dataset_len: usize, batch_size: usize) -> Result<BatchSampler> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(BatchSampler {
            dataset_len,
            batch_size,
            shuffle: false,
            drop_last: false,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Drop the last batch if it is smaller than `batch_size`.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        if self.drop_last {
            self.dataset_len / self.batch_size
        } else {
            (self.dataset_len + self.batch_size - 1) / self.batch_size
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batches of indices of a new epoch.
    /// Shuffled samplers draw a new order at each epoch.
    pub fn epoch(&mut self) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.dataset_len).collect();
        if self.shuffle {
            indices.shuffle(&mut self.rng);
        }
        let mut batches: Vec<Vec<usize>> = indices
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        if self.drop_last && batches.last().map_or(false, |b| b.len() < self.batch_size) {
            batches.pop();
        }
        batches
    }
}

/// Load samples of a dataset and assemble them into batches.
#[derive(Debug)]
pub struct BatchLoader<'a> {
    dataset: &'a PlaceRecognitionDataset,
    sampler: BatchSampler,
    assembler: BatchAssembler,
    pool: Option<rayon::ThreadPool>,
}

impl<'a> BatchLoader<'a> {
    pub fn new(dataset: &'a PlaceRecognitionDataset, config: &BatchingConfig) -> Result<Self> {
        let pool = if config.num_workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.num_workers)
                .build()
                .map_err(|e| Error::InvalidArgument(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        Ok(BatchLoader {
            dataset,
            sampler: config.sampler(dataset.len())?,
            assembler: config.assembler()?,
            pool,
        })
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        self.sampler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sampler.is_empty()
    }

    /// Load the given samples, in parallel if there are workers, then assemble them.
    pub fn load_batch(&mut self, indices: &[usize]) -> Result<Batch> {
        let dataset = self.dataset;
        let samples: Vec<Sample> = match &self.pool {
            Some(pool) => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&idx| dataset.get(idx))
                    .collect::<Result<Vec<Sample>>>()
            })?,
            None => indices
                .iter()
                .map(|&idx| dataset.get(idx))
                .collect::<Result<Vec<Sample>>>()?,
        };
        debug!("Loaded samples {:?}", indices);
        self.assembler.assemble(samples, dataset.index())
    }

    /// Iterator over the batches of a new epoch.
    pub fn epoch(&mut self) -> Epoch<'_, 'a> {
        let batches = self.sampler.epoch().into_iter();
        Epoch {
            loader: self,
            batches,
        }
    }
}

/// Batches of one epoch, loaded lazily.
pub struct Epoch<'l, 'a> {
    loader: &'l mut BatchLoader<'a>,
    batches: std::vec::IntoIter<Vec<usize>>,
}

impl<'l, 'a> Iterator for Epoch<'l, 'a> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.batches.next()?;
        Some(self.loader.load_batch(&indices))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.batches.size_hint()
    }
}

// SUBSETS ###################################################

/// Train, val and test datasets of one configuration.
#[derive(Debug)]
pub struct Subsets {
    pub train: PlaceRecognitionDataset,
    pub val: PlaceRecognitionDataset,
    pub test: PlaceRecognitionDataset,
    batching: BatchingConfig,
}

impl Subsets {
    /// Open the three subsets, ignoring `config.dataset.subset`.
    pub fn open(config: &Config) -> Result<Subsets> {
        let open = |subset: Subset| {
            let mut dataset = config.dataset.clone();
            dataset.subset = subset;
            PlaceRecognitionDataset::open(&dataset, &config.mining)
        };
        Ok(Subsets {
            train: open(Subset::Train)?,
            val: open(Subset::Val)?,
            test: open(Subset::Test)?,
            batching: config.batching.clone(),
        })
    }

    pub fn dataset(&self, subset: Subset) -> Result<&PlaceRecognitionDataset> {
        match subset {
            Subset::Train => Ok(&self.train),
            Subset::Val => Ok(&self.val),
            Subset::Test => Ok(&self.test),
            Subset::Track => Err(Error::InvalidArgument(
                "The track subset is not part of train, val and test".to_string(),
            )),
        }
    }

    /// Batching of a subset.
    /// Val and test batches have `val_batch_size` samples, and test batches are sequential.
    pub fn batching(&self, subset: Subset) -> BatchingConfig {
        match subset {
            Subset::Train | Subset::Track => self.batching.clone(),
            Subset::Val => self.batching.val(),
            Subset::Test => self.batching.test(),
        }
    }

    pub fn loader(&self, subset: Subset) -> Result<BatchLoader<'_>> {
        BatchLoader::new(self.dataset(subset)?, &self.batching(subset))
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MiningConfig;
    use crate::core::camera::CameraId;
    use crate::dataset::track::tests::{small_config, write_dataset};
    use itertools::Itertools;
    use quickcheck_macros;

    #[test]
    fn sequential_batches() {
        let mut sampler = BatchSampler::new(10, 4).unwrap();
        assert_eq!(3, sampler.len());
        assert_eq!(
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]],
            sampler.epoch()
        );
        let mut sampler = sampler.drop_last(true);
        assert_eq!(2, sampler.len());
        assert_eq!(2, sampler.epoch().len());
        assert!(BatchSampler::new(3, 4).unwrap().drop_last(true).is_empty());
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let mut a = BatchSampler::new(50, 8).unwrap().shuffle(true).with_seed(1);
        let mut b = BatchSampler::new(50, 8).unwrap().shuffle(true).with_seed(1);
        let epoch = a.epoch();
        assert_eq!(epoch, b.epoch());
        assert_ne!((0..8).collect_vec(), epoch[0]);
    }

    #[quickcheck_macros::quickcheck]
    fn epoch_covers_every_index_once(len: u8, batch_size: u8, shuffle: bool) -> bool {
        let (len, batch_size) = (len as usize, batch_size as usize + 1);
        let mut sampler = BatchSampler::new(len, batch_size).unwrap().shuffle(shuffle);
        let batches = sampler.epoch();
        let mut all = batches.concat();
        all.sort();
        batches.len() == sampler.len()
            && batches.iter().all(|b| b.len() <= batch_size)
            && all == (0..len).collect_vec()
    }

    fn loader_config(num_workers: usize) -> BatchingConfig {
        BatchingConfig {
            batch_size: 3,
            num_workers,
            quantization_size: 1.0,
            ..BatchingConfig::default()
        }
    }

    fn mining() -> MiningConfig {
        MiningConfig {
            positive_threshold: 5.0,
            negative_threshold: 15.0,
        }
    }

    #[test]
    fn epoch_of_batches() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let dataset = PlaceRecognitionDataset::open(&small_config(dir.path()), &mining()).unwrap();
        for &workers in &[0, 2] {
            let mut loader = BatchLoader::new(&dataset, &loader_config(workers)).unwrap();
            assert_eq!(2, loader.len());
            let batches: Vec<Batch> = loader.epoch().collect::<Result<_>>().unwrap();
            assert_eq!(vec![0, 1, 2], batches[0].indices);
            assert_eq!(vec![3], batches[1].indices);
            assert_eq!(&[3, 3, 4, 8], batches[0].images[&CameraId::FrontCam].shape());
            assert!(batches[0].positives_mask[(0, 1)]);
            assert!(batches[0].negatives_mask[(0, 2)]);
            let clouds = batches[0].clouds.as_ref().unwrap();
            assert_eq!(vec![2, 2, 2], clouds.counts);
        }
    }

    #[test]
    fn zero_batch_size_is_an_error() {
        assert!(BatchSampler::new(10, 0).unwrap_err().is_configuration());
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let dataset = PlaceRecognitionDataset::open(&small_config(dir.path()), &mining()).unwrap();
        let config = BatchingConfig {
            batch_size: 0,
            ..loader_config(0)
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            BatchLoader::new(&dataset, &config).map(|_| ())
        }));
        assert!(match result {
            Ok(Err(Error::InvalidArgument(_))) => true,
            _ => false,
        });
    }

    #[test]
    fn three_subsets_of_one_config() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        for subset in &["val.csv", "test.csv"] {
            std::fs::copy(dir.path().join("train.csv"), dir.path().join(subset)).unwrap();
        }
        let config = Config {
            dataset: small_config(dir.path()),
            mining: mining(),
            batching: BatchingConfig {
                shuffle: true,
                drop_last: true,
                seed: Some(5),
                val_batch_size: Some(4),
                ..loader_config(0)
            },
        };
        let subsets = Subsets::open(&config).unwrap();
        assert_eq!(4, subsets.val.len());

        let train = subsets.loader(Subset::Train).unwrap();
        assert_eq!(1, train.len());
        let mut val = subsets.loader(Subset::Val).unwrap();
        assert_eq!(1, val.len());
        let mut test = subsets.loader(Subset::Test).unwrap();
        let batches: Vec<Batch> = test.epoch().collect::<Result<_>>().unwrap();
        let indices = batches.iter().map(|b| b.indices.clone()).collect_vec();
        assert_eq!(vec![vec![0, 1, 2, 3]], indices);
        assert_eq!(4, val.epoch().next().unwrap().unwrap().len());
        assert!(subsets.loader(Subset::Track).unwrap_err().is_configuration());

        std::fs::remove_file(dir.path().join("test.csv")).unwrap();
        assert!(match Subsets::open(&config) {
            Err(Error::MissingManifest(_)) => true,
            _ => false,
        });
    }

    #[test]
    fn failed_sample_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        std::fs::remove_file(dir.path().join("front_cam/1002.png")).unwrap();
        let dataset = PlaceRecognitionDataset::open(&small_config(dir.path()), &mining()).unwrap();
        let mut loader = BatchLoader::new(&dataset, &loader_config(2)).unwrap();
        let results: Vec<Result<Batch>> = loader.epoch().collect();
        assert!(results[0].as_ref().unwrap_err().is_resource_not_found());
        assert!(results[1].is_ok());
    }
}
