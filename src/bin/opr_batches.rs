// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{env, error::Error, path::PathBuf};

use place_recognition_rs as oprs;
use oprs::config::Config;
use oprs::core::batch::Batch;
use oprs::dataset::loader::BatchLoader;
use oprs::dataset::track::PlaceRecognitionDataset;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if let Err(error) = my_run(&args) {
        eprintln!("{}", error);
        std::process::exit(1);
    }
}

const USAGE: &str = "Usage: ./opr_batches config.toml [nb_batches]";

fn my_run(args: &[String]) -> Result<(), Box<dyn Error>> {
    // Check that the arguments are correct.
    let valid_args = check_args(args)?;

    // Open the dataset, which builds the spatial index.
    let config = Config::from_file(&valid_args.config_path)?;
    let dataset = PlaceRecognitionDataset::open(&config.dataset, &config.mining)?;
    let mut loader = BatchLoader::new(&dataset, &config.batching)?;
    println!(
        "{} samples, {} batches per epoch",
        dataset.len(),
        loader.len()
    );

    // Iterate over one epoch, or its first batches.
    let nb_batches = valid_args.nb_batches.unwrap_or_else(|| loader.len());
    for (batch_id, batch) in loader.epoch().take(nb_batches).enumerate() {
        println!("batch {}: {}", batch_id, summary(&batch?));
    }
    Ok(())
}

struct Args {
    config_path: PathBuf,
    nb_batches: Option<usize>,
}

/// Verify that command line arguments are correct.
fn check_args(args: &[String]) -> Result<Args, String> {
    let (config_str, nb_batches) = match args {
        [_, config_str] => (config_str, None),
        [_, config_str, nb_str] => {
            let nb = nb_str.parse::<usize>().map_err(|_| {
                eprintln!("{}", USAGE);
                format!("Invalid number of batches: {}", nb_str)
            })?;
            (config_str, Some(nb))
        }
        _ => {
            eprintln!("{}", USAGE);
            return Err("Wrong number of arguments".to_string());
        }
    };
    let config_path = PathBuf::from(config_str);
    if config_path.is_file() {
        Ok(Args {
            config_path,
            nb_batches,
        })
    } else {
        eprintln!("{}", USAGE);
        Err(format!(
            "The configuration file does not exist or is not reachable: {}",
            config_str
        ))
    }
}

/// One line description of a batch.
fn summary(batch: &Batch) -> String {
    let mut parts = vec![format!("idxs {:?}", batch.indices)];
    for (cam, images) in &batch.images {
        parts.push(format!("images_{} {:?}", cam, images.shape()));
    }
    for (cam, masks) in &batch.masks {
        parts.push(format!("masks_{} {:?}", cam, masks.shape()));
    }
    if let Some(clouds) = &batch.clouds {
        parts.push(format!(
            "pointclouds_lidar {} voxels {:?}",
            clouds.len(),
            clouds.counts
        ));
    }
    let nb_positives = batch.positives_mask.iter().filter(|&&p| p).count();
    let nb_negatives = batch.negatives_mask.iter().filter(|&&n| n).count();
    parts.push(format!(
        "{} positive pairs, {} negative pairs",
        nb_positives, nb_negatives
    ));
    parts.join(", ")
}
