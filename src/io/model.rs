use crate::core::classifier::{ProbabilityClassifier, RandomForest};
use crate::types::BurnResult;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reader for serialized random forests
pub struct ForestReader;

impl ForestReader {
    /// Parse and validate a forest from a JSON document
    pub fn from_json_str(json: &str) -> BurnResult<RandomForest> {
        let forest: RandomForest = serde_json::from_str(json)?;
        forest.validate()?;
        Ok(forest)
    }

    /// Parse and validate a forest from a JSON file
    pub fn read<P: AsRef<Path>>(path: P) -> BurnResult<RandomForest> {
        let path = path.as_ref();
        log::info!("Reading random forest from {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        let forest: RandomForest = serde_json::from_reader(reader)?;
        forest.validate()?;
        Ok(forest)
    }

    /// Load a classifier ready to apply to predictor rasters
    pub fn load_classifier<P: AsRef<Path>>(path: P) -> BurnResult<ProbabilityClassifier> {
        ProbabilityClassifier::from_forest(Self::read(path)?)
    }

    pub fn write<P: AsRef<Path>>(forest: &RandomForest, path: P) -> BurnResult<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, forest)?;
        Ok(())
    }
}
