//! YAML run configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use voxlab_features::MfccConfig;
use voxlab_hmm::TrainConfig;

/// Contents of a `--config` file. Missing sections fall back to defaults.
///
/// ```yaml
/// train:
///   max_iter: 20
///   stop_threshold: 1.0
///   variance_floor: 5.0
/// mfcc:
///   win_len: 400
///   nceps: 13
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub train: TrainConfig,
    pub mfcc: MfccConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.train.validate()?;
        config.mfcc.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
