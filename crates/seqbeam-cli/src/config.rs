use std::path::PathBuf;

use derivative::Derivative;
use seqbeam_core::BeamOption;
use serde::{Deserialize, Serialize};

use crate::build_path;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub beam: BeamOption,
    pub model: Model,
    pub output: OutputOption,
}

impl Config {
    /// Full path to the transition table.
    pub fn model_path(&self) -> anyhow::Result<PathBuf> {
        build_path(&self.model.path, &self.model.name)
    }
}

#[derive(Debug, Derivative, Clone, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct Model {
    /// Path to the folder containing all tables.
    #[derivative(Default(value = "\"assets/models\".into()"))]
    #[serde(alias = "model_path")]
    pub path: PathBuf,
    /// Name of the table.
    #[derivative(Default(value = "\"toy.toml\".into()"))]
    #[serde(alias = "model_name")]
    pub name: PathBuf,
}

#[derive(Debug, Derivative, Clone, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct OutputOption {
    /// Print the cumulative and normalized scores after the words.
    pub scores: bool,
    /// Drop the start token from the printed words.
    #[derivative(Default(value = "true"))]
    pub skip_start: bool,
}
