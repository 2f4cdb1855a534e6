//! Pipeline and configuration errors.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreSceneSelection,
    PostSceneSelection,
    BandRead,
    Alignment,
    CloudMask,
    Index,
    Delta,
    Classification,
    Statistics,
    Output,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreSceneSelection => "pre-fire scene selection",
            Stage::PostSceneSelection => "post-fire scene selection",
            Stage::BandRead => "band read",
            Stage::Alignment => "band alignment",
            Stage::CloudMask => "cloud mask",
            Stage::Index => "index",
            Stage::Delta => "delta",
            Stage::Classification => "classification",
            Stage::Statistics => "statistics",
            Stage::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first failure of a pipeline run and where it happened.
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: emberline_core::Error,
}

impl PipelineError {
    pub fn new(stage: Stage, source: emberline_core::Error) -> Self {
        Self { stage, source }
    }

    /// Error kind of the underlying failure, e.g. `"NoSuitableScene"`.
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

/// Tag a core result with the stage that produced it.
pub(crate) trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T> AtStage<T> for emberline_core::Result<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}

/// Errors loading or validating a [`PipelineConfig`](crate::PipelineConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] emberline_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_stage_and_cause() {
        let err = PipelineError::new(
            Stage::PostSceneSelection,
            emberline_core::Error::NoSuitableScene("all 3 scenes exceed the 10% cloud ceiling".into()),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("post-fire scene selection failed"));
        assert_eq!(err.kind(), "NoSuitableScene");
    }

    #[test]
    fn at_stage_wraps_errors_only() {
        let ok: emberline_core::Result<u8> = Ok(3);
        assert_eq!(ok.at(Stage::Index).unwrap(), 3);
        let bad: emberline_core::Result<u8> = Err(emberline_core::Error::EmptyRaster("x".into()));
        assert_eq!(bad.at(Stage::Statistics).unwrap_err().stage, Stage::Statistics);
    }
}
