use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Decode,
    Compile,
    Link,
    Install,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Decode => write!(f, "decode"),
            BuildStage::Compile => write!(f, "compile"),
            BuildStage::Link => write!(f, "link"),
            BuildStage::Install => write!(f, "install"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("decoder rejected parameter: {diagnostic}")]
    Parameter { diagnostic: String },

    #[error("{stage} stage failed:\n{output}")]
    Tool { stage: BuildStage, output: String },

    #[error("{what} has wrong shape (got {got}, expected {expected})")]
    Shape {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid state: {0}")]
    State(String),

    #[error("evaluator routine {routine} returned status {status}")]
    Native { routine: &'static str, status: i32 },

    #[error("failed to load evaluator module: {0}")]
    Load(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
