//! Error types for diagram construction and persistence.

use std::fmt;
use std::io;

use thiserror::Error;

/// Why a process flagged as hidden cannot be collapsed into an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenNodeViolation {
    /// The process has no dependent processes, so there is nothing to collapse into.
    Terminal,
    /// Several required processes and several dependent processes at once.
    AmbiguousFan { requires: usize, nexts: usize },
}

impl fmt::Display for HiddenNodeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal => f.write_str("it is an end process"),
            Self::AmbiguousFan { requires, nexts } => write!(
                f,
                "it has {requires} required processes and {nexts} dependent processes"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiagramError {
    #[error("theme `{name}` not found")]
    UnknownTheme { name: String },

    #[error("{}", hidden_node_message(.process, .violation))]
    InvalidHiddenNode {
        process: String,
        violation: HiddenNodeViolation,
    },

    #[error("failed to persist diagram to `{target}`: {source}")]
    Persistence {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("node `{name}` must be added before an edge can reference it")]
    UnregisteredNode { name: String },

    #[error("render error: {0}")]
    Render(String),

    #[error("config error: {0}")]
    Config(String),
}

impl DiagramError {
    pub(crate) fn persistence(target: impl Into<String>, source: io::Error) -> Self {
        Self::Persistence {
            target: target.into(),
            source,
        }
    }
}

fn hidden_node_message(process: &str, violation: &HiddenNodeViolation) -> String {
    match violation {
        HiddenNodeViolation::Terminal => {
            format!("cannot hide end process `{process}` from diagram")
        }
        HiddenNodeViolation::AmbiguousFan { .. } => format!(
            "cannot hide process `{process}` from diagram with multiple required processes \
             and multiple dependent processes ({violation})"
        ),
    }
}

pub type Result<T> = std::result::Result<T, DiagramError>;
