use thiserror::Error;

use crate::BoxShape;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// A zero (or negative) intersection side: one of the boxes has no area.
    #[error("degenerate box against reference #{index}: box={shape:?} reference={reference:?}")]
    InvalidInput {
        index: usize,
        shape: BoxShape,
        reference: BoxShape,
    },

    #[error("invalid k-means configuration: {0}")]
    InvalidConfiguration(String),

    #[error("cluster {cluster} has no members after assignment pass {iteration}")]
    DegenerateCluster { cluster: usize, iteration: usize },

    #[error("no boxes to score")]
    EmptyDataset,

    #[error("no representative boxes to score against")]
    NoRepresentatives,

    #[error("assignment did not settle within {iterations} iterations")]
    NotConverged { iterations: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
