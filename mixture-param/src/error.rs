use thiserror::Error;

/// Rank and size violations, raised when the parameters are resolved
/// and when arrays handed to an existing mixture do not line up with it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("locs should be K x D (or ... x K x D in batch mode), found shape {0:?}")]
    LocsRank(Vec<usize>),

    #[error("locs has an empty component or event axis: {0:?}")]
    EmptyAxis(Vec<usize>),

    #[error("scale should have shape {expected:?}, found {found:?}")]
    Scale {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("logits should have shape {expected:?}, found {found:?}")]
    Logits {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("value of shape {found:?} does not broadcast against {target:?}")]
    Value {
        target: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("upstream gradient should have shape {expected:?}, found {found:?}")]
    Gradient {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("component sampler returned shape {found:?}, expected {expected:?}")]
    SampleShape {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("component index {index} out of range for {num_components} components")]
    SampleIndex { index: usize, num_components: usize },

    #[error("cannot reshape {from:?} into {to:?}")]
    Reshape { from: Vec<usize>, to: Vec<usize> },
}

/// Construction errors: shapes first, then parameter values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MixtureError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("scale must be positive, found scale{index:?} = {value}")]
    NonPositiveScale { index: Vec<usize>, value: f64 },

    #[error("logits must be finite, found logits{index:?} = {value}")]
    NonFiniteLogit { index: Vec<usize>, value: f64 },

    #[error("locs must be finite, found locs{index:?} = {value}")]
    NonFiniteLoc { index: Vec<usize>, value: f64 },
}
