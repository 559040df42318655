use cast_store::StoreError;

/// Failures along the train/predict pipeline. Only
/// `InsufficientData` is an expected condition — the scheduler skips
/// the hour and revisits on a later tick; everything else is logged
/// and retried the same way but at `warn` level.
#[derive(Debug)]
pub enum PredictorError {
    InsufficientData { needed: usize, have: usize },
    Storage(String),
    Artifacts(String),
}

impl std::fmt::Display for PredictorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData { needed, have } => {
                write!(f, "insufficient data: need {needed} minutes, have {have}")
            }
            Self::Storage(msg) => write!(f, "storage: {msg}"),
            Self::Artifacts(msg) => write!(f, "model artifacts: {msg}"),
        }
    }
}

impl std::error::Error for PredictorError {}

impl From<StoreError> for PredictorError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl PredictorError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}
