use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    /// A query named a narrower level without naming the levels above it.
    #[error("{0}")]
    Contract(String),

    #[error("argument {0} is not in [0..1]")]
    OutOfRange(f64),

    #[error("{0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MetricsError {
    pub(crate) fn unknown_metric(name: &str) -> Self {
        MetricsError::Validation(format!("Unknown metric {}", name))
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            MetricsError::OutOfRange(2.0).to_string(),
            "argument 2 is not in [0..1]"
        );
        assert_eq!(
            MetricsError::unknown_metric("p99").to_string(),
            "Unknown metric p99"
        );
        assert_eq!(
            MetricsError::Config("bad".into()).to_string(),
            "Configuration error: bad"
        );
    }
}
