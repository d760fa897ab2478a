//! Errors returned when submitting to the aggregation store

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Sample rate was zero, negative, or not a finite number
    InvalidSampleRate(f64),
    /// The serializer has stopped; nothing more can be applied
    Closed,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidSampleRate(rate) => {
                write!(f, "invalid sample rate {}: must be finite and > 0", rate)
            }
            StoreError::Closed => write!(f, "metrics store is closed"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Validate a counter sample rate before it reaches the queue.
pub(crate) fn check_sample_rate(sample_rate: f64) -> Result<(), StoreError> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(StoreError::InvalidSampleRate(sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_validation() {
        assert!(check_sample_rate(1.0).is_ok());
        assert!(check_sample_rate(0.1).is_ok());
        assert!(check_sample_rate(2.0).is_ok());
        assert_eq!(check_sample_rate(0.0), Err(StoreError::InvalidSampleRate(0.0)));
        assert!(check_sample_rate(-0.5).is_err());
        assert!(check_sample_rate(f64::NAN).is_err());
        assert!(check_sample_rate(f64::INFINITY).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(StoreError::Closed.to_string(), "metrics store is closed");
        assert!(StoreError::InvalidSampleRate(0.0)
            .to_string()
            .starts_with("invalid sample rate 0"));
    }
}
