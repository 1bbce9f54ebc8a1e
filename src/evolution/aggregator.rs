use thiserror::Error;
/// Aggregator trait which reduces a series (usually a generation's fitness scores)
/// to a single f64 number.
pub trait Aggregator: Sync + Send {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError>;
}

#[derive(Error, Debug, PartialEq)]
pub enum AggregatorError {
    #[error("Cannot aggregate an empty series")]
    EmptySeries,
}

pub struct ArithmeticMean;
impl Aggregator for ArithmeticMean {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError> {
        if series.is_empty() {
            return Err(AggregatorError::EmptySeries);
        }
        Ok(series.iter().sum::<f64>() / (series.len() as f64))
    }
}

pub struct Maximum;
impl Aggregator for Maximum {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError> {
        series
            .iter()
            .copied()
            .max_by(f64::total_cmp)
            .ok_or(AggregatorError::EmptySeries)
    }
}
