use std::time::Duration;

/// Staging engine configuration
///
/// Builder-style; every setter consumes and returns the config.
///
/// ```
/// use gqlstage::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::new()
///     .sample_size(3)
///     .query_timeout(Duration::from_secs(5));
/// assert_eq!(config.sample_size, 3);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rows returned per table in a staging report
    pub sample_size: usize,

    /// Deepest object nesting accepted in a staged document
    pub max_depth: usize,

    /// Largest number of rows a single staging call may produce
    pub max_rows: usize,

    /// Interrupt queries that run longer than this
    pub query_timeout: Option<Duration>,

    /// Cap on rows returned by a query; extra rows are dropped and the
    /// result is flagged as truncated
    pub max_result_rows: Option<usize>,

    /// Confidence below which a column or relationship is called out in the
    /// staging report's hints
    pub low_confidence_threshold: f64,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            sample_size: 5,
            max_depth: 32,
            max_rows: 100_000,
            query_timeout: None,
            max_result_rows: None,
            low_confidence_threshold: 0.8,
        }
    }

    /// Set the number of sample rows per table
    pub fn sample_size(mut self, rows: usize) -> Self {
        self.sample_size = rows;
        self
    }

    /// Set the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the maximum number of rows per staging call
    pub fn max_rows(mut self, rows: usize) -> Self {
        self.max_rows = rows;
        self
    }

    /// Set query timeout
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of rows a query returns
    pub fn max_result_rows(mut self, rows: usize) -> Self {
        self.max_result_rows = Some(rows);
        self
    }

    pub fn low_confidence_threshold(mut self, threshold: f64) -> Self {
        self.low_confidence_threshold = threshold;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 {
            return Err("max_depth must be > 0".to_string());
        }

        if self.max_rows == 0 {
            return Err("max_rows must be > 0".to_string());
        }

        if let Some(timeout) = self.query_timeout {
            if timeout.is_zero() {
                return Err("query_timeout must be > 0".to_string());
            }
        }

        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err("low_confidence_threshold must be within 0.0..=1.0".to_string());
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
