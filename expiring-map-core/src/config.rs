use std::time::Duration;

use crate::error::Error;

/// Configuration for the map's background sweeper
///
/// # Example
///
/// ```rust
/// use expiring_map_core::MapConfig;
/// use std::time::Duration;
///
/// let config = MapConfig::default()
///     .with_sweep_interval(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Interval between background sweeps (default: 1 second)
    pub sweep_interval: Duration,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl MapConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sweep interval
    ///
    /// This determines how often the background task scans for and evicts
    /// expired entries. An unaccessed entry lingers at most this long past
    /// its deadline.
    ///
    /// # Example
    ///
    /// ```rust
    /// use expiring_map_core::MapConfig;
    /// use std::time::Duration;
    ///
    /// // Sweep every 100 milliseconds
    /// let config = MapConfig::default()
    ///     .with_sweep_interval(Duration::from_millis(100));
    /// ```
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Checks that the configuration can drive a sweeper.
    ///
    /// A zero interval would make the sweeper spin, so it is rejected.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sweep_interval.is_zero() {
            return Err(Error::InvalidSweepInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MapConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_sweep_interval() {
        let config = MapConfig::default()
            .with_sweep_interval(Duration::from_millis(250));
        assert_eq!(config.sweep_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = MapConfig::new().with_sweep_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidSweepInterval)));
    }
}
