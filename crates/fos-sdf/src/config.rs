//! Atlas and scheduler configuration

use std::time::Duration;

use serde::Deserialize;

/// Atlas geometry and distance encoding
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AtlasConfig {
    /// Texture width in pixels, rounded down to a multiple of the tile size
    pub texture_width: u32,
    /// Height limit; growing past it fails the class
    pub max_texture_size: u32,
    /// Exponent of the perceptual distance curve
    pub exponent: f32,
    /// Outline margin as a fraction of the tile
    pub margin: f32,
    /// Try the accelerated raster strategy first
    pub use_accelerated: bool,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            texture_width: 2048,
            max_texture_size: 16384,
            exponent: 9.0,
            margin: 1.0 / 16.0,
            use_accelerated: true,
        }
    }
}

/// Work distribution for rasterization jobs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Upper bound on live raster contexts
    pub max_contexts: usize,
    /// Idle time after which pooled contexts are released
    #[serde(with = "millis")]
    pub idle_timeout: Duration,
    /// Work budget of one software drain tick
    #[serde(with = "millis")]
    pub time_slice: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_contexts: 2,
            idle_timeout: Duration::from_secs(5),
            time_slice: Duration::from_millis(5),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_contexts(mut self, max_contexts: usize) -> Self {
        self.max_contexts = max_contexts.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_time_slice(mut self, time_slice: Duration) -> Self {
        self.time_slice = time_slice;
        self
    }
}

/// Durations are written as integer milliseconds
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let atlas = AtlasConfig::default();
        assert_eq!(atlas.texture_width, 2048);
        assert_eq!(atlas.exponent, 9.0);
        let sched = SchedulerConfig::default().with_max_contexts(0);
        assert_eq!(sched.max_contexts, 1);
        assert_eq!(sched.time_slice, Duration::from_millis(5));
    }
}
