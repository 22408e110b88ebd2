use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and pacing knobs for the drawing engine.
///
/// Durations are (de)serialized as whole milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    pub spin_steps_min: u32,
    pub spin_steps_max: u32,
    #[serde(with = "duration_ms")]
    pub spin_base_delay: Duration,
    #[serde(with = "duration_ms")]
    pub spin_delay_increment: Duration,

    /// Pause between a digit landing and its batch starting to shake.
    #[serde(with = "duration_ms")]
    pub elimination_lead_in: Duration,
    #[serde(with = "duration_ms")]
    pub shake_duration: Duration,
    #[serde(with = "duration_ms")]
    pub shrink_duration: Duration,
    #[serde(with = "duration_ms")]
    pub entrance_grace: Duration,

    pub counter_max_steps: u32,
    #[serde(with = "duration_ms")]
    pub counter_frame: Duration,
    #[serde(with = "duration_ms")]
    pub glow_duration: Duration,

    #[serde(with = "duration_ms")]
    pub winner_dark: Duration,
    #[serde(with = "duration_ms")]
    pub winner_spotlight: Duration,
    #[serde(with = "duration_ms")]
    pub winner_card_reveal: Duration,

    /// Seed for the digit spin walk; `None` draws from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            spin_steps_min: 20,
            spin_steps_max: 30,
            spin_base_delay: Duration::from_millis(50),
            spin_delay_increment: Duration::from_millis(6),
            elimination_lead_in: Duration::from_millis(250),
            shake_duration: Duration::from_millis(1200),
            shrink_duration: Duration::from_millis(600),
            entrance_grace: Duration::from_millis(500),
            counter_max_steps: 30,
            counter_frame: Duration::from_millis(33),
            glow_duration: Duration::from_secs(2),
            winner_dark: Duration::from_millis(1000),
            winner_spotlight: Duration::from_millis(1500),
            winner_card_reveal: Duration::from_millis(1000),
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_spin_steps(mut self, min: u32, max: u32) -> Self {
        self.spin_steps_min = min;
        self.spin_steps_max = max;
        self
    }

    pub fn with_elimination_timings(
        mut self,
        shake: Duration,
        shrink: Duration,
        entrance_grace: Duration,
    ) -> Self {
        self.shake_duration = shake;
        self.shrink_duration = shrink;
        self.entrance_grace = entrance_grace;
        self
    }

    pub fn with_counter_steps(mut self, max_steps: u32, frame: Duration) -> Self {
        self.counter_max_steps = max_steps;
        self.counter_frame = frame;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive"));
        }
        if self.spin_steps_min == 0 || self.spin_steps_min > self.spin_steps_max {
            return Err(ConfigError::Invalid(
                "spin steps need 0 < spin_steps_min <= spin_steps_max",
            ));
        }
        if self.elimination_lead_in.is_zero() {
            return Err(ConfigError::Invalid(
                "elimination_lead_in must be positive",
            ));
        }
        if self.counter_max_steps == 0 {
            return Err(ConfigError::Invalid("counter_max_steps must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid engine config: {0}")]
    Invalid(&'static str),
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
