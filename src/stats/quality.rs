use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Best possible link quality sample.
pub const MAX_QUALITY: u8 = 100;

/// How a window of raw link-quality samples is reduced to one value.
#[derive(clap::ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QualityPolicy {
    /// Mean of the window, rounded.
    Average,
    /// Worst sample in the window.
    Minimum,
    /// Percentage of samples that were perfect.
    Count,
}

impl QualityPolicy {
    fn neutral(self) -> u64 {
        match self {
            QualityPolicy::Minimum => u64::from(MAX_QUALITY),
            QualityPolicy::Average | QualityPolicy::Count => 0,
        }
    }
}

/// Turns a noisy per-packet quality signal (0..=100) into one summary
/// value every `window` samples.
#[derive(Debug, Clone)]
pub struct LinkQualitySmoother {
    window: u64,
    policy: QualityPolicy,
    count: u64,
    acc: u64,
}

impl LinkQualitySmoother {
    pub fn new(window: usize, policy: QualityPolicy) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError::ZeroWindow { what: "link quality" });
        }
        // a full window of perfect samples must fit the accumulator
        let window = u64::try_from(window)
            .ok()
            .filter(|w| w.checked_mul(u64::from(MAX_QUALITY)).is_some())
            .ok_or(ConfigError::WindowTooLarge { what: "link quality", window })?;
        Ok(Self { window, policy, count: 0, acc: policy.neutral() })
    }

    pub fn policy(&self) -> QualityPolicy {
        self.policy
    }

    /// Feed one sample. Returns the summary once the window is full and
    /// `None` while it is still filling.
    pub fn add_measurement(&mut self, value: u8) -> Option<u8> {
        let value = u64::from(value.min(MAX_QUALITY));
        self.count += 1;
        match self.policy {
            QualityPolicy::Average => self.acc += value,
            QualityPolicy::Minimum => self.acc = self.acc.min(value),
            QualityPolicy::Count => self.acc += u64::from(value == u64::from(MAX_QUALITY)),
        }

        if self.count < self.window {
            return None;
        }

        let w = self.window as f64;
        let out = match self.policy {
            QualityPolicy::Average => (self.acc as f64 / w).round() as u8,
            QualityPolicy::Minimum => self.acc as u8,
            QualityPolicy::Count => (100.0 * self.acc as f64 / w).round() as u8,
        };
        self.reset();
        Some(out)
    }

    /// Like [`add_measurement`](Self::add_measurement) but with an explicit
    /// policy. Switching policy abandons the partially filled window.
    pub fn add_measurement_with(&mut self, policy: QualityPolicy, value: u8) -> Option<u8> {
        if policy != self.policy {
            self.policy = policy;
            self.reset();
        }
        self.add_measurement(value)
    }

    fn reset(&mut self) {
        self.count = 0;
        self.acc = self.policy.neutral();
    }
}
