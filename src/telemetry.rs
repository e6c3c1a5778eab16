use serde::Serialize;

/// Fragment size the vehicle splits console text into.
pub const CONSOLE_FRAGMENT_LEN: usize = 30;

pub const MIN_THRUST: f64 = 10_000.0;
/// Largest thrust accepted as a command.
pub const MAX_THRUST_CMD: f64 = 60_000.0;
/// Largest thrust reported by the vehicle.
pub const MAX_THRUST_VEHICLE: f64 = 65_535.0;

pub const MIN_POWER_MV: f64 = 3_000.0;
pub const MAX_POWER_MV: f64 = 4_150.0;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    Battery,
    Charging,
    Charged,
    LowPower,
    Shutdown,
}

impl BatteryState {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => BatteryState::Battery,
            1 => BatteryState::Charging,
            2 => BatteryState::Charged,
            3 => BatteryState::LowPower,
            4 => BatteryState::Shutdown,
            _ => return None,
        })
    }
}

pub fn thrust_to_percentage(thrust: f64, from_vehicle: bool) -> f64 {
    let max = if from_vehicle { MAX_THRUST_VEHICLE } else { MAX_THRUST_CMD };
    ((thrust - MIN_THRUST) / (max - MIN_THRUST) * 100.0).max(0.0)
}

pub fn power_to_percentage(millivolts: f64) -> f64 {
    ((millivolts - MIN_POWER_MV) / (MAX_POWER_MV - MIN_POWER_MV) * 100.0).clamp(0.0, 100.0)
}

/// Joins console text that arrives split into fixed-size fragments.
///
/// A fragment of exactly [`CONSOLE_FRAGMENT_LEN`] bytes means more follows;
/// anything shorter ends the message.
#[derive(Debug, Default)]
pub struct ConsoleAssembler {
    pending: String,
}

impl ConsoleAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if fragment.len() == CONSOLE_FRAGMENT_LEN {
            self.pending.push_str(fragment);
            return None;
        }
        let mut line = std::mem::take(&mut self.pending);
        line.push_str(fragment);
        let mut line = line.trim_matches('\n').to_string();
        line.push('\n');
        Some(line)
    }
}
