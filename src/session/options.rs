use crate::core::error::ChatError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 100..=8192;
pub const THREAD_COUNT_RANGE: RangeInclusive<u32> = 1..=16;

pub const CONTEXT_WINDOW: u32 = 2048;
pub const TOP_K: u32 = 20;
pub const TOP_P: f32 = 0.7;
pub const REPEAT_PENALTY: f32 = 1.0;
pub const GPU_LAYERS: u32 = 1;
pub const STOP_SEQUENCES: [&str; 2] = ["User:", "Assistant:"];

/// Sampling parameters sent with every generation request.
///
/// Only `temperature`, `max_tokens` and `thread_count` are adjustable; the rest
/// are fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub context_window: u32,
    pub thread_count: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub num_gpu: u32,
    pub stop: Vec<String>,
}

impl GenerationOptions {
    pub fn for_mode(mode: PerformanceMode) -> Self {
        let preset = mode.preset();
        Self {
            temperature: preset.temperature,
            max_tokens: preset.max_tokens,
            context_window: CONTEXT_WINDOW,
            thread_count: preset.thread_count,
            top_k: TOP_K,
            top_p: TOP_P,
            repeat_penalty: REPEAT_PENALTY,
            num_gpu: GPU_LAYERS,
            stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub(crate) fn apply(&mut self, setting: OptionSetting) {
        match setting {
            OptionSetting::Temperature(v) => self.temperature = v,
            OptionSetting::MaxTokens(v) => self.max_tokens = v,
            OptionSetting::ThreadCount(v) => self.thread_count = v,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::for_mode(PerformanceMode::default())
    }
}

/// Canonical `(temperature, max_tokens, thread_count)` for a mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModePreset {
    pub temperature: f32,
    pub max_tokens: u32,
    pub thread_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    #[default]
    Balanced,
    SpeedFirst,
    QualityFirst,
}

impl PerformanceMode {
    pub const ALL: [PerformanceMode; 3] = [
        PerformanceMode::Balanced,
        PerformanceMode::SpeedFirst,
        PerformanceMode::QualityFirst,
    ];

    pub fn preset(&self) -> ModePreset {
        match self {
            PerformanceMode::Balanced => ModePreset {
                temperature: 0.5,
                max_tokens: 2048,
                thread_count: 4,
            },
            PerformanceMode::SpeedFirst => ModePreset {
                temperature: 0.8,
                max_tokens: 2048,
                thread_count: 4,
            },
            PerformanceMode::QualityFirst => ModePreset {
                temperature: 0.7,
                max_tokens: 8192,
                thread_count: 8,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceMode::Balanced => "balanced",
            PerformanceMode::SpeedFirst => "speed",
            PerformanceMode::QualityFirst => "quality",
        }
    }
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerformanceMode {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "balanced" => Ok(PerformanceMode::Balanced),
            "speed" | "speed_first" => Ok(PerformanceMode::SpeedFirst),
            "quality" | "quality_first" => Ok(PerformanceMode::QualityFirst),
            other => Err(ChatError::Validation(format!(
                "unknown performance mode '{}' (expected balanced, speed or quality)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionField {
    Temperature,
    MaxTokens,
    ThreadCount,
}

impl OptionField {
    pub const ALL: [OptionField; 3] = [
        OptionField::Temperature,
        OptionField::MaxTokens,
        OptionField::ThreadCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OptionField::Temperature => "temperature",
            OptionField::MaxTokens => "max_tokens",
            OptionField::ThreadCount => "threads",
        }
    }
}

impl FromStr for OptionField {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "temperature" | "temp" => Ok(OptionField::Temperature),
            "max_tokens" | "max-tokens" | "tokens" => Ok(OptionField::MaxTokens),
            "threads" | "thread_count" | "num_thread" => Ok(OptionField::ThreadCount),
            other => Err(ChatError::Validation(format!("unknown option '{}'", other))),
        }
    }
}

/// A single user adjustment of one option field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionSetting {
    Temperature(f32),
    MaxTokens(u32),
    ThreadCount(u32),
}

impl OptionSetting {
    pub fn field(&self) -> OptionField {
        match self {
            OptionSetting::Temperature(_) => OptionField::Temperature,
            OptionSetting::MaxTokens(_) => OptionField::MaxTokens,
            OptionSetting::ThreadCount(_) => OptionField::ThreadCount,
        }
    }

    /// Parses a raw value for `field`. Range checks happen in [`validate`](Self::validate).
    pub fn parse(field: OptionField, value: &str) -> Result<Self, ChatError> {
        let value = value.trim();
        let invalid = || ChatError::Validation(format!("invalid value '{}' for {}", value, field.name()));
        match field {
            OptionField::Temperature => value
                .parse::<f32>()
                .map(OptionSetting::Temperature)
                .map_err(|_| invalid()),
            OptionField::MaxTokens => value
                .parse::<u32>()
                .map(OptionSetting::MaxTokens)
                .map_err(|_| invalid()),
            OptionField::ThreadCount => value
                .parse::<u32>()
                .map(OptionSetting::ThreadCount)
                .map_err(|_| invalid()),
        }
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        let in_range = match *self {
            OptionSetting::Temperature(v) => v.is_finite() && TEMPERATURE_RANGE.contains(&v),
            OptionSetting::MaxTokens(v) => MAX_TOKENS_RANGE.contains(&v),
            OptionSetting::ThreadCount(v) => THREAD_COUNT_RANGE.contains(&v),
        };
        if in_range {
            Ok(())
        } else {
            Err(ChatError::Validation(format!(
                "{} out of range: {}",
                self.field().name(),
                self.describe_range()
            )))
        }
    }

    fn describe_range(&self) -> String {
        match self {
            OptionSetting::Temperature(v) => format!(
                "{} not in {}..={}",
                v,
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end()
            ),
            OptionSetting::MaxTokens(v) => format!(
                "{} not in {}..={}",
                v,
                MAX_TOKENS_RANGE.start(),
                MAX_TOKENS_RANGE.end()
            ),
            OptionSetting::ThreadCount(v) => format!(
                "{} not in {}..={}",
                v,
                THREAD_COUNT_RANGE.start(),
                THREAD_COUNT_RANGE.end()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_table() {
        let p = PerformanceMode::Balanced.preset();
        assert_eq!((p.temperature, p.max_tokens, p.thread_count), (0.5, 2048, 4));
        let p = PerformanceMode::SpeedFirst.preset();
        assert_eq!((p.temperature, p.max_tokens, p.thread_count), (0.8, 2048, 4));
        let p = PerformanceMode::QualityFirst.preset();
        assert_eq!((p.temperature, p.max_tokens, p.thread_count), (0.7, 8192, 8));
    }

    #[test]
    fn fixed_fields_survive_mode_presets() {
        for mode in PerformanceMode::ALL {
            let options = GenerationOptions::for_mode(mode);
            assert_eq!(options.context_window, 2048);
            assert_eq!(options.top_k, 20);
            assert_eq!(options.stop, vec!["User:".to_string(), "Assistant:".to_string()]);
        }
    }

    #[test]
    fn parses_mode_aliases() {
        assert_eq!("speed".parse::<PerformanceMode>().unwrap(), PerformanceMode::SpeedFirst);
        assert_eq!(
            "Quality-First".parse::<PerformanceMode>().unwrap(),
            PerformanceMode::QualityFirst
        );
        assert!("turbo".parse::<PerformanceMode>().is_err());
    }

    #[test]
    fn rejects_nan_temperature() {
        assert!(OptionSetting::Temperature(f32::NAN).validate().is_err());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        assert!(OptionSetting::Temperature(0.0).validate().is_ok());
        assert!(OptionSetting::Temperature(2.0).validate().is_ok());
        assert!(OptionSetting::MaxTokens(100).validate().is_ok());
        assert!(OptionSetting::MaxTokens(8192).validate().is_ok());
        assert!(OptionSetting::MaxTokens(99).validate().is_err());
        assert!(OptionSetting::ThreadCount(0).validate().is_err());
        assert!(OptionSetting::ThreadCount(17).validate().is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = OptionSetting::parse(OptionField::MaxTokens, "lots").unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert_eq!(
            OptionSetting::parse(OptionField::Temperature, " 1.5 ").unwrap(),
            OptionSetting::Temperature(1.5)
        );
    }
}
