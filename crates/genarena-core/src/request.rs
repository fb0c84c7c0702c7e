//! Generation request value types.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static ASPECT_RATIO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):(\d+)$").unwrap());

/// Width:height ratio shared by every slot in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub const SQUARE: AspectRatio = AspectRatio::new_unchecked(1, 1);
    pub const PORTRAIT: AspectRatio = AspectRatio::new_unchecked(2, 3);
    pub const WIDESCREEN: AspectRatio = AspectRatio::new_unchecked(16, 9);

    /// Ratios offered as one-click choices.
    pub const PRESETS: [AspectRatio; 3] = [Self::SQUARE, Self::PORTRAIT, Self::WIDESCREEN];

    const fn new_unchecked(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Validation(format!(
                "aspect ratio {}:{} must use positive integers",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    /// Parse `W:H`, e.g. `16:9` or `4:5`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || {
            Error::Validation(format!(
                "invalid aspect ratio '{}', expected W:H (e.g. 4:5)",
                raw
            ))
        };
        let caps = ASPECT_RATIO_RE.captures(raw.trim()).ok_or_else(invalid)?;
        let width: u32 = caps[1].parse().map_err(|_| invalid())?;
        let height: u32 = caps[2].parse().map_err(|_| invalid())?;
        Self::new(width, height)
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::SQUARE
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.to_string()
    }
}

/// One provider's participation in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SlotConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, enabled: bool) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            enabled,
        }
    }

    pub fn enabled(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(provider, model, true)
    }

    pub fn disabled(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(provider, model, false)
    }
}

/// Immutable description of one "generate" action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    prompt: String,
    aspect_ratio: AspectRatio,
    slots: Vec<SlotConfig>,
}

impl GenerationRequest {
    /// Validate and build a request. Slot order is preserved.
    pub fn new(
        prompt: impl Into<String>,
        aspect_ratio: AspectRatio,
        slots: Vec<SlotConfig>,
    ) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(Error::Validation("prompt must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for slot in &slots {
            if slot.provider.trim().is_empty() {
                return Err(Error::Validation("slot provider must not be empty".into()));
            }
            if !seen.insert(slot.provider.as_str()) {
                return Err(Error::Validation(format!(
                    "provider '{}' appears more than once",
                    slot.provider
                )));
            }
        }

        Ok(Self {
            prompt,
            aspect_ratio,
            slots,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn slots(&self) -> &[SlotConfig] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aspect_ratio() {
        assert_eq!(AspectRatio::parse("16:9").unwrap(), AspectRatio::WIDESCREEN);
        assert_eq!(AspectRatio::parse(" 4:5 ").unwrap().to_string(), "4:5");
        assert!(AspectRatio::parse("4x5").is_err());
        assert!(AspectRatio::parse("4:").is_err());
        assert!(AspectRatio::parse("-4:5").is_err());
        assert!(AspectRatio::parse("0:5").is_err());
        assert!(AspectRatio::parse("99999999999:1").is_err());
    }

    #[test]
    fn test_aspect_ratio_default() {
        assert_eq!(AspectRatio::default().to_string(), "1:1");
        assert_eq!(AspectRatio::default(), AspectRatio::SQUARE);
    }

    #[test]
    fn test_aspect_ratio_serde_as_string() {
        let json = serde_json::to_string(&AspectRatio::WIDESCREEN).unwrap();
        assert_eq!(json, "\"16:9\"");
        let parsed: AspectRatio = serde_json::from_str("\"2:3\"").unwrap();
        assert_eq!(parsed, AspectRatio::PORTRAIT);
        assert!(serde_json::from_str::<AspectRatio>("\"wide\"").is_err());
    }

    #[test]
    fn test_request_rejects_empty_prompt() {
        let err = GenerationRequest::new("   ", AspectRatio::default(), Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_request_rejects_duplicate_provider() {
        let slots = vec![
            SlotConfig::enabled("fireworks1", "a"),
            SlotConfig::disabled("fireworks1", "b"),
        ];
        assert!(GenerationRequest::new("a cat", AspectRatio::default(), slots).is_err());
    }

    #[test]
    fn test_slot_enabled_defaults_true() {
        let slot: SlotConfig =
            serde_json::from_str(r#"{"provider":"fal","model":"fal-ai/flux/dev"}"#).unwrap();
        assert!(slot.enabled);
    }
}
