use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sampling knobs passed through to the backend unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParameters {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub max_output_tokens: i32,
}

impl GenerationParameters {
    /// Tuning used by the chat route.
    pub const CHAT: Self = Self {
        temperature: 1.0,
        top_p: 0.95,
        top_k: 40,
        max_output_tokens: 8192,
    };

    /// Tuning used by the direct generate-content route.
    pub const DIRECT: Self = Self {
        temperature: 0.9,
        top_p: 1.0,
        top_k: 1,
        max_output_tokens: 1000,
    };
}

/// Harm categories the backend can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
}

impl HarmCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarmCategory::HarmCategoryHarassment => "HARM_CATEGORY_HARASSMENT",
            HarmCategory::HarmCategoryHateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            HarmCategory::HarmCategorySexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            HarmCategory::HarmCategoryDangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
        }
    }
}

impl fmt::Display for HarmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HarmCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HARM_CATEGORY_HARASSMENT" => Ok(HarmCategory::HarmCategoryHarassment),
            "HARM_CATEGORY_HATE_SPEECH" => Ok(HarmCategory::HarmCategoryHateSpeech),
            "HARM_CATEGORY_SEXUALLY_EXPLICIT" => Ok(HarmCategory::HarmCategorySexuallyExplicit),
            "HARM_CATEGORY_DANGEROUS_CONTENT" => Ok(HarmCategory::HarmCategoryDangerousContent),
            other => Err(format!("unknown harm category '{}'", other)),
        }
    }
}

/// How aggressively a category is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

impl HarmBlockThreshold {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarmBlockThreshold::BlockNone => "BLOCK_NONE",
            HarmBlockThreshold::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
            HarmBlockThreshold::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
            HarmBlockThreshold::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
        }
    }
}

impl fmt::Display for HarmBlockThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HarmBlockThreshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BLOCK_NONE" => Ok(HarmBlockThreshold::BlockNone),
            "BLOCK_ONLY_HIGH" => Ok(HarmBlockThreshold::BlockOnlyHigh),
            "BLOCK_MEDIUM_AND_ABOVE" => Ok(HarmBlockThreshold::BlockMediumAndAbove),
            "BLOCK_LOW_AND_ABOVE" => Ok(HarmBlockThreshold::BlockLowAndAbove),
            other => Err(format!("unknown block threshold '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

impl SafetySetting {
    /// Parse a comma separated `CATEGORY=THRESHOLD` list.
    ///
    /// An empty string yields no overrides.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (category, threshold) = entry
                    .split_once('=')
                    .ok_or_else(|| format!("expected CATEGORY=THRESHOLD, got '{}'", entry))?;
                Ok(SafetySetting {
                    category: category.parse()?,
                    threshold: threshold.parse()?,
                })
            })
            .collect()
    }
}

/// Everything a backend needs besides the prompt itself.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub parameters: GenerationParameters,
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerationSettings {
    pub fn new(parameters: GenerationParameters, safety_settings: Vec<SafetySetting>) -> Self {
        Self {
            parameters,
            safety_settings,
        }
    }
}
