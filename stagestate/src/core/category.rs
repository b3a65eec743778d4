//! Storage categories and their well-known artifact filenames.

use crate::errors::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace segment grouping related artifacts of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Image data (Base64 encoded) and image metadata.
    Images,
    /// Prompts and conversation inputs.
    Prompts,
    /// Raw responses from the inference API.
    Responses,
    /// Processed analysis and intermediate results.
    Processing,
}

impl Category {
    /// Returns every category.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Images, Self::Prompts, Self::Responses, Self::Processing]
    }

    /// Returns the path segment for the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Prompts => "prompts",
            Self::Responses => "responses",
            Self::Processing => "processing",
        }
    }

    /// Returns true if `value` names a category.
    #[must_use]
    pub fn is_valid(value: &str) -> bool {
        value.parse::<Self>().is_ok()
    }

    /// Human-readable description of what the category holds.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Images => "Image data (Base64 encoded and metadata)",
            Self::Prompts => "AI prompts and conversation data",
            Self::Responses => "AI responses and conversation history",
            Self::Processing => "Processed analysis and intermediate results",
        }
    }

    /// Content type used for structured objects in the category.
    ///
    /// Images are stored as Base64 text wrapped in JSON, so every category
    /// reports JSON.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        "application/json"
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "images" => Ok(Self::Images),
            "prompts" => Ok(Self::Prompts),
            "responses" => Ok(Self::Responses),
            "processing" => Ok(Self::Processing),
            "" => Err(StateError::category("parse_category", "category is required")),
            other => Err(StateError::category(
                "parse_category",
                format!("invalid category: {other}"),
            )),
        }
    }
}

/// Image metadata.
pub const IMAGE_METADATA_FILE: &str = "metadata.json";
/// Base64 text of the reference image.
pub const REFERENCE_BASE64_FILE: &str = "reference-base64.base64";
/// Base64 text of the checking image.
pub const CHECKING_BASE64_FILE: &str = "checking-base64.base64";
/// Rendered system prompt.
pub const SYSTEM_PROMPT_FILE: &str = "system-prompt.json";
/// First-turn prompt.
pub const TURN1_PROMPT_FILE: &str = "turn1-prompt.json";
/// Second-turn prompt.
pub const TURN2_PROMPT_FILE: &str = "turn2-prompt.json";
/// Raw first-turn response.
pub const TURN1_RESPONSE_FILE: &str = "turn1-raw-response.json";
/// Raw second-turn response.
pub const TURN2_RESPONSE_FILE: &str = "turn2-raw-response.json";
/// Run initialization record.
pub const INITIALIZATION_FILE: &str = "initialization.json";
/// Layout metadata.
pub const LAYOUT_METADATA_FILE: &str = "layout-metadata.json";
/// Historical verification context.
pub const HISTORICAL_CONTEXT_FILE: &str = "historical-context.json";
/// Processed first-turn analysis.
pub const TURN1_ANALYSIS_FILE: &str = "turn1-processed-response.json";
/// Processed second-turn analysis.
pub const TURN2_ANALYSIS_FILE: &str = "turn2-processed-response.json";
/// Final results of the run.
pub const FINAL_RESULTS_FILE: &str = "final-results.json";

/// Returns the standard filename for a well-known artifact of a category.
pub fn standard_filename(category: Category, file_type: &str) -> Result<&'static str, StateError> {
    let filename = match (category, file_type) {
        (Category::Images, "metadata") => Some(IMAGE_METADATA_FILE),
        (Category::Images, "reference-base64") => Some(REFERENCE_BASE64_FILE),
        (Category::Images, "checking-base64") => Some(CHECKING_BASE64_FILE),
        (Category::Prompts, "system") => Some(SYSTEM_PROMPT_FILE),
        (Category::Prompts, "turn1") => Some(TURN1_PROMPT_FILE),
        (Category::Prompts, "turn2") => Some(TURN2_PROMPT_FILE),
        (Category::Responses, "turn1") => Some(TURN1_RESPONSE_FILE),
        (Category::Responses, "turn2") => Some(TURN2_RESPONSE_FILE),
        (Category::Processing, "initialization") => Some(INITIALIZATION_FILE),
        (Category::Processing, "layout-metadata") => Some(LAYOUT_METADATA_FILE),
        (Category::Processing, "historical-context") => Some(HISTORICAL_CONTEXT_FILE),
        (Category::Processing, "turn1-analysis") => Some(TURN1_ANALYSIS_FILE),
        (Category::Processing, "turn2-analysis") => Some(TURN2_ANALYSIS_FILE),
        (Category::Processing, "final-results") => Some(FINAL_RESULTS_FILE),
        _ => None,
    };

    filename.ok_or_else(|| {
        StateError::category(
            "standard_filename",
            format!("unknown file type '{file_type}' for category '{category}'"),
        )
    })
}

/// Builds the envelope reference name for an artifact: `{category}_{stem}`.
///
/// The stem drops a trailing `.json` and turns `/` and `-` into `_`, so
/// `("prompts", "system-prompt.json")` becomes `prompts_system_prompt`.
#[must_use]
pub fn reference_name(category: Category, filename: &str) -> String {
    let stem = filename.strip_suffix(".json").unwrap_or(filename);
    let stem = stem.replace(['/', '-'], "_");
    format!("{category}_{stem}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for category in Category::all() {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "audio".parse::<Category>().unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Category);
        assert!(!Category::is_valid(""));
        assert!(Category::is_valid("responses"));
    }

    #[test]
    fn test_serde_uses_path_segment() {
        let json = serde_json::to_string(&Category::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_standard_filename() {
        assert_eq!(
            standard_filename(Category::Prompts, "system").unwrap(),
            "system-prompt.json"
        );
        assert_eq!(
            standard_filename(Category::Processing, "final-results").unwrap(),
            "final-results.json"
        );
        assert!(standard_filename(Category::Images, "turn1").is_err());
    }

    #[test]
    fn test_reference_name() {
        assert_eq!(
            reference_name(Category::Prompts, "system-prompt.json"),
            "prompts_system_prompt"
        );
        assert_eq!(
            reference_name(Category::Processing, "metadata.json"),
            "processing_metadata"
        );
        assert_eq!(
            reference_name(Category::Images, "reference-base64.base64"),
            "images_reference_base64.base64"
        );
    }
}
