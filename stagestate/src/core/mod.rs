//! Core addressing types.
//!
//! This module contains:
//! - `Reference`, the pointer to one stored object
//! - `Category`, the closed set of artifact namespaces
//! - The key scheme mapping `(run id, category, filename, date)` to a path

mod category;
mod key;
mod reference;

pub use category::{
    reference_name, standard_filename, Category, CHECKING_BASE64_FILE, FINAL_RESULTS_FILE,
    HISTORICAL_CONTEXT_FILE, IMAGE_METADATA_FILE, INITIALIZATION_FILE, LAYOUT_METADATA_FILE,
    REFERENCE_BASE64_FILE, SYSTEM_PROMPT_FILE, TURN1_ANALYSIS_FILE, TURN1_PROMPT_FILE,
    TURN1_RESPONSE_FILE, TURN2_ANALYSIS_FILE, TURN2_PROMPT_FILE, TURN2_RESPONSE_FILE,
};
pub use key::{date_partition, generate_key, is_date_path, parse_key, validate_key, ParsedKey};
pub use reference::Reference;
