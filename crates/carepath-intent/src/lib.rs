pub mod classifier;
pub mod rules;
pub mod types;

pub use classifier::IntentClassifier;
pub use rules::{match_pattern, PatternRule, MEDICAL_EMERGENCY, VOCABULARY};
pub use types::{IntentOutcome, IntentSource};
