//! Extraction instruction sent with every page image.
//!
//! Kept in one place so tests can inspect it and callers can override it via
//! [`crate::config::ExtractionConfig::prompt`].
//!
//! The instruction asks the model to infer values for required fields that
//! the page does not show. Inferred values are not marked as such in the
//! output; downstream consumers cannot tell a printed ingredient from a
//! guessed one.

/// Default instruction paired with the page image in the user message.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Extract all menu items from this restaurant menu image. For each item, provide:
- Item name and description
- Price
- Category and sub-category
- All ingredients you can identify
- Dietary tags (vegetarian, vegan, keto, gluten-friendly-option, etc.)
- Spiciness level (0-5 scale, if applicable)
- Portion size information
- General tags

Be thorough and accurate. If information is not visible for a field, make reasonable inferences based on the item name and description. Maintain the language of the image in your results."#;
