//! The structured-output contract between this crate and the VLM.
//!
//! [`menu_items_schema`] is the strict JSON Schema attached to every
//! extraction request; [`MenuItem`] is its typed mirror. The two must agree:
//! the serde attributes below (`camelCase`, `deny_unknown_fields`, optional
//! `subCategory` / `portionSize`) encode exactly what the schema's
//! `required` list and `additionalProperties: false` say.
//!
//! The schema is versionless and not configurable at runtime.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name given to the schema inside the `response_format` directive.
pub const SCHEMA_NAME: &str = "menu_items";

/// Upper bound of the spiciness scale (0 = bland).
pub const MAX_SPICINESS: f64 = 5.0;

/// One dish as extracted from a menu page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MenuItem {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub tags: Vec<String>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    pub ingredients: Vec<String>,
    pub dietary_tags: Vec<String>,
    pub spiciness_level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portion_size: Option<String>,
}

impl MenuItem {
    /// Check the numeric constraints serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if !self.spiciness_level.is_finite()
            || !(0.0..=MAX_SPICINESS).contains(&self.spiciness_level)
        {
            return Err(format!(
                "item '{}': spicinessLevel {} outside 0–{}",
                self.name, self.spiciness_level, MAX_SPICINESS
            ));
        }
        if !self.price.is_finite() {
            return Err(format!("item '{}': price is not a finite number", self.name));
        }
        Ok(())
    }
}

/// The inner payload carried in `choices[0].message.content`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MenuPayload {
    #[serde(default)]
    menu_items: Vec<MenuItem>,
}

/// Decode the model's content string: once to an untyped value (kept
/// verbatim as `menu_data`), then into typed items.
///
/// A missing `menuItems` key yields an empty list. Any other shape mismatch,
/// including extra item fields, is an error.
pub fn parse_menu_payload(content: &str) -> Result<(Value, Vec<MenuItem>), String> {
    let menu_data: Value =
        serde_json::from_str(content).map_err(|e| format!("content is not JSON: {e}"))?;

    if !menu_data.is_object() {
        return Err(format!(
            "expected a JSON object, got {}",
            json_kind(&menu_data)
        ));
    }

    let payload: MenuPayload = serde_json::from_value(menu_data.clone())
        .map_err(|e| format!("menuItems does not match the schema: {e}"))?;

    for item in &payload.menu_items {
        item.validate()?;
    }

    Ok((menu_data, payload.menu_items))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// JSON Schema for the structured reply: `{ "menuItems": [MenuItem, …] }`.
pub fn menu_items_schema() -> Value {
    let string_list = |description: &str| {
        json!({
            "type": "array",
            "items": { "type": "string" },
            "description": description,
        })
    };

    json!({
        "type": "object",
        "properties": {
            "menuItems": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "Name of the menu item",
                        },
                        "description": {
                            "type": "string",
                            "description": "Detailed description of the menu item",
                        },
                        "price": {
                            "type": "number",
                            "description": "Price of the item",
                        },
                        "tags": string_list("General tags for the item"),
                        "category": {
                            "type": "string",
                            "description": "Main category (e.g., Appetizers, Main Course, etc.)",
                        },
                        "subCategory": {
                            "type": "string",
                            "description": "Sub-category within the main category",
                        },
                        "ingredients": string_list("List of ingredients in the item"),
                        "dietaryTags": string_list("Dietary flags"),
                        "spicinessLevel": {
                            "type": "number",
                            "minimum": 0,
                            "maximum": 5,
                            "description": "Spiciness level from 0 (bland) to 5 (very spicy)",
                        },
                        "portionSize": {
                            "type": "string",
                            "description": "Portion context (e.g., 2 units, 8 pieces, 300g)",
                        },
                    },
                    "required": [
                        "name",
                        "description",
                        "price",
                        "tags",
                        "category",
                        "spicinessLevel",
                        "ingredients",
                        "dietaryTags",
                    ],
                    "additionalProperties": false,
                },
            }
        },
        "required": ["menuItems"],
        "additionalProperties": false,
    })
}

/// The `response_format` request field wrapping [`menu_items_schema`].
pub fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": SCHEMA_NAME,
            "strict": true,
            "schema": menu_items_schema(),
        }
    })
}
