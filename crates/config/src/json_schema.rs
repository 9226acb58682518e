//! JSON Schema export of the config file format.

use crate::CodeIndexConfig;
use schemars::{Schema, schema_for};

/// JSON Schema for [`CodeIndexConfig`].
#[must_use]
pub fn config_json_schema() -> Schema {
    schema_for!(CodeIndexConfig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_top_level_sections() {
        let schema = serde_json::to_value(config_json_schema()).unwrap_or_default();
        let properties = schema.get("properties").cloned().unwrap_or_default();
        for section in ["version", "index", "embedding", "vectorStore", "search", "watch"] {
            assert!(properties.get(section).is_some(), "missing section {section}");
        }
    }
}
