use crate::domain::errors::BerthError;
use crate::domain::template::ModuleTemplate;

/// Source of a module's template. In production this reads deployment
/// metadata; tests hand in a template directly.
pub trait MetadataProvider: Send + Sync {
    fn module_template(&self) -> Result<ModuleTemplate, BerthError>;
}

pub struct FixedTemplate(pub ModuleTemplate);

impl MetadataProvider for FixedTemplate {
    fn module_template(&self) -> Result<ModuleTemplate, BerthError> {
        Ok(self.0.clone())
    }
}

/// Parses a template from a JSON document.
pub struct JsonMetadata {
    raw: String,
}

impl JsonMetadata {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

impl MetadataProvider for JsonMetadata {
    fn module_template(&self) -> Result<ModuleTemplate, BerthError> {
        serde_json::from_str(&self.raw).map_err(|err| BerthError::Metadata(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_metadata_parses_template() {
        let raw = r#"{
            "name": "demo",
            "extensions": [],
            "components": [{
                "name": "greeter",
                "kind": "single",
                "configurations": [],
                "references": [],
                "activations": []
            }]
        }"#;
        let template = JsonMetadata::new(raw).module_template().unwrap();
        assert_eq!(template.name, "demo");
        assert_eq!(template.components.len(), 1);
    }

    #[test]
    fn json_metadata_reports_parse_failure() {
        let err = JsonMetadata::new("not json").module_template().unwrap_err();
        assert!(matches!(err, BerthError::Metadata(_)));
    }
}
