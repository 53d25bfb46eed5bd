//! Weaver configuration
//!
//! Names of the annotations the weaver recognizes and of the runtime API it
//! emits calls to. Defaults match the semweave runtime; a host can override
//! any of them from TOML:
//!
//! ```toml
//! verify = true
//!
//! [annotations]
//! persistent_identifier = "Acme.Model.PredicateAttribute"
//!
//! [runtime]
//! module = "Acme.Runtime"
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Kind of annotation that drives a generator task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Class-level identifier list
    TypeIdentifiers,
    /// Property-level persistent identifier
    PersistentIdentifier,
    /// Property- or class-level change notification request
    ChangeNotification,
}

/// Top-level weaver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeaveConfig {
    #[serde(default)]
    pub annotations: AnnotationNames,
    #[serde(default)]
    pub runtime: RuntimeNames,
    /// Verify every synthesized body before committing the pass
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_verify() -> bool {
    true
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            annotations: AnnotationNames::default(),
            runtime: RuntimeNames::default(),
            verify: default_verify(),
        }
    }
}

/// Full names of the recognized annotations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnnotationNames {
    pub type_identifiers: String,
    pub persistent_identifier: String,
    pub default_value: String,
    pub change_notification: String,
}

impl Default for AnnotationNames {
    fn default() -> Self {
        Self {
            type_identifiers: "Semweave.Mapping.RdfClassAttribute".to_string(),
            persistent_identifier: "Semweave.Mapping.RdfPropertyAttribute".to_string(),
            default_value: "System.ComponentModel.DefaultValueAttribute".to_string(),
            change_notification: "Semweave.Mapping.NotifyPropertyChangedAttribute".to_string(),
        }
    }
}

/// Modules, types and members of the runtime the generated code calls into
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeNames {
    /// Module declaring the mapping API
    pub module: String,
    /// Module declaring the root object type
    pub core_module: String,
    pub root_object: String,
    /// Generic mapping-field type definition
    pub mapping_type: String,
    /// Wrapper type returned by the type-hierarchy query
    pub identifier_type: String,
    pub get_value: String,
    pub set_value: String,
    pub raise_property_changed: String,
    pub type_query: String,
    pub equals: String,
    /// Appended to the property name to form the mapping field name
    pub mapping_field_suffix: String,
}

impl Default for RuntimeNames {
    fn default() -> Self {
        Self {
            module: "Semweave.Runtime".to_string(),
            core_module: "System.Runtime".to_string(),
            root_object: "System.Object".to_string(),
            mapping_type: "Semweave.Mapping.PropertyMapping`1".to_string(),
            identifier_type: "Semweave.Class".to_string(),
            get_value: "GetValue".to_string(),
            set_value: "SetValue".to_string(),
            raise_property_changed: "RaisePropertyChanged".to_string(),
            type_query: "GetTypes".to_string(),
            equals: "Equals".to_string(),
            mapping_field_suffix: "Mapping".to_string(),
        }
    }
}

impl WeaveConfig {
    /// Parse a configuration from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Classify an attribute by its full type name
    pub fn annotation_kind(&self, full_name: &str) -> Option<AnnotationKind> {
        let names = &self.annotations;
        if full_name == names.type_identifiers {
            Some(AnnotationKind::TypeIdentifiers)
        } else if full_name == names.persistent_identifier {
            Some(AnnotationKind::PersistentIdentifier)
        } else if full_name == names.change_notification {
            Some(AnnotationKind::ChangeNotification)
        } else {
            None
        }
    }

    /// Name of the mapping field injected for a property
    pub fn mapping_field_name(&self, property: &str) -> String {
        format!("{}{}", property, self.runtime.mapping_field_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WeaveConfig::default();
        assert!(config.verify);
        assert_eq!(config.runtime.get_value, "GetValue");
        assert_eq!(config.mapping_field_name("Age"), "AgeMapping");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = WeaveConfig::from_toml_str(
            r#"
            verify = false

            [annotations]
            persistent_identifier = "Acme.Model.PredicateAttribute"

            [runtime]
            module = "Acme.Runtime"
            mapping_field_suffix = "Map"
            "#,
        )
        .unwrap();

        assert!(!config.verify);
        assert_eq!(config.runtime.module, "Acme.Runtime");
        assert_eq!(config.runtime.set_value, "SetValue");
        assert_eq!(config.mapping_field_name("Age"), "AgeMap");
        assert_eq!(
            config.annotation_kind("Acme.Model.PredicateAttribute"),
            Some(AnnotationKind::PersistentIdentifier)
        );
        assert_eq!(
            config.annotation_kind("Semweave.Mapping.RdfClassAttribute"),
            Some(AnnotationKind::TypeIdentifiers)
        );
        assert_eq!(config.annotation_kind("System.ObsoleteAttribute"), None);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(WeaveConfig::from_toml_str("").unwrap(), WeaveConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = WeaveConfig::from_toml_str("verify = \"sometimes\"").unwrap_err();
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
