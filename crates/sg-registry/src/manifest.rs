// manifest.rs — Class declarations loaded from TOML.
//
// Lets a host module declare the classes it exposes, and exactly which of
// their members scripts may reach, in a file next to the module:
//
//   [[class]]
//   name = "HttpClient"
//
//   [[class.attribute]]
//   name = "get"
//   kind = "method"
//   requires = ["net:fetch"]
//   description = "HTTP GET"

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::registry::AttributeRegistry;
use crate::rule::AttributeRule;

/// One exposed class and its whitelisted members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default, rename = "attribute")]
    pub attributes: Vec<AttributeRule>,
}

/// A set of class declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassManifest {
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassDecl>,
}

impl ClassManifest {
    pub fn from_toml_str(content: &str) -> Result<Self, RegistryError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Register every declared class. Stops at the first class that is
    /// rejected; classes before it stay registered.
    pub fn apply(&self, registry: &mut AttributeRegistry) -> Result<usize, RegistryError> {
        let mut total = 0;
        for class in &self.classes {
            total += registry.register_custom_class(&class.name, class.attributes.iter().cloned())?;
        }
        Ok(total)
    }
}
