//! Declaration files.
//!
//! A declaration file lists the resource names to register, in id order, and
//! the systems to schedule:
//!
//! ```json
//! {
//!   "resources": ["Position", "Velocity"],
//!   "systems": [
//!     { "name": "Gravity", "parameters": [{ "resource": "Velocity", "access": "write" }] },
//!     { "name": "Move",
//!       "parameters": [
//!         { "resource": "Position", "access": "write" },
//!         { "resource": "Velocity", "access": "read" }
//!       ],
//!       "after": ["Gravity"] }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use wave_component::ComponentRegistry;

use crate::declaration::SystemDeclaration;
use crate::error::ConfigError;

/// Resources and systems loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationFile {
    /// Resource names, registered in this order.
    #[serde(default)]
    pub resources: Vec<String>,
    /// System declarations.
    #[serde(default)]
    pub systems: Vec<SystemDeclaration>,
}

impl DeclarationFile {
    /// Parse a declaration file from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if `json` is not a valid declaration file.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read and parse a declaration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = Self::from_json(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            resources = file.resources.len(),
            systems = file.systems.len(),
            "loaded declaration file"
        );
        Ok(file)
    }

    /// Register every listed resource into a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Registry`] for an empty resource name.
    pub fn component_registry(&self) -> Result<ComponentRegistry, ConfigError> {
        Ok(ComponentRegistry::from_names(self.resources.iter().cloned())?)
    }
}
