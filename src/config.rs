// Surface configuration
//
// Loaded from a JSON file:
//
//   {
//     "extra_protected": { "query": ["csrf_token"], "header": ["X-Request-Id"] },
//     "kinds": ["query", "body"]
//   }
//
// Every field is optional. Kind names are validated when the policy or
// component list is built, not at deserialization.

use crate::component::{Component, ComponentKind};
use crate::error::ConfigError;
use crate::protected::ProtectedKeys;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Keys protected on top of the default tables, by component kind name
    pub extra_protected: HashMap<String, Vec<String>>,
    /// Component kinds to enumerate; all of them when absent
    pub kinds: Option<Vec<String>>,
}

impl SurfaceConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Protected-key policy: the default tables plus `extra_protected`
    pub fn protected_keys(&self) -> Result<ProtectedKeys, ConfigError> {
        let mut policy = ProtectedKeys::new();
        for (kind, keys) in &self.extra_protected {
            let kind: ComponentKind = kind.parse()?;
            policy = policy.with_extra(kind, keys.iter().cloned());
        }
        Ok(policy)
    }

    /// Selected component kinds, in canonical order and without repeats
    pub fn component_kinds(&self) -> Result<Vec<ComponentKind>, ConfigError> {
        let Some(names) = &self.kinds else {
            return Ok(ComponentKind::all().to_vec());
        };
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            selected.push(name.parse::<ComponentKind>()?);
        }
        Ok(ComponentKind::all()
            .iter()
            .copied()
            .filter(|kind| selected.contains(kind))
            .collect())
    }

    /// Unparsed components for the selected kinds, sharing one policy
    pub fn components(&self) -> Result<Vec<Component>, ConfigError> {
        let policy = Arc::new(self.protected_keys()?);
        Ok(self
            .component_kinds()?
            .into_iter()
            .map(|kind| Component::new(kind, Arc::clone(&policy)))
            .collect())
    }
}
