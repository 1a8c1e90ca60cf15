use std::{fmt, panic::Location};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form ownership tag: a generated id plus a human label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerTag {
    pub id: Uuid,
    pub label: String,
}

impl OwnerTag {
    /// New tag with a fresh id. An empty label is replaced by the caller's source location.
    #[track_caller]
    pub fn new(label: impl Into<String>) -> Self {
        let mut label = label.into();
        if label.trim().is_empty() {
            let caller = Location::caller();
            label = format!("{}:{}", caller.file(), caller.line());
        }
        Self {
            id: Uuid::new_v4(),
            label,
        }
    }
}

impl fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

/// The (service, name) pair a secret belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretIdentity {
    pub service: OwnerTag,
    pub name: OwnerTag,
}

impl SecretIdentity {
    #[track_caller]
    pub fn new(service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service: OwnerTag::new(service),
            name: OwnerTag::new(name),
        }
    }

    /// `{service}_{name}.secret`, with path separators and control characters replaced.
    ///
    /// Depends on the labels only, so every instance built for the same pair
    /// maps to the same file.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.secret",
            sanitize_label(&self.service.label),
            sanitize_label(&self.name.label)
        )
    }
}

impl fmt::Display for SecretIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service.label, self.name.label)
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
