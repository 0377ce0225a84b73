//! Inbound package events

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};

/// A request to repackage one sealed package
///
/// `encrypted_reference` and `encrypted_key` are base64 RSA-OAEP
/// ciphertexts; `target` is the image name the result is tagged with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageEvent {
    pub encrypted_reference: String,
    pub encrypted_key: String,
    pub target: String,
}

impl PackageEvent {
    pub fn from_json(json: &str) -> Result<Self> {
        let event: Self = serde_json::from_str(json)?;
        event.validate()?;
        Ok(event)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("encryptedReference", &self.encrypted_reference),
            ("encryptedKey", &self.encrypted_key),
            ("target", &self.target),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::InvalidEvent {
                    message: format!("{} must not be empty", field),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let event = PackageEvent::from_json(
            r#"{"encryptedReference": "cmVm", "encryptedKey": "a2V5", "target": "local/app:1"}"#,
        )
        .unwrap();
        assert_eq!(event.encrypted_reference, "cmVm");
        assert_eq!(event.target, "local/app:1");
    }

    #[test]
    fn test_missing_field() {
        assert!(matches!(
            PackageEvent::from_json(r#"{"encryptedReference": "cmVm", "target": "x"}"#),
            Err(EngineError::Json(_))
        ));
    }

    #[test]
    fn test_empty_field() {
        assert!(matches!(
            PackageEvent::from_json(r#"{"encryptedReference": "", "encryptedKey": "a2V5", "target": "x"}"#),
            Err(EngineError::InvalidEvent { .. })
        ));
    }
}
