//! Registry connection settings
//!
//! Embedded in the pipeline configuration file under `registry:`.

use oci_distribution::client::ClientProtocol;
use oci_distribution::secrets::RegistryAuth;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, Result};

/// Transport used to reach the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Https,
    /// Plain HTTP, for local registries
    Http,
}

impl From<Protocol> for ClientProtocol {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Https => ClientProtocol::Https,
            Protocol::Http => ClientProtocol::Http,
        }
    }
}

/// Credential types supported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    /// Basic authentication (username/password)
    Basic { username: String, password: String },

    /// Environment variable references (CI/CD friendly)
    #[serde(rename_all = "camelCase")]
    Env {
        username_var: String,
        password_var: String,
    },
}

impl Credentials {
    /// Create basic auth credentials
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Create environment variable credentials
    pub fn from_env(username_var: impl Into<String>, password_var: impl Into<String>) -> Self {
        Credentials::Env {
            username_var: username_var.into(),
            password_var: password_var.into(),
        }
    }

    /// Resolve to registry authentication
    pub fn resolve(&self) -> Result<RegistryAuth> {
        match self {
            Credentials::Basic { username, password } => {
                Ok(RegistryAuth::Basic(username.clone(), password.clone()))
            }
            Credentials::Env {
                username_var,
                password_var,
            } => {
                let username = std::env::var(username_var).map_err(|_| RepoError::AuthFailed {
                    message: format!("Environment variable {} not set", username_var),
                })?;
                let password = std::env::var(password_var).map_err(|_| RepoError::AuthFailed {
                    message: format!("Environment variable {} not set", password_var),
                })?;
                Ok(RegistryAuth::Basic(username, password))
            }
        }
    }
}

/// How to reach the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    #[serde(default)]
    pub protocol: Protocol,

    /// Anonymous access when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl RegistryConfig {
    /// Authentication to present to the registry
    pub fn auth(&self) -> Result<RegistryAuth> {
        match &self.credentials {
            Some(credentials) => credentials.resolve(),
            None => Ok(RegistryAuth::Anonymous),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_anonymous_https() {
        let config = RegistryConfig::default();
        assert_eq!(config.protocol, Protocol::Https);
        assert!(matches!(config.auth().unwrap(), RegistryAuth::Anonymous));
    }

    #[test]
    fn test_parse_env_credentials() {
        let yaml = r#"
protocol: http
credentials:
  type: env
  usernameVar: REG_USER
  passwordVar: REG_PASS
"#;
        let config: RegistryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(
            config.credentials,
            Some(Credentials::from_env("REG_USER", "REG_PASS"))
        );
    }

    #[test]
    fn test_missing_env_var_fails() {
        let creds = Credentials::from_env(
            "SEALPACK_TEST_SURELY_UNSET_USER",
            "SEALPACK_TEST_SURELY_UNSET_PASS",
        );
        assert!(matches!(creds.resolve(), Err(RepoError::AuthFailed { .. })));
    }

    #[test]
    fn test_basic_credentials() {
        let creds = Credentials::basic("user", "pass");
        match creds.resolve().unwrap() {
            RegistryAuth::Basic(user, pass) => {
                assert_eq!(user, "user");
                assert_eq!(pass, "pass");
            }
            _ => panic!("expected basic auth"),
        }
    }
}
