use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Database connection parameters for the deployed application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseEnv {
    pub name: String,
    pub user: String,
}

impl Default for DatabaseEnv {
    fn default() -> Self {
        Self {
            name: "reef".to_string(),
            user: "reef".to_string(),
        }
    }
}

/// Deployment parameters for one target environment.
///
/// Replaces the ambient process-wide registry with an explicit value passed
/// into each operation. Fields that only some operations need are optional;
/// the `require_*` accessors validate them at the call site that first needs
/// them and surface a typed missing-key error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployEnv {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    pub service_name: Option<String>,
    /// Project checkout directory on the remote host.
    pub directory: Option<String>,
    pub virtualenv_dir_name: String,
    pub web_user: Option<String>,
    pub django_settings: Option<String>,
    pub sass_env: Option<String>,
    /// Languages to warm after a restart.
    pub languages: Vec<String>,
    /// Role name to host list, e.g. "backup" -> ["backup1.example.com"].
    pub roledefs: HashMap<String, Vec<String>>,
    pub database: DatabaseEnv,
}

impl Default for DeployEnv {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            port: 22,
            identity_file: None,
            service_name: None,
            directory: None,
            virtualenv_dir_name: "env".to_string(),
            web_user: None,
            django_settings: None,
            sass_env: None,
            languages: vec!["en".to_string(), "nl".to_string()],
            roledefs: HashMap::new(),
            database: DatabaseEnv::default(),
        }
    }
}

impl DeployEnv {
    /// Load an environment definition from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::invalid_config(path.to_string_lossy(), e.to_string()))
    }

    /// Default location: `~/.config/reef-deploy/<env>.json`.
    pub fn config_path(name: &str) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("reef-deploy").join(format!("{}.json", name)))
    }

    pub fn require_host(&self) -> Result<&str> {
        require(&self.host, "host")
    }

    pub fn require_service_name(&self) -> Result<&str> {
        require_opt(&self.service_name, "service_name")
    }

    pub fn require_directory(&self) -> Result<&str> {
        require_opt(&self.directory, "directory")
    }

    pub fn require_web_user(&self) -> Result<&str> {
        require_opt(&self.web_user, "web_user")
    }

    pub fn require_django_settings(&self) -> Result<&str> {
        require_opt(&self.django_settings, "django_settings")
    }

    pub fn require_sass_env(&self) -> Result<&str> {
        require_opt(&self.sass_env, "sass_env")
    }

    /// First host configured for a role.
    pub fn require_role(&self, role: &str) -> Result<&str> {
        self.roledefs
            .get(role)
            .and_then(|hosts| hosts.first())
            .map(|h| h.as_str())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::missing_config(format!("roledefs.{}", role)))
    }

    /// Environment-dependent Django settings module, derived from the first
    /// label of the target host ("staging.example.com" -> server_staging).
    pub fn derive_django_settings(&self) -> Result<String> {
        let host = self.require_host()?;
        let environment = host.split('.').next().unwrap_or(host);
        Ok(format!("reef.settings.server_{}", environment))
    }
}

fn require<'a>(value: &'a str, key: &str) -> Result<&'a str> {
    if value.is_empty() {
        Err(Error::missing_config(key))
    } else {
        Ok(value)
    }
}

fn require_opt<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::missing_config(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn staging_env() -> DeployEnv {
        DeployEnv {
            host: "staging.onepercentclub.com".to_string(),
            user: "deploy".to_string(),
            service_name: Some("reef".to_string()),
            directory: Some("/var/www/reef".to_string()),
            web_user: Some("onepercent".to_string()),
            ..DeployEnv::default()
        }
    }

    #[test]
    fn load_parses_camel_case_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "host": "production.onepercentclub.com",
                "user": "deploy",
                "serviceName": "reef",
                "webUser": "onepercent",
                "roledefs": {{"backup": ["backup1.example.com"]}}
            }}"#
        )
        .unwrap();

        let env = DeployEnv::load(file.path()).unwrap();
        assert_eq!(env.host, "production.onepercentclub.com");
        assert_eq!(env.port, 22);
        assert_eq!(env.service_name.as_deref(), Some("reef"));
        assert_eq!(env.virtualenv_dir_name, "env");
        assert_eq!(env.require_role("backup").unwrap(), "backup1.example.com");
    }

    #[test]
    fn load_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = DeployEnv::load(file.path()).unwrap_err();
        assert_eq!(err.code(), "config.invalid_value");
    }

    #[test]
    fn require_surfaces_missing_key() {
        let env = DeployEnv::default();
        let err = env.require_service_name().unwrap_err();
        assert_eq!(err.code(), "config.missing_key");
        assert!(err.to_string().contains("service_name"));
    }

    #[test]
    fn require_role_missing_is_fatal() {
        let env = staging_env();
        let err = env.require_role("backup").unwrap_err();
        assert!(err.to_string().contains("roledefs.backup"));
    }

    #[test]
    fn derive_django_settings_uses_host_prefix() {
        let env = staging_env();
        assert_eq!(
            env.derive_django_settings().unwrap(),
            "reef.settings.server_staging"
        );
    }
}
