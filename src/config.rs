use crate::error::CuratorError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use toml_edit::{value, DocumentMut};

pub const DEFAULT_PROFILE: &str = "Default";

fn default_worker_count() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_profiles() -> Vec<PlatformProfile> {
    vec![PlatformProfile::new(DEFAULT_PROFILE)]
}

/// A named target configuration. Its hash participates in every asset hash, so switching the
/// active profile invalidates all transform outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub name: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub settings: BTreeMap<String, toml::Value>,
}

impl PlatformProfile {
    pub fn new<S: Into<String>>(name: S) -> Self {
        PlatformProfile {
            name: name.into(),
            target: String::new(),
            settings: BTreeMap::new(),
        }
    }

    pub fn profile_hash(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.target.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(&self.settings).unwrap_or_default());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        PlatformProfile::new(DEFAULT_PROFILE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratorConfig {
    /// Root folders that are scanned for assets. Each receives its own `AssetCache/` folder.
    pub data_dirs: Vec<PathBuf>,
    /// Number of background update workers. `0` disables the scheduler; state is then only
    /// computed on demand.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Whether background workers run the handler for assets found out of date.
    #[serde(default = "default_true")]
    pub auto_transform: bool,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default = "default_profiles")]
    pub profiles: Vec<PlatformProfile>,
}

impl CuratorConfig {
    pub fn new<P: AsRef<Path>>(data_dirs: &[P]) -> Self {
        CuratorConfig {
            data_dirs: data_dirs.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            worker_count: default_worker_count(),
            auto_transform: true,
            cache_enabled: true,
            active_profile: None,
            profiles: default_profiles(),
        }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_auto_transform(mut self, auto_transform: bool) -> Self {
        self.auto_transform = auto_transform;
        self
    }

    pub fn with_cache(mut self, cache_enabled: bool) -> Self {
        self.cache_enabled = cache_enabled;
        self
    }

    pub fn with_profile(mut self, profile: PlatformProfile) -> Self {
        self.profiles.retain(|p| p.name != profile.name);
        self.profiles.push(profile);
        self
    }

    pub fn validate(&self) -> Result<(), CuratorError> {
        if self.data_dirs.is_empty() {
            return Err(CuratorError::Config(
                "at least one data directory is required".to_string(),
            ));
        }
        if self.profiles.is_empty() {
            return Err(CuratorError::Config(
                "at least one platform profile is required".to_string(),
            ));
        }
        if let Some(active) = &self.active_profile {
            if !self.profiles.iter().any(|p| &p.name == active) {
                return Err(CuratorError::Config(format!(
                    "active profile '{active}' is not among the configured profiles"
                )));
            }
        }
        Ok(())
    }

    /// Index of the configured active profile, falling back to the first one.
    pub fn active_profile_index(&self) -> usize {
        self.active_profile
            .as_ref()
            .and_then(|name| self.profiles.iter().position(|p| &p.name == name))
            .unwrap_or(0)
    }
}

/// Reads and writes a [`CuratorConfig`] stored as a TOML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CuratorConfig, CuratorError> {
        tracing::debug!("Attempting to read curator config from: {:?}", &self.path);
        if !self.path.exists() {
            return Err(CuratorError::NotFound(format!(
                "curator config not found at {:?}",
                self.path
            )));
        }
        let content = read_to_string(&self.path)?;
        let mut config: CuratorConfig = toml::from_str(&content)?;
        // Relative data dirs are relative to the config file.
        if let Some(base) = self.path.parent() {
            for dir in config.data_dirs.iter_mut() {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &CuratorConfig) -> Result<(), CuratorError> {
        tracing::debug!("Attempting to write curator config to: {:?}", &self.path);
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }

    /// Updates only the `active_profile` key, leaving comments and layout of the file intact.
    pub fn set_active_profile(&self, name: &str) -> Result<(), CuratorError> {
        let content = if self.path.exists() {
            read_to_string(&self.path)?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;
        doc["active_profile"] = value(name);
        write(&self.path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_fill_missing_keys() {
        let config: CuratorConfig = toml::from_str(r#"data_dirs = ["/data"]"#).unwrap();
        assert_eq!(config.worker_count, 4);
        assert!(config.auto_transform);
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].name, DEFAULT_PROFILE);
        assert_eq!(config.active_profile_index(), 0);
    }

    #[test]
    fn provider_keeps_comments_when_switching_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("curator.toml");
        std::fs::write(
            &path,
            r#"# project assets
data_dirs = ["assets"]

[[profiles]]
name = "PC"

[[profiles]]
name = "Mobile"
target = "android"
"#,
        )
        .unwrap();

        let provider = TomlConfigProvider::new(path.clone());
        let config = provider.load().unwrap();
        assert_eq!(config.data_dirs[0], dir.path().join("assets"));
        assert_eq!(config.active_profile_index(), 0);

        provider.set_active_profile("Mobile").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# project assets"));
        assert_eq!(provider.load().unwrap().active_profile_index(), 1);
    }

    #[test]
    fn unknown_active_profile_is_rejected() {
        let mut config = CuratorConfig::new(&["/data"]);
        config.active_profile = Some("Console".to_string());
        assert!(matches!(config.validate(), Err(CuratorError::Config(_))));
    }

    #[test]
    fn profile_hash_tracks_settings() {
        let a = PlatformProfile::new("PC");
        let mut b = PlatformProfile::new("PC");
        assert_eq!(a.profile_hash(), b.profile_hash());
        b.settings
            .insert("compression".to_string(), toml::Value::Boolean(true));
        assert_ne!(a.profile_hash(), b.profile_hash());
    }
}
