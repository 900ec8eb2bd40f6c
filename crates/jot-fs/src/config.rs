use crate::workspace::WorkspacePaths;
use jot_core::{JotError, JotResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub version: u32,
    pub active_profile: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub server: String,
}

/// Presentation defaults for list commands; the cache itself never sorts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub name: String,
    pub active: bool,
    pub server: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedProfile {
    pub name: String,
    pub server: String,
}

impl WorkspaceConfig {
    pub fn with_default_server(server: impl Into<String>) -> Self {
        let server: String = server.into();
        let mut config = Self {
            version: CONFIG_VERSION,
            active_profile: DEFAULT_PROFILE.to_string(),
            profiles: BTreeMap::new(),
            display: DisplayConfig::default(),
        };
        set_profile_server(&mut config, DEFAULT_PROFILE, &server);
        config
    }

    pub fn ensure_defaults(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }

        if self.profiles.is_empty() {
            set_profile_server(self, DEFAULT_PROFILE, DEFAULT_SERVER_URL);
        }

        if !self.profiles.contains_key(&self.active_profile) {
            // A stale active profile falls back to the first configured one.
            self.active_profile = self
                .profiles
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        }
    }
}

pub fn load_config(paths: &WorkspacePaths) -> JotResult<WorkspaceConfig> {
    let contents = fs::read_to_string(&paths.config_path).map_err(|err| {
        JotError::io(format!(
            "failed to read workspace config '{}': {}",
            paths.config_path.display(),
            err
        ))
    })?;

    let mut config: WorkspaceConfig = toml::from_str(&contents).map_err(|err| {
        JotError::io(format!(
            "failed to parse workspace config '{}': {}",
            paths.config_path.display(),
            err
        ))
    })?;
    config.ensure_defaults();
    Ok(config)
}

pub fn save_config(paths: &WorkspacePaths, config: &WorkspaceConfig) -> JotResult<()> {
    let serialized = toml::to_string_pretty(config)
        .map_err(|err| JotError::io(format!("failed to encode config.toml: {err}")))?;

    fs::write(&paths.config_path, serialized).map_err(|err| {
        JotError::io(format!(
            "failed to write workspace config '{}': {}",
            paths.config_path.display(),
            err
        ))
    })
}

pub fn list_profiles(config: &WorkspaceConfig) -> Vec<ProfileView> {
    config
        .profiles
        .iter()
        .map(|(name, profile)| ProfileView {
            name: name.clone(),
            active: name == &config.active_profile,
            server: profile.server.clone(),
        })
        .collect()
}

pub fn set_active_profile(config: &mut WorkspaceConfig, name: &str) -> JotResult<()> {
    if !config.profiles.contains_key(name) {
        return Err(JotError::usage(format!(
            "profile '{name}' not found in workspace config"
        )));
    }

    config.active_profile = name.to_string();
    Ok(())
}

pub fn set_profile_server(config: &mut WorkspaceConfig, name: &str, server: &str) {
    config.profiles.insert(
        name.to_string(),
        ProfileConfig {
            server: server.trim_end_matches('/').to_string(),
        },
    );

    if config.active_profile.is_empty() {
        config.active_profile = name.to_string();
    }
}

pub fn resolve_profile(
    config: &WorkspaceConfig,
    profile_override: Option<&str>,
    server_override: Option<&str>,
) -> JotResult<ResolvedProfile> {
    let name = profile_override.unwrap_or(&config.active_profile);
    let profile = config.profiles.get(name).ok_or_else(|| {
        JotError::usage(format!("profile '{name}' not found in workspace config"))
    })?;

    let server = server_override.unwrap_or(profile.server.as_str()).trim();
    if server.is_empty() {
        return Err(JotError::usage(format!(
            "profile '{name}' has no server URL; run `jot profile set --server <url>`"
        )));
    }

    Ok(ResolvedProfile {
        name: name.to_string(),
        server: server.to_string(),
    })
}
