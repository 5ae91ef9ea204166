use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extractors::{CookieProfile, MediaKind};
use crate::policy::Limits;
use crate::relay::RelaySettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Job execution settings
    pub relay: RelayConfig,

    /// Duration/size ceilings
    pub limits: Limits,

    /// Which requests get the limits checked
    pub policy: PolicyConfig,

    /// Names written into tags and captions
    pub branding: BrandingConfig,

    /// Netscape cookie file contents per profile
    pub cookies: CookiesConfig,

    /// External tools
    pub extractor: ExtractorConfig,

    /// Chat connection
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Directory for per-job temporary files (system temp dir if not set)
    pub work_dir: Option<PathBuf>,

    /// Upper bound for a metadata probe
    pub probe_timeout_secs: u64,

    /// Minimum time between progress message edits
    pub progress_interval_secs: u64,

    /// Size of the pool for blocking work (tagging, media inspection)
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub profiles: Vec<CookieProfile>,
    pub media_kinds: Vec<MediaKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandingConfig {
    pub author: String,
    pub comment: String,
    pub footer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CookiesConfig {
    pub youtube: Option<String>,
    pub instagram: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub yt_dlp_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Where the local transport delivers files (`./outbox` if not set)
    pub outbox_dir: Option<PathBuf>,
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub bot_token: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            probe_timeout_secs: 15,
            progress_interval_secs: 3,
            workers: 4,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            profiles: vec![CookieProfile::Youtube],
            media_kinds: vec![MediaKind::Video],
        }
    }
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            author: "Media Relay".to_string(),
            comment: "Processed by Media Relay".to_string(),
            footer: "Powered By Media Relay".to_string(),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
        }
    }
}

impl PolicyConfig {
    /// Whether a request for `kind` from a `profile` source gets the limits checked
    pub fn applies_to(&self, profile: CookieProfile, kind: MediaKind) -> bool {
        self.profiles.contains(&profile) && self.media_kinds.contains(&kind)
    }
}

impl CookiesConfig {
    pub fn get(&self, profile: CookieProfile) -> Option<&str> {
        match profile {
            CookieProfile::None => None,
            CookieProfile::Youtube => self.youtube.as_deref(),
            CookieProfile::Instagram => self.instagram.as_deref(),
        }
    }

    fn slot(&mut self, profile: CookieProfile) -> Option<&mut Option<String>> {
        match profile {
            CookieProfile::None => None,
            CookieProfile::Youtube => Some(&mut self.youtube),
            CookieProfile::Instagram => Some(&mut self.instagram),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or the default location, creating it if missing.
    /// Secrets from the environment override the file.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str::<Config>(&content)
                .context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.save_to(&config_path).await?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            config
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("media-relay").join("config.yaml"))
    }

    /// Take secrets from `lookup` (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for profile in [CookieProfile::Youtube, CookieProfile::Instagram] {
            let value = profile
                .env_var()
                .and_then(&lookup)
                .filter(|v| !v.trim().is_empty());
            if let (Some(value), Some(slot)) = (value, self.cookies.slot(profile)) {
                *slot = Some(value);
            }
        }

        if let Some(token) = lookup("RELAY_BOT_TOKEN") {
            self.transport.bot_token = Some(token);
        }
        if let Some(api_id) = lookup("RELAY_API_ID") {
            self.transport.api_id = Some(api_id);
        }
        if let Some(api_hash) = lookup("RELAY_API_HASH") {
            self.transport.api_hash = Some(api_hash);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.relay.workers == 0 {
            anyhow::bail!("relay.workers must be at least 1");
        }
        if self.relay.probe_timeout_secs == 0 {
            anyhow::bail!("relay.probe_timeout_secs must be at least 1");
        }
        if self.relay.progress_interval_secs == 0 {
            anyhow::bail!("relay.progress_interval_secs must be at least 1");
        }
        if self.limits.max_duration_seconds == 0 || self.limits.max_size_bytes == 0 {
            anyhow::bail!("limits must be greater than zero");
        }
        if self.extractor.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("extractor.yt_dlp_path must not be empty");
        }

        Ok(())
    }

    pub fn work_dir(&self) -> PathBuf {
        self.relay
            .work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("media-relay"))
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.transport
            .outbox_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("outbox"))
    }

    /// Orchestrator settings derived from this configuration
    pub fn relay_settings(&self) -> RelaySettings {
        let mut cookies = HashMap::new();
        for profile in [CookieProfile::Youtube, CookieProfile::Instagram] {
            if let Some(secret) = self.cookies.get(profile) {
                cookies.insert(profile, secret.to_string());
            }
        }

        RelaySettings {
            work_dir: self.work_dir(),
            limits: self.limits,
            probe_timeout: Duration::from_secs(self.relay.probe_timeout_secs),
            progress_interval: Duration::from_secs(self.relay.progress_interval_secs),
            author: self.branding.author.clone(),
            comment: self.branding.comment.clone(),
            footer: self.branding.footer.clone(),
            cookies,
        }
    }

    /// Display current configuration with secrets masked
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Work Dir: {}", self.work_dir().display());
        println!("  Outbox Dir: {}", self.outbox_dir().display());
        println!("  Workers: {}", self.relay.workers);
        println!("  Probe Timeout: {}s", self.relay.probe_timeout_secs);
        println!(
            "  Max Duration: {}",
            crate::utils::format_duration(self.limits.max_duration_seconds as f64)
        );
        println!("  Max Size: {}", crate::utils::format_file_size(self.limits.max_size_bytes));
        println!(
            "  Policy: {:?} x {:?}",
            self.policy.profiles, self.policy.media_kinds
        );
        println!("  yt-dlp: {}", self.extractor.yt_dlp_path);
        println!("  YouTube Cookies: {}", mask(self.cookies.youtube.as_deref()));
        println!("  Instagram Cookies: {}", mask(self.cookies.instagram.as_deref()));
        println!("  Bot Token: {}", mask(self.transport.bot_token.as_deref()));
    }
}

fn mask(secret: Option<&str>) -> &'static str {
    match secret {
        Some(s) if !s.trim().is_empty() => "set (hidden)",
        _ => "not set",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.policy.applies_to(CookieProfile::Youtube, MediaKind::Video));
        assert!(!config.policy.applies_to(CookieProfile::Youtube, MediaKind::Audio));
        assert!(!config.policy.applies_to(CookieProfile::Instagram, MediaKind::Video));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "relay:\n  workers: 2\npolicy:\n  profiles: [youtube, instagram]\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.relay.workers, 2);
        assert_eq!(config.relay.probe_timeout_secs, 15);
        assert_eq!(config.limits.max_duration_seconds, 10800);
        assert!(config.policy.applies_to(CookieProfile::Instagram, MediaKind::Video));
    }

    #[test]
    fn test_env_overrides_secrets() {
        let mut config = Config::default();
        config.cookies.instagram = Some("from file".into());

        config.apply_overrides(|key| match key {
            "YT_COOKIES" => Some("yt secret".to_string()),
            "INSTA_COOKIES" => Some("   ".to_string()),
            "RELAY_BOT_TOKEN" => Some("123:abc".to_string()),
            _ => None,
        });

        assert_eq!(config.cookies.youtube.as_deref(), Some("yt secret"));
        assert_eq!(config.cookies.instagram.as_deref(), Some("from file"));
        assert_eq!(config.transport.bot_token.as_deref(), Some("123:abc"));

        let settings = config.relay_settings();
        assert_eq!(settings.cookies.get(&CookieProfile::Youtube).map(String::as_str), Some("yt secret"));
        assert!(!settings.cookies.contains_key(&CookieProfile::None));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = Config::default();
        config.relay.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.limits.max_size_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = Config::load(Some(&path)).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.relay.workers, 4);

        let reloaded = Config::load(Some(&path)).await.unwrap();
        assert_eq!(reloaded.branding.footer, config.branding.footer);
    }
}
