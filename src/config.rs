use crate::{
    channel::{
        authority::{Authority, RolePolicy},
        types::Role,
        ExecutionChannel, LocalChannel, RemoteChannel,
    },
    engine::CopyOptions,
};
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub root: Root,
    #[serde(default)]
    pub copy: CopyData,
    #[serde(default)]
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub channel: Channel,
    pub agent: Option<Agent>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Root {
    pub allowed_root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CopyData {
    #[serde(default)]
    pub folder_path: String,
    #[serde(default)]
    pub make_files_executable: bool,
    #[serde(default)]
    pub delete_files_after_build: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}
fn default_delimiter() -> String { ",".to_string() }

impl Default for CopyData {
    fn default() -> Self {
        Self {
            folder_path: String::new(),
            make_files_executable: false,
            delete_files_after_build: false,
            delimiter: default_delimiter(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthorityConfig {
    #[serde(default = "default_roles")]
    pub allowed_roles: Vec<Role>,
}
fn default_roles() -> Vec<Role> { vec![Role::Any, Role::ReadData] }

impl Default for AuthorityConfig {
    fn default() -> Self { Self { allowed_roles: default_roles() } }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    #[default]
    Local,
    Remote,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct Channel {
    #[serde(default)]
    pub mode: ChannelMode,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_timeout", rename = "timeout_s")]
    pub timeout: Duration,
}
fn default_origin() -> String { "confined-copy".to_string() }
fn default_timeout() -> Duration { Duration::from_secs(30) }

impl Default for Channel {
    fn default() -> Self {
        Self {
            mode: ChannelMode::Local,
            url: String::new(),
            bearer_token: String::new(),
            origin: default_origin(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Agent {
    pub bind_addr: String,
    pub port: u16,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    pub bearer_token: String,
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_request_kb")]
    pub max_request_kb: usize,
    #[serde(default = "default_rate")]
    pub rate_per_token: u32,
    #[serde(default = "default_burst")]
    pub burst_per_token: u32,
    #[serde(default = "default_global_rate")]
    pub rate_global: u32,
    #[serde(default = "default_global_burst")]
    pub burst_global: u32,
}
fn default_base_path() -> String { "/agent".to_string() }
fn default_max_request_kb() -> usize { 64 }
fn default_rate() -> u32 { 200 }
fn default_burst() -> u32 { 400 }
fn default_global_rate() -> u32 { 1000 }
fn default_global_burst() -> u32 { 2000 }

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.root.allowed_root.is_absolute() {
            anyhow::bail!("allowed_root must be absolute: {}", self.root.allowed_root.display());
        }
        if self.copy.delimiter.is_empty() { anyhow::bail!("delimiter must not be empty"); }
        if self.channel.mode == ChannelMode::Remote {
            if self.channel.url.trim().is_empty() { anyhow::bail!("channel.url is required in remote mode"); }
            if self.channel.bearer_token.trim().is_empty() { anyhow::bail!("channel.bearer_token is required in remote mode"); }
            if self.channel.timeout.is_zero() { anyhow::bail!("channel.timeout_s must be > 0"); }
        }
        if let Some(agent) = &self.agent {
            if agent.bearer_token.trim().is_empty() { anyhow::bail!("agent.bearer_token must not be empty"); }
            if agent.allowed_origins.is_empty() { anyhow::bail!("agent.allowed_origins must not be empty"); }
            if agent.max_request_kb == 0 { anyhow::bail!("agent.max_request_kb must be > 0"); }
        }
        Ok(())
    }

    pub fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            make_files_executable: self.copy.make_files_executable,
            delete_files_after_build: self.copy.delete_files_after_build,
            delimiter: self.copy.delimiter.clone(),
        }
    }

    pub fn authority(&self) -> Arc<dyn Authority> {
        Arc::new(RolePolicy::new(self.authority.allowed_roles.iter().copied()))
    }

    /// Channel to the node hosting the allowed root.
    pub fn build_channel(&self) -> anyhow::Result<Arc<dyn ExecutionChannel>> {
        Ok(match self.channel.mode {
            ChannelMode::Local => Arc::new(LocalChannel::new(Some(self.authority()))),
            ChannelMode::Remote => Arc::new(RemoteChannel::new(
                &self.channel.url,
                &self.channel.bearer_token,
                &self.channel.origin,
                self.channel.timeout,
            )?),
        })
    }
}
