use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::domain::{DocumentBlocks, TransportProtocol};
use tracing::warn;

use crate::{
    connection::{ConnectionOptions, DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT},
    store::{default_initial_content, SessionState, DEFAULT_SERVER_ADDRESS},
};

pub const DEFAULT_CONFIG_FILE: &str = "gadget.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct GadgetSettings {
    pub server_address: String,
    pub transport_protocol: TransportProtocol,
    pub initial_content: DocumentBlocks,
    /// Dial the peer as soon as the gadget starts, before any CONFIGURE.
    pub connect_on_launch: bool,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for GadgetSettings {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.into(),
            transport_protocol: TransportProtocol::Socket,
            initial_content: default_initial_content(),
            connect_on_launch: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl GadgetSettings {
    pub fn session_state(&self) -> SessionState {
        SessionState {
            server_address: self.server_address.clone(),
            transport_protocol: self.transport_protocol,
            initial_content: self.initial_content.clone(),
            ..SessionState::default()
        }
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: self.connect_timeout,
            close_timeout: self.close_timeout,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    server_address: Option<String>,
    transport_protocol: Option<String>,
    connect_on_launch: Option<bool>,
    connect_timeout_ms: Option<u64>,
    close_timeout_ms: Option<u64>,
    initial_content_json: Option<String>,
}

/// Loads settings from `path` (or `gadget.toml` when present) and `GADGET_*` env vars.
pub fn load_settings(path: Option<&Path>) -> Result<GadgetSettings> {
    let raw = match path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?,
        ),
        None => match fs::read_to_string(PathBuf::from(DEFAULT_CONFIG_FILE)) {
            Ok(raw) => Some(raw),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {DEFAULT_CONFIG_FILE}"))
            }
        },
    };
    settings_from_sources(raw.as_deref(), |key| std::env::var(key).ok())
}

fn settings_from_sources(
    raw: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<GadgetSettings> {
    let mut settings = GadgetSettings::default();

    if let Some(raw) = raw {
        let file: SettingsFile = toml::from_str(raw).context("invalid gadget config")?;
        if let Some(v) = file.server_address {
            settings.server_address = v;
        }
        if let Some(v) = file.transport_protocol {
            settings.transport_protocol = TransportProtocol::parse(&v);
        }
        if let Some(v) = file.connect_on_launch {
            settings.connect_on_launch = v;
        }
        if let Some(v) = file.connect_timeout_ms {
            settings.connect_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.close_timeout_ms {
            settings.close_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.initial_content_json {
            match serde_json::from_str::<DocumentBlocks>(&v) {
                Ok(blocks) => settings.initial_content = blocks,
                Err(err) => warn!(error = %err, "config: ignoring invalid initial_content_json"),
            }
        }
    }

    if let Some(v) = env("GADGET_SERVER_ADDRESS") {
        settings.server_address = v;
    }
    if let Some(v) = env("GADGET_TRANSPORT_PROTOCOL") {
        settings.transport_protocol = TransportProtocol::parse(&v);
    }
    if let Some(v) = env("GADGET_CONNECT_ON_LAUNCH") {
        match v.parse::<bool>() {
            Ok(parsed) => settings.connect_on_launch = parsed,
            Err(_) => warn!(value = %v, "config: ignoring invalid GADGET_CONNECT_ON_LAUNCH"),
        }
    }
    if let Some(v) = env("GADGET_CONNECT_TIMEOUT_MS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.connect_timeout = Duration::from_millis(parsed),
            Err(_) => warn!(value = %v, "config: ignoring invalid GADGET_CONNECT_TIMEOUT_MS"),
        }
    }
    if let Some(v) = env("GADGET_CLOSE_TIMEOUT_MS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.close_timeout = Duration::from_millis(parsed),
            Err(_) => warn!(value = %v, "config: ignoring invalid GADGET_CLOSE_TIMEOUT_MS"),
        }
    }

    Ok(settings)
}
