use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::google::auth::{CredentialSource, ServiceAccountKey};
use crate::report::{ExtractOptions, HeaderMode};

pub const DEFAULT_CONFIG_PATH: &str = "report_loader.toml";
const ENV_PREFIX: &str = "REPORT";

/// Everything the pipeline needs, assembled once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Spreadsheet URL or bare id.
    pub spreadsheet: Option<String>,
    pub sheet_name: String,
    /// Tab rendered to PDF; the report template, not the data sheet.
    pub export_gid: i64,
    pub drive_folder_id: Option<String>,
    pub output_dir: PathBuf,
    pub encoding: String,
    pub header_mode: HeaderMode,
    pub bind: String,
    pub credentials: CredentialSettings,
    pub service_account: Option<ServiceAccountKey>,
    pub endpoints: Endpoints,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            spreadsheet: None,
            sheet_name: "Вставка".to_string(),
            export_gid: 0,
            drive_folder_id: None,
            output_dir: PathBuf::from("."),
            encoding: "windows-1251".to_string(),
            header_mode: HeaderMode::Global,
            bind: "127.0.0.1:8501".to_string(),
            credentials: CredentialSettings::default(),
            service_account: None,
            endpoints: Endpoints::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub source: CredentialSource,
    /// Variable holding the key JSON for the `inline` source.
    pub env_var: String,
    /// Key file (`key_file`) or secrets file (`secret_store`).
    pub path: Option<PathBuf>,
    /// Table of the secrets file holding the key.
    pub table: String,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        CredentialSettings {
            source: CredentialSource::Inline,
            env_var: "SERVICE_ACCOUNT_JSON".to_string(),
            path: None,
            table: "gcp_service_account".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub sheets: String,
    pub docs: String,
    pub drive_upload: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            sheets: "https://sheets.googleapis.com/v4".to_string(),
            docs: "https://docs.google.com".to_string(),
            drive_upload: "https://www.googleapis.com/upload/drive/v3".to_string(),
        }
    }
}

impl Settings {
    /// Optional TOML file, then `REPORT_*` variables (`__` separates nested keys).
    pub fn load(path: &Path) -> Result<Settings> {
        let builder = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );
        Self::finish(builder.build())
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }

    #[cfg(test)]
    pub fn from_toml_str(toml: &str) -> Result<Settings> {
        let built = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build();
        Self::finish(built)
    }

    fn finish(built: std::result::Result<Config, config::ConfigError>) -> Result<Settings> {
        let settings: Settings = built?.try_deserialize()?;
        settings.extract_options()?;
        Ok(settings)
    }

    pub fn extract_options(&self) -> Result<ExtractOptions> {
        let encoding = encoding_rs::Encoding::for_label(self.encoding.as_bytes())
            .with_context(|| format!("Unknown encoding {:?}", self.encoding))?;
        Ok(ExtractOptions {
            encoding,
            header_mode: self.header_mode,
        })
    }

    pub fn spreadsheet_id(&self) -> Option<String> {
        self.spreadsheet.as_deref().and_then(spreadsheet_id)
    }
}

/// Id out of a spreadsheet URL; anything that is not a URL is taken as the id.
pub fn spreadsheet_id(input: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").unwrap());
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match re.captures(input) {
        Some(c) => Some(c[1].to_string()),
        None if !input.contains('/') => Some(input.to_string()),
        None => None,
    }
}
