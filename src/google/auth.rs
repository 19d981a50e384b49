use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GoogleError;
use crate::settings::{CredentialSettings, Settings};

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/spreadsheets",
];

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const REFRESH_MARGIN_SECS: i64 = 60;

/// Where the service-account key comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Key JSON in an environment variable.
    #[default]
    Inline,
    /// Key JSON file on disk.
    KeyFile,
    /// Table inside a TOML secrets file.
    SecretStore,
    /// `[service_account]` table of the main settings.
    Config,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialSource::Inline => "inline secret",
            CredentialSource::KeyFile => "key file",
            CredentialSource::SecretStore => "secret store",
            CredentialSource::Config => "config file",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, GoogleError> {
        serde_json::from_str(raw)
            .map_err(|e| GoogleError::Credentials(format!("invalid key JSON: {}", e)))
    }
}

pub fn load_key(settings: &Settings) -> Result<ServiceAccountKey, GoogleError> {
    key_from_source(
        &settings.credentials,
        settings.service_account.as_ref(),
        |name| std::env::var(name).ok(),
    )
}

fn key_from_source(
    creds: &CredentialSettings,
    configured: Option<&ServiceAccountKey>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ServiceAccountKey, GoogleError> {
    let fail = |msg: String| GoogleError::Credentials(msg);
    let read = |what: &str| -> Result<String, GoogleError> {
        let path = creds
            .path
            .as_ref()
            .ok_or_else(|| fail(format!("credentials.path must point at the {}", what)))?;
        std::fs::read_to_string(path)
            .map_err(|e| fail(format!("cannot read {}: {}", path.display(), e)))
    };

    let key = match creds.source {
        CredentialSource::Inline => {
            let raw = env(&creds.env_var)
                .ok_or_else(|| fail(format!("{} is not set", creds.env_var)))?;
            ServiceAccountKey::from_json(&raw)?
        }
        CredentialSource::KeyFile => ServiceAccountKey::from_json(&read("key file")?)?,
        CredentialSource::SecretStore => {
            let mut doc: toml::Table = toml::from_str(&read("secrets file")?)
                .map_err(|e| fail(format!("invalid secrets file: {}", e)))?;
            doc.remove(&creds.table)
                .ok_or_else(|| fail(format!("secrets file has no [{}] table", creds.table)))?
                .try_into::<ServiceAccountKey>()
                .map_err(|e| fail(format!("invalid [{}] table: {}", creds.table, e)))?
        }
        CredentialSource::Config => configured
            .cloned()
            .ok_or_else(|| fail("settings have no [service_account] table".to_string()))?,
    };
    info!("Using service account {} ({})", key.client_email, creds.source);
    Ok(key)
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Service-account identity with a cached, self-refreshing bearer token.
pub struct Credentials {
    key: ServiceAccountKey,
    token: Option<AccessToken>,
}

impl Credentials {
    pub fn new(key: ServiceAccountKey) -> Self {
        Credentials { key, token: None }
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Current bearer token, fetching a new one when near expiry.
    pub async fn token(&mut self, http: &reqwest::Client) -> Result<String, GoogleError> {
        if let Some(t) = &self.token {
            if t.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(t.value.clone());
            }
        }
        let fresh = self.fetch(http).await?;
        let value = fresh.value.clone();
        self.token = Some(fresh);
        Ok(value)
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, GoogleError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES.join(" "),
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| GoogleError::Credentials(format!("invalid private key: {}", e)))?;
        encode(&header, &claims, &signing_key)
            .map_err(|e| GoogleError::Credentials(format!("cannot sign assertion: {}", e)))
    }

    async fn fetch(&self, http: &reqwest::Client) -> Result<AccessToken, GoogleError> {
        let assertion = self.assertion(Utc::now())?;
        debug!("Requesting access token from {}", self.key.token_uri);
        let resp = http
            .post(&self.key.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GoogleError::Credentials(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }
        let body: TokenResponse = resp.json().await?;
        info!("Access token refreshed, valid for {}s", body.expires_in);
        Ok(AccessToken {
            value: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        })
    }
}
