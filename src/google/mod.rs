pub mod auth;
pub mod drive;
pub mod sheets;

use std::path::Path;

use tracing::info;

use crate::error::GoogleError;
use crate::pipeline::{Storage, Workbook};
use crate::settings::{Endpoints, Settings};
use auth::Credentials;

/// One authorized session against a single spreadsheet and Drive.
pub struct GoogleClient {
    http: reqwest::Client,
    creds: Credentials,
    endpoints: Endpoints,
    spreadsheet_id: String,
}

impl GoogleClient {
    pub fn connect(settings: &Settings) -> Result<Self, GoogleError> {
        let spreadsheet_id = settings
            .spreadsheet_id()
            .ok_or_else(|| GoogleError::Config("no spreadsheet configured".to_string()))?;
        let key = auth::load_key(settings)?;
        info!("Target spreadsheet {}", spreadsheet_id);
        Ok(GoogleClient {
            http: reqwest::Client::new(),
            creds: Credentials::new(key),
            endpoints: settings.endpoints.clone(),
            spreadsheet_id,
        })
    }

    pub fn service_account(&self) -> &str {
        self.creds.client_email()
    }

    async fn bearer(&mut self) -> Result<String, GoogleError> {
        self.creds.token(&self.http).await
    }
}

impl Workbook for GoogleClient {
    async fn write_rows(&mut self, sheet: &str, grid: &[Vec<String>]) -> Result<i64, GoogleError> {
        let gid = self.find_or_create_sheet(sheet).await?;
        self.update_values(sheet, grid).await?;
        Ok(gid)
    }

    async fn export_pdf(&mut self, gid: i64) -> Result<Vec<u8>, GoogleError> {
        self.export_sheet_pdf(gid).await
    }
}

impl Storage for GoogleClient {
    async fn upload(&mut self, path: &Path, folder: Option<&str>) -> Result<String, GoogleError> {
        self.upload_pdf(path, folder).await
    }
}
