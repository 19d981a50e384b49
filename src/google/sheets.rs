use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::GoogleClient;
use crate::error::GoogleError;

// Same input semantics as typing into the sheet, so numbers and dates are parsed.
const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct BatchUpdateReply {
    #[serde(default)]
    replies: Vec<Reply>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reply {
    add_sheet: Option<SheetEntry>,
}

impl GoogleClient {
    /// Sheet id (gid) of the tab titled `title`, adding the tab if absent.
    pub async fn find_or_create_sheet(&mut self, title: &str) -> Result<i64, GoogleError> {
        let token = self.bearer().await?;
        let url = format!("{}/spreadsheets/{}", self.endpoints.sheets, self.spreadsheet_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&[("fields", "sheets.properties(sheetId,title)")])
            .send()
            .await?;
        let meta: SpreadsheetMeta = remote_json(resp).await?;
        if let Some(gid) = sheet_id_by_title(&meta, title) {
            info!("Selected sheet {:?} (gid {})", title, gid);
            return Ok(gid);
        }

        info!("Sheet {:?} not found, creating it", title);
        let resp = self
            .http
            .post(format!("{}:batchUpdate", url))
            .bearer_auth(&token)
            .json(&add_sheet_request(title))
            .send()
            .await?;
        let reply: BatchUpdateReply = remote_json(resp).await?;
        reply
            .replies
            .into_iter()
            .find_map(|r| r.add_sheet)
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| GoogleError::RemoteWrite("addSheet reply carried no sheet".to_string()))
    }

    /// Overwrites the block starting at A1 of `title` with `grid`.
    pub async fn update_values(
        &mut self,
        title: &str,
        grid: &[Vec<String>],
    ) -> Result<(), GoogleError> {
        let token = self.bearer().await?;
        let range = a1_origin(title);
        let mut url = reqwest::Url::parse(&format!(
            "{}/spreadsheets/{}/values/",
            self.endpoints.sheets, self.spreadsheet_id
        ))
        .map_err(|e| GoogleError::Config(format!("bad sheets endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GoogleError::Config("sheets endpoint cannot take a path".to_string()))?
            .pop_if_empty()
            .push(&range);

        let resp = self
            .http
            .put(url)
            .bearer_auth(&token)
            .query(&[("valueInputOption", VALUE_INPUT_OPTION)])
            .json(&values_body(&range, grid))
            .send()
            .await?;
        let _: Value = remote_json(resp).await?;
        info!("Wrote {} rows to {}", grid.len(), range);
        Ok(())
    }

    /// Renders one tab to PDF through the spreadsheet export endpoint.
    pub async fn export_sheet_pdf(&mut self, gid: i64) -> Result<Vec<u8>, GoogleError> {
        let token = self.bearer().await?;
        let url = format!(
            "{}/spreadsheets/d/{}/export",
            self.endpoints.docs, self.spreadsheet_id
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&[("format", "pdf".to_string()), ("gid", gid.to_string())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GoogleError::Export {
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await?;
        info!("Exported gid {} to PDF ({} bytes)", gid, bytes.len());
        Ok(bytes.to_vec())
    }
}

async fn remote_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, GoogleError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleError::RemoteWrite(format!("{}: {}", status, body)));
    }
    Ok(resp.json().await?)
}

fn sheet_id_by_title(meta: &SpreadsheetMeta, title: &str) -> Option<i64> {
    meta.sheets
        .iter()
        .find(|s| s.properties.title == title)
        .map(|s| s.properties.sheet_id)
}

/// `'Sheet'!A1`, with quotes inside the title doubled.
fn a1_origin(title: &str) -> String {
    format!("'{}'!A1", title.replace('\'', "''"))
}

fn add_sheet_request(title: &str) -> Value {
    json!({ "requests": [{ "addSheet": { "properties": { "title": title } } }] })
}

fn values_body(range: &str, grid: &[Vec<String>]) -> Value {
    json!({ "range": range, "majorDimension": "ROWS", "values": grid })
}
