use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::GoogleClient;
use crate::error::GoogleError;

const BOUNDARY_PREFIX: &str = "report_loader_part";

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

impl GoogleClient {
    /// Uploads a local PDF to Drive, optionally into `folder`; returns the file id.
    pub async fn upload_pdf(
        &mut self,
        path: &Path,
        folder: Option<&str>,
    ) -> Result<String, GoogleError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| GoogleError::Upload(format!("cannot read {}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| GoogleError::Upload(format!("{} has no file name", path.display())))?;

        let metadata = file_metadata(&name, "application/pdf", folder);
        let boundary = boundary_for(&content, Utc::now().timestamp_micros());
        let body = multipart_related(&boundary, &metadata, "application/pdf", &content);

        let token = self.bearer().await?;
        let resp = self
            .http
            .post(format!("{}/files", self.endpoints.drive_upload))
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GoogleError::Upload(format!("{}: {}", status, text)));
        }
        let created: CreatedFile = resp.json().await?;
        info!("Uploaded {} as Drive file {}", name, created.id);
        Ok(created.id)
    }
}

fn file_metadata(name: &str, mime: &str, folder: Option<&str>) -> Value {
    let mut meta = json!({ "name": name, "mimeType": mime });
    if let Some(folder) = folder.filter(|f| !f.is_empty()) {
        meta["parents"] = json!([folder]);
    }
    meta
}

/// Per-request boundary that does not occur anywhere in `content`.
fn boundary_for(content: &[u8], seed: i64) -> String {
    (0u32..)
        .map(|n| format!("{}_{:x}_{}", BOUNDARY_PREFIX, seed, n))
        .find(|b| !content.windows(b.len()).any(|w| w == b.as_bytes()))
        .unwrap_or_default()
}

/// Two-part `multipart/related` body: JSON metadata, then the media.
fn multipart_related(boundary: &str, metadata: &Value, mime: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n\
             --{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = boundary,
            meta = metadata,
            mime = mime
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_with_and_without_folder() {
        let m = file_metadata("Отчет.pdf", "application/pdf", Some("fld1"));
        assert_eq!(m["parents"][0], "fld1");
        assert_eq!(m["name"], "Отчет.pdf");
        assert!(file_metadata("a.pdf", "application/pdf", None).get("parents").is_none());
        assert!(file_metadata("a.pdf", "application/pdf", Some("")).get("parents").is_none());
    }

    #[test]
    fn body_layout() {
        let meta = file_metadata("a.pdf", "application/pdf", None);
        let boundary = boundary_for(b"%PDF-1.4 data", 7);
        let body = multipart_related(&boundary, &meta, "application/pdf", b"%PDF-1.4 data");
        let text = String::from_utf8(body).unwrap();
        let parts: Vec<&str> = text.split(&format!("--{}", boundary)).collect();
        // preamble, metadata, media, closing
        assert_eq!(parts.len(), 4);
        assert!(parts[1].contains("application/json"));
        assert!(parts[1].contains("\"name\":\"a.pdf\""));
        assert!(parts[2].ends_with("\r\n\r\n%PDF-1.4 data\r\n"));
        assert_eq!(parts[3], "--\r\n");
    }

    #[test]
    fn boundary_avoids_content() {
        assert_eq!(boundary_for(b"%PDF", 0x1f), "report_loader_part_1f_0");
        let content = b"%PDF ... --report_loader_part_1f_0 ... report_loader_part_1f_1";
        assert_eq!(boundary_for(content, 0x1f), "report_loader_part_1f_2");
    }
}
