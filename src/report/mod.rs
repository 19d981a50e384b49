pub mod fields;
pub mod model;
pub mod tables;

use encoding_rs::Encoding;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ExtractError;
pub use model::{ClientInfo, ExtractionResult, MeasurementRow, COLUMNS};

/// Which assembled rows are treated as column headers and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    /// Drop only the first row of the concatenated sequence.
    #[default]
    Global,
    /// Drop the first row of every eligible table.
    PerTable,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub encoding: &'static Encoding,
    pub header_mode: HeaderMode,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            encoding: encoding_rs::WINDOWS_1251,
            header_mode: HeaderMode::Global,
        }
    }
}

/// Raw report bytes → client record plus measurement rows.
pub fn transform(raw: &[u8], opts: &ExtractOptions) -> Result<ExtractionResult, ExtractError> {
    let text = decode(raw, opts.encoding)?;
    info!("Decoded {} bytes as {}", raw.len(), opts.encoding.name());

    let document = Html::parse_document(&text);
    if !document.errors.is_empty() {
        debug!("markup parsed with {} recoverable errors", document.errors.len());
    }

    let client = client_info(&document)?;

    let rows: Vec<MeasurementRow> = match opts.header_mode {
        HeaderMode::Global => tables::normalize(&document)?
            .into_iter()
            .skip(1)
            .map(Into::into)
            .collect(),
        HeaderMode::PerTable => tables::collect_tables(&document)?
            .into_iter()
            .flat_map(|g| g.into_iter().skip(1))
            .map(Into::into)
            .collect(),
    };
    info!("Extracted {} measurement rows for {}", rows.len(), client.full_name);

    Ok(ExtractionResult { client, rows })
}

// 0x98 is unassigned in windows-1251; encoding_rs still decodes it to U+0098.
const CP1251_UNASSIGNED: char = '\u{98}';

fn decode(raw: &[u8], encoding: &'static Encoding) -> Result<String, ExtractError> {
    let failed = || ExtractError::Decode {
        encoding: encoding.name(),
    };
    let text = encoding
        .decode_without_bom_handling_and_without_replacement(raw)
        .ok_or_else(failed)?;
    if encoding == encoding_rs::WINDOWS_1251 && text.contains(CP1251_UNASSIGNED) {
        return Err(failed());
    }
    Ok(text.into_owned())
}

fn client_info(document: &Html) -> Result<ClientInfo, ExtractError> {
    let mut missing = Vec::new();
    let mut field = |label: &'static str| match fields::extract(document, label) {
        Ok(v) => Ok(v),
        Err(ExtractError::FieldNotFound { label }) => {
            missing.push(label);
            Ok(String::new())
        }
        Err(e) => Err(e),
    };

    let full_name = field(fields::NAME)?;
    let age = field(fields::AGE)?;
    let body_type = field(fields::BODY_TYPE)?;
    let test_time = field(fields::TEST_TIME)?;

    if !missing.is_empty() {
        warn!("Client info incomplete: {:?}", missing);
        return Err(ExtractError::IncompleteClientInfo { missing });
    }
    Ok(ClientInfo {
        full_name,
        age,
        body_type,
        test_time,
    })
}

pub(crate) fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Parse(format!("selector {:?}: {:?}", css, e)))
}
