use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{error, info};

use crate::error::{GoogleError, PipelineError};
use crate::report::{self, ClientInfo, ExtractOptions};
use crate::settings::Settings;

/// Spreadsheet side of a run.
#[allow(async_fn_in_trait)]
pub trait Workbook {
    /// Writes `grid` at the origin of `sheet`, creating the sheet if needed; returns its gid.
    async fn write_rows(&mut self, sheet: &str, grid: &[Vec<String>]) -> Result<i64, GoogleError>;

    async fn export_pdf(&mut self, gid: i64) -> Result<Vec<u8>, GoogleError>;
}

/// File storage side of a run.
#[allow(async_fn_in_trait)]
pub trait Storage {
    /// Returns the storage id of the uploaded file.
    async fn upload(&mut self, path: &Path, folder: Option<&str>) -> Result<String, GoogleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub level: Level,
    pub message: String,
}

/// Operator-visible messages of one run, in order.
#[derive(Default)]
pub struct Journal {
    steps: Vec<Step>,
    observer: Option<Box<dyn FnMut(&Step) + Send>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: impl FnMut(&Step) + Send + 'static) -> Self {
        Journal {
            steps: Vec::new(),
            observer: Some(Box::new(observer)),
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push(Level::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push(Level::Success, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.push(Level::Error, message);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn push(&mut self, level: Level, message: String) {
        let step = Step { level, message };
        if let Some(observe) = self.observer.as_mut() {
            observe(&step);
        }
        self.steps.push(step);
    }
}

#[derive(Debug)]
pub struct Outcome {
    pub rows: usize,
    pub sheet_gid: i64,
    pub pdf_path: PathBuf,
    pub file_id: String,
}

/// Transform, write, export, save, upload; the first failure ends the run.
///
/// Nothing is rolled back: a failed export leaves the written rows in place, and the
/// journal shows how far the run got.
pub async fn run<R: Workbook + Storage>(
    settings: &Settings,
    opts: &ExtractOptions,
    raw: &[u8],
    remote: &mut R,
    journal: &mut Journal,
) -> Result<Outcome, PipelineError> {
    let result = run_steps(settings, opts, raw, remote, journal).await;
    match &result {
        Ok(_) => journal.success("All steps completed"),
        Err(e) => journal.error(e.to_string()),
    }
    result
}

async fn run_steps<R: Workbook + Storage>(
    settings: &Settings,
    opts: &ExtractOptions,
    raw: &[u8],
    remote: &mut R,
    journal: &mut Journal,
) -> Result<Outcome, PipelineError> {
    journal.info(format!("Read report, {} bytes", raw.len()));
    let extracted = report::transform(raw, opts)?;
    if extracted.is_empty() {
        journal.info("Report has no measurement rows besides the header");
    }
    journal.info(format!(
        "Extracted {} rows for {}, age {}, {}, tested {}",
        extracted.len(),
        extracted.client.full_name,
        extracted.client.age,
        extracted.client.body_type,
        extracted.client.test_time
    ));

    let grid = extracted.to_grid();
    let sheet_gid = remote.write_rows(&settings.sheet_name, &grid).await?;
    journal.success(format!(
        "Wrote {} rows to sheet {:?}",
        extracted.len(),
        settings.sheet_name
    ));

    let pdf = remote.export_pdf(settings.export_gid).await?;
    journal.success(format!("Exported gid {} to PDF", settings.export_gid));

    let file_name = pdf_file_name(&extracted.client, Local::now());
    tokio::fs::create_dir_all(&settings.output_dir).await?;
    let pdf_path = settings.output_dir.join(&file_name);
    tokio::fs::write(&pdf_path, &pdf).await?;
    journal.info(format!("Saved {}", pdf_path.display()));

    let file_id = remote
        .upload(&pdf_path, settings.drive_folder_id.as_deref())
        .await?;
    journal.success(format!("Uploaded {} with id {}", file_name, file_id));

    Ok(Outcome {
        rows: extracted.len(),
        sheet_gid,
        pdf_path,
        file_id,
    })
}

/// `Отчет_<last>_<first>_<timestamp>.pdf` from the first two name tokens.
pub fn pdf_file_name(client: &ClientInfo, now: DateTime<Local>) -> String {
    let mut parts = vec!["Отчет".to_string()];
    parts.extend(
        client
            .full_name
            .split_whitespace()
            .take(2)
            .map(|p| p.replace(|c: char| c == '/' || c == '\\', "_")),
    );
    parts.push(now.format("%Y%m%d_%H%M%S%3f").to_string());
    format!("{}.pdf", parts.join("_"))
}
