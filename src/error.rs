use thiserror::Error;

/// Failures of the report transform. Every variant aborts the run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("report is not valid {encoding} text")]
    Decode { encoding: &'static str },

    #[error("could not parse report markup: {0}")]
    Parse(String),

    #[error("field {label:?} not found")]
    FieldNotFound { label: &'static str },

    #[error("client info incomplete, missing: {}", .missing.join(", "))]
    IncompleteClientInfo { missing: Vec<&'static str> },

    #[error("no 4-column tables found in report")]
    NoTablesFound,
}

/// Failures talking to the spreadsheet, export and storage endpoints.
#[derive(Error, Debug)]
pub enum GoogleError {
    #[error("configuration: {0}")]
    Config(String),

    #[error("credentials: {0}")]
    Credentials(String),

    #[error("spreadsheet write failed: {0}")]
    RemoteWrite(String),

    #[error("PDF export failed with status {status}")]
    Export { status: u16 },

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("{0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Extract(#[from] ExtractError),

    #[error("{0}")]
    Google(#[from] GoogleError),

    #[error("could not save PDF: {0}")]
    Io(#[from] std::io::Error),
}
