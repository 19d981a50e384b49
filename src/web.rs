//! Upload form: one page to pick a report, one page showing how the run went.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::google::GoogleClient;
use crate::pipeline::{self, Journal, Level, Step};
use crate::report::ExtractOptions;
use crate::settings::Settings;

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const FIELD: &str = "report";

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    opts: ExtractOptions,
    account: Arc<str>,
    // one run at a time
    remote: Arc<Mutex<GoogleClient>>,
}

impl AppState {
    pub fn new(settings: Settings, opts: ExtractOptions, remote: GoogleClient) -> Self {
        AppState {
            settings: Arc::new(settings),
            opts,
            account: Arc::from(remote.service_account()),
            remote: Arc::new(Mutex::new(remote)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    info!("Serving upload form on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state)).await
}

async fn health() -> &'static str {
    "ok"
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(page(&sidebar(&state.settings, &state.account), FORM))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, (StatusCode, String)> {
    let bad_request = |msg: String| (StatusCode::BAD_REQUEST, msg);

    let mut report = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() != Some(FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
        report = Some((file_name, bytes));
    }

    let (file_name, bytes) =
        report.ok_or_else(|| bad_request(format!("form has no {:?} file", FIELD)))?;
    if !is_report_file(&file_name) {
        warn!("Rejected upload {:?}", file_name);
        return Err(bad_request(format!("{:?} is not an .html/.htm file", file_name)));
    }

    let mut remote = state.remote.lock().await;
    let mut journal = Journal::new();
    journal.info(format!("Received {}", file_name));
    if let Err(e) =
        pipeline::run(&state.settings, &state.opts, &bytes, &mut *remote, &mut journal).await
    {
        debug!("Run for {} stopped: {}", file_name, e);
    }

    let body = format!("{}<p><a href=\"/\">Загрузить ещё</a></p>", journal_html(journal.steps()));
    Ok(Html(page(&sidebar(&state.settings, &state.account), &body)))
}

fn is_report_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

const FORM: &str = r#"<p>Загрузите HTML-файл отчёта: данные будут извлечены, записаны в таблицу, а PDF отчёта сохранён на Диск.</p>
<form method="post" action="/upload" enctype="multipart/form-data">
  <input type="file" name="report" accept=".html,.htm" required>
  <button type="submit">Обработать отчет</button>
</form>"#;

fn page(sidebar: &str, main: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"ru\"><head><meta charset=\"utf-8\">\
         <title>Обработка медицинских отчётов</title>\
         <style>body{{display:flex;font-family:sans-serif}}aside{{width:18em;padding:1em;background:#f3f3f3}}\
         main{{padding:1em}}.info{{color:#333}}.success{{color:#17692e}}.error{{color:#a11}}</style>\
         </head><body><aside>{}</aside><main><h1>Обработка медицинских отчётов</h1>{}</main></body></html>",
        sidebar, main
    )
}

fn sidebar(settings: &Settings, account: &str) -> String {
    let row = |k: &str, v: &str| format!("<dt>{}</dt><dd>{}</dd>", k, escape(v));
    let id = settings.spreadsheet_id().unwrap_or_default();
    [
        "<h2>Настройки</h2><dl>".to_string(),
        row("Таблица", &id),
        row("Лист", &settings.sheet_name),
        row("Лист для PDF (gid)", &settings.export_gid.to_string()),
        row("Папка на Диске", settings.drive_folder_id.as_deref().unwrap_or("-")),
        row("Учётные данные", &settings.credentials.source.to_string()),
        row("Сервисный аккаунт", account),
        "</dl>".to_string(),
    ]
    .concat()
}

fn journal_html(steps: &[Step]) -> String {
    let items: String = steps
        .iter()
        .map(|s| {
            let class = match s.level {
                Level::Info => "info",
                Level::Success => "success",
                Level::Error => "error",
            };
            format!("<li class=\"{}\">{}</li>", class, escape(&s.message))
        })
        .collect();
    format!("<ul>{}</ul>", items)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::auth::{CredentialSource, ServiceAccountKey};
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request};

    const FORM_BOUNDARY: &str = "form-boundary-x";

    fn state() -> AppState {
        let mut settings = Settings {
            spreadsheet: Some("sheet123".into()),
            service_account: Some(ServiceAccountKey {
                client_email: "loader@x.iam.gserviceaccount.com".into(),
                private_key: "pem".into(),
                private_key_id: None,
                token_uri: "https://oauth2.example.test/token".into(),
            }),
            ..Default::default()
        };
        settings.credentials.source = CredentialSource::Config;
        let remote = GoogleClient::connect(&settings).unwrap();
        AppState::new(settings, ExtractOptions::default(), remote)
    }

    async fn form(field: &str, file_name: &str, content: &[u8]) -> Multipart {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/html\r\n\r\n",
            b = FORM_BOUNDARY,
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", FORM_BOUNDARY).as_bytes());
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", FORM_BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(req, &()).await.unwrap()
    }

    #[tokio::test]
    async fn upload_without_report_field() {
        let mp = form("attachment", "r.html", b"<html></html>").await;
        let (status, msg) = upload(State(state()), mp).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(msg.contains("\"report\""));
    }

    #[tokio::test]
    async fn upload_rejects_non_html_name() {
        let mp = form(FIELD, "scan.pdf", b"%PDF-1.4").await;
        let (status, msg) = upload(State(state()), mp).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(msg.contains("scan.pdf"));
    }

    #[tokio::test]
    async fn incomplete_report_shows_journal() {
        let html = std::fs::read_to_string("tests/fixtures/missing_age.html").unwrap();
        let raw = encoding_rs::WINDOWS_1251.encode(&html).0.into_owned();
        let mp = form(FIELD, "client.html", &raw).await;
        let Html(body) = upload(State(state()), mp).await.unwrap();
        assert!(body.contains("<li class=\"info\">Received client.html</li>"));
        assert!(body.contains("class=\"error\""));
        assert!(body.contains("Возраст:"));
    }

    #[test]
    fn accepts_html_names_only() {
        assert!(is_report_file("Отчёт.HTM"));
        assert!(is_report_file("report.html"));
        assert!(!is_report_file("report.pdf"));
        assert!(!is_report_file(""));
    }

    #[test]
    fn journal_levels_become_classes() {
        let steps = vec![
            Step { level: Level::Info, message: "Read <file>".into() },
            Step { level: Level::Error, message: "boom & bust".into() },
        ];
        let html = journal_html(&steps);
        assert!(html.contains("<li class=\"info\">Read &lt;file&gt;</li>"));
        assert!(html.contains("<li class=\"error\">boom &amp; bust</li>"));
    }

    #[test]
    fn sidebar_shows_configuration() {
        let settings = Settings {
            spreadsheet: Some("https://docs.google.com/spreadsheets/d/sheet123/edit".into()),
            drive_folder_id: Some("fold".into()),
            ..Default::default()
        };
        let html = sidebar(&settings, "loader@x.iam.gserviceaccount.com");
        assert!(html.contains("<dd>sheet123</dd>"));
        assert!(html.contains("<dd>Вставка</dd>"));
        assert!(html.contains("<dd>fold</dd>"));
        assert!(html.contains("<dd>inline secret</dd>"));
    }

    #[test]
    fn form_posts_report_field() {
        let html = page("", FORM);
        assert!(html.contains("action=\"/upload\""));
        assert!(html.contains(&format!("name=\"{}\"", FIELD)));
    }
}
