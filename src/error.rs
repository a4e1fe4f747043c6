use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ArchiveError {
    #[error("cookie file not found at {0}")]
    #[diagnostic(help("export your browser cookies in Netscape format and pass --cookies"))]
    MissingAuthContext(Utf8PathBuf),

    #[error("failed to read cookie file at {0}")]
    AuthRead(Utf8PathBuf),

    #[error("export file not found at {0}")]
    #[diagnostic(help("request your data from TikTok in JSON format and pass --export"))]
    MissingExport(Utf8PathBuf),

    #[error("failed to read export file at {0}")]
    ExportRead(Utf8PathBuf),

    #[error("invalid export file: {0}")]
    ExportParse(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("download request failed: {0}")]
    FetchHttp(String),

    #[error("server returned status {status}: {message}")]
    FetchStatus { status: u16, message: String },

    #[error("{0}")]
    FetchTool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
