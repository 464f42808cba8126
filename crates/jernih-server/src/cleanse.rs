use async_trait::async_trait;
use std::fmt;

pub const TEXT_DESCRIPTION: &str = "Teks yang sudah diproses";
pub const FILE_DESCRIPTION: &str = "File processed";
pub const CSV_EXTENSION: &str = "csv";

/// A CSV upload as received from the multipart body.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Column to cleanse; `None` means the provider's configured default.
    pub column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCleansed {
    pub output: String,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCleansed {
    pub csv: String,
    pub rows: usize,
    pub persisted: bool,
}

#[async_trait]
pub trait CleanseProvider: Send + Sync + 'static {
    async fn cleanse_text(&self, text: String) -> Result<TextCleansed, CleanseError>;
    async fn cleanse_file(&self, upload: FileUpload) -> Result<FileCleansed, CleanseError>;
}

#[derive(Debug, Clone)]
pub struct CleanseError {
    pub kind: CleanseErrorKind,
    pub message: String,
    pub field: Option<String>,
}

impl CleanseError {
    pub fn invalid_param(field: impl Into<String>, message: impl Into<String>) -> Self {
        CleanseError {
            kind: CleanseErrorKind::InvalidParameter,
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CleanseError {
            kind: CleanseErrorKind::Internal,
            message: message.into(),
            field: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanseErrorKind {
    InvalidParameter,
    Internal,
}

impl fmt::Display for CleanseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CleanseError {}

/// The name must carry a `.csv` extension, compared case-insensitively.
pub fn is_csv_file_name(file_name: &str) -> bool {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.eq_ignore_ascii_case(CSV_EXTENSION),
        None => false,
    }
}
