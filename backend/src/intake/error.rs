use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::model::ClassifyError;

const MIB: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("Image decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Image format {found} is not in the allow-list {allowed:?}")]
    UnsupportedFormat { found: String, allowed: Vec<String> },
    #[error("Normalization failed: {0}")]
    Normalization(String),
    #[error("Classification failed: {0}")]
    Classification(#[from] ClassifyError),
    #[error("No file field in upload")]
    MissingFile,
    #[error("Malformed multipart upload: {0}")]
    InvalidUpload(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AnalyzeError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzeError::PayloadTooLarge { .. } => "PayloadTooLarge",
            AnalyzeError::Decode(_) => "DecodeError",
            AnalyzeError::UnsupportedFormat { .. } => "UnsupportedFormat",
            AnalyzeError::Normalization(_) => "NormalizationError",
            AnalyzeError::Classification(_) => "ClassificationError",
            AnalyzeError::MissingFile => "MissingFile",
            AnalyzeError::InvalidUpload(_) => "InvalidUpload",
            AnalyzeError::Unexpected(_) => "UnexpectedError",
        }
    }

    /// Message returned to the client. Never includes the internal cause.
    pub fn detail(&self) -> String {
        match self {
            AnalyzeError::PayloadTooLarge { limit, .. } => {
                format!("File size must be at most {}", format_megabytes(*limit))
            }
            AnalyzeError::Decode(_) => "Failed to read the image".to_string(),
            AnalyzeError::UnsupportedFormat { allowed, .. } => {
                format!("Only {} images are supported", allowed.join(" or "))
            }
            AnalyzeError::Normalization(_) => "Failed to optimize the image".to_string(),
            AnalyzeError::Classification(_) => "Failed to analyze the image".to_string(),
            AnalyzeError::MissingFile => "No file was uploaded".to_string(),
            AnalyzeError::InvalidUpload(_) => "Invalid multipart upload".to_string(),
            AnalyzeError::Unexpected(_) => "An unexpected error occurred".to_string(),
        }
    }
}

impl ResponseError for AnalyzeError {
    fn status_code(&self) -> StatusCode {
        match self {
            AnalyzeError::PayloadTooLarge { .. }
            | AnalyzeError::Decode(_)
            | AnalyzeError::UnsupportedFormat { .. }
            | AnalyzeError::MissingFile
            | AnalyzeError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::Normalization(_)
            | AnalyzeError::Classification(_)
            | AnalyzeError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.detail(),
        })
    }
}

fn format_megabytes(bytes: usize) -> String {
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{:.2}MB", bytes as f64 / MIB as f64)
    }
}
