use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use futures::StreamExt;
use log::{debug, error, info};
use shared::{AnalyzeResponse, HealthResponse};
use std::error::Error as _;
use uuid::Uuid;

use crate::intake::{AnalyzeError, IntakePipeline};

const FILE_FIELD: &str = "file";

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/analyze").route(web::post().to(analyze)))
        .service(web::resource("/health").route(web::get().to(health)));
}

pub fn cors_policy(origins: &[String]) -> Cors {
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
        .expose_headers(vec![header::CONTENT_LENGTH, header::CONTENT_TYPE])
}

async fn analyze(
    pipeline: web::Data<IntakePipeline>,
    payload: Multipart,
) -> Result<HttpResponse, AnalyzeError> {
    let request_id = Uuid::new_v4();

    match run_analysis(request_id, pipeline, payload).await {
        Ok(result) => {
            info!(
                "[{}] Analysis result: variety={}, grade={}, confidence={}",
                request_id, result.variety, result.grade, result.confidence
            );
            Ok(HttpResponse::Ok().json(result))
        }
        Err(e) => {
            log_failure(request_id, &e);
            Err(e)
        }
    }
}

async fn run_analysis(
    request_id: Uuid,
    pipeline: web::Data<IntakePipeline>,
    payload: Multipart,
) -> Result<AnalyzeResponse, AnalyzeError> {
    let upload = read_upload(payload, pipeline.max_upload_bytes()).await?;
    info!("[{}] Request received: {}", request_id, upload.filename);

    web::block(move || pipeline.analyze(&upload.bytes, &upload.filename))
        .await
        .map_err(|e| AnalyzeError::Unexpected(e.to_string()))?
}

/// Takes the first field named `file` or carrying a filename. Reading stops
/// once the body passes `limit`, leaving the size check to the pipeline.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Upload, AnalyzeError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AnalyzeError::InvalidUpload(e.to_string()))?;

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(String::from);
        if field.name() != Some(FILE_FIELD) && filename.is_none() {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| AnalyzeError::InvalidUpload(e.to_string()))?;
            }
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| AnalyzeError::InvalidUpload(e.to_string()))?;
            bytes.extend_from_slice(&data);
            if bytes.len() > limit {
                break;
            }
        }

        return Ok(Upload {
            filename: filename.unwrap_or_else(|| FILE_FIELD.to_string()),
            bytes,
        });
    }

    Err(AnalyzeError::MissingFile)
}

fn log_failure(request_id: Uuid, err: &AnalyzeError) {
    error!(
        "[{}] {} ({}): {}",
        request_id,
        err.detail(),
        err.kind(),
        err
    );
    let mut source = err.source();
    while let Some(cause) = source {
        error!("[{}]   caused by: {}", request_id, cause);
        source = cause.source();
    }
}

async fn health() -> HttpResponse {
    debug!("Health check request received");
    HttpResponse::Ok().json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntakeConfig;
    use crate::intake::fixtures;
    use crate::model::RandomClassifier;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use image::ImageFormat;
    use shared::{ErrorResponse, Grade, Variety};
    use std::str::FromStr;
    use std::sync::Arc;

    const BOUNDARY: &str = "teagradeboundary";

    fn pipeline() -> web::Data<IntakePipeline> {
        let classifier = Arc::new(RandomClassifier::new(Some(3)));
        web::Data::new(IntakePipeline::new(&IntakeConfig::default(), classifier).unwrap())
    }

    fn multipart(field: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/analyze")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn health_reports_healthy() {
        let app = test::init_service(App::new().configure(configure_routes)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: HealthResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, "healthy");
        assert!(!body.message.is_empty());
    }

    #[actix_web::test]
    async fn wide_png_is_analyzed() {
        let app =
            test::init_service(App::new().app_data(pipeline()).configure(configure_routes)).await;
        let png = fixtures::encode(&fixtures::rgb(600, 300, [40, 150, 70]), ImageFormat::Png);
        let req = upload_request(multipart("file", "leaf.png", &png)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        let variety = body["variety"].as_str().unwrap();
        let grade = body["grade"].as_str().unwrap();
        let confidence = body["confidence"].as_f64().unwrap();
        assert!(Variety::from_str(variety).is_ok());
        assert!(Grade::from_str(grade).is_ok());
        assert!((0.7..=1.0).contains(&confidence));
    }

    #[actix_web::test]
    async fn transparent_png_is_analyzed() {
        let app =
            test::init_service(App::new().app_data(pipeline()).configure(configure_routes)).await;
        let png = fixtures::encode(&fixtures::rgba(100, 100, [0, 0, 0, 0]), ImageFormat::Png);
        let req = upload_request(multipart("file", "clear.png", &png)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected() {
        let app =
            test::init_service(App::new().app_data(pipeline()).configure(configure_routes)).await;
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.resize(10 * 1024 * 1024, 0);
        let req = upload_request(multipart("file", "big.jpg", &jpeg)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.detail, "File size must be at most 5MB");
    }

    #[actix_web::test]
    async fn text_renamed_to_jpg_is_rejected() {
        let app =
            test::init_service(App::new().app_data(pipeline()).configure(configure_routes)).await;
        let body = multipart("file", "notes.jpg", b"just some notes about tea");
        let req = upload_request(body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.detail, "Failed to read the image");
    }

    #[actix_web::test]
    async fn decompression_bomb_is_rejected() {
        let app =
            test::init_service(App::new().app_data(pipeline()).configure(configure_routes)).await;
        let png = fixtures::png_with_declared_size(16_000, 16_000);
        let req = upload_request(multipart("file", "bomb.png", &png)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.detail, "Failed to read the image");
    }

    #[actix_web::test]
    async fn gif_is_rejected_as_unsupported() {
        let app =
            test::init_service(App::new().app_data(pipeline()).configure(configure_routes)).await;
        let gif = fixtures::encode(&fixtures::rgba(12, 12, [0, 0, 0, 255]), ImageFormat::Gif);
        let req = upload_request(multipart("file", "a.gif", &gif)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.detail, "Only JPEG or PNG images are supported");
    }

    #[actix_web::test]
    async fn body_without_file_is_rejected() {
        let app =
            test::init_service(App::new().app_data(pipeline()).configure(configure_routes)).await;
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        )
        .into_bytes();
        let req = upload_request(body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.detail, "No file was uploaded");
    }

    #[actix_web::test]
    async fn cors_allows_configured_origin() {
        let origins = vec!["http://localhost:3000".to_string()];
        let app = test::init_service(
            App::new()
                .wrap(cors_policy(&origins))
                .configure(configure_routes),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/health")
            .insert_header((header::ORIGIN, "http://localhost:3000"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
    }

    #[actix_web::test]
    async fn preflight_sets_no_max_age() {
        let origins = vec!["http://localhost:3001".to_string()];
        let app = test::init_service(
            App::new()
                .wrap(cors_policy(&origins))
                .configure(configure_routes),
        )
        .await;
        let req = test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .uri("/analyze")
            .insert_header((header::ORIGIN, "http://localhost:3001"))
            .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert!(!resp.headers().contains_key(header::ACCESS_CONTROL_MAX_AGE));
    }
}
