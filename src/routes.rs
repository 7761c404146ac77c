use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::error::PrintError;
use crate::radio::RadioCapability;
use crate::session::PrintSession;

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
    #[serde(default = "default_align")]
    pub align: String,
    #[serde(default)]
    pub bold: bool,
}

#[derive(Debug, Deserialize)]
pub struct QrRequest {
    pub data: String,
    #[serde(default = "default_qr_size")]
    pub size: u32,
}

#[derive(Debug, Deserialize)]
pub struct BarcodeRequest {
    #[serde(default)]
    pub data: String,
    #[serde(rename = "type", default = "default_barcode_type")]
    pub kind: String,
}

fn default_align() -> String {
    "left".into()
}

fn default_qr_size() -> u32 {
    3
}

fn default_barcode_type() -> String {
    "CODE128".into()
}

pub fn configure<R: RadioCapability>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/status", web::get().to(status::<R>))
            .route("/print/text", web::post().to(print_text::<R>))
            .route("/print/qr", web::post().to(print_qr::<R>))
            .route("/print/barcode", web::post().to(print_barcode::<R>)),
    );
}

/// Malformed JSON bodies answer in the same shape as every other failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = json!({ "success": false, "error": err.to_string() });
        InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}

async fn status<R: RadioCapability>(session: web::Data<PrintSession<R>>) -> impl Responder {
    let printer = if session.status().connected {
        "connected"
    } else {
        "disconnected"
    };
    HttpResponse::Ok().json(json!({ "server": "running", "printer": printer }))
}

async fn print_text<R: RadioCapability>(
    session: web::Data<PrintSession<R>>,
    body: web::Json<TextRequest>,
) -> impl Responder {
    let result = session.submit_text(&body.text, &body.align, body.bold).await;
    respond(result, "Text printed")
}

async fn print_qr<R: RadioCapability>(
    session: web::Data<PrintSession<R>>,
    body: web::Json<QrRequest>,
) -> impl Responder {
    let result = session.submit_qr(&body.data, body.size).await;
    respond(result, "QR code printed")
}

async fn print_barcode<R: RadioCapability>(
    session: web::Data<PrintSession<R>>,
    body: web::Json<BarcodeRequest>,
) -> impl Responder {
    let result = session.submit_barcode(&body.kind, &body.data).await;
    respond(result, "Barcode printed")
}

fn respond(result: Result<(), PrintError>, message: &str) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true, "message": message })),
        Err(e) => {
            let code = match e {
                PrintError::Validation(_) => StatusCode::BAD_REQUEST,
                PrintError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
                PrintError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            log::warn!(target: "routes", "print rejected ({}): {}", code, e);
            HttpResponse::build(code).json(json!({ "success": false, "error": e.to_string() }))
        }
    }
}
