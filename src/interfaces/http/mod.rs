use crate::application::use_cases::gateway::GatewayUseCase;
use crate::application::use_cases::localization::{
    error_message, failure_message, format_result, rate_limited_message,
};
use crate::domain::error::AppError;
use crate::domain::language::detect_language;
use crate::domain::prompt::InboundMessage;
use crate::domain::query::Identity;
use crate::infrastructure::notifier::Notifier;
use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{dev::Server, get, post, web, App, HttpResponse, HttpServer, Responder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;
use validator::Validate;

const MISSING_FIELDS: &str = "phone and text are required";

pub struct HttpState {
    pub gateway: Arc<GatewayUseCase>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<i64>,
}

impl<'a> ErrorBody<'a> {
    fn new(error: &'a str) -> Self {
        Self {
            error,
            retry_after_seconds: None,
        }
    }
}

#[derive(Serialize)]
struct SuccessBody {
    success: bool,
    rows: usize,
}

fn error_response(e: &AppError) -> actix_web::HttpResponseBuilder {
    HttpResponse::build(
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    )
}

#[get("/")]
async fn health() -> impl Responder {
    HttpResponse::Ok().body("Query gateway up")
}

#[post("/messages")]
async fn receive_message(
    data: web::Data<HttpState>,
    req: web::Json<InboundMessage>,
) -> impl Responder {
    let message = req.into_inner();
    if message.validate().is_err()
        || message.phone.trim().is_empty()
        || message.text.trim().is_empty()
    {
        return HttpResponse::BadRequest().json(ErrorBody::new(MISSING_FIELDS));
    }

    let span = info_span!("message", request_id = %Uuid::new_v4());
    handle_message(&data, message).instrument(span).await
}

async fn handle_message(data: &HttpState, message: InboundMessage) -> HttpResponse {
    let identity = Identity::new(message.phone.as_str());
    let lang = detect_language(&message.text);
    info!(identity = %identity, lang = lang.code(), "Received message");

    match data.gateway.submit_request(&identity, &message.text).await {
        Ok(response) => {
            let reply = format_result(&response.result, lang);
            notify(data, &message.phone, &reply).await;
            HttpResponse::Ok().json(SuccessBody {
                success: true,
                rows: response.result.row_count,
            })
        }
        Err(e @ AppError::ValidationRejected(_)) => {
            warn!(reason = %e, "Refusing request");
            notify(data, &message.phone, failure_message(lang)).await;
            error_response(&e).json(ErrorBody::new("Generated SQL not allowed"))
        }
        Err(
            e @ AppError::RateLimited {
                retry_after_seconds,
            },
        ) => {
            warn!(retry_after_seconds, "Rate limited");
            notify(
                data,
                &message.phone,
                &rate_limited_message(lang, retry_after_seconds),
            )
            .await;
            error_response(&e)
                .insert_header(("Retry-After", retry_after_seconds.to_string()))
                .json(ErrorBody {
                    error: "Too many requests",
                    retry_after_seconds: Some(retry_after_seconds),
                })
        }
        Err(e) => {
            error!(error = %e, "Request failed");
            notify(data, &message.phone, error_message(lang)).await;
            error_response(&e).json(ErrorBody::new("Failed to process message"))
        }
    }
}

/// Delivery failures are logged and never change the HTTP outcome.
async fn notify(data: &HttpState, to: &str, body: &str) {
    if let Err(e) = data.notifier.send_text(to, body).await {
        error!(to = %to, error = %e, "Failed to notify user");
    }
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| {
            let response = HttpResponse::BadRequest().json(ErrorBody::new(MISSING_FIELDS));
            InternalError::from_response(err, response).into()
        })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(web::scope("/api").app_data(json_config()).service(receive_message));
}

pub fn start_server(state: HttpState, port: u16) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(("0.0.0.0", port))?
        .run();

    info!(port, "HTTP server listening");
    Ok(server)
}
