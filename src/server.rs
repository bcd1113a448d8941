use std::io::Write;

use actix_multipart::Multipart;
use actix_web::{HttpResponse, HttpServer, get, post, web};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::io_struct::{GenerationRequest, RequestFields};
use crate::relay_state::{RelayState, run_generation, run_generation_sync};
use crate::upload::MAX_UPLOAD_BYTES;

#[get("/health")]
pub async fn health(_: web::Data<RelayState>) -> HttpResponse {
    HttpResponse::Ok().body("Ok")
}

/// Streaming endpoint: multipart in, `text/event-stream` out. Validation
/// failures are plain 400s; once the stream is open every outcome arrives as
/// a progress-protocol event, ending with exactly one terminal frame.
#[post("/v1/generate")]
pub async fn generate(
    payload: Multipart,
    app_state: web::Data<RelayState>,
) -> std::result::Result<HttpResponse, RelayError> {
    let request = parse_generation_request(payload).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let state = app_state.clone();
    actix_web::rt::spawn(async move {
        run_generation(&state, request, tx).await;
    });

    let body = UnboundedReceiverStream::new(rx)
        .map(|event| Ok::<Bytes, actix_web::Error>(event.to_frame()));
    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(body))
}

/// Non-streaming variant: same pipeline, single JSON response.
#[post("/v1/generate/sync")]
pub async fn generate_sync(
    payload: Multipart,
    app_state: web::Data<RelayState>,
) -> std::result::Result<HttpResponse, RelayError> {
    let request = parse_generation_request(payload).await?;
    let response = run_generation_sync(&app_state, request).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Received → Validating: drain the multipart payload into a
/// `GenerationRequest`. The image part is size-capped while it streams in so
/// an oversized upload is rejected without buffering all of it.
async fn parse_generation_request(mut payload: Multipart) -> Result<GenerationRequest> {
    let mut fields = RequestFields::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| {
            RelayError::Validation(format!("malformed multipart payload: {e}"))
        })?;
        let name = field.name().unwrap_or("").to_string();

        if name == "image" {
            let mime = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_default();
            let filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .unwrap_or("upload")
                .to_string();
            let mut data = web::BytesMut::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|e| {
                    RelayError::Validation(format!("failed to read image upload: {e}"))
                })?;
                if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                    return Err(RelayError::Validation(
                        "image is too large: the limit is 10 MiB".to_string(),
                    ));
                }
                data.extend_from_slice(&chunk);
            }
            fields.image = Some(crate::io_struct::UploadedImage {
                filename,
                mime,
                bytes: data.freeze(),
            });
        } else {
            let mut value = Vec::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|e| {
                    RelayError::Validation(format!("failed to read field `{name}`: {e}"))
                })?;
                value.extend_from_slice(&chunk);
            }
            let text = String::from_utf8(value).map_err(|_| {
                RelayError::Validation(format!("field `{name}` is not valid UTF-8"))
            })?;
            fields.set_text(&name, text);
        }
    }

    fields.finish()
}

pub async fn startup(config: RelayConfig, state: RelayState) -> std::io::Result<()> {
    let app_state = web::Data::new(state);

    println!("Starting server at {}:{}", config.host, config.port);

    // default level is info
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .init();

    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(app_state.clone())
            .service(health)
            .service(generate)
            .service(generate_sync)
    })
    .bind((config.host.clone(), config.port))?
    .run()
    .await
}
