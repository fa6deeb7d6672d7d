use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{info, warn};

use crate::pipeline::HtmlTranslator;
use crate::settings;

use super::models::{
    ErrorResponse, HealthResponse, TestResponse, TranslateHtmlRequest, TranslateHtmlResponse,
};
use super::state::ServerState;
use super::translate::translate_request;

const SERVICE_NAME: &str = "HTML Translator";

pub async fn run_server(
    settings: settings::Settings,
    addr: String,
    models: Vec<String>,
    key: Option<String>,
) -> Result<()> {
    let client = reqwest::Client::new();
    let translator = match crate::build_gateway_chain(&settings, &client, &models, key.as_deref())
    {
        Ok(chain) => {
            info!("gateway chain: {}", crate::Gateway::name(&chain));
            Some(HtmlTranslator::new(chain, settings.pipeline_options()))
        }
        Err(err) => {
            warn!("starting without a default gateway: {:#}", err);
            None
        }
    };
    let state = Arc::new(ServerState {
        settings,
        client,
        key,
        translator,
    });
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address {}", addr))?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/test", get(test))
        .route("/translate-html", post(translate_html))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

/// `configured` with its port replaced by `port` when that parses.
pub fn listen_addr(configured: &str, port: Option<&str>) -> String {
    let Some(port) = port.and_then(|port| port.trim().parse::<u16>().ok()) else {
        return configured.to_string();
    };
    let host = configured
        .rsplit_once(':')
        .map(|(host, _)| host)
        .filter(|host| !host.is_empty())
        .unwrap_or("0.0.0.0");
    format!("{}:{}", host, port)
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        gateways: state.gateway_names(),
    })
}

async fn test(State(state): State<Arc<ServerState>>) -> Json<TestResponse> {
    Json(TestResponse {
        message: "Service is running!",
        gateway_configured: state.translator.is_some(),
    })
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

/// Awaited in place: dropping this future (client gone, outer timeout) drops
/// every in-flight gateway call with it.
async fn translate_html(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<TranslateHtmlRequest>,
) -> Result<Json<TranslateHtmlResponse>, (StatusCode, Json<ErrorResponse>)> {
    match translate_request(state.as_ref(), payload).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            warn!("translate-html failed ({}): {}", err.status, err.message);
            Err((
                err.status,
                Json(ErrorResponse {
                    success: false,
                    error: err.message,
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayChain;
    use crate::gateway::testing::StubGateway;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn port_variable_replaces_configured_port() {
        assert_eq!(listen_addr("0.0.0.0:5000", Some("8080")), "0.0.0.0:8080");
        assert_eq!(listen_addr("127.0.0.1:5000", None), "127.0.0.1:5000");
        assert_eq!(listen_addr("127.0.0.1:5000", Some("not-a-port")), "127.0.0.1:5000");
        assert_eq!(listen_addr("localhost", Some("9000")), "0.0.0.0:9000");
    }

    #[tokio::test]
    async fn health_lists_no_gateways_without_translator() {
        let state = Arc::new(ServerState {
            settings: settings::Settings::default(),
            client: reqwest::Client::new(),
            key: None,
            translator: None,
        });
        let Json(body) = health(State(state.clone())).await;
        assert_eq!(body.status, "healthy");
        assert!(body.gateways.is_empty());
        let Json(body) = test(State(state)).await;
        assert!(!body.gateway_configured);
    }

    #[tokio::test]
    async fn dropping_the_request_cancels_gateway_calls() {
        let finished = Arc::new(AtomicUsize::new(0));
        let replies = finished.clone();
        let stub = Arc::new(
            StubGateway::new("slow", move |request| {
                replies.fetch_add(1, Ordering::SeqCst);
                Ok(request.items.clone())
            })
            .with_delay(Duration::from_millis(200)),
        );
        let settings = settings::Settings::default();
        let chain = GatewayChain::new(Duration::from_secs(5)).with_gateway(stub.clone());
        let state = Arc::new(ServerState {
            translator: Some(HtmlTranslator::new(chain, settings.pipeline_options())),
            settings,
            client: reqwest::Client::new(),
            key: None,
        });
        let payload = TranslateHtmlRequest {
            html: Some("<p>Hello</p>".to_string()),
            target_lang: Some("fr".to_string()),
            ..Default::default()
        };

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            translate_html(State(state), Json(payload)),
        )
        .await;
        assert!(abandoned.is_err());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(stub.call_count(), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
