use crate::api;
use crate::config::Config;
use crate::mailer::{self, Mailer};
use crate::registry::JobRegistry;
use crate::resolver::{ClaudeEstimator, GoogleMaps, Resolver};
use anyhow::Error;
use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::*;

/// Everything a request handler may touch. Owned by the server for its
/// whole lifetime.
#[derive(Clone)]
pub struct AppState {
    pub registry: JobRegistry,
    pub resolver: Resolver,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(resolver: Resolver, mailer: Arc<dyn Mailer>, config: &Config) -> Self {
        AppState {
            registry: JobRegistry::new(mailer.clone(), config.tick()),
            resolver,
            mailer,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let client = reqwest::Client::new();
        let maps = GoogleMaps::new(client.clone(), config.google_maps_api_key.clone());
        let estimator = ClaudeEstimator::new(
            client,
            config.anthropic_api_key.clone(),
            config.anthropic_model.clone(),
        );
        let mailer = mailer::from_config(config)?;

        info!(
            google_maps = maps.is_configured(),
            anthropic = estimator.is_configured(),
            mailer = mailer.name(),
            "External services"
        );

        let resolver = Resolver::new(Arc::new(maps), Arc::new(estimator));
        Ok(AppState::new(resolver, mailer, config))
    }
}

pub fn router(state: AppState, allowed_origin: HeaderValue) -> Router {
    let distance = Router::new()
        .route("/calculate", post(api::calculate))
        .route("/calculate-all", post(api::calculate_all))
        .route("/health", get(api::distance_health));

    let email = Router::new()
        .route("/send", post(api::send_email))
        .route("/status/:job_id", get(api::email_status))
        .route("/jobs", get(api::email_jobs))
        .route("/health", get(api::email_health));

    Router::new()
        .route("/", get(api::index))
        .nest("/api/distance", distance)
        .nest("/api/email", email)
        .layer(middleware::from_fn_with_state(allowed_origin, cors))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    info!(%method, %path, "Request");
    let response = next.run(request).await;
    debug!(%method, %path, status = response.status().as_u16(), "Response");
    response
}

async fn cors(State(origin): State<HeaderValue>, request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    response
}

pub async fn serve(cancel_token: CancellationToken, config: Config) -> Result<(), Error> {
    let state = AppState::from_config(&config)?;
    let allowed_origin = HeaderValue::from_str(&config.frontend_url)?;

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(
        addr = %listener.local_addr()?,
        frontend = %config.frontend_url,
        "SnailMail backend listening"
    );

    serve_on(listener, state, allowed_origin, cancel_token).await
}

/// Serves until `cancel_token` fires, then drains every courier still in
/// transit.
pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    allowed_origin: HeaderValue,
    cancel_token: CancellationToken,
) -> Result<(), Error> {
    let registry = state.registry.clone();
    let app = router(state, allowed_origin);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            debug!("Server Cancelled");
        })
        .await?;

    registry.shutdown().await;
    info!("Server stopped.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::tests::RecordingMailer;
    use crate::resolver::tests::Unavailable;
    use clap::Parser;
    use std::sync::Mutex;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;

    type Events = Arc<Mutex<Vec<(Level, String)>>>;

    struct Capture(Events);

    struct MessageText(String);

    impl Visit for MessageText {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: Subscriber> Layer<S> for Capture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut text = MessageText(String::new());
            event.record(&mut text);
            self.0
                .lock()
                .unwrap()
                .push((*event.metadata().level(), text.0));
        }
    }

    #[tokio::test]
    async fn requests_are_logged_at_info() {
        let events = Events::default();
        let _guard = tracing_subscriber::registry()
            .with(Capture(events.clone()))
            .set_default();

        let config = Config::try_parse_from(["snailmail"]).unwrap();
        let state = AppState::new(
            Resolver::new(Arc::new(Unavailable), Arc::new(Unavailable)),
            Arc::new(RecordingMailer::default()),
            &config,
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let server = tokio::spawn(serve_on(
            listener,
            state,
            HeaderValue::from_static("http://localhost:5173"),
            token.clone(),
        ));

        let response = reqwest::get(format!("http://{addr}/api/distance/health"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        token.cancel();
        server.await.unwrap().unwrap();

        let events = events.lock().unwrap();
        assert!(events
            .iter()
            .any(|(level, message)| *level == Level::INFO && message == "Request"));
    }
}
