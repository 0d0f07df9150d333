//! Matchit routing configuration.

use std::sync::Arc;

use hyper::{body::Bytes, Method, Request, Response, Uri};
use matchit::Router as MatchitRouter;
use tokio::sync::mpsc;

use crate::handlers;
use crate::handlers::request_utils::read_request_body_with_timeout;
use roster_core::{config::RosterConfig, PersonTable};
use roster_runtime::ApiRequest;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Person table (read directly for the feed and health)
    pub table: Arc<PersonTable>,
    /// Server configuration
    pub config: Arc<RosterConfig>,
    /// API request sender to runtime
    pub api_tx: mpsc::Sender<ApiRequest>,
}

/// HTTP request router.
pub struct Router {
    inner: MatchitRouter<RouteHandler>,
    state: AppState,
}

impl Router {
    /// Creates a new router with the Person routes.
    pub fn new(
        table: Arc<PersonTable>,
        config: Arc<RosterConfig>,
        api_tx: mpsc::Sender<ApiRequest>,
    ) -> Self {
        let mut router = MatchitRouter::new();

        router
            .insert("/rpc/{name}", RouteHandler::Rpc)
            .expect("Failed to insert /rpc/{name} route");
        router
            .insert("/feed", RouteHandler::Feed)
            .expect("Failed to insert /feed route");
        router
            .insert("/health", RouteHandler::Health)
            .expect("Failed to insert /health route");

        Self {
            inner: router,
            state: AppState {
                table,
                config,
                api_tx,
            },
        }
    }

    /// Routes an incoming request to the appropriate handler.
    ///
    /// # Arguments
    /// * `req` - HTTP request
    ///
    /// # Returns
    /// `Result<Response<Bytes>, RouterError>` containing the response or an error.
    pub async fn route<B>(&self, req: Request<B>) -> Result<Response<Bytes>, RouterError>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let body = read_request_body_with_timeout(req, self.state.config.request_timeout_ms).await?;
        self.dispatch(&method, &uri, body).await
    }

    /// Dispatches an already-buffered request.
    pub async fn dispatch(
        &self,
        method: &Method,
        uri: &Uri,
        body: Bytes,
    ) -> Result<Response<Bytes>, RouterError> {
        let path = uri.path();
        match self.inner.at(path) {
            Ok(matched) => {
                matched
                    .value
                    .handle(method, &matched.params, uri.query(), body, self.state.clone())
                    .await
            }
            Err(_) => Err(RouterError::NotFound(format!("No route found for {}", path))),
        }
    }
}

/// Route handler function.
enum RouteHandler {
    Rpc,
    Feed,
    Health,
}

impl RouteHandler {
    /// Handles a request with the given route parameters.
    async fn handle(
        &self,
        method: &Method,
        params: &matchit::Params<'_, '_>,
        query: Option<&str>,
        body: Bytes,
        state: AppState,
    ) -> Result<Response<Bytes>, RouterError> {
        match self {
            RouteHandler::Rpc => {
                if *method == Method::POST || *method == Method::GET {
                    let name = params.get("name").unwrap_or("unknown");
                    handlers::rpc(method, name, body, state).await
                } else {
                    Err(RouterError::MethodNotAllowed)
                }
            }
            RouteHandler::Feed => {
                if method == Method::GET {
                    handlers::poll_feed(query, state).await
                } else {
                    Err(RouterError::MethodNotAllowed)
                }
            }
            RouteHandler::Health => {
                if method == Method::GET {
                    handlers::health(state).await
                } else {
                    Err(RouterError::MethodNotAllowed)
                }
            }
        }
    }
}

/// Router error type.
#[derive(Debug)]
pub enum RouterError {
    MethodNotAllowed,
    InternalError(String),
    Timeout,
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
}

impl RouterError {
    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            RouterError::MethodNotAllowed => 405,
            RouterError::InternalError(_) => 500,
            RouterError::Timeout => 408,
            RouterError::BadRequest(_) => 400,
            RouterError::NotFound(_) => 404,
            RouterError::Unavailable(_) => 503,
        }
    }
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::MethodNotAllowed => write!(f, "Method Not Allowed"),
            RouterError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
            RouterError::Timeout => write!(f, "Request Timeout"),
            RouterError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            RouterError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            RouterError::Unavailable(msg) => write!(f, "Service Unavailable: {}", msg),
        }
    }
}

impl std::error::Error for RouterError {}

impl From<RouterError> for Response<Bytes> {
    fn from(err: RouterError) -> Self {
        let status = err.status();
        let message = match &err {
            RouterError::MethodNotAllowed => "Method Not Allowed".to_string(),
            RouterError::Timeout => "Request Timeout".to_string(),
            RouterError::InternalError(msg)
            | RouterError::BadRequest(msg)
            | RouterError::NotFound(msg)
            | RouterError::Unavailable(msg) => msg.clone(),
        };

        let error_response = handlers::error_response(status, message, None);
        let body = serde_json::to_vec(&error_response).unwrap_or_else(|e| {
            format!(
                "{{\"success\":false,\"error\":{{\"code\":\"500\",\"message\":\"Failed to serialize error: {}\"}}}}",
                e
            )
            .into_bytes()
        });

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() =
            hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::ChangeFeed;

    fn test_router() -> (Router, mpsc::Receiver<ApiRequest>) {
        let table = Arc::new(PersonTable::new(Arc::new(ChangeFeed::new(8))));
        let (api_tx, api_rx) = mpsc::channel(8);
        (
            Router::new(table, Arc::new(RosterConfig::default()), api_tx),
            api_rx,
        )
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (router, _rx) = test_router();
        let err = router
            .dispatch(&Method::GET, &uri("/tables"), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_unknown_procedure_is_not_found() {
        let (router, _rx) = test_router();
        let err = router
            .dispatch(&Method::POST, &uri("/rpc/person.delete"), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_mutation_over_get_is_rejected() {
        let (router, _rx) = test_router();
        let err = router
            .dispatch(&Method::GET, &uri("/rpc/person.create"), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 405);

        let err = router
            .dispatch(&Method::DELETE, &uri("/health"), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 405);
    }

    #[tokio::test]
    async fn test_invalid_update_never_reaches_runtime() {
        let (router, mut rx) = test_router();
        let bodies: [&[u8]; 4] = [
            br#"{"id":"optimistic-1","data":{"field":"age","value":3}}"#,
            br#"{"id":"67e5504410b1426f9247bb680e5fe0c8","data":{"field":"email","value":"x"}}"#,
            br#"{"id":"67e5504410b1426f9247bb680e5fe0c8","data":{"field":"age","value":"41"}}"#,
            br#"not json"#,
        ];
        for body in bodies {
            let err = router
                .dispatch(&Method::POST, &uri("/rpc/person.update"), Bytes::from_static(body))
                .await
                .unwrap_err();
            assert_eq!(err.status(), 400, "{}", String::from_utf8_lossy(body));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_feed_handshake_returns_cursor() {
        let (router, _rx) = test_router();
        let response = router
            .dispatch(&Method::GET, &uri("/feed"), Bytes::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let json: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["cursor"], 0);
        assert_eq!(json["data"]["events"].as_array().unwrap().len(), 0);
        assert_eq!(json["data"]["epoch"], router.state.table.feed().epoch());
    }

    #[test]
    fn test_error_envelope() {
        let response: Response<Bytes> = RouterError::BadRequest("nope".into()).into();
        assert_eq!(response.status(), 400);
        let json: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "400");
        assert_eq!(json["error"]["message"], "nope");
    }
}
