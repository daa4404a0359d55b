use crate::config::Listener as ListenerConfig;
use crate::device_config::{DeviceConfigError, DeviceConfigRequest, DeviceConfigService};
use crate::metrics_defs::DEVICE_CONFIG_REQUESTS;
use crate::service::{PlantService, PlantsError};
use crate::types::PlantsResponse;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Map, Value};
use shared::counter;
use tokio::net::TcpListener;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(thiserror::Error, Debug)]
pub enum PlantsApiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Routes of the public listener. `/device-config` is only mounted when a
/// device configuration store is configured.
pub fn router(plants: PlantService, device_config: Option<DeviceConfigService>) -> Router {
    let app = Router::new()
        .route("/plants", get(list_plants))
        .with_state(plants);

    match device_config {
        Some(device_config) => app.merge(
            Router::new()
                .route("/device-config", post(get_device_config))
                .with_state(device_config),
        ),
        None => app,
    }
}

pub async fn serve(listener: ListenerConfig, app: Router) -> Result<(), PlantsApiError> {
    let addr = format!("{}:{}", listener.host, listener.port);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn list_plants(
    State(service): State<PlantService>,
    headers: HeaderMap,
) -> Result<Json<PlantsResponse>, PlantsError> {
    // A header that is not valid text is treated like a missing one.
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    service.list_plants(authorization).await.map(Json)
}

async fn get_device_config(
    State(service): State<DeviceConfigService>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Map<String, Value>>, DeviceConfigError> {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    let result = match DeviceConfigRequest::from_slice(&body) {
        Ok(request) => service.resolve(&request, request_id).await,
        Err(e) => Err(e),
    };

    let outcome = if result.is_ok() { "ok" } else { "error" };
    counter!(DEVICE_CONFIG_REQUESTS, "outcome" => outcome).increment(1);

    result.map(Json)
}

#[derive(Serialize)]
struct ApiErrorResponse {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for PlantsError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PlantsError::MissingAuthorization => {
                (StatusCode::UNAUTHORIZED, "Missing Authorization header")
            }
            PlantsError::Auth(e) if e.is_credential_error() => {
                (StatusCode::UNAUTHORIZED, "Invalid token")
            }
            PlantsError::Auth(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify token"),
            PlantsError::Membership(_) | PlantsError::Catalog(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load plants")
            }
        };

        let detail = match &self {
            PlantsError::MissingAuthorization => None,
            error => Some(error.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "Failed to serve plants request");
        } else {
            tracing::info!(error = %self, "Rejected plants request");
        }

        (status, Json(ApiErrorResponse { message, detail })).into_response()
    }
}

#[derive(Serialize)]
struct DeviceConfigErrorResponse {
    error: String,
}

impl IntoResponse for DeviceConfigError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Failed to serve device config request");

        let body = Json(DeviceConfigErrorResponse {
            error: self.to_string(),
        });

        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BatchCatalogFetcher;
    use crate::membership::MembershipResolver;
    use crate::memory::MemoryDeviceConfigStore;
    use crate::store::{DeviceConfigStore, StoreError};
    use crate::testutils::{
        FailingMembershipStore, RecordingCatalogStore, RecordingMembershipStore, StaticVerifier,
    };
    use crate::types::Subject;
    use crate::verifier::AuthError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn verifier() -> Arc<StaticVerifier> {
        Arc::new(StaticVerifier::new([
            ("good-token", Ok(Subject::new("user-1"))),
            ("stranger", Ok(Subject::new("user-2"))),
            ("expired-token", Err(AuthError::Expired)),
            (
                "jwks-down",
                Err(AuthError::KeySetUnavailable("connection refused".into())),
            ),
        ]))
    }

    fn plants_service() -> PlantService {
        PlantService::new(
            verifier(),
            MembershipResolver::new(Arc::new(RecordingMembershipStore::new([(
                "user-1",
                vec!["p3", "p1", "p3", "p2"],
            )]))),
            BatchCatalogFetcher::new(
                Arc::new(RecordingCatalogStore::new([("p1", "Alpha"), ("p2", "Beta")])),
                4,
            ),
        )
    }

    async fn get_plants(app: Router, authorization: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri("/plants");
        if let Some(authorization) = authorization {
            request = request.header("authorization", authorization);
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        into_parts(response).await
    }

    async fn into_parts(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_list_plants() {
        let app = router(plants_service(), None);

        let (status, body) = get_plants(app, Some("Bearer good-token")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"plants": [
                {"plant_id": "p3", "plant_name": "(unknown)"},
                {"plant_id": "p1", "plant_name": "Alpha"},
                {"plant_id": "p2", "plant_name": "Beta"},
            ]})
        );
    }

    #[tokio::test]
    async fn test_list_plants_without_memberships() {
        let app = router(plants_service(), None);

        let (status, body) = get_plants(app, Some("bearer stranger")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"plants": []}));
    }

    #[tokio::test]
    async fn test_list_plants_auth_failures() {
        let cases = [
            (
                None,
                StatusCode::UNAUTHORIZED,
                json!({"message": "Missing Authorization header"}),
            ),
            (
                Some("Token good-token"),
                StatusCode::UNAUTHORIZED,
                json!({"message": "Missing Authorization header"}),
            ),
            (
                Some("Bearer expired-token"),
                StatusCode::UNAUTHORIZED,
                json!({"message": "Invalid token", "detail": "token has expired"}),
            ),
            (
                Some("Bearer jwks-down"),
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "message": "Failed to verify token",
                    "detail": "signing keys unavailable: connection refused",
                }),
            ),
        ];

        for (authorization, expected_status, expected_body) in cases {
            let (status, body) = get_plants(router(plants_service(), None), authorization).await;
            assert_eq!(status, expected_status, "{authorization:?}");
            assert_eq!(body, expected_body, "{authorization:?}");
        }
    }

    #[tokio::test]
    async fn test_list_plants_store_failure() {
        let service = PlantService::new(
            verifier(),
            MembershipResolver::new(Arc::new(FailingMembershipStore(StoreError::Unavailable(
                "connection reset".into(),
            )))),
            BatchCatalogFetcher::new(Arc::new(RecordingCatalogStore::new([("p1", "Alpha")])), 4),
        );

        let (status, body) = get_plants(router(service, None), Some("Bearer good-token")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({
                "message": "Failed to load plants",
                "detail": "membership lookup failed: store unavailable: connection reset",
            })
        );
    }

    async fn post_device_config(
        app: Router,
        body: &str,
        request_id: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/device-config")
            .header("content-type", "application/json");
        if let Some(request_id) = request_id {
            request = request.header("x-request-id", request_id);
        }
        let response = app
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        into_parts(response).await
    }

    fn device_config_service() -> DeviceConfigService {
        let Value::Object(defaults) = json!({"camera": {"interval_sec": 60}}) else {
            unreachable!()
        };
        DeviceConfigService::new(Arc::new(MemoryDeviceConfigStore::new(HashMap::from([(
            "acme/DEFAULT".to_string(),
            defaults,
        )]))))
    }

    #[tokio::test]
    async fn test_device_config() {
        let app = router(plants_service(), Some(device_config_service()));

        let (status, body) = post_device_config(
            app,
            r#"{"company": "acme", "mac_addr": "24:6F:28:AA:BB:CC"}"#,
            Some("req-42"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "camera": {"interval_sec": 60},
                "version": {"server": "req-42"},
                "client_cache_ttl_sec": 86400,
            })
        );

        // Without a request id
        let app = router(plants_service(), Some(device_config_service()));
        let (_, body) =
            post_device_config(app, r#"{"company": "acme", "mac_addr": "aa"}"#, None).await;
        assert_eq!(body["version"], json!({"server": "unknown"}));
    }

    #[tokio::test]
    async fn test_device_config_bad_request() {
        let app = router(plants_service(), Some(device_config_service()));

        let (status, body) = post_device_config(app, r#"{"company": "acme"}"#, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("invalid request body: missing field `mac_addr`")
        );
    }

    struct BrokenStore;

    #[async_trait]
    impl DeviceConfigStore for BrokenStore {
        async fn get(
            &self,
            _company: &str,
            _sort_key: &str,
        ) -> Result<Option<Map<String, Value>>, StoreError> {
            Err(StoreError::Timeout("get_item".into()))
        }
    }

    #[tokio::test]
    async fn test_device_config_store_failure() {
        let app = router(
            plants_service(),
            Some(DeviceConfigService::new(Arc::new(BrokenStore))),
        );

        let (status, body) =
            post_device_config(app, r#"{"company": "acme", "mac_addr": "aa"}"#, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "store request timed out: get_item"}));
    }

    #[tokio::test]
    async fn test_device_config_not_mounted() {
        let app = router(plants_service(), None);
        let request = Request::builder()
            .method("POST")
            .uri("/device-config")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
