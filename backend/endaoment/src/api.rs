//! Axum REST API handlers: deployment records and reference data for the
//! front end.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::{self, DeploymentView};
use crate::errors::Result;
use crate::format::{self, Projection, FIXED_APY};
use crate::universities::{self, University};

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/deployments/:network", get(get_network_deployments))
        .route("/deployments/:network/:name", get(get_deployment))
        .route("/universities", get(list_universities))
        .route("/universities/:id", get(get_university))
        .route("/universities/wallet/:wallet", get(get_university_by_wallet))
        .route("/projections", get(get_projections))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct DeploymentsResponse {
    pub network: String,
    pub count: usize,
    pub deployments: Vec<DeploymentView>,
}

#[derive(Serialize)]
pub struct UniversitiesResponse {
    pub count: usize,
    pub universities: Vec<&'static University>,
}

#[derive(Serialize)]
pub struct ProjectionsResponse {
    pub principal: f64,
    pub apy: f64,
    pub projections: Vec<Projection>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize)]
pub struct ProjectionQuery {
    pub principal: f64,
    pub apy: Option<f64>,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!(ErrorResponse {
            error: message.into()
        })),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn network_views(pool: &SqlitePool, network: &str) -> Result<Vec<DeploymentView>> {
    db::list_deployments(pool, network)
        .await?
        .iter()
        .map(|record| record.view())
        .collect()
}

/// `GET /deployments/:network`
///
/// Every contract recorded for the network, by name.
pub async fn get_network_deployments(
    State(state): State<Arc<ApiState>>,
    Path(network): Path<String>,
) -> Response {
    match network_views(&state.pool, &network).await {
        Ok(deployments) => {
            let count = deployments.len();
            (
                StatusCode::OK,
                Json(serde_json::json!(DeploymentsResponse {
                    network,
                    count,
                    deployments,
                })),
            )
                .into_response()
        }
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /deployments/:network/:name`
pub async fn get_deployment(
    State(state): State<Arc<ApiState>>,
    Path((network, name)): Path<(String, String)>,
) -> Response {
    let record = match db::get_deployment(&state.pool, &network, &name).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return error(
                StatusCode::NOT_FOUND,
                format!("No deployment of {name} recorded on network {network}"),
            )
        }
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    match record.view() {
        Ok(view) => (StatusCode::OK, Json(serde_json::json!(view))).into_response(),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /universities`
pub async fn list_universities() -> impl IntoResponse {
    let universities: Vec<&University> = universities::active().collect();
    Json(UniversitiesResponse {
        count: universities.len(),
        universities,
    })
}

/// `GET /universities/:id`
pub async fn get_university(Path(id): Path<String>) -> Response {
    match universities::by_id(&id) {
        Some(university) => (StatusCode::OK, Json(serde_json::json!(university))).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("Unknown university: {id}")),
    }
}

/// `GET /universities/wallet/:wallet`
pub async fn get_university_by_wallet(Path(wallet): Path<String>) -> Response {
    match universities::by_wallet(&wallet) {
        Some(university) => (StatusCode::OK, Json(serde_json::json!(university))).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("No university uses wallet {wallet}")),
    }
}

/// `GET /projections?principal=&apy=`
///
/// `apy` defaults to the fixed vault APY.
pub async fn get_projections(Query(query): Query<ProjectionQuery>) -> Response {
    let apy = query.apy.unwrap_or(FIXED_APY);
    if !query.principal.is_finite() || query.principal < 0.0 || !apy.is_finite() || apy < 0.0 {
        return error(StatusCode::BAD_REQUEST, "principal and apy must be non-negative numbers");
    }
    Json(ProjectionsResponse {
        principal: query.principal,
        apy,
        projections: format::calculate_projections(query.principal, apy),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::{json, Value};

    use super::*;

    async fn body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn state() -> Arc<ApiState> {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        db::upsert_deployment(
            &pool,
            &db::NewDeployment {
                network: "sim",
                name: "LosslessVault",
                address: "0xc000000000000000000000000000000000000007",
                abi: &json!(["function totalAssets() view returns (uint256)"]),
                args: &json!(["0xc000000000000000000000000000000000000001"]),
                receipt: &json!({"status": true, "blockNumber": 7}),
            },
        )
        .await
        .unwrap();
        Arc::new(ApiState { pool })
    }

    #[tokio::test]
    async fn deployments_by_network_and_name() {
        let state = state().await;

        let response = get_network_deployments(State(state.clone()), Path("sim".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body(response).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["deployments"][0]["receipt"]["blockNumber"], 7);

        let response = get_deployment(
            State(state.clone()),
            Path(("sim".to_string(), "LosslessVault".to_string())),
        )
        .await;
        assert_eq!(body(response).await["address"], "0xc000000000000000000000000000000000000007");

        let response = get_deployment(State(state), Path(("sepolia".to_string(), "LosslessVault".to_string()))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn university_reference_data() {
        let json = body(list_universities().await.into_response()).await;
        assert_eq!(json["count"], 6);

        let response = get_university(Path("tec".to_string())).await;
        assert_eq!(body(response).await["shortName"], "TEC");

        let response = get_university(Path("mit".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            get_university_by_wallet(Path("0x791DC44D843870DEE8832BF9801F0DCBDB1D0618".to_string())).await;
        assert_eq!(body(response).await["id"], "unam");
    }

    #[tokio::test]
    async fn projections_default_to_fixed_apy() {
        let response = get_projections(Query(ProjectionQuery {
            principal: 1000.0,
            apy: None,
        }))
        .await;
        let json = body(response).await;
        assert_eq!(json["apy"], 0.1);
        assert_eq!(json["projections"][4]["yield"], 100.0);

        let response = get_projections(Query(ProjectionQuery {
            principal: -1.0,
            apy: None,
        }))
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn router_serves_health() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = router(state().await);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let json: Value = reqwest::get(format!("http://{address}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(json["status"], "ok");
    }
}
