// Public-Investment Forecast Backend - Web Server
// REST API with Axum

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use invest_forecast::{
    get_actions, parse_base_year, BudgetAction, ForecastConfig, ForecastEngine, ForecastError,
    ForecastResponse,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: ForecastConfig,
}

/// Error envelope: {"error": <message>}
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Budget-action reference entry (settings reporting)
#[derive(Serialize)]
struct ActionResponse {
    #[serde(rename = "AcId")]
    id: i64,
    #[serde(rename = "AcCode")]
    code: String,
    #[serde(rename = "AcName")]
    name: String,
}

impl From<BudgetAction> for ActionResponse {
    fn from(action: BudgetAction) -> Self {
        Self {
            id: action.id,
            code: action.code,
            name: action.name,
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "OK" }))
}

/// GET /api/pmt-forecast/:year - Multi-year payment forecast per action
async fn get_pmt_forecast(
    State(state): State<AppState>,
    AxumPath(year): AxumPath<String>,
) -> impl IntoResponse {
    // Reject a malformed base year before the engine runs
    let base_year = match parse_base_year(Some(&year)) {
        Ok(year) => year,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ApiError::new(e.to_string())))
                .into_response();
        }
    };

    let conn = state.db.lock().unwrap();
    let engine = ForecastEngine::new(state.config.clone());

    match engine.forecast(&conn, base_year) {
        Ok(result) => (
            StatusCode::OK,
            Json(ForecastResponse {
                entries: result.entries,
            }),
        )
            .into_response(),
        Err(e) => {
            eprintln!("Error computing forecast for {}: {}", base_year, e);
            let status = match e {
                ForecastError::MissingBaseYear => StatusCode::BAD_REQUEST,
                ForecastError::SourceReadFailure { .. }
                | ForecastError::IncompleteConfiguration { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, Json(ApiError::new(e.to_string()))).into_response()
        }
    }
}

/// GET /api/actions - Budget-action reference list
async fn get_budget_actions(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match get_actions(&conn) {
        Ok(actions) => {
            let response: Vec<ActionResponse> = actions.into_iter().map(|a| a.into()).collect();

            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            eprintln!("Error getting budget actions: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(e.to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌐 Public-Investment Forecast Backend - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Open database
    let db_path = Path::new("invest.db");

    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: cargo run -- init");
        eprintln!("   to create the schema first.");
        std::process::exit(1);
    }

    let conn = Connection::open(db_path).expect("Failed to open database");
    println!("✓ Database opened: {:?}", db_path);

    // Load forecast configuration (unit costs, curves, share ratios)
    let config_path = Path::new("forecast_config.json");
    let config = if config_path.exists() {
        ForecastConfig::load(config_path).expect("Failed to load forecast configuration")
    } else {
        ForecastConfig::default()
    };
    println!("✓ Forecast configuration loaded");

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/pmt-forecast/:year", get(get_pmt_forecast))
        .route("/actions", get(get_budget_actions))
        .with_state(state);

    // Build main router
    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   Forecast: http://localhost:3000/api/pmt-forecast/2025");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
