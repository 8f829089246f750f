use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::errors::ApiError;
use crate::registry::SourceType;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/admin/knowledge", post(add_knowledge))
        .route("/api/admin/data-mart", post(add_data_mart))
        .route("/api/admin/roles/:role", post(add_role_content))
        .route("/api/admin/sample-data", post(populate_sample_data))
        .route("/api/admin/status", get(collection_status))
        .route("/api/admin/clear", post(clear_collection))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "started_at": state.started_at.to_rfc3339(),
    }))
}

#[derive(Deserialize)]
struct ChatPayload {
    user_id: String,
    role: String,
    query: String,
    data_sources: Option<Vec<String>>,
    session_id: Option<String>,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".to_string()));
    }

    let answer = state
        .engine
        .answer_query(
            &payload.user_id,
            &payload.role,
            &payload.query,
            payload.data_sources.as_deref(),
            payload.session_id,
        )
        .await?;

    Ok(Json(json!({
        "response": answer.response,
        "sources_used": answer.sources_used,
    })))
}

#[derive(Deserialize)]
struct KnowledgePayload {
    /// Pre-extracted document pages (e.g. from a PDF).
    documents: Vec<String>,
    source: String,
}

async fn add_knowledge(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<KnowledgePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let partition = state
        .registry
        .get_or_create(SourceType::CommonKnowledge, "")
        .await?;

    let written = state
        .ingestor
        .ingest_documents(&partition, &payload.documents, &payload.source)
        .await?;

    Ok(Json(json!({
        "message": format!("Added {} chunks to the knowledge base from {}", written, payload.source),
        "chunks_written": written,
    })))
}

#[derive(Deserialize)]
struct DataMartPayload {
    data: Value,
    #[serde(default = "default_data_type")]
    data_type: String,
}

fn default_data_type() -> String {
    "business_data".to_string()
}

async fn add_data_mart(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DataMartPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if !payload.data.is_object() {
        return Err(ApiError::BadRequest(
            "Data mart payload must be a JSON object".to_string(),
        ));
    }

    let partition = state
        .registry
        .get_or_create(SourceType::DataMart, "")
        .await?;

    let written = state
        .ingestor
        .ingest_record(&partition, &payload.data, &payload.data_type)
        .await?;

    Ok(Json(json!({
        "message": format!("Added business data of type {}", payload.data_type),
        "chunks_written": written,
    })))
}

#[derive(Deserialize)]
struct RoleContentPayload {
    content: String,
    source: Option<String>,
}

async fn add_role_content(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    Json(payload): Json<RoleContentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let partition = state
        .registry
        .get_or_create(SourceType::RoleSpecific, &role)
        .await?;

    let source = payload.source.unwrap_or_else(|| "manual".to_string());
    let written = state
        .ingestor
        .ingest_text(&partition, &payload.content, &source)
        .await?;

    Ok(Json(json!({
        "message": format!("Added {} chunks for role {}", written, role),
        "chunks_written": written,
    })))
}

#[derive(Deserialize)]
struct StatusQuery {
    source: Option<String>,
    owner: Option<String>,
}

async fn collection_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(name) = query.source {
        let source = SourceType::parse(&name)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown data source: {name}")))?;
        let owner = query.owner.unwrap_or_default();

        let partition = state.registry.get_or_create(source, &owner).await?;
        return Ok(Json(collection_stats(partition.collection(), partition.count().await?)));
    }

    // Overview of the shared collections.
    let mut overview = serde_json::Map::new();
    for source in SourceType::ALL.into_iter().filter(SourceType::is_shared) {
        let partition = state.registry.get_or_create(source, "").await?;
        overview.insert(
            source.as_str().to_string(),
            collection_stats(partition.collection(), partition.count().await?),
        );
    }

    Ok(Json(Value::Object(overview)))
}

fn collection_stats(collection: &str, count: usize) -> Value {
    json!({
        "collection": collection,
        "document_count": count,
        "status": if count > 0 { "active" } else { "empty" },
    })
}

#[derive(Deserialize)]
struct ClearPayload {
    source: String,
    owner: Option<String>,
}

async fn clear_collection(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ClearPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let source = SourceType::parse(&payload.source).ok_or_else(|| {
        ApiError::BadRequest(format!("Unknown collection: {}", payload.source))
    })?;
    let owner = payload.owner.unwrap_or_default();

    let partition = state.registry.get_or_create(source, &owner).await?;
    let cleared = partition.clear().await?;

    tracing::info!("Cleared {} chunks from {}", cleared, partition.collection());
    Ok(Json(json!({
        "message": format!("Cleared collection {}", partition.collection()),
        "chunks_removed": cleared,
    })))
}

/// Seed the system with a small demonstration corpus: business records
/// for the data mart, guidance for each shipped role, and a user guide
/// for the knowledge base.
async fn populate_sample_data(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let data_mart = state
        .registry
        .get_or_create(SourceType::DataMart, "")
        .await?;

    let gaming_metrics = json!({
        "revenue_metrics": {
            "gaming_revenue": 15000000.0,
            "average_revenue_per_paying_user": 125.0,
            "conversion_to_premium": 0.08,
        },
        "user_engagement": {
            "daily_active_players": 750000,
            "average_session_duration": 45.2,
            "completion_rate": 0.67,
        },
    });
    state
        .ingestor
        .ingest_record(&data_mart, &gaming_metrics, "business_metrics")
        .await?;

    let analytics = json!({
        "user_demographics": {
            "device_usage": {"mobile": 0.65, "desktop": 0.30, "tablet": 0.05},
        },
        "behavior_patterns": [
            "Peak usage hours: 7-9 PM",
            "Weekend engagement 30% higher than weekdays",
        ],
    });
    state
        .ingestor
        .ingest_record(&data_mart, &analytics, "user_analytics")
        .await?;

    let gaming_data = json!({
        "game_performance": {
            "Strategy": {"retention_rate": 0.82, "tournament_participation": 0.43},
            "Puzzle": {"retention_rate": 0.74, "tournament_participation": 0.21},
        },
    });
    state
        .ingestor
        .ingest_record(&data_mart, &gaming_data, "gaming_data")
        .await?;

    let role_contents = [
        (
            "Analyst-Gaming",
            "Gaming Analytics Best Practices:\n\
             1. Track player engagement metrics including session duration, retention rates, and in-game purchases\n\
             2. Use cohort analysis to understand player lifecycle\n\
             3. Implement A/B testing for game features and monetization strategies",
        ),
        (
            "Analyst-Non-Gaming",
            "General Analytics Guidelines:\n\
             1. Focus on user acquisition cost and lifetime value metrics\n\
             2. Analyze conversion funnels and identify optimization opportunities\n\
             3. Use predictive analytics for forecasting and planning",
        ),
        (
            "Leadership-Gaming",
            "Gaming Strategy Leadership Framework:\n\
             1. Define long-term vision for the gaming portfolio\n\
             2. Make strategic decisions on game development investments\n\
             3. Oversee portfolio performance and resource allocation",
        ),
        (
            "Leadership-Non-Gaming",
            "Strategic Leadership Principles:\n\
             1. Develop comprehensive business strategy and vision\n\
             2. Build strong stakeholder relationships\n\
             3. Ensure sustainable growth and profitability",
        ),
    ];

    for (role, content) in role_contents {
        let partition = state
            .registry
            .get_or_create(SourceType::RoleSpecific, role)
            .await?;
        state
            .ingestor
            .ingest_text(&partition, content, "sample_data")
            .await?;
    }

    let knowledge = state
        .registry
        .get_or_create(SourceType::CommonKnowledge, "")
        .await?;
    state
        .ingestor
        .ingest_text(
            &knowledge,
            "Mimir AI Assistant User Guide:\n\
             Mimir helps with business analysis, gaming insights, and strategic decision-making.\n\
             Key features: multi-source data integration, role-based content, conversation history tracking.\n\
             Be specific in your questions and reference previous conversations for continuity.",
            "user_guide",
        )
        .await?;

    Ok(Json(json!({
        "message": "Sample data populated",
        "roles_seeded": role_contents.len(),
    })))
}
