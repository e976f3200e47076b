use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::models::{AnalyzeRequest, AnalyzeResponse};
use crate::state::AppState;
use crate::taxonomy::PATH_SEPARATOR;

/// GET /api/taxonomy/tree - full tree structure for frontend drop-downs.
pub async fn get_tree(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json((*state.tree_data).clone())
}

/// POST /api/taxonomy/analyze - two-stage classification:
///   1. Resolve the taxonomy path (full search, or restricted to the
///      caller's constraint subtree).
///   2. Predict the defect type among the labels valid for that path.
///
/// A classification that does not resolve is a normal outcome and answers
/// 200 with an empty path and no defect candidates.
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, (StatusCode, String)> {
    let remark = req.remark.trim().to_string();
    if remark.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Remark is required".to_string()));
    }

    let taxonomy = state.path_classifier.taxonomy();

    // ── Step 1: Resolve the taxonomy path ────────────────────
    let constraint = req
        .constraint_path
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let outcome = match constraint {
        Some(constraint) => {
            // User manually corrected the path and asked to re-evaluate
            // below it. Restrict to all known paths under the constraint.
            tracing::info!("Running restricted classification. Constraint: {constraint}");
            let allowed: Vec<String> = taxonomy
                .paths()
                .iter()
                .filter(|p| p.starts_with(constraint))
                .cloned()
                .collect();
            state
                .path_classifier
                .classify_restricted(&remark, &allowed, state.config.path_top_k)
                .await
        }
        None => {
            state
                .path_classifier
                .classify(&remark, state.config.path_top_k)
                .await
        }
    };

    let full_path = match outcome {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("Path classification did not resolve: {e}");
            return Ok(Json(AnalyzeResponse {
                path_segments: Vec::new(),
                full_path: String::new(),
                defect_candidates: Vec::new(),
            }));
        }
    };

    let path_segments: Vec<String> = full_path
        .split(PATH_SEPARATOR)
        .map(str::to_string)
        .collect();

    // ── Step 2: Predict the defect type ──────────────────────
    let allowed_defects: Vec<String> = taxonomy
        .defects_for(&full_path)
        .map(<[String]>::to_vec)
        .unwrap_or_default();

    if allowed_defects.is_empty() {
        tracing::warn!("No defect labels attached to path '{full_path}'.");
    }

    let defect_candidates = match state
        .defect_classifier
        .predict(&remark, &allowed_defects, state.config.defect_top_k)
        .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!("Defect prediction did not resolve: {e}");
            Vec::new()
        }
    };

    Ok(Json(AnalyzeResponse {
        path_segments,
        full_path,
        defect_candidates,
    }))
}
