use serde::{Deserialize, Serialize};

/// Analyze request: a free-text remark, optionally narrowed to a taxonomy
/// subtree when the user corrected the path and asked for a re-evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub remark: String,
    #[serde(default)]
    pub constraint_path: Option<String>,
}

/// One defect-type suggestion with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectCandidate {
    pub label: String,
    pub score: f32,
}

/// Analyze response. An unresolved classification is a normal outcome:
/// empty segments, empty path string, no defect candidates.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub path_segments: Vec<String>,
    pub full_path: String,
    pub defect_candidates: Vec<DefectCandidate>,
}
