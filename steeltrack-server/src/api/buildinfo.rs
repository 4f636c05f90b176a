//! Build identification endpoint

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BuildInfoResponse {
    version: String,
    git_hash: String,
    build_timestamp: String,
    profile: String,
}

/// GET /api/build-info - build identification captured by build.rs
pub async fn get_build_info() -> Json<BuildInfoResponse> {
    Json(BuildInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        profile: env!("BUILD_PROFILE").to_string(),
    })
}
