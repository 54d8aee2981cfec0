use crate::app::AppState;
use crate::error::{AppError, AppResult};
use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;

const APK_MEDIA_TYPE: &str = "application/vnd.android.package-archive";
const DOWNLOAD_PATH: &str = "/api/update/download";

#[derive(Debug, Clone, Copy)]
pub struct ReleaseInfo {
    pub latest_version: &'static str,
    pub min_version: &'static str,
    pub force_update: bool,
    pub update_description: &'static str,
}

pub const CURRENT_RELEASE: ReleaseInfo = ReleaseInfo {
    latest_version: "1.0.6",
    min_version: "1.0.6",
    force_update: false,
    update_description: "1. Updated the app logo\n2. Fixed the temperature setting in the settings center",
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version component {0:?}")]
pub struct VersionError(pub String);

/// Compares dotted numeric versions; the shorter one is padded with zeros,
/// so `1.0` equals `1.0.0`.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let left = parse_version(a)?;
    let right = parse_version(b)?;
    let len = left.len().max(right.len());
    for idx in 0..len {
        let l = left.get(idx).copied().unwrap_or(0);
        let r = right.get(idx).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }
    Ok(Ordering::Equal)
}

fn parse_version(version: &str) -> Result<Vec<u64>, VersionError> {
    version
        .split('.')
        .map(|part| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| VersionError(part.to_string()))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    #[serde(default)]
    pub current_version: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UpdateCheck {
    pub need_update: bool,
    pub latest_version: String,
    pub force_update: bool,
    pub update_description: String,
    pub download_url: Option<String>,
}

pub fn check_against(
    release: &ReleaseInfo,
    current_version: &str,
) -> Result<UpdateCheck, VersionError> {
    let need_update = compare_versions(current_version, release.latest_version)?.is_lt();
    let below_minimum = compare_versions(current_version, release.min_version)?.is_lt();
    Ok(UpdateCheck {
        need_update,
        latest_version: release.latest_version.to_string(),
        force_update: below_minimum || release.force_update,
        update_description: release.update_description.to_string(),
        download_url: need_update.then(|| DOWNLOAD_PATH.to_string()),
    })
}

pub async fn check_update(Query(query): Query<CheckQuery>) -> Response {
    let Some(current) = query
        .current_version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return Json(json!({ "error": "current_version is required" })).into_response();
    };
    match check_against(&CURRENT_RELEASE, current) {
        Ok(check) => Json(check).into_response(),
        Err(err) => {
            tracing::debug!(current_version = current, "rejecting update check: {err}");
            Json(json!({ "error": "invalid version format" })).into_response()
        }
    }
}

pub async fn download_apk(State(state): State<AppState>) -> AppResult<Response> {
    let dir = state.runtime.apk_dir.clone();
    let Some(path) = find_apk(&dir)
        .await
        .map_err(|err| AppError::internal("apk_dir_unreadable", err.to_string()))?
    else {
        return Ok(Json(json!({ "error": "no apk file found" })).into_response());
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(json!({ "error": "apk file does not exist" })).into_response());
        }
        Err(err) => return Err(AppError::internal("apk_read_failed", err.to_string())),
    };
    let len = file
        .metadata()
        .await
        .map_err(|err| AppError::internal("apk_read_failed", err.to_string()))?
        .len();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::debug!(file = %filename, bytes = len, "serving apk");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, APK_MEDIA_TYPE)
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "")),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|err| AppError::internal("response_build_failed", err.to_string()))
}

/// First `*.apk` file in `dir`, by file name.
pub async fn find_apk(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut apks = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_apk = path.extension().is_some_and(|ext| ext == "apk");
        if is_apk && entry.file_type().await?.is_file() {
            apks.push(path);
        }
    }
    apks.sort();
    Ok(apks.into_iter().next())
}
