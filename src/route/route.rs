// SPDX-License-Identifier: GPL-2.0-or-later

//! C5 Route: resolves a `DONGLE|ROUTE_ID` string to an ordered mapping of
//! segment index to `SegmentFiles`, trying the local disk convention first
//! and falling back to the remote route-info endpoint. Grounded on the
//! teacher's disk-convention scanning in `recdb/recdb.rs` (listing a
//! directory, parsing structured names out of its entries).

use common::{RouteId, SegmentFiles};
use fetch::{AbortFlag, FetchOptions, FileSource};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default base URL for the remote route-info endpoint. Overridable via
/// `RouteConfig::api_base` (e.g. for tests against a local mock server).
pub const DEFAULT_API_BASE: &str = "https://api.commadotai.com/v1/route/";

#[derive(Clone, Debug)]
pub struct RouteConfig {
    pub log_root: PathBuf,
    pub api_base: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
            api_base: DEFAULT_API_BASE.to_owned(),
        }
    }
}

fn default_log_root() -> PathBuf {
    std::env::var_os("LOG_ROOT")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| Path::new(&home).join(".comma/media/0/realdata")))
        .unwrap_or_else(|| PathBuf::from("/data/media/0/realdata"))
}

#[derive(Debug, Error)]
pub enum RouteLoadError {
    #[error("route '{0}' has no segments locally or remotely")]
    RouteNotFound(String),
}

impl common::Classify for RouteLoadError {
    fn kind(&self) -> common::ErrorKind {
        common::ErrorKind::RouteNotFound
    }
}

/// Resolves a route id to its ordered segment files, per spec §4.5: try
/// local disk first, fall back to the remote endpoint on a miss.
pub struct Route;

impl Route {
    /// Resolves `route` to its segments. Tries `config.log_root` first;
    /// on a miss, fetches `config.api_base` via `source`.
    pub async fn load(
        route: &RouteId,
        config: &RouteConfig,
        source: &FileSource,
        abort: &AbortFlag,
    ) -> Result<BTreeMap<i64, SegmentFiles>, RouteLoadError> {
        if let Some(local) = load_local(route, &config.log_root).await {
            if !local.is_empty() {
                return Ok(local);
            }
        }

        if let Some(remote) = load_remote(route, config, source, abort).await {
            if !remote.is_empty() {
                return Ok(remote);
            }
        }

        Err(RouteLoadError::RouteNotFound(route.as_str().to_owned()))
    }
}

async fn load_local(route: &RouteId, log_root: &Path) -> Option<BTreeMap<i64, SegmentFiles>> {
    let mut entries = tokio::fs::read_dir(log_root).await.ok()?;
    let mut out: BTreeMap<i64, SegmentFiles> = BTreeMap::new();

    let prefix = format!("{route}--");
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(seg_str) = name.strip_prefix(&prefix) else {
            continue;
        };
        let Ok(seg) = seg_str.parse::<i64>() else {
            continue;
        };

        let dir = entry.path();
        let mut files = SegmentFiles::default();
        let Ok(mut dir_entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(file)) = dir_entries.next_entry().await {
            let Some(file_name) = file.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let path = file.path().to_string_lossy().into_owned();
            assign_local_prefix(&mut files, &file_name, path);
        }
        out.insert(seg, files);
    }

    Some(out)
}

fn assign_local_prefix(files: &mut SegmentFiles, file_name: &str, path: String) {
    if file_name.starts_with("rlog") {
        files.log = Some(path);
    } else if file_name.starts_with("qlog") {
        files.qlog = Some(path);
    } else if file_name.starts_with("fcamera") {
        files.cam = Some(path);
    } else if file_name.starts_with("dcamera") {
        files.dcam = Some(path);
    } else if file_name.starts_with("ecamera") {
        files.ecam = Some(path);
    } else if file_name.starts_with("qcamera") {
        files.qcam = Some(path);
    }
}

#[derive(Debug, Deserialize, Default)]
struct RemoteRouteFiles {
    #[serde(default)]
    cameras: Vec<String>,
    #[serde(default)]
    dcameras: Vec<String>,
    #[serde(default)]
    ecameras: Vec<String>,
    #[serde(default)]
    qcameras: Vec<String>,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    qlogs: Vec<String>,
}

async fn load_remote(
    route: &RouteId,
    config: &RouteConfig,
    source: &FileSource,
    abort: &AbortFlag,
) -> Option<BTreeMap<i64, SegmentFiles>> {
    let url = format!("{}{}/files", config.api_base, route.as_str());
    let bytes = source.fetch(&url, &FetchOptions::default(), abort).await.ok()?;
    let parsed: RemoteRouteFiles = serde_json::from_slice(&bytes).ok()?;

    let mut out: BTreeMap<i64, SegmentFiles> = BTreeMap::new();
    assign_remote_urls(&mut out, &parsed.logs, |f, u| f.log = Some(u));
    assign_remote_urls(&mut out, &parsed.qlogs, |f, u| f.qlog = Some(u));
    assign_remote_urls(&mut out, &parsed.cameras, |f, u| f.cam = Some(u));
    assign_remote_urls(&mut out, &parsed.dcameras, |f, u| f.dcam = Some(u));
    assign_remote_urls(&mut out, &parsed.ecameras, |f, u| f.ecam = Some(u));
    assign_remote_urls(&mut out, &parsed.qcameras, |f, u| f.qcam = Some(u));

    Some(out)
}

fn assign_remote_urls(
    out: &mut BTreeMap<i64, SegmentFiles>,
    urls: &[String],
    assign: impl Fn(&mut SegmentFiles, String),
) {
    for url in urls {
        let Some(seg) = extract_segment_index(url) else {
            continue;
        };
        assign(out.entry(seg).or_default(), url.clone());
    }
}

/// Pulls the segment index out of a URL of the form `.../<seg>/name.ext`,
/// per spec §6's "element URLs encode the segment index as the `…/<seg>/…`
/// path component."
fn extract_segment_index(url: &str) -> Option<i64> {
    let path = url.split('?').next().unwrap_or(url);
    let mut parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    parts.pop()?;
    parts.pop()?.parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn extracts_segment_index_from_url() {
        assert_eq!(
            extract_segment_index("https://host/dongle/route/3/fcamera.hevc"),
            Some(3)
        );
        assert_eq!(extract_segment_index("https://host/fcamera.hevc"), None);
    }

    #[tokio::test]
    async fn local_scan_finds_segment_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let route = RouteId::from_str("dongle|route").expect("parse");
        let seg_dir = dir.path().join(format!("{route}--0"));
        tokio::fs::create_dir_all(&seg_dir).await.expect("mkdir");
        tokio::fs::write(seg_dir.join("rlog.bz2"), b"x").await.expect("write");
        tokio::fs::write(seg_dir.join("fcamera.hevc"), b"y").await.expect("write");

        let found = load_local(&route, dir.path()).await.expect("scan");
        let files = found.get(&0).expect("segment 0 present");
        assert!(files.log.is_some());
        assert!(files.cam.is_some());
    }

    #[tokio::test]
    async fn missing_route_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let route = RouteId::from_str("dongle|route").expect("parse");
        let config = RouteConfig {
            log_root: dir.path().to_path_buf(),
            api_base: "http://127.0.0.1:0/".to_owned(),
        };
        let source = FileSource::new(None);
        let err = Route::load(&route, &config, &source, &AbortFlag::new())
            .await
            .expect_err("should fail");
        assert!(matches!(err, RouteLoadError::RouteNotFound(_)));
    }
}
