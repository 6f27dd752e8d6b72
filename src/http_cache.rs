use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};

const CACHE_VERSION: u32 = 1;
const APP_DIR: &str = "fpl_toolkit";
const HTTP_DIR: &str = "http";

static MEMO: Mutex<Option<HashMap<String, CacheEntry>>> = Mutex::new(None);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    version: u32,
    url: String,
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

/// `$XDG_CACHE_HOME/fpl_toolkit`, else `~/.cache/fpl_toolkit`.
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

/// GETs `url` as text, revalidating a cached copy with ETag / Last-Modified.
/// Returns `Ok(None)` for a 404.
pub fn fetch_text_cached(client: &Client, url: &str) -> Result<Option<String>> {
    let cached = cached_entry(url);

    let mut req = client.get(url);
    if let Some(entry) = cached.as_ref() {
        if let Some(etag) = entry.etag.as_ref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_ref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let resp = req.send().with_context(|| format!("request failed: {url}"))?;
    let status = resp.status();
    if status == StatusCode::NOT_MODIFIED {
        let entry = cached.ok_or_else(|| anyhow!("received 304 without cache body: {url}"))?;
        debug!("cache hit (304) {url}");
        return Ok(Some(entry.body));
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    let headers = resp.headers().clone();
    let bytes = resp
        .bytes()
        .with_context(|| format!("failed reading body: {url}"))?;
    let body = String::from_utf8_lossy(&bytes).into_owned();
    if !status.is_success() {
        return Err(anyhow!("http {status} for {url}"));
    }

    let header_text = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };
    let entry = CacheEntry {
        version: CACHE_VERSION,
        url: url.to_string(),
        body: body.clone(),
        etag: header_text(ETAG),
        last_modified: header_text(LAST_MODIFIED),
        fetched_at: system_time_to_secs(SystemTime::now()).unwrap_or_default(),
    };
    if let Err(err) = store_entry(entry) {
        debug!("http cache not written for {url}: {err:#}");
    }
    Ok(Some(body))
}

fn cached_entry(url: &str) -> Option<CacheEntry> {
    let mut guard = MEMO.lock().unwrap_or_else(|e| e.into_inner());
    let memo = guard.get_or_insert_with(HashMap::new);
    if let Some(entry) = memo.get(url) {
        return Some(entry.clone());
    }
    let raw = fs::read_to_string(entry_path(url)?).ok()?;
    let entry = serde_json::from_str::<CacheEntry>(&raw).ok()?;
    if entry.version != CACHE_VERSION || entry.url != url {
        return None;
    }
    memo.insert(url.to_string(), entry.clone());
    Some(entry)
}

fn store_entry(entry: CacheEntry) -> Result<()> {
    if let Some(path) = entry_path(&entry.url)
        && let Some(dir) = path.parent()
    {
        fs::create_dir_all(dir).context("create http cache dir")?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&entry).context("serialize http cache entry")?;
        fs::write(&tmp, json).context("write http cache entry")?;
        fs::rename(&tmp, &path).context("swap http cache entry")?;
    }
    let mut guard = MEMO.lock().unwrap_or_else(|e| e.into_inner());
    guard
        .get_or_insert_with(HashMap::new)
        .insert(entry.url.clone(), entry);
    Ok(())
}

fn entry_path(url: &str) -> Option<PathBuf> {
    let dir = app_cache_dir()?.join(HTTP_DIR);
    Some(dir.join(format!("{}.json", cache_key(url))))
}

/// File-system safe key: the URL after the scheme with every
/// non-alphanumeric run collapsed to `_`.
fn cache_key(url: &str) -> String {
    let tail = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let mut out = String::with_capacity(tail.len());
    for ch in tail.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_path_safe() {
        assert_eq!(
            cache_key("https://example.org/data/2020-21/gws/gw1.csv"),
            "example_org_data_2020-21_gws_gw1_csv"
        );
    }
}
