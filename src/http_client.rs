use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("fpl_toolkit/", env!("CARGO_PKG_VERSION"));

static SEASON_CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared client for season downloads. `FPL_HTTP_TIMEOUT` (seconds)
/// overrides the request timeout.
pub fn http_client() -> Result<&'static Client> {
    SEASON_CLIENT.get_or_try_init(|| {
        let timeout = request_timeout(env::var("FPL_HTTP_TIMEOUT").ok().as_deref());
        debug!("building season http client, timeout {}s", timeout.as_secs());
        Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build season http client")
    })
}

fn request_timeout(raw: Option<&str>) -> Duration {
    let secs = raw
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_override_falls_back_on_junk() {
        assert_eq!(request_timeout(None), Duration::from_secs(30));
        assert_eq!(request_timeout(Some(" 90 ")), Duration::from_secs(90));
        assert_eq!(request_timeout(Some("0")), Duration::from_secs(30));
        assert_eq!(request_timeout(Some("soon")), Duration::from_secs(30));
    }
}
