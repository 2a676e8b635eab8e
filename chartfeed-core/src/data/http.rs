//! REST backend client.
//!
//! Thin blocking wrapper over the brokerage backend's JSON endpoints: the
//! historical-bars query, the backtest/strategy order listings and the asset
//! list. Status codes map onto [`DataError`]; nothing is retried here.

use super::provider::{
    AssetSource, BarQuery, BarSource, DataError, FillScope, FillSource, RawBar, RawFill,
};
use chrono::SecondsFormat;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Bars endpoint body: either `{"bars": [...]}` (bars may be null) or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BarsResponse {
    Wrapped { bars: Option<Vec<RawBar>> },
    Bare(Vec<RawBar>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FillsResponse {
    Wrapped {
        #[serde(alias = "orders")]
        trades: Vec<RawFill>,
    },
    Bare(Vec<RawFill>),
}

#[derive(Debug, Deserialize)]
struct Asset {
    symbol: String,
    #[serde(default = "default_tradable")]
    tradable: bool,
}

fn default_tradable() -> bool {
    true
}

pub struct RestClient {
    client: reqwest::blocking::Client,
    base: Url,
    account_id: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chartfeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Config(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.into();
        let base = Url::parse(&base_url)
            .map_err(|e| DataError::Config(format!("invalid base URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(DataError::Config(format!(
                "base URL '{base_url}' cannot carry a path"
            )));
        }

        Ok(Self {
            client,
            base,
            account_id: account_id.into(),
            token,
        })
    }

    /// Append path segments to the base URL. Each segment is percent-encoded,
    /// so a `/` inside a symbol or id stays within its segment.
    fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }

    pub fn bars_url(&self, symbol: &str) -> String {
        self.endpoint(&["accounts", self.account_id.as_str(), "bars", symbol])
    }

    pub fn fills_url(&self, scope: &FillScope) -> String {
        match scope {
            FillScope::Backtest(id) => self.endpoint(&["backtests", id.as_str(), "trades"]),
            FillScope::Strategy(id) => self.endpoint(&["strategies", id.as_str(), "orders"]),
        }
    }

    pub fn assets_url(&self) -> String {
        self.endpoint(&["accounts", self.account_id.as_str(), "assets"])
    }

    /// Query-string pairs for a bars request.
    pub fn bars_params(query: &BarQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("timeframe", query.timeframe.as_str().to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(start) = query.start {
            params.push(("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(end) = query.end {
            params.push(("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        params
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&'static str, String)],
        resource: &str,
    ) -> Result<T, DataError> {
        let mut req = self.client.get(url).query(params);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        let status = resp.status();
        debug!(%url, status = status.as_u16(), "backend response");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationRequired(format!(
                "backend refused {resource} (HTTP {status})"
            )));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DataError::NotFound {
                resource: resource.to_string(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !status.is_success() {
            return Err(DataError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        resp.json::<T>().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse {resource}: {e}"))
        })
    }
}

/// Unwrap a bars body.
fn bars_from(resp: BarsResponse) -> Vec<RawBar> {
    match resp {
        BarsResponse::Wrapped { bars } => bars.unwrap_or_default(),
        BarsResponse::Bare(bars) => bars,
    }
}

fn fills_from(resp: FillsResponse) -> Vec<RawFill> {
    match resp {
        FillsResponse::Wrapped { trades } => trades,
        FillsResponse::Bare(fills) => fills,
    }
}

/// Tradable symbols, sorted and unique.
fn tradable_symbols(assets: Vec<Asset>) -> Vec<String> {
    let mut symbols: Vec<String> = assets
        .into_iter()
        .filter(|a| a.tradable)
        .map(|a| a.symbol)
        .collect();
    symbols.sort();
    symbols.dedup();
    symbols
}

impl BarSource for RestClient {
    fn name(&self) -> &str {
        "rest"
    }

    fn fetch_bars(&self, query: &BarQuery) -> Result<Vec<RawBar>, DataError> {
        let url = self.bars_url(&query.symbol);
        let resource = format!("bars for {}", query.symbol);
        let resp: BarsResponse = self.get_json(&url, &Self::bars_params(query), &resource)?;
        Ok(bars_from(resp))
    }
}

impl FillSource for RestClient {
    fn fetch_fills(&self, scope: &FillScope) -> Result<Vec<RawFill>, DataError> {
        let url = self.fills_url(scope);
        let resp: FillsResponse = self.get_json(&url, &[], "order listing")?;
        Ok(fills_from(resp))
    }
}

impl AssetSource for RestClient {
    fn fetch_symbols(&self) -> Result<Vec<String>, DataError> {
        let url = self.assets_url();
        let assets: Vec<Asset> = self.get_json(&url, &[], "asset list")?;
        Ok(tradable_symbols(assets))
    }
}
