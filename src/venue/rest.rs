use std::time::Duration;

use tracing::warn;

use crate::domain::{Candle, Interval, LeaderboardSnapshot};
use crate::error::{PipelineError, Result};

use super::types::{CandleSnapshotReq, InfoRequest, LeaderboardResponse, RawCandle};

/// Outbound-only REST client for the venue (spec §6, §5 — 30s fetch
/// deadline).
pub struct VenueRestClient {
    http: reqwest::Client,
    info_url: String,
    leaderboard_url: String,
}

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

impl VenueRestClient {
    pub fn new(info_url: impl Into<String>, leaderboard_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            info_url: info_url.into(),
            leaderboard_url: leaderboard_url.into(),
        }
    }

    pub async fn leaderboard(&self) -> Result<LeaderboardSnapshot> {
        let resp = self
            .http
            .get(&self.leaderboard_url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(PipelineError::from)?;

        if !resp.status().is_success() {
            return Err(PipelineError::Transport(format!(
                "leaderboard fetch returned {}",
                resp.status()
            )));
        }

        let body: LeaderboardResponse = resp.json().await.map_err(PipelineError::from)?;
        let rows = body
            .leaderboard_rows
            .into_iter()
            .filter_map(|r| {
                let eth = r.eth_address.clone();
                let row = r.into_row();
                if row.is_none() {
                    warn!(eth, "leaderboard row dropped: unparseable account value");
                }
                row
            })
            .collect();

        Ok(LeaderboardSnapshot {
            fetched_at: chrono::Utc::now().timestamp(),
            rows,
        })
    }

    pub async fn candle_snapshot(
        &self,
        coin: &str,
        interval: Interval,
        start_time_ms: i64,
        end_time_ms: i64,
    ) -> Result<Vec<Candle>> {
        let req = InfoRequest::CandleSnapshot {
            req: CandleSnapshotReq {
                coin: coin.to_string(),
                interval: interval.as_str().to_string(),
                start_time: start_time_ms,
                end_time: end_time_ms,
            },
        };

        let resp = self
            .http
            .post(&self.info_url)
            .json(&req)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(PipelineError::from)?;

        if !resp.status().is_success() {
            return Err(PipelineError::Transport(format!(
                "candleSnapshot returned {}",
                resp.status()
            )));
        }

        let raw: Vec<RawCandle> = resp.json().await.map_err(PipelineError::from)?;
        Ok(raw.into_iter().map(|c| c.into_candle(interval)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_stores_urls() {
        let client = VenueRestClient::new("https://api.hyperliquid.xyz/info", "https://stats.example/leaderboard");
        assert_eq!(client.info_url, "https://api.hyperliquid.xyz/info");
    }
}
