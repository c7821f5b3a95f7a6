// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use crate::error::{ReportError, Result};
use crate::exchange_rates::{extract_csv, RateTable};
use log::{info, warn};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ECB_HISTORY_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-hist.zip";
pub const CACHE_FILE_NAME: &str = "eurofxref-hist.csv";

#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    async fn load(&self) -> Result<RateTable>;
}

/// Downloads the ECB reference-rate history.
pub struct EcbClient {
    client: Client,
    url: String,
    cache_dir: Option<PathBuf>,
}

impl EcbClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::SourceUnavailable(format!("HTTP client setup: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            cache_dir: None,
        })
    }

    /// Keep a copy of the raw CSV in `dir` after each successful download.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    async fn fetch_raw(&self) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ReportError::SourceUnavailable(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::SourceUnavailable(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ReportError::SourceUnavailable(format!("{}: {}", self.url, e)))?;

        Ok(bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl RateSource for EcbClient {
    async fn load(&self) -> Result<RateTable> {
        info!("Fetching ECB reference rates from {}", self.url);
        let payload = self.fetch_raw().await?;
        let csv = extract_csv(&payload)?;

        if let Some(dir) = &self.cache_dir {
            match write_cache(dir, &csv) {
                Ok(path) => info!("Cached raw rates at {}", path.display()),
                Err(e) => warn!("⚠️  Could not cache raw rates in {}: {}", dir.display(), e),
            }
        }

        let table = RateTable::from_csv_reader(csv.as_slice())?;
        info!(
            "✅ Loaded {} days of rates for {} currencies",
            table.rows().len(),
            table.currencies().len()
        );
        Ok(table)
    }
}

/// Reads the CSV left behind by a previous `EcbClient` download.
pub struct CachedRates {
    path: PathBuf,
}

impl CachedRates {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CACHE_FILE_NAME))
    }
}

#[async_trait::async_trait]
impl RateSource for CachedRates {
    async fn load(&self) -> Result<RateTable> {
        info!("Reading cached rates from {}", self.path.display());
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            ReportError::SourceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        RateTable::from_payload(&bytes)
    }
}

fn write_cache(dir: &Path, csv: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(CACHE_FILE_NAME);
    std::fs::write(&path, csv)?;
    Ok(path)
}
