//! Lexeme analysis of OCR text
//!
//! Sends the combined label text to an external service that answers with
//! a JSON array of `[field, value]` pairs. The service is optional and
//! best effort: anything that goes wrong yields an empty answer.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use super::LexemeAnalyzer;

pub struct HttpLexemeService {
    endpoint: String,
    client: reqwest::Client,
    runtime: Runtime,
}

impl HttpLexemeService {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
            runtime,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<(String, String)>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("text", text)])
            .send()
            .await
            .context("Failed to send analysis request")?;

        if !response.status().is_success() {
            anyhow::bail!("Analysis service answered {}", response.status());
        }

        response
            .json::<Vec<(String, String)>>()
            .await
            .context("Invalid analysis response")
    }
}

impl LexemeAnalyzer for HttpLexemeService {
    fn analyze(&self, text: &str) -> Vec<(String, String)> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        match self.runtime.block_on(self.request(text)) {
            Ok(fields) => {
                debug!("Analysis returned {} fields", fields.len());
                fields
            }
            Err(e) => {
                warn!("OCR analysis unavailable: {:#}", e);
                Vec::new()
            }
        }
    }
}
