// HTTP history repository implementation
use crate::application::history_repository::HistoryRepository;
use crate::domain::history::HistoricalSeries;
use crate::infrastructure::config::endpoint_url;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct HttpHistoryRepository {
    base_url: String,
    client: reqwest::Client,
}

impl HttpHistoryRepository {
    pub fn new(base_url: String) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: String, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get_records(&self, path: &str) -> Result<Vec<Value>> {
        let url = endpoint_url(&self.base_url, path);
        tracing::debug!("Fetching history from {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("History request to {} failed with status {}: {}", url, status, body);
        }

        response
            .json::<Vec<Value>>()
            .await
            .with_context(|| format!("Failed to parse history response from {}", url))
    }
}

#[async_trait]
impl HistoryRepository for HttpHistoryRepository {
    async fn fetch_series(&self, path: &str) -> Result<HistoricalSeries> {
        let records = self.get_records(path).await?;
        let series = HistoricalSeries::from_records(&records);
        tracing::debug!(
            "Normalized {} records from {} into {} series",
            records.len(),
            path,
            series.names().count()
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer a single HTTP request with the given status line and body.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = stream.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        });
        format!("http://{}", addr)
    }

    fn repository(base: String) -> HttpHistoryRepository {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpHistoryRepository::with_client(base, client)
    }

    #[tokio::test]
    async fn test_fetch_series_normalizes_records() {
        let base = serve_once(
            "200 OK",
            r#"[{"timestamp":"2024-05-01T10:00:00Z","soil_pct":40,"soil_temp":18.2},{"timestamp":"2024-05-01T10:05:00Z","soil_pct":41,"soil_temp":null}]"#,
        )
        .await;
        let repo = repository(base);

        let series = repo.fetch_series("/api/charts/24h").await.unwrap();

        assert_eq!(series.get("soil_pct").unwrap().len(), 2);
        assert_eq!(series.get("soil_temp").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_series_reports_http_errors() {
        let base = serve_once("503 Service Unavailable", r#"{"error":"db down"}"#).await;
        let repo = repository(base);

        let err = repo.fetch_series("/api/charts/24h").await.unwrap_err();
        assert!(format!("{:#}", err).contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_series_rejects_non_array_body() {
        let base = serve_once("200 OK", r#"{"soil_pct":40}"#).await;
        let repo = repository(base);

        let err = repo.fetch_series("/api/charts/24h").await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse history response"));
    }
}
