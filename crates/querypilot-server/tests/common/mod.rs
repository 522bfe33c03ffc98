//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use rusqlite::Connection;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use querypilot_config::{AssistantSettings, QueryPilotConfig};
use querypilot_llm::{MockBackend, MockResponse, SharedBackend};
use querypilot_server::{AppState, DataSourceRegistry, Server, ServerConfig};

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client configured for this server.
    pub client: Client,
    /// The scripted model every request talks to.
    pub backend: Arc<MockBackend>,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
    /// Temporary directory holding the SQLite database.
    pub temp_dir: TempDir,
}

impl TestServer {
    /// Start an enabled, configured server with scripted model replies.
    pub async fn start(responses: Vec<MockResponse>) -> Result<Self> {
        Self::start_with_config(
            "[assistant]\nenabled = true\napi_key = \"sk-test\"\n",
            responses,
        )
        .await
    }

    /// Start a server from an `[assistant]` TOML snippet. A `shop` data
    /// source pointing at a fresh SQLite file is always configured.
    pub async fn start_with_config(assistant_toml: &str, responses: Vec<MockResponse>) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = create_shop_db(&temp_dir)?;

        let toml = format!(
            "{}\n[[data_source]]\nid = \"shop\"\nname = \"Shop\"\npath = {:?}\nontology = \"Every order belongs to one customer.\"\n",
            assistant_toml,
            db_path.display().to_string()
        );
        let config = QueryPilotConfig::from_toml(&toml)?;
        let settings = AssistantSettings::resolve_with(&config, |_| None);
        let sources = DataSourceRegistry::from_config(&config.data_sources)?;

        let addr = find_available_port().await?;
        let backend = Arc::new(MockBackend::new(responses));
        let shared: SharedBackend = backend.clone();

        let state = AppState::new(settings, ServerConfig::new().with_bind_address(addr), sources)
            .with_backend_factory(move |_| Ok(shared.clone()));

        let server = Server::from_state(state);
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            backend,
            _handle: handle,
            temp_dir,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    /// Run one chat exchange and collect its events.
    pub async fn chat(&self, body: serde_json::Value) -> Result<Vec<SseEvent>> {
        let resp = self.post("/api/v1/assistant/chat").json(&body).send().await?;
        anyhow::ensure!(resp.status().is_success(), "chat failed: {}", resp.status());
        Ok(parse_sse(&resp.text().await?))
    }
}

/// One parsed server-sent event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: serde_json::Value,
}

/// Split an SSE body into events.
pub fn parse_sse(body: &str) -> Vec<SseEvent> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .filter_map(|frame| {
            let mut event = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    event = Some(rest.to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(rest).ok();
                }
            }
            Some(SseEvent {
                event: event?,
                data: data?,
            })
        })
        .collect()
}

/// A shop database with 12 customers and 240 orders.
fn create_shop_db(dir: &TempDir) -> Result<PathBuf> {
    let path = dir.path().join("shop.db");
    let conn = Connection::open(&path)?;
    conn.execute_batch(
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE orders (
             id INTEGER PRIMARY KEY,
             customer_id INTEGER REFERENCES customers(id),
             total DECIMAL(10, 2),
             placed_on DATE
         );
         WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 12)
         INSERT INTO customers SELECT i, 'customer ' || i FROM n;
         WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 240)
         INSERT INTO orders SELECT i, 1 + (i % 12), i * 2.5, date('2024-01-01', '+' || i || ' days') FROM n;",
    )?;
    Ok(path)
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
