use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;

const USER_AGENT: &str = concat!("wpt-coverage/", env!("CARGO_PKG_VERSION"));

/// Plain-text GET of an arbitrary URL.
#[async_trait]
pub trait WebClient: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String>;
}

pub struct HttpWebClient {
    client: Client,
}

impl HttpWebClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebClient for HttpWebClient {
    async fn get_text(&self, url: &str) -> Result<String> {
        tracing::debug!(url = url, "Fetching URL");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}
