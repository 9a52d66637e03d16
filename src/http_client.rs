use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

const USER_AGENT: &str = concat!("matchcast/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build http client")
}
