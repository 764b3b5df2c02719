//! Content references for ID documents and metadata.
//!
//! With an IPFS HTTP API configured, files are added through `/api/v0/add`
//! and the returned CID is used. Without one, a deterministic `local-<keccak>`
//! reference is produced so registrations still carry a document reference.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::abi;
use crate::errors::{EndaomentError, Result};

pub const DEFAULT_GATEWAY: &str = "https://ipfs.io/ipfs";

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

pub struct IpfsClient {
    http: Client,
    api_url: Option<String>,
    gateway: String,
}

impl IpfsClient {
    pub fn new(api_url: Option<String>) -> Self {
        IpfsClient {
            http: Client::new(),
            api_url: api_url.map(|url| url.trim_end_matches('/').to_string()),
            gateway: DEFAULT_GATEWAY.to_string(),
        }
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into().trim_end_matches('/').to_string();
        self
    }

    pub fn gateway_url(&self, hash: &str) -> String {
        format!("{}/{hash}", self.gateway)
    }

    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let Some(api_url) = &self.api_url else {
            let reference = local_reference(&bytes);
            info!("No IPFS API configured, using {reference} for {file_name}");
            return Ok(reference);
        };

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));
        let response = self
            .http
            .post(format!("{api_url}/api/v0/add"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EndaomentError::Rpc(format!(
                "IPFS add failed with HTTP {}",
                response.status()
            )));
        }
        let added: AddResponse = response.json().await?;
        info!("Uploaded {file_name} to IPFS: {}", added.hash);
        Ok(added.hash)
    }

    pub async fn upload_metadata(&self, metadata: &Value) -> Result<String> {
        self.upload("metadata.json", serde_json::to_vec(metadata)?).await
    }

    pub async fn download(&self, hash: &str) -> Result<Vec<u8>> {
        let response = self.http.get(self.gateway_url(hash)).send().await?;
        if !response.status().is_success() {
            return Err(EndaomentError::Rpc(format!(
                "IPFS gateway returned HTTP {} for {hash}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn local_reference(bytes: &[u8]) -> String {
    format!("local-{}", hex::encode(abi::keccak256(bytes)))
}
