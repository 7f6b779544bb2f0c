use std::env;

/// Default region when `AWS_REGION` is unset.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Where the store client connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Custom endpoint URL (for local DynamoDB).
    pub endpoint_url: Option<String>,
    /// AWS region.
    pub region: String,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `AWS_ENDPOINT_URL` - Custom endpoint (falls back to `DYNAMODB_ENDPOINT_URL`)
    /// - `AWS_REGION` - AWS region (default: "us-east-1")
    pub fn from_env() -> Self {
        Self {
            endpoint_url: env::var("AWS_ENDPOINT_URL")
                .or_else(|_| env::var("DYNAMODB_ENDPOINT_URL"))
                .ok()
                .filter(|url| !url.is_empty()),
            region: env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Returns a display string for the target environment.
    pub fn target_display(&self) -> String {
        match &self.endpoint_url {
            Some(url) => format!("Local DynamoDB ({url})"),
            None => format!("AWS DynamoDB (region: {})", self.region),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
