/// S3 bucket configuration shared by the geopost services
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Bucket that receives uploaded objects
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...)
    pub endpoint: Option<String>,
    /// Base URL that serves the bucket publicly (CDN or storage gateway)
    pub public_base_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Use path-style addressing (`{endpoint}/{bucket}/{key}`)
    pub path_style: bool,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("public_base_url", &self.public_base_url)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "[REDACTED]"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "[REDACTED]"))
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl S3Config {
    /// Publicly reachable URL for an object key
    pub fn public_url(&self, key: &str) -> String {
        if let Some(base) = &self.public_base_url {
            return format!("{}/{}", base.trim_end_matches('/'), key);
        }

        match (&self.endpoint, self.path_style) {
            (Some(endpoint), true) => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key)
            }
            _ => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}
