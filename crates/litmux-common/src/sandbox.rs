use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::LitmuxError;

const USER_AGENT: &str = "litmux/0.1 (literature aggregation)";

/// An HTTP client that only allows requests to approved literature API hosts.
/// Every request carries the client's hard timeout.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default allowlist and a 30s timeout.
    pub fn new() -> Result<Self, LitmuxError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, LitmuxError> {
        let domains = [
            "eutils.ncbi.nlm.nih.gov", // PubMed
            "export.arxiv.org",        // arXiv
            "api.biorxiv.org",         // bioRxiv
            "localhost",
            "127.0.0.1",
        ];
        let allowlist = domains.iter().map(|d| d.to_string()).collect();

        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LitmuxError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Allows the host of a configured endpoint URL.
    pub fn allow_url_host(&mut self, url: &str) {
        if let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(String::from)) {
            self.allowlist.insert(host);
        }
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else { return false };
        let Some(host) = parsed.host_str() else { return false };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, LitmuxError> {
        if !self.is_allowed(url) {
            return Err(LitmuxError::Security(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allowlist() {
        let c = SandboxClient::new().unwrap();
        assert!(c.is_allowed("https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi"));
        assert!(c.is_allowed("https://export.arxiv.org/api/query"));
        assert!(c.is_allowed("http://127.0.0.1:8080/x"));
        assert!(!c.is_allowed("https://evil.example.com/"));
        assert!(!c.is_allowed("not a url"));
    }

    #[test]
    fn test_allow_url_host() {
        let mut c = SandboxClient::new().unwrap();
        assert!(!c.is_allowed("https://mirror.example.org/api"));
        c.allow_url_host("https://mirror.example.org/api/query");
        assert!(c.is_allowed("https://mirror.example.org/api"));
        assert!(c.get("https://other.example.org/").is_err());
    }
}
