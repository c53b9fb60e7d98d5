use presence_core::domain::UserRecord;
use presence_core::error::PresenceError;
use presence_core::ports::{Result, UserSource};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, COOKIE, REFERER, USER_AGENT};

pub const DEFAULT_ENDPOINT: &str = "https://onche.org/user/logged";
pub const DEFAULT_REFERER: &str = "https://onche.org/";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:140.0) Gecko/20100101 Firefox/140.0";

/// Request settings for the presence endpoint, including the two session cookies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub referer: String,
    pub auth_cookie: String,
    pub sess_cookie: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            auth_cookie: String::new(),
            sess_cookie: String::new(),
        }
    }
}

impl FetchConfig {
    /// Value of the Cookie header: both cookies joined by "; ", unvalidated
    pub fn cookie_header(&self) -> String {
        format!("{}; {}", self.auth_cookie, self.sess_cookie)
    }
}

/// Keeps the usernames that are present, in payload order
pub fn usernames(records: Vec<UserRecord>) -> Vec<String> {
    records.into_iter().filter_map(|record| record.username).collect()
}

/// Blocking HTTP implementation of the UserSource trait
pub struct HttpUserSource {
    client: Client,
    config: FetchConfig,
}

impl HttpUserSource {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| PresenceError::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: FetchConfig, client: Client) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Issues one GET and returns the usernames, surfacing every failure
    pub fn try_fetch_usernames(&self) -> Result<Vec<String>> {
        tracing::debug!("Requesting online users from {}", self.config.endpoint);

        let response = self
            .client
            .get(&self.config.endpoint)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "application/json")
            .header(REFERER, &self.config.referer)
            .header(COOKIE, self.config.cookie_header())
            .send()
            .map_err(|e| PresenceError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PresenceError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| PresenceError::Http(format!("Failed to read response body: {}", e)))?;
        let records = UserRecord::list_from_json(&body)?;

        let names = usernames(records);
        tracing::debug!("Endpoint listed {} usernames", names.len());
        Ok(names)
    }
}

impl UserSource for HttpUserSource {
    fn fetch_usernames(&self) -> Vec<String> {
        match self.try_fetch_usernames() {
            Ok(names) => names,
            Err(e) => {
                tracing::error!("Error fetching data: {}", e);
                Vec::new()
            }
        }
    }
}
