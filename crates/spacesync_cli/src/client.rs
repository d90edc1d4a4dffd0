//! Blocking HTTP client backing the REST remote.

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use spacesync_remote::{HttpClient, HttpRequest, HttpResponse, Method, RemoteConfig};

/// [`HttpClient`] over `reqwest`, with basic authentication.
pub struct ReqwestClient {
    client: Client,
    username: String,
    api_token: String,
}

impl ReqwestClient {
    /// Builds a client with the timeouts from `config`.
    pub fn new(
        config: &RemoteConfig,
        username: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("spacesync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            username: username.into(),
            api_token: api_token.into(),
        })
    }
}

impl HttpClient for ReqwestClient {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .basic_auth(&self.username, Some(&self.api_token))
            .header(ACCEPT, request.accept);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse { status, body })
    }
}
