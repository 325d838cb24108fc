use std::sync::Arc;
use std::time::Duration;

use portfolio_api_types::{
    AdditionalCompetency, BlogPost, ContactAccepted, ContactSubmission, ErrorBody, PersonalInfo,
    Project, Record, Skill,
};
use regex::Regex;
use reqwest::{Client, Response, StatusCode, Url, header};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::cache::ClientCache;
use super::revalidate::{Revalidated, stale_while_revalidate};

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited; retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },
    #[error("server error: status {status}: {message}")]
    Server { status: u16, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Reads the public portfolio API through a [`ClientCache`].
///
/// Every read is stale-while-revalidate: a cached value younger than the
/// configured max age is returned at once and refreshed in the background.
#[derive(Clone, Debug)]
pub struct PortfolioClient {
    http: Client,
    base: Url,
    cache: Arc<ClientCache>,
    max_age: Duration,
}

impl PortfolioClient {
    pub fn new(site: &str) -> Result<Self, ClientError> {
        let base = Url::parse(site)?.join("/")?;
        let http = Client::builder().user_agent(Self::user_agent()).build()?;
        Ok(Self {
            http,
            base,
            cache: Arc::new(ClientCache::new()),
            max_age: DEFAULT_MAX_AGE,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("portfolio-client/", env!("CARGO_PKG_VERSION"))
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    pub async fn personal_info(&self) -> Result<Revalidated<Record<PersonalInfo>>, ClientError> {
        self.read("personal-info", "/api/personal-info").await
    }

    pub async fn projects(&self) -> Result<Revalidated<Vec<Record<Project>>>, ClientError> {
        self.read("projects", "/api/projects").await
    }

    pub async fn skills(&self) -> Result<Revalidated<Vec<Record<Skill>>>, ClientError> {
        self.read("skills", "/api/skills").await
    }

    pub async fn competencies(
        &self,
    ) -> Result<Revalidated<Vec<Record<AdditionalCompetency>>>, ClientError> {
        self.read("competencies", "/api/competencies").await
    }

    pub async fn blog_posts(&self) -> Result<Revalidated<Vec<Record<BlogPost>>>, ClientError> {
        self.read("blog", "/api/blog").await
    }

    pub async fn blog_post(&self, slug: &str) -> Result<Revalidated<Record<BlogPost>>, ClientError> {
        let url = self.post_url(slug)?;
        self.read_url(&format!("blog:{slug}"), url).await
    }

    /// Contact submissions are never cached.
    pub async fn submit_contact(
        &self,
        submission: &ContactSubmission,
    ) -> Result<ContactAccepted, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/contact")?)
            .json(submission)
            .send()
            .await?;
        handle(resp).await
    }

    /// Forget the blog list and every cached post.
    pub fn invalidate_blog(&self) -> usize {
        match Regex::new("^blog(:|$)") {
            Ok(pattern) => self.cache.invalidate_pattern(&pattern),
            Err(_) => 0,
        }
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base.join(path).map_err(ClientError::Url)
    }

    fn post_url(&self, slug: &str) -> Result<Url, ClientError> {
        let mut url = self.url("/api/blog")?;
        url.path_segments_mut()
            .map_err(|()| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .push(slug);
        Ok(url)
    }

    async fn read<T>(&self, key: &str, path: &str) -> Result<Revalidated<T>, ClientError>
    where
        T: serde::Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.read_url(key, self.url(path)?).await
    }

    async fn read_url<T>(&self, key: &str, url: Url) -> Result<Revalidated<T>, ClientError>
    where
        T: serde::Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let http = self.http.clone();
        stale_while_revalidate(&self.cache, key, self.max_age, move || async move {
            let resp = http.get(url).send().await?;
            handle(resp).await
        })
        .await
    }
}

async fn handle<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        return Err(ClientError::RateLimited { retry_after });
    }

    let bytes = resp.bytes().await?;
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&bytes)
            .map(|body| body.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
        return Err(ClientError::Server {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
}
