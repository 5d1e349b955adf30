use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("page is closed")]
    Closed,
    #[error("no element matches {0}")]
    ElementNotFound(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// One browsing context as the action runner sees it.
#[async_trait::async_trait]
pub trait RemotePage: Send + Sync {
    fn url(&self) -> String;
    async fn html(&self) -> Result<String, PageError>;
    async fn click(&self, selector: &str) -> Result<(), PageError>;
    async fn navigate(&self, url: &str) -> Result<(), PageError>;
    async fn close(&self);
}
