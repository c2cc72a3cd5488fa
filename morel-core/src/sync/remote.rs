//! Remote server client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::SyncError;
use super::protocol::{Deletion, Receipt, Submission};

/// The server a manager synchronizes with.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Creates or updates a record, returning the server's receipt.
    async fn submit(&self, submission: &Submission) -> Result<Receipt, SyncError>;

    /// Deletes a previously synced record. Deleting a record the server no
    /// longer has succeeds.
    async fn delete(&self, deletion: &Deletion) -> Result<(), SyncError>;
}

/// Application credentials sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub appname: String,
    pub appsecret: String,
    pub website_id: i64,
    pub survey_id: i64,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    #[serde(flatten)]
    credentials: &'a Credentials,
    submission: &'a Submission,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    #[serde(flatten)]
    credentials: &'a Credentials,
    deletion: &'a Deletion,
}

/// HTTP implementation of [`Remote`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    url: String,
    credentials: Credentials,
}

impl HttpRemote {
    pub fn new(
        url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            credentials,
        })
    }

    /// Returns the server URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn error_for(response: reqwest::Response) -> SyncError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        SyncError::from_status(status, message)
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn submit(&self, submission: &Submission) -> Result<Receipt, SyncError> {
        tracing::debug!("Submitting {} '{}'", submission.collection, submission.cid);

        let response = self
            .client
            .post(&self.url)
            .json(&SubmitRequest {
                credentials: &self.credentials,
                submission,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        response
            .json::<Receipt>()
            .await
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }

    async fn delete(&self, deletion: &Deletion) -> Result<(), SyncError> {
        tracing::debug!("Deleting {} {}", deletion.collection, deletion.id);

        let response = self
            .client
            .delete(&self.url)
            .json(&DeleteRequest {
                credentials: &self.credentials,
                deletion,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::error_for(response).await)
        }
    }
}
