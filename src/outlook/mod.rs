pub mod dto;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::OutlookConfig;
use crate::error::AppError;
use crate::models::{FieldChangeSet, TargetTask, TaskContainer, TaskDraft};
use crate::sync::retry_after_header;

/// Resolves the downstream list holding every synced task.
#[async_trait]
pub trait TargetContainerResolver: Send + Sync {
    /// Idempotent: repeated calls with one name never create a second container.
    async fn get_or_create_container(&self, name: &str) -> Result<String, AppError>;
}

/// Create/update capability for downstream tasks.
#[async_trait]
pub trait TargetTaskClient: Send + Sync {
    async fn create(&self, container_id: &str, draft: &TaskDraft) -> Result<TargetTask, AppError>;

    async fn update(
        &self,
        container_id: &str,
        task_id: &str,
        changes: &FieldChangeSet,
    ) -> Result<TargetTask, AppError>;
}

/// Microsoft To Do over Microsoft Graph, authenticated with a bearer token
/// acquired outside this process.
pub struct OutlookHttpClient {
    client: Client,
    config: OutlookConfig,
}

impl OutlookHttpClient {
    pub fn new(config: OutlookConfig, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.graph_url, path)
    }

    pub async fn list_task_lists(&self) -> Result<Vec<TaskContainer>, AppError> {
        let mut lists = Vec::new();
        let mut next = Some(self.url("/me/todo/lists"));

        while let Some(url) = next {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.config.access_token)
                .send()
                .await
                .map_err(transport_error)?;

            let page: dto::ListResponse<dto::TodoTaskList> =
                decode(check_status(response, "list task lists").await?).await?;
            lists.extend(page.value.into_iter().map(TaskContainer::from));
            next = page.next_link;
        }

        debug!("Found {} task lists", lists.len());
        Ok(lists)
    }

    async fn create_task_list(&self, name: &str) -> Result<TaskContainer, AppError> {
        info!("Creating task list: {}", name);
        let response = self
            .client
            .post(self.url("/me/todo/lists"))
            .bearer_auth(&self.config.access_token)
            .json(&serde_json::json!({ "displayName": name }))
            .send()
            .await
            .map_err(transport_error)?;

        let list: dto::TodoTaskList = decode(check_status(response, "create task list").await?).await?;
        Ok(list.into())
    }
}

#[async_trait]
impl TargetContainerResolver for OutlookHttpClient {
    async fn get_or_create_container(&self, name: &str) -> Result<String, AppError> {
        if let Some(existing) = self
            .list_task_lists()
            .await?
            .into_iter()
            .find(|list| list.display_name == name)
        {
            debug!("Found existing task list: {}", existing.id);
            return Ok(existing.id);
        }

        Ok(self.create_task_list(name).await?.id)
    }
}

#[async_trait]
impl TargetTaskClient for OutlookHttpClient {
    async fn create(&self, container_id: &str, draft: &TaskDraft) -> Result<TargetTask, AppError> {
        let response = self
            .client
            .post(self.url(&format!("/me/todo/lists/{}/tasks", container_id)))
            .bearer_auth(&self.config.access_token)
            .json(&dto::create_payload(draft))
            .send()
            .await
            .map_err(transport_error)?;

        let task: dto::TodoTask = decode(check_status(response, "create task").await?).await?;
        Ok(task.into())
    }

    async fn update(
        &self,
        container_id: &str,
        task_id: &str,
        changes: &FieldChangeSet,
    ) -> Result<TargetTask, AppError> {
        debug!("Updating task {}: {:?}", task_id, changes.field_names());
        let response = self
            .client
            .patch(self.url(&format!("/me/todo/lists/{}/tasks/{}", container_id, task_id)))
            .bearer_auth(&self.config.access_token)
            .json(&dto::update_payload(changes))
            .send()
            .await
            .map_err(transport_error)?;

        let task: dto::TodoTask = decode(check_status(response, "update task").await?).await?;
        Ok(task.into())
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    AppError::TargetUnavailable(format!("Graph request failed: {}", e))
}

/// Classifies non-success responses: 401/403 are auth failures, 429 carries the
/// server's `Retry-After`, everything else is transient.
async fn check_status(response: Response, action: &str) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after_header(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(
        status,
        retry_after,
        format!("Failed to {}: {} {}", action, status, body),
    ))
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, message: String) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::TargetAuth(message),
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited {
            message,
            retry_after,
        },
        _ => AppError::TargetUnavailable(message),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
    response
        .json::<T>()
        .await
        .map_err(|e| AppError::TargetUnavailable(format!("Failed to parse Graph response: {}", e)))
}
