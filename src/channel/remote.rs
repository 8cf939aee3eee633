use super::{
    types::{CallRequest, CallResponse, Capabilities, ErrorObj, Reply, WorkOutput, WorkUnit},
    ExecutionChannel,
};
use crate::{
    errors::{AppError, AppResult},
    syntax::Platform,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Ships units to an agent over HTTP and blocks on the reply.
pub struct RemoteChannel {
    client: reqwest::Client,
    call_url: String,
    capabilities_url: String,
    node: String,
    bearer_token: String,
    origin: String,
    platform: OnceCell<Platform>,
}

impl RemoteChannel {
    pub fn new(base_url: &str, bearer_token: &str, origin: &str, timeout: Duration) -> AppResult<Self> {
        let base_url = base_url.trim_end_matches('/');
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            call_url: format!("{base_url}/call"),
            capabilities_url: format!("{base_url}/capabilities"),
            node: base_url.to_string(),
            bearer_token: bearer_token.to_string(),
            origin: origin.to_string(),
            platform: OnceCell::new(),
        })
    }

    async fn capabilities(&self) -> AppResult<Capabilities> {
        let resp = self
            .client
            .get(&self.capabilities_url)
            .bearer_auth(&self.bearer_token)
            .header(http::header::ORIGIN, &self.origin)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let err: ErrorObj = resp
                .json()
                .await
                .map_err(|e| AppError::Transport(format!("unreadable reply (status {status}): {e}")))?;
            return Err(AppError::from_wire(err));
        }
        resp.json()
            .await
            .map_err(|e| AppError::Transport(format!("unreadable capabilities: {e}")))
    }
}

fn transport(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Transport("agent did not answer in time".into())
    } else {
        AppError::Transport(e.to_string())
    }
}

#[async_trait]
impl ExecutionChannel for RemoteChannel {
    fn node(&self) -> &str {
        &self.node
    }

    /// Asked once per channel; the agent's answer is kept for later calls.
    async fn platform(&self) -> AppResult<Platform> {
        self.platform
            .get_or_try_init(|| async {
                let caps = self.capabilities().await?;
                info!(node = %self.node, platform = ?caps.platform, "hosting node platform");
                Ok::<_, AppError>(caps.platform)
            })
            .await
            .copied()
    }

    async fn dispatch(&self, unit: WorkUnit) -> AppResult<WorkOutput> {
        let id = uuid::Uuid::new_v4().to_string();
        debug!(unit = unit.name(), node = %self.node, request_id = %id, "dispatching unit");
        let resp = self
            .client
            .post(&self.call_url)
            .bearer_auth(&self.bearer_token)
            .header(http::header::ORIGIN, &self.origin)
            .json(&CallRequest { id: id.clone(), unit })
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        let reply: Reply = resp
            .json()
            .await
            .map_err(|e| AppError::Transport(format!("unreadable reply (status {status}): {e}")))?;

        match reply {
            Reply::Bare(err) => Err(AppError::from_wire(err)),
            Reply::Call(CallResponse { error: Some(err), .. }) => Err(AppError::from_wire(err)),
            Reply::Call(CallResponse { id: reply_id, result: Some(out), .. }) => {
                if reply_id != id {
                    return Err(AppError::Transport("reply does not match request".into()));
                }
                Ok(out)
            }
            Reply::Call(_) => Err(AppError::Transport("reply carries neither result nor error".into())),
        }
    }
}
