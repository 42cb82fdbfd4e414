//! HTTP client for the chat REST API.

use anyhow::Context;
use api_shared::auth::{API_KEY_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
use api_shared::dto::{
    HealthRes, NotificationsRes, OpenThreadReq, OpenThreadRes, SendMessageReq, ThreadListRes,
    ThreadMessagesRes,
};
use chat_core::{Role, UserId};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

/// Who the client acts as, and where. Passed explicitly to every command.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub base_url: String,
    pub user_id: UserId,
    pub role: Role,
    pub api_key: String,
}

pub struct ChatClient {
    http: reqwest::Client,
    ctx: SessionContext,
}

impl ChatClient {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            http: reqwest::Client::new(),
            ctx,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Health does not need an identity.
    pub async fn health(&self) -> anyhow::Result<HealthRes> {
        let response = self.http.get(self.url("/health")).send().await?;
        json(response).await
    }

    pub async fn threads(&self) -> anyhow::Result<ThreadListRes> {
        let response = self.authed(self.http.get(self.url("/threads"))).send().await?;
        json(response).await
    }

    pub async fn open_thread(&self, counterpart_id: &str) -> anyhow::Result<OpenThreadRes> {
        let body = OpenThreadReq {
            counterpart_id: counterpart_id.to_string(),
        };
        let response = self
            .authed(self.http.post(self.url("/threads")))
            .json(&body)
            .send()
            .await?;
        json(response).await
    }

    pub async fn messages(
        &self,
        thread_id: &str,
        after: Option<&str>,
        limit: Option<usize>,
    ) -> anyhow::Result<ThreadMessagesRes> {
        let mut request = self.authed(
            self.http
                .get(self.url(&format!("/threads/{thread_id}/messages"))),
        );
        if let Some(after) = after {
            request = request.query(&[("after", after)]);
        }
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        json(request.send().await?).await
    }

    pub async fn send(
        &self,
        thread_id: &str,
        text: Option<String>,
        attachment_url: Option<String>,
    ) -> anyhow::Result<ThreadMessagesRes> {
        let body = SendMessageReq {
            sender_id: Some(self.ctx.user_id.to_string()),
            text,
            attachment_url,
        };
        let response = self
            .authed(
                self.http
                    .post(self.url(&format!("/threads/{thread_id}/messages"))),
            )
            .json(&body)
            .send()
            .await?;
        json(response).await
    }

    pub async fn notifications(&self) -> anyhow::Result<NotificationsRes> {
        let response = self
            .authed(self.http.get(self.url("/notifications")))
            .send()
            .await?;
        json(response).await
    }

    /// Opens the live event stream. The server has subscribed by the time this returns.
    pub async fn events(&self) -> anyhow::Result<Response> {
        let response = self
            .authed(self.http.get(self.url("/events")))
            .header("accept", "text/event-stream")
            .send()
            .await?;
        success(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.ctx.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(API_KEY_HEADER, &self.ctx.api_key)
            .header(USER_ID_HEADER, self.ctx.user_id.as_str())
            .header(USER_ROLE_HEADER, self.ctx.role.to_string())
    }
}

async fn success(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("{} {}", status, body.trim())
}

async fn json<T: DeserializeOwned>(response: Response) -> anyhow::Result<T> {
    success(response)
        .await?
        .json::<T>()
        .await
        .context("unexpected response body")
}
