use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{pagination, to_value};
use crate::db::ChatSort;
use crate::query::QueryEngine;
use crate::tools::{parse_params, schema_of, Tool};

#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    LastActive,
    Name,
}

impl From<SortBy> for ChatSort {
    fn from(sort: SortBy) -> Self {
        match sort {
            SortBy::LastActive => ChatSort::LastActive,
            SortBy::Name => ChatSort::Name,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListChatsParams {
    /// Substring matched against chat names and ids
    pub query: Option<String>,
    /// Maximum chats per page
    pub limit: Option<usize>,
    /// Zero-based page number
    pub page: Option<usize>,
    /// Attach each chat's most recent message
    #[serde(default = "default_true")]
    pub include_last_message: bool,
    /// Ordering: most recently active first, or by name
    #[serde(default)]
    pub sort_by: SortBy,
}

fn default_true() -> bool {
    true
}

pub struct ListChatsTool {
    pub queries: Arc<QueryEngine>,
}

#[async_trait]
impl Tool for ListChatsTool {
    fn name(&self) -> &str {
        "list_chats"
    }

    fn description(&self) -> &str {
        "List chats, optionally filtered by name or id, with their most recent message."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ListChatsParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let params: ListChatsParams = parse_params(self.name(), params)?;
        let page = pagination(&self.queries, params.limit, params.page);
        let chats = self
            .queries
            .list_chats(params.query, page, params.include_last_message, params.sort_by.into())
            .await?;
        if chats.is_empty() {
            return Ok(json!({"result": "No chats found."}));
        }
        Ok(json!({
            "chats": to_value(&chats)?,
            "page": page.page,
            "limit": page.limit
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetChatParams {
    /// Chat id
    pub chat_jid: String,
    /// Attach the chat's most recent message
    #[serde(default = "default_true")]
    pub include_last_message: bool,
}

pub struct GetChatTool {
    pub queries: Arc<QueryEngine>,
}

#[async_trait]
impl Tool for GetChatTool {
    fn name(&self) -> &str {
        "get_chat"
    }

    fn description(&self) -> &str {
        "Get a single chat by id."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<GetChatParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let params: GetChatParams = parse_params(self.name(), params)?;
        match self
            .queries
            .get_chat(&params.chat_jid, params.include_last_message)
            .await?
        {
            Some(chat) => Ok(json!({ "chat": to_value(&chat)? })),
            None => Ok(json!({"result": "Chat not found."})),
        }
    }
}
