use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{pagination, to_value};
use crate::db::MessageFilter;
use crate::query::{parse_time_bound, ContextSpec, QueryEngine};
use crate::tools::{parse_params, schema_of, Tool};

const DEFAULT_CONTEXT: usize = 1;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListMessagesParams {
    /// Only messages at or after this ISO-8601 time (UTC when no offset is given)
    pub after: Option<String>,
    /// Only messages at or before this ISO-8601 time
    pub before: Option<String>,
    /// Exact sender id
    pub sender: Option<String>,
    /// Exact chat id
    pub chat_jid: Option<String>,
    /// Substring to search for in message text
    pub query: Option<String>,
    /// Maximum messages per page
    pub limit: Option<usize>,
    /// Zero-based page number
    pub page: Option<usize>,
    /// Attach surrounding messages from the same chat to each result
    #[serde(default)]
    pub include_context: bool,
    /// Messages to include before each result when include_context is set
    pub context_before: Option<usize>,
    /// Messages to include after each result when include_context is set
    pub context_after: Option<usize>,
}

pub struct ListMessagesTool {
    pub queries: Arc<QueryEngine>,
}

#[async_trait]
impl Tool for ListMessagesTool {
    fn name(&self) -> &str {
        "list_messages"
    }

    fn description(&self) -> &str {
        "List stored messages, newest first, filtered by time range, sender, chat or text. Can attach surrounding context to each result."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ListMessagesParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let params: ListMessagesParams = parse_params(self.name(), params)?;
        let filter = MessageFilter {
            after: params.after.as_deref().map(parse_time_bound).transpose()?,
            before: params.before.as_deref().map(parse_time_bound).transpose()?,
            sender: non_empty(params.sender),
            chat_jid: non_empty(params.chat_jid),
            query: non_empty(params.query),
        };
        let context = params.include_context.then(|| ContextSpec {
            before: params.context_before.unwrap_or(DEFAULT_CONTEXT),
            after: params.context_after.unwrap_or(DEFAULT_CONTEXT),
        });
        let page = pagination(&self.queries, params.limit, params.page);

        let messages = self.queries.list_messages(filter, page, context).await?;
        if messages.is_empty() {
            return Ok(json!({"result": "No messages found."}));
        }
        Ok(json!({
            "messages": to_value(&messages)?,
            "page": page.page,
            "limit": page.limit
        }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MessageContextParams {
    /// Id of the anchor message
    pub message_id: String,
    /// Chat the anchor message belongs to
    pub chat_jid: String,
    /// Messages to include before the anchor (default 5)
    pub before: Option<usize>,
    /// Messages to include after the anchor (default 5)
    pub after: Option<usize>,
}

pub struct GetMessageContextTool {
    pub queries: Arc<QueryEngine>,
}

#[async_trait]
impl Tool for GetMessageContextTool {
    fn name(&self) -> &str {
        "get_message_context"
    }

    fn description(&self) -> &str {
        "Get a message together with the messages immediately before and after it in the same chat."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<MessageContextParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let params: MessageContextParams = parse_params(self.name(), params)?;
        let context = self
            .queries
            .get_message_context(
                &params.message_id,
                &params.chat_jid,
                params.before.unwrap_or(5),
                params.after.unwrap_or(5),
            )
            .await?;
        match context {
            Some(context) => to_value(&context),
            None => Ok(json!({"result": "Message not found."})),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tools::builtin::test_support::{fixture, put};
    use serde_json::json;

    fn ids(value: &serde_json::Value) -> Vec<String> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_list_messages_tool() {
        let fx = fixture();
        put(&fx.writer, "g1@g.us", "2", "u1", 105, "there", None);
        put(&fx.writer, "g1@g.us", "1", "u1", 100, "hi", None);
        put(&fx.writer, "g1@g.us", "3", "u2", 110, "50% off", None);

        let tool = fx.registry.get("list_messages").unwrap();
        let out = tool.execute(json!({"chat_jid": "g1@g.us"})).await.unwrap();
        assert_eq!(ids(&out["messages"]), vec!["3", "2", "1"]);
        assert!(out["messages"][0].get("context").is_none());

        let out = tool.execute(json!({"query": "50%"})).await.unwrap();
        assert_eq!(ids(&out["messages"]), vec!["3"]);

        let out = tool
            .execute(json!({"sender": "u1", "limit": 1, "page": 1}))
            .await
            .unwrap();
        assert_eq!(ids(&out["messages"]), vec!["1"]);

        let out = tool
            .execute(json!({
                "chat_jid": "g1@g.us",
                "after": "1970-01-01T00:01:45Z",
                "before": "1970-01-01T00:01:45Z",
                "include_context": true
            }))
            .await
            .unwrap();
        assert_eq!(ids(&out["messages"]), vec!["2"]);
        assert_eq!(ids(&out["messages"][0]["context"]["before"]), vec!["1"]);
        assert_eq!(ids(&out["messages"][0]["context"]["after"]), vec!["3"]);

        let out = tool.execute(json!({"chat_jid": "nope"})).await.unwrap();
        assert_eq!(out["result"], "No messages found.");
    }

    #[tokio::test]
    async fn test_list_messages_rejects_bad_input() {
        let fx = fixture();
        let tool = fx.registry.get("list_messages").unwrap();
        assert!(tool.execute(json!({"limit": 0})).await.is_err());
        assert!(tool.execute(json!({"limit": 100000})).await.is_err());
        assert!(tool.execute(json!({"after": "yesterday"})).await.is_err());
        assert!(tool
            .execute(json!({"after": "2024-02-01", "before": "2024-01-01"}))
            .await
            .is_err());
        assert!(tool
            .execute(json!({"include_context": true, "context_before": 10000}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_get_message_context_tool() {
        let fx = fixture();
        for (id, ts) in [("a", 100), ("b", 101), ("c", 102), ("d", 103)] {
            put(&fx.writer, "c1", id, "u1", ts, id, None);
        }
        let tool = fx.registry.get("get_message_context").unwrap();
        let out = tool
            .execute(json!({"message_id": "c", "chat_jid": "c1", "before": 1, "after": 3}))
            .await
            .unwrap();
        assert_eq!(out["target"]["id"], "c");
        assert_eq!(ids(&out["before"]), vec!["b"]);
        assert_eq!(ids(&out["after"]), vec!["d"]);

        let out = tool
            .execute(json!({"message_id": "zz", "chat_jid": "c1"}))
            .await
            .unwrap();
        assert_eq!(out["result"], "Message not found.");
    }
}
