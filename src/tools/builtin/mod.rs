//! Tools exposed to the agent: retrieval over the query engine and the single
//! outbound send.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::query::{Pagination, QueryEngine};
use crate::tools::ToolRegistry;

pub mod chats;
pub mod contacts;
pub mod messages;
pub mod send;

pub fn build_registry(queries: Arc<QueryEngine>, dispatcher: Arc<Dispatcher>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(contacts::SearchContactsTool { queries: queries.clone() }));
    registry.register(Arc::new(contacts::GetDirectChatByContactTool { queries: queries.clone() }));
    registry.register(Arc::new(contacts::GetContactChatsTool { queries: queries.clone() }));
    registry.register(Arc::new(contacts::GetLastInteractionTool { queries: queries.clone() }));
    registry.register(Arc::new(messages::ListMessagesTool { queries: queries.clone() }));
    registry.register(Arc::new(messages::GetMessageContextTool { queries: queries.clone() }));
    registry.register(Arc::new(chats::ListChatsTool { queries: queries.clone() }));
    registry.register(Arc::new(chats::GetChatTool { queries }));
    registry.register(Arc::new(send::SendMessageTool { dispatcher }));
    registry
}

/// Missing `limit` falls back to the configured page size; out-of-range values
/// are left for the query engine to reject.
fn pagination(queries: &QueryEngine, limit: Option<usize>, page: Option<usize>) -> Pagination {
    Pagination::new(
        limit.unwrap_or(queries.limits().default_page_size),
        page.unwrap_or(0),
    )
}

fn to_value<T: Serialize>(value: &T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}
