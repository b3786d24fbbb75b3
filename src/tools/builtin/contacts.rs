use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{pagination, to_value};
use crate::query::QueryEngine;
use crate::tools::{parse_params, schema_of, Tool};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchContactsParams {
    /// Case-insensitive text matched against contact names and phone numbers
    pub query: String,
}

pub struct SearchContactsTool {
    pub queries: Arc<QueryEngine>,
}

#[async_trait]
impl Tool for SearchContactsTool {
    fn name(&self) -> &str {
        "search_contacts"
    }

    fn description(&self) -> &str {
        "Search contacts by name or phone number. Returns one entry per phone number with its display name and chat id."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SearchContactsParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let params: SearchContactsParams = parse_params(self.name(), params)?;
        let contacts = self.queries.search_contacts(&params.query).await?;
        if contacts.is_empty() {
            return Ok(json!({"result": format!("No contacts matched '{}'.", params.query.trim())}));
        }
        Ok(json!({ "contacts": to_value(&contacts)? }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DirectChatParams {
    /// Phone number of the contact, with or without a leading '+'
    pub phone_number: String,
}

pub struct GetDirectChatByContactTool {
    pub queries: Arc<QueryEngine>,
}

#[async_trait]
impl Tool for GetDirectChatByContactTool {
    fn name(&self) -> &str {
        "get_direct_chat_by_contact"
    }

    fn description(&self) -> &str {
        "Find the one-to-one chat with a contact by phone number."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<DirectChatParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let params: DirectChatParams = parse_params(self.name(), params)?;
        match self.queries.get_direct_chat_by_contact(&params.phone_number).await? {
            Some(chat) => Ok(json!({ "chat": to_value(&chat)? })),
            None => Ok(json!({"result": "No direct chat found for that contact."})),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContactChatsParams {
    /// Contact id (e.g. 15551234567@s.whatsapp.net) or bare phone number
    pub jid: String,
    /// Maximum chats to return
    pub limit: Option<usize>,
    /// Zero-based page number
    pub page: Option<usize>,
}

pub struct GetContactChatsTool {
    pub queries: Arc<QueryEngine>,
}

#[async_trait]
impl Tool for GetContactChatsTool {
    fn name(&self) -> &str {
        "get_contact_chats"
    }

    fn description(&self) -> &str {
        "List every chat a contact takes part in, including groups where they have sent messages. Most recently active first."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ContactChatsParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let params: ContactChatsParams = parse_params(self.name(), params)?;
        let page = pagination(&self.queries, params.limit, params.page);
        let chats = self.queries.get_contact_chats(&params.jid, page).await?;
        if chats.is_empty() {
            return Ok(json!({"result": "No chats found for that contact."}));
        }
        Ok(json!({ "chats": to_value(&chats)? }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LastInteractionParams {
    /// Contact id (e.g. 15551234567@s.whatsapp.net) or bare phone number
    pub jid: String,
}

pub struct GetLastInteractionTool {
    pub queries: Arc<QueryEngine>,
}

#[async_trait]
impl Tool for GetLastInteractionTool {
    fn name(&self) -> &str {
        "get_last_interaction"
    }

    fn description(&self) -> &str {
        "Get the most recent message exchanged with a contact, sent by them or in their direct chat."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<LastInteractionParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let params: LastInteractionParams = parse_params(self.name(), params)?;
        match self.queries.get_last_interaction(&params.jid).await? {
            Some(message) => Ok(json!({ "message": to_value(&message)? })),
            None => Ok(json!({"result": "No interactions found with that contact."})),
        }
    }
}
