//! Read-only retrieval over the store: filtered message listing with context
//! expansion, chat listing, contact search and per-contact lookups.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::db::reads::ContactCandidate;
use crate::db::{ChatSort, MessageFilter, StoreError, StoreReader};
use crate::models::{phone_part, Chat, Contact, ContextWindow, Message, MessageContext, MessageWithContext};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub page: usize,
}

impl Pagination {
    pub fn new(limit: usize, page: usize) -> Self {
        Self { limit, page }
    }

    pub fn offset(&self) -> usize {
        self.limit.saturating_mul(self.page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSpec {
    pub before: usize,
    pub after: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub max_context_window: usize,
}

impl QueryLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            max_context_window: config.max_context_window,
        }
    }
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 200,
            max_context_window: 50,
        }
    }
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` (UTC) or a
/// bare `YYYY-MM-DD` meaning midnight UTC.
pub fn parse_time_bound(raw: &str) -> Result<DateTime<Utc>, QueryError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(QueryError::Validation(format!(
        "'{}' is not a valid ISO-8601 date or timestamp",
        raw
    )))
}

pub struct QueryEngine {
    reader: StoreReader,
    limits: QueryLimits,
    individual_suffix: String,
    group_suffix: String,
}

impl QueryEngine {
    pub fn new(
        reader: StoreReader,
        limits: QueryLimits,
        individual_suffix: impl Into<String>,
        group_suffix: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            limits,
            individual_suffix: individual_suffix.into(),
            group_suffix: group_suffix.into(),
        }
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    fn check_page(&self, page: Pagination) -> Result<(), QueryError> {
        if page.limit == 0 || page.limit > self.limits.max_page_size {
            return Err(QueryError::Validation(format!(
                "limit must be between 1 and {}",
                self.limits.max_page_size
            )));
        }
        // SQLite offsets are i64; a wrapped offset would silently read page 0.
        let in_range = page
            .page
            .checked_mul(page.limit)
            .and_then(|offset| i64::try_from(offset).ok())
            .is_some();
        if !in_range {
            return Err(QueryError::Validation("page is out of range".to_string()));
        }
        Ok(())
    }

    fn check_context(&self, before: usize, after: usize) -> Result<(), QueryError> {
        let max = self.limits.max_context_window;
        if before > max || after > max {
            return Err(QueryError::Validation(format!(
                "context window must be at most {} messages on each side",
                max
            )));
        }
        Ok(())
    }

    fn require(value: &str, field: &str) -> Result<String, QueryError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(QueryError::Validation(format!("{} must not be empty", field)));
        }
        Ok(trimmed.to_string())
    }

    /// Resolves a chat key or bare phone into the contact projection used by
    /// per-contact lookups.
    fn contact_for(&self, jid: &str) -> Contact {
        let phone = phone_part(jid).to_string();
        let jid = if jid.contains('@') {
            jid.to_string()
        } else {
            format!("{}@{}", phone, self.individual_suffix)
        };
        Contact {
            phone_number: phone,
            name: None,
            jid,
        }
    }

    pub async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, QueryError> {
        let query = Self::require(query, "query")?;
        let group_suffix = self.group_suffix.clone();
        let candidates = self
            .reader
            .run_blocking(move |db| db.contact_candidates(&group_suffix))
            .await?;
        let contacts = dedupe_contacts(&query, candidates, &self.individual_suffix);
        debug!("Query: contact search '{}' matched {}", query, contacts.len());
        Ok(contacts)
    }

    pub async fn list_messages(
        &self,
        filter: MessageFilter,
        page: Pagination,
        context: Option<ContextSpec>,
    ) -> Result<Vec<MessageWithContext>, QueryError> {
        self.check_page(page)?;
        if let Some(spec) = context {
            self.check_context(spec.before, spec.after)?;
        }
        if let (Some(after), Some(before)) = (filter.after, filter.before) {
            if after > before {
                return Err(QueryError::Validation(
                    "'after' must not be later than 'before'".to_string(),
                ));
            }
        }

        let results = self
            .reader
            .run_blocking(move |db| {
                let page_messages = db.list_messages(&filter, page.limit, page.offset())?;
                let mut results = Vec::with_capacity(page_messages.len());
                for message in page_messages {
                    let context = match context {
                        Some(spec) => Some(ContextWindow {
                            before: db.messages_before(&message, spec.before)?,
                            after: db.messages_after(&message, spec.after)?,
                        }),
                        None => None,
                    };
                    results.push(MessageWithContext { message, context });
                }
                Ok(results)
            })
            .await?;
        debug!("Query: list_messages returned {} messages", results.len());
        Ok(results)
    }

    pub async fn list_chats(
        &self,
        query: Option<String>,
        page: Pagination,
        include_last_message: bool,
        sort: ChatSort,
    ) -> Result<Vec<Chat>, QueryError> {
        self.check_page(page)?;
        let query = query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty());
        let chats = self
            .reader
            .run_blocking(move |db| {
                db.list_chats(query.as_deref(), sort, include_last_message, page.limit, page.offset())
            })
            .await?;
        Ok(chats)
    }

    pub async fn get_chat(&self, jid: &str, include_last_message: bool) -> Result<Option<Chat>, QueryError> {
        let jid = Self::require(jid, "chat_jid")?;
        let chat = self
            .reader
            .run_blocking(move |db| db.get_chat(&jid, include_last_message))
            .await?;
        Ok(chat)
    }

    pub async fn get_message_context(
        &self,
        message_id: &str,
        chat_jid: &str,
        before: usize,
        after: usize,
    ) -> Result<Option<MessageContext>, QueryError> {
        let message_id = Self::require(message_id, "message_id")?;
        let chat_jid = Self::require(chat_jid, "chat_jid")?;
        self.check_context(before, after)?;

        let context = self
            .reader
            .run_blocking(move |db| {
                let Some(target) = db.get_message(&message_id, &chat_jid)? else {
                    return Ok(None);
                };
                let before = db.messages_before(&target, before)?;
                let after = db.messages_after(&target, after)?;
                Ok(Some(MessageContext { target, before, after }))
            })
            .await?;
        Ok(context)
    }

    pub async fn get_direct_chat_by_contact(&self, phone: &str) -> Result<Option<Chat>, QueryError> {
        let phone = Self::require(phone, "phone_number")?;
        let phone = phone_part(phone.trim_start_matches('+')).to_string();
        let group_suffix = self.group_suffix.clone();
        let chat = self
            .reader
            .run_blocking(move |db| db.direct_chat_for_phone(&phone, &group_suffix))
            .await?;
        Ok(chat)
    }

    pub async fn get_contact_chats(&self, jid: &str, page: Pagination) -> Result<Vec<Chat>, QueryError> {
        let jid = Self::require(jid, "jid")?;
        self.check_page(page)?;
        let contact = self.contact_for(&jid);
        let chats = self
            .reader
            .run_blocking(move |db| db.chats_for_contact(&contact, page.limit, page.offset()))
            .await?;
        Ok(chats)
    }

    pub async fn get_last_interaction(&self, jid: &str) -> Result<Option<Message>, QueryError> {
        let jid = Self::require(jid, "jid")?;
        let contact = self.contact_for(&jid);
        let message = self
            .reader
            .run_blocking(move |db| db.last_interaction(&contact))
            .await?;
        Ok(message)
    }
}

/// Narrows candidates to real matches and keeps one entry per phone number.
/// The most recently active chat's name wins; remaining ties prefer a named
/// entry and then the lexically smallest `(name, jid)`. Output is sorted by
/// phone number.
fn dedupe_contacts(query: &str, candidates: Vec<ContactCandidate>, individual_suffix: &str) -> Vec<Contact> {
    let needle = query.to_lowercase();
    let mut best: BTreeMap<String, ContactCandidate> = BTreeMap::new();

    for candidate in candidates {
        let phone = phone_part(&candidate.jid).to_string();
        let name_matches = candidate
            .name
            .as_deref()
            .map_or(false, |n| n.to_lowercase().contains(&needle));
        if !name_matches && !phone.to_lowercase().contains(&needle) {
            continue;
        }

        match best.get(&phone) {
            Some(current) if !outranks(&candidate, current) => {}
            _ => {
                best.insert(phone, candidate);
            }
        }
    }

    best.into_iter()
        .map(|(phone, candidate)| {
            let jid = if candidate.jid.contains('@') {
                candidate.jid
            } else {
                format!("{}@{}", phone, individual_suffix)
            };
            Contact {
                phone_number: phone,
                name: candidate.name,
                jid,
            }
        })
        .collect()
}

fn outranks(candidate: &ContactCandidate, current: &ContactCandidate) -> bool {
    let rank = |c: &ContactCandidate| (c.last_active, c.name.is_some());
    match rank(candidate).cmp(&rank(current)) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => {
            (&candidate.name, &candidate.jid) < (&current.name, &current.jid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, StoreWriter};
    use crate::models::MessageRecord;
    use chrono::TimeZone;

    fn engine() -> (StoreWriter, QueryEngine) {
        let (writer, reader) = Database::open(":memory:", 0).unwrap();
        let engine = QueryEngine::new(reader, QueryLimits::default(), "s.whatsapp.net", "g.us");
        (writer, engine)
    }

    fn put(writer: &StoreWriter, chat: &str, id: &str, sender: &str, ts: i64, content: &str, name: Option<&str>) {
        writer
            .write_record(&MessageRecord {
                chat_jid: chat.to_string(),
                id: id.to_string(),
                sender: sender.to_string(),
                timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
                content: content.to_string(),
                is_from_me: false,
                media_type: None,
                chat_name: name.map(str::to_string),
            })
            .unwrap();
    }

    fn ids(messages: &[MessageWithContext]) -> Vec<String> {
        messages.iter().map(|m| m.message.id.clone()).collect()
    }

    fn chat_filter(chat: &str) -> MessageFilter {
        MessageFilter {
            chat_jid: Some(chat.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_scenario_reverse_delivery() {
        let (writer, engine) = engine();
        put(&writer, "g1", "2", "u1", 105, "there", None);
        put(&writer, "g1", "1", "u1", 100, "hi", None);

        let page = engine
            .list_messages(chat_filter("g1"), Pagination::new(10, 0), None)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["2", "1"]);
        assert!(page.iter().all(|m| m.context.is_none()));

        let chat = engine.get_chat("g1", false).await.unwrap().unwrap();
        assert_eq!(chat.last_message_time, Some(Utc.timestamp_opt(105, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_pagination_is_complete_and_ordered() {
        let (writer, engine) = engine();
        // Includes timestamp ties across chats and within a chat.
        let rows = [
            ("c1", "a", 100), ("c1", "b", 100), ("c2", "a", 100), ("c1", "c", 101),
            ("c2", "d", 99), ("c1", "e", 105), ("c2", "f", 103), ("c1", "g", 102),
            ("c2", "h", 104), ("c1", "i", 98), ("c2", "j", 100),
        ];
        for (chat, id, ts) in rows {
            put(&writer, chat, id, "u1", ts, "x", None);
        }

        let mut seen = Vec::new();
        for page in 0.. {
            let batch = engine
                .list_messages(MessageFilter::default(), Pagination::new(3, page), None)
                .await
                .unwrap();
            if batch.is_empty() {
                break;
            }
            seen.extend(batch.into_iter().map(|m| m.message));
        }

        assert_eq!(seen.len(), rows.len());
        for pair in seen.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!((a.timestamp, &a.id) >= (b.timestamp, &b.id), "{:?} before {:?}", a, b);
        }
        let mut keys: Vec<_> = seen.iter().map(|m| (m.chat_jid.clone(), m.id.clone())).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), rows.len());
    }

    #[tokio::test]
    async fn test_filters_compose() {
        let (writer, engine) = engine();
        put(&writer, "g1", "1", "alice", 100, "Lunch plans?", None);
        put(&writer, "g1", "2", "bob", 200, "lunch at noon", None);
        put(&writer, "g1", "3", "bob", 300, "dinner", None);
        put(&writer, "g2", "4", "bob", 250, "LUNCH tomorrow", None);

        let filter = MessageFilter {
            after: Some(Utc.timestamp_opt(200, 0).unwrap()),
            before: Some(Utc.timestamp_opt(300, 0).unwrap()),
            sender: Some("bob".to_string()),
            chat_jid: None,
            query: Some("lunch".to_string()),
        };
        let page = engine
            .list_messages(filter, Pagination::new(10, 0), None)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["4", "2"]);

        let filter = MessageFilter {
            chat_jid: Some("g1".to_string()),
            query: Some("lunch".to_string()),
            ..Default::default()
        };
        let page = engine
            .list_messages(filter, Pagination::new(10, 0), None)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["2", "1"]);
    }

    #[tokio::test]
    async fn test_context_embedded_without_counting_against_limit() {
        let (writer, engine) = engine();
        for i in 1..=6 {
            put(&writer, "g1", &i.to_string(), "u1", 100 + i, if i == 4 { "needle" } else { "hay" }, None);
        }
        put(&writer, "g2", "x", "u1", 103, "other chat", None);

        let filter = MessageFilter {
            query: Some("needle".to_string()),
            ..Default::default()
        };
        let page = engine
            .list_messages(filter, Pagination::new(1, 0), Some(ContextSpec { before: 2, after: 5 }))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        let context = page[0].context.as_ref().unwrap();
        let before: Vec<_> = context.before.iter().map(|m| m.id.as_str()).collect();
        let after: Vec<_> = context.after.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(before, vec!["2", "3"]);
        assert_eq!(after, vec!["5", "6"]);
    }

    #[tokio::test]
    async fn test_message_context_bounds() {
        let (writer, engine) = engine();
        for i in 1..=5 {
            put(&writer, "g1", &i.to_string(), "u1", 100 + i, "m", None);
        }

        let ctx = engine.get_message_context("3", "g1", 1, 1).await.unwrap().unwrap();
        assert_eq!(ctx.target.id, "3");
        assert_eq!(ctx.before.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["2"]);
        assert_eq!(ctx.after.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["4"]);

        // Fewer only when the chat has fewer.
        let ctx = engine.get_message_context("2", "g1", 5, 5).await.unwrap().unwrap();
        assert_eq!(ctx.before.len(), 1);
        assert_eq!(ctx.after.len(), 3);
        assert!(ctx.before.iter().all(|m| m.timestamp < ctx.target.timestamp));
        assert!(ctx.after.iter().all(|m| m.timestamp > ctx.target.timestamp));

        let ctx = engine.get_message_context("1", "g1", 0, 0).await.unwrap().unwrap();
        assert!(ctx.before.is_empty() && ctx.after.is_empty());

        assert!(engine.get_message_context("99", "g1", 1, 1).await.unwrap().is_none());
        assert!(engine.get_message_context("3", "other", 1, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contact_search_scenario() {
        let (writer, engine) = engine();
        put(&writer, "15550001@domain", "1", "15550001@domain", 100, "hey", Some("John Doe"));
        put(&writer, "15559999@domain", "2", "15559999@domain", 110, "yo", Some("Jane"));
        put(&writer, "team@g.us", "3", "15550001@domain", 120, "in the group", Some("Johnson family"));

        let contacts = engine.search_contacts("john").await.unwrap();
        assert_eq!(
            contacts,
            vec![Contact {
                phone_number: "15550001".to_string(),
                name: Some("John Doe".to_string()),
                jid: "15550001@domain".to_string(),
            }]
        );

        let by_phone = engine.search_contacts("5559999").await.unwrap();
        assert_eq!(by_phone.len(), 1);
        assert_eq!(by_phone[0].name.as_deref(), Some("Jane"));
    }

    #[tokio::test]
    async fn test_contact_name_prefers_most_recent_chat() {
        let (writer, engine) = engine();
        put(&writer, "15550001@s.whatsapp.net", "1", "15550001", 100, "a", Some("Johnny"));
        put(&writer, "15550001:2@s.whatsapp.net", "2", "15550001", 300, "b", Some("John Doe"));
        // Bare sender with no chat of its own.
        put(&writer, "team@g.us", "3", "15557777", 200, "c", Some("Team"));

        let contacts = engine.search_contacts("john").await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name.as_deref(), Some("John Doe"));

        let contacts = engine.search_contacts("15557777").await.unwrap();
        assert_eq!(
            contacts,
            vec![Contact {
                phone_number: "15557777".to_string(),
                name: None,
                jid: "15557777@s.whatsapp.net".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_list_chats_sorting_and_last_message() {
        let (writer, engine) = engine();
        put(&writer, "b@s.whatsapp.net", "1", "b", 300, "latest", Some("bravo"));
        put(&writer, "a@s.whatsapp.net", "2", "a", 100, "oldest", Some("Alpha"));
        put(&writer, "c@g.us", "3", "c", 200, "middle", Some("charlie"));

        let chats = engine
            .list_chats(None, Pagination::new(10, 0), true, ChatSort::LastActive)
            .await
            .unwrap();
        let jids: Vec<_> = chats.iter().map(|c| c.jid.as_str()).collect();
        assert_eq!(jids, vec!["b@s.whatsapp.net", "c@g.us", "a@s.whatsapp.net"]);
        assert_eq!(chats[0].last_message.as_ref().unwrap().content, "latest");

        let chats = engine
            .list_chats(None, Pagination::new(2, 0), false, ChatSort::Name)
            .await
            .unwrap();
        let names: Vec<_> = chats.iter().map(|c| c.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["Alpha", "bravo"]);
        assert!(chats.iter().all(|c| c.last_message.is_none()));

        let chats = engine
            .list_chats(Some("CHAR".to_string()), Pagination::new(10, 0), false, ChatSort::LastActive)
            .await
            .unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].jid, "c@g.us");

        let chats = engine
            .list_chats(None, Pagination::new(2, 1), false, ChatSort::LastActive)
            .await
            .unwrap();
        assert_eq!(chats.len(), 1);
    }

    #[tokio::test]
    async fn test_get_chat_missing_is_empty() {
        let (_writer, engine) = engine();
        assert!(engine.get_chat("nobody", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contact_lookups() {
        let (writer, engine) = engine();
        put(&writer, "15550001@s.whatsapp.net", "1", "15550001", 100, "direct", Some("John"));
        put(&writer, "team@g.us", "2", "15550001", 200, "group", Some("Team"));

        let direct = engine.get_direct_chat_by_contact("+15550001").await.unwrap().unwrap();
        assert_eq!(direct.jid, "15550001@s.whatsapp.net");
        assert!(engine.get_direct_chat_by_contact("team").await.unwrap().is_none());

        let chats = engine
            .get_contact_chats("15550001", Pagination::new(10, 0))
            .await
            .unwrap();
        assert_eq!(chats.len(), 2);

        let last = engine.get_last_interaction("15550001@s.whatsapp.net").await.unwrap().unwrap();
        assert_eq!(last.content, "group");
    }

    #[tokio::test]
    async fn test_validation_rejects_before_touching_store() {
        let (_writer, engine) = engine();
        let err = engine
            .list_messages(MessageFilter::default(), Pagination::new(0, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        let err = engine
            .list_messages(MessageFilter::default(), Pagination::new(201, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        let err = engine
            .list_messages(MessageFilter::default(), Pagination::new(10, usize::MAX), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        let err = engine.get_message_context("1", "g1", 51, 0).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        let backwards = MessageFilter {
            after: Some(Utc.timestamp_opt(200, 0).unwrap()),
            before: Some(Utc.timestamp_opt(100, 0).unwrap()),
            ..Default::default()
        };
        let err = engine
            .list_messages(backwards, Pagination::new(10, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        assert!(matches!(
            engine.search_contacts("  ").await.unwrap_err(),
            QueryError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_page_past_sqlite_offset_range_is_rejected() {
        let (writer, engine) = engine();
        put(&writer, "g1", "1", "u1", 100, "only", None);
        let err = engine
            .list_messages(MessageFilter::default(), Pagination::new(1, 1usize << 63), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        let err = engine
            .list_chats(None, Pagination::new(2, 1usize << 62), false, ChatSort::LastActive)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_contact_search_folds_non_ascii_case() {
        let (writer, engine) = engine();
        let jid = "15551112222@s.whatsapp.net";
        put(&writer, jid, "1", jid, 100, "hallo", Some("Jörg Ölmann"));

        for query in ["ölmann", "ÖLMANN", "jÖrG"] {
            let contacts = engine.search_contacts(query).await.unwrap();
            assert_eq!(contacts.len(), 1, "{}", query);
            assert_eq!(contacts[0].phone_number, "15551112222");
        }
    }

    #[tokio::test]
    async fn test_sender_wildcards_match_literally() {
        let (writer, engine) = engine();
        let zed = "15550001@s.whatsapp.net";
        put(&writer, zed, "1", zed, 100, "hi", Some("Zed"));
        put(&writer, "team@g.us", "2", "1555_0001", 200, "odd id", Some("Team"));

        let contacts = engine.search_contacts("zed").await.unwrap();
        let phones: Vec<_> = contacts.iter().map(|c| c.phone_number.as_str()).collect();
        assert_eq!(phones, vec!["15550001"]);
    }

    #[test]
    fn test_parse_time_bound() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_time_bound("2024-05-01T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_time_bound("2024-05-01T14:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_time_bound("2024-05-01T12:30:00").unwrap(), expected);
        assert_eq!(parse_time_bound("2024-05-01 12:30:00").unwrap(), expected);
        assert_eq!(
            parse_time_bound("2024-05-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert!(parse_time_bound("yesterday").is_err());
    }
}
