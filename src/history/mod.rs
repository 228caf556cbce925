//! Read side of the relay: chronological two-party history and the
//! recency-ranked conversation list that orders a user's contacts.

use serde::Serialize;

use crate::store::{Message, MessageStore, StoreError};

/// One row of the ranked conversation list: a known counterpart and the
/// newest message shared with them, if any. Recomputed per query.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub user: String,
    pub last_message: Option<Message>,
}

/// Every message between `me` and `other` in either direction, ascending by
/// timestamp. A present, non-empty `search` narrows the result to messages
/// containing it case-insensitively; an empty string means no filter.
pub async fn between(
    store: &dyn MessageStore,
    me: &str,
    other: &str,
    search: Option<&str>,
) -> Result<Vec<Message>, StoreError> {
    let search = search.filter(|term| !term.is_empty());
    store.history(me, other, search).await
}

/// Ranks `others` by most recent shared message, newest first. Counterparts
/// with no shared history sort after everyone with at least one message.
///
/// Tie-break: equal timestamps (and the no-history tail) order ascending by
/// handle, so the ranking is deterministic and independent of the order the
/// roster was supplied in.
pub async fn rank(
    store: &dyn MessageStore,
    me: &str,
    others: &[String],
) -> Result<Vec<ConversationSummary>, StoreError> {
    let mut summaries = Vec::with_capacity(others.len());
    for other in others {
        summaries.push(ConversationSummary {
            user: other.clone(),
            last_message: store.latest(me, other).await?,
        });
    }
    sort_by_recency(&mut summaries);
    Ok(summaries)
}

fn sort_by_recency(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|x, y| {
        // None < Some(_), so comparing y to x puts absent history last.
        let ts_x = x.last_message.as_ref().map(|m| m.timestamp);
        let ts_y = y.last_message.as_ref().map(|m| m.timestamp);
        ts_y.cmp(&ts_x).then_with(|| x.user.cmp(&y.user))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn message(sender: &str, receiver: &str, content: &str, at: i64) -> Message {
        Message {
            id: Uuid::now_v7(),
            sender: sender.to_owned(),
            receiver: receiver.to_owned(),
            content: content.to_owned(),
            timestamp: OffsetDateTime::from_unix_timestamp(at).unwrap(),
        }
    }

    fn summary(user: &str, last: Option<Message>) -> ConversationSummary {
        ConversationSummary { user: user.to_owned(), last_message: last }
    }

    #[test]
    fn sort_puts_missing_history_last() {
        let mut summaries = vec![
            summary("carol", None),
            summary("bob", Some(message("bob", "alice", "hey", 200))),
            summary("dave", Some(message("alice", "dave", "yo", 100))),
        ];
        sort_by_recency(&mut summaries);

        let order: Vec<&str> = summaries.iter().map(|s| s.user.as_str()).collect();
        assert_eq!(order, ["bob", "dave", "carol"]);
    }

    #[test]
    fn sort_breaks_ties_by_handle() {
        let mut summaries = vec![
            summary("zed", Some(message("zed", "alice", "a", 100))),
            summary("bob", Some(message("bob", "alice", "b", 100))),
            summary("nia", None),
            summary("eve", None),
        ];
        sort_by_recency(&mut summaries);

        let order: Vec<&str> = summaries.iter().map(|s| s.user.as_str()).collect();
        assert_eq!(order, ["bob", "zed", "eve", "nia"]);
    }

    #[tokio::test]
    async fn rank_is_stable_under_roster_permutation() {
        let store = MemoryStore::new();
        store.append("alice", "bob", "hi").await.unwrap();
        store.append("bob", "alice", "hey").await.unwrap();

        let forward = rank(&store, "alice", &["bob".into(), "carol".into()])
            .await
            .unwrap();
        let backward = rank(&store, "alice", &["carol".into(), "bob".into()])
            .await
            .unwrap();

        assert_eq!(forward.len(), 2);
        assert_eq!(forward[0].user, "bob");
        assert_eq!(
            forward[0].last_message.as_ref().unwrap().content,
            "hey"
        );
        assert_eq!(forward[1].user, "carol");
        assert!(forward[1].last_message.is_none());

        let forward_order: Vec<&str> = forward.iter().map(|s| s.user.as_str()).collect();
        let backward_order: Vec<&str> = backward.iter().map(|s| s.user.as_str()).collect();
        assert_eq!(forward_order, backward_order);
    }

    #[tokio::test]
    async fn between_treats_empty_search_as_absent() {
        let store = MemoryStore::new();
        store.append("alice", "bob", "hi").await.unwrap();
        store.append("bob", "alice", "hey").await.unwrap();

        let all = between(&store, "alice", "bob", Some("")).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "hi");
        assert_eq!(all[1].content, "hey");

        let hits = between(&store, "alice", "bob", Some("hey")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sender, "bob");
    }
}
