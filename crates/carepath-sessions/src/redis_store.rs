use std::time::Duration;

use async_trait::async_trait;
use carepath_core::config::{APPEND_RETRY_ATTEMPTS, APPEND_RETRY_JITTER_MS};
use carepath_core::{ConversationMessage, Session, SessionId};
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{instrument, warn};

use crate::error::{Result, SessionStoreError};
use crate::store::SessionStore;

const SESSION_KEY_PREFIX: &str = "carepath:session:";
const USER_INDEX_PREFIX: &str = "carepath:session:user:";

/// Compare-and-swap: only replaces the stored value if its `version` field
/// still matches `ARGV[2]`. Returns 1 on success, 0 on a lost race.
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == false then
    return 0
end
local ok, obj = pcall(cjson.decode, current)
if not ok then
    return 0
end
if tostring(obj.version) ~= ARGV[2] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
return 1
"#;

fn session_key(id: SessionId) -> String {
    format!("{SESSION_KEY_PREFIX}{id}")
}

fn user_index_key(user_id: &str) -> String {
    format!("{USER_INDEX_PREFIX}{user_id}")
}

/// Redis-backed `SessionStore` (§4.1). Shared across every orchestrator
/// instance; a `ConnectionManager` transparently reconnects on drops.
pub struct RedisSessionStore {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisSessionStore {
    pub async fn connect(redis_url: &str, ttl_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;
        Ok(Self { conn, ttl_secs })
    }

    async fn compare_and_swap(&self, session: &Session, expected_version: u64) -> Result<bool> {
        let key = session_key(session.id);
        let payload = serde_json::to_string(session)
            .map_err(|e| SessionStoreError::Codec(e.to_string()))?;

        let script = redis::Script::new(CAS_SCRIPT);
        let mut conn = self.conn.clone();
        let result: i64 = script
            .key(&key)
            .arg(&payload)
            .arg(expected_version.to_string())
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;
        Ok(result == 1)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn get(&self, session_id: SessionId) -> Result<Option<Session>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(session_key(session_id))
            .await
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| SessionStoreError::Codec(e.to_string())),
        }
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn put(&self, session: Session) -> Result<()> {
        let key = session_key(session.id);
        let payload = serde_json::to_string(&session)
            .map_err(|e| SessionStoreError::Codec(e.to_string()))?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(&key, payload, self.ttl_secs)
            .await
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;
        let _: () = conn
            .sadd(user_index_key(&session.user_id), session.id.to_string())
            .await
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn delete(&self, session_id: SessionId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(session_key(session_id))
            .await
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id))]
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionId>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(user_index_key(user_id))
            .await
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;
        Ok(ids.into_iter().filter_map(|s| SessionId::parse(&s).ok()).collect())
    }

    #[instrument(skip(self, message), fields(session_id = %session_id))]
    async fn append_message(
        &self,
        session_id: SessionId,
        message: ConversationMessage,
        max_history: usize,
    ) -> Result<Session> {
        for attempt in 0..APPEND_RETRY_ATTEMPTS {
            let mut session = self.get(session_id).await?.ok_or_else(|| {
                SessionStoreError::Conflict {
                    session_id: session_id.to_string(),
                }
            })?;
            let expected_version = session.version;
            session.append_message(message.clone(), max_history);
            session.version = expected_version + 1;

            if self.compare_and_swap(&session, expected_version).await? {
                return Ok(session);
            }

            warn!(session_id = %session_id, attempt, "append_message lost a write race, retrying");
            let jitter = rand::thread_rng().gen_range(0..=APPEND_RETRY_JITTER_MS);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }

        Err(SessionStoreError::Conflict {
            session_id: session_id.to_string(),
        })
    }
}
