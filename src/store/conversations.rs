//! Conversation and preference persistence for [`SqliteStore`].

use super::sqlite::{parse_timestamp, parsed_column};
use super::{ConversationStore, SqliteStore};
use crate::error::{QuarryError, Result};
use crate::models::{Citation, Conversation, ConversationSummary, Turn, TurnRole, UserPreferences};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use uuid::Uuid;

fn not_found(id: Uuid) -> QuarryError {
    QuarryError::NotFound(format!("conversation {}", id))
}

/// Fail unless the conversation exists and belongs to `user_id`.
fn ensure_owned(conn: &Connection, user_id: &str, id: Uuid) -> Result<()> {
    let owned: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM conversations WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id],
            |row| row.get(0),
        )
        .optional()?;
    owned.map(|_| ()).ok_or_else(|| not_found(id))
}

fn load_turns(conn: &Connection, id: Uuid) -> Result<Vec<Turn>> {
    let mut stmt = conn.prepare(
        "SELECT role, content, citations_json, created_at
         FROM conversation_turns WHERE conversation_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![id.to_string()], |row| {
            let citations: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok((parsed_column::<TurnRole>(row, 0)?, row.get::<_, String>(1)?, citations, created_at))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(role, content, citations, created_at)| -> Result<Turn> {
            Ok(Turn {
                role,
                content,
                citations: serde_json::from_str::<Vec<Citation>>(&citations)?,
                created_at: parse_timestamp(&created_at),
            })
        })
        .collect()
}

fn load_context_sources(conn: &Connection, id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT source_id FROM conversation_sources WHERE conversation_id = ?1 ORDER BY rowid",
    )?;
    let sources = stmt
        .query_map(params![id.to_string()], |row| parsed_column(row, 0))?
        .collect::<rusqlite::Result<Vec<Uuid>>>()?;
    Ok(sources)
}

#[async_trait]
impl ConversationStore for SqliteStore {
    #[instrument(skip(self, system_prompt))]
    async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
        system_prompt: Option<&str>,
    ) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            system_prompt: system_prompt.map(str::to_string),
            turns: Vec::new(),
            context_sources: Vec::new(),
            last_activity_at: now,
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO conversations
            (id, user_id, title, system_prompt, last_activity_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                conversation.id.to_string(),
                conversation.user_id,
                conversation.title,
                conversation.system_prompt,
                now.to_rfc3339(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        info!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    async fn get_conversation(&self, user_id: &str, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.lock()?;

        let header = conn
            .query_row(
                "SELECT title, system_prompt, last_activity_at, created_at, updated_at
                 FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((title, system_prompt, last_activity_at, created_at, updated_at)) = header else {
            return Ok(None);
        };

        Ok(Some(Conversation {
            id,
            user_id: user_id.to_string(),
            title,
            system_prompt,
            turns: load_turns(&conn, id)?,
            context_sources: load_context_sources(&conn, id)?,
            last_activity_at: parse_timestamp(&last_activity_at),
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        }))
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.title, c.last_activity_at, c.created_at,
                   (SELECT COUNT(*) FROM conversation_turns t WHERE t.conversation_id = c.id)
            FROM conversations c
            WHERE c.user_id = ?1
            ORDER BY c.last_activity_at DESC
            "#,
        )?;

        let conversations = stmt
            .query_map(params![user_id], |row| {
                let last_activity_at: String = row.get(2)?;
                let created_at: String = row.get(3)?;
                Ok(ConversationSummary {
                    id: parsed_column(row, 0)?,
                    title: row.get(1)?,
                    last_activity_at: parse_timestamp(&last_activity_at),
                    created_at: parse_timestamp(&created_at),
                    turn_count: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conversations)
    }

    async fn rename_conversation(&self, user_id: &str, id: Uuid, title: &str) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
            params![title, Utc::now().to_rfc3339(), id.to_string(), user_id],
        )?;
        if updated == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn set_conversation_prompt(
        &self,
        user_id: &str,
        id: Uuid,
        system_prompt: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE conversations SET system_prompt = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
            params![system_prompt, Utc::now().to_rfc3339(), id.to_string(), user_id],
        )?;
        if updated == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_conversation(&self, user_id: &str, id: Uuid) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id],
        )?;
        if deleted == 0 {
            return Err(not_found(id));
        }
        info!("Deleted conversation {}", id);
        Ok(())
    }

    #[instrument(skip(self, user_turn, assistant_turn, context_sources))]
    async fn append_exchange(
        &self,
        user_id: &str,
        id: Uuid,
        user_turn: &Turn,
        assistant_turn: &Turn,
        context_sources: &[Uuid],
    ) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        ensure_owned(&tx, user_id, id)?;

        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM conversation_turns WHERE conversation_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;

        for (offset, turn) in [user_turn, assistant_turn].into_iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO conversation_turns
                (conversation_id, position, role, content, citations_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    id.to_string(),
                    next + offset as i64,
                    turn.role.as_str(),
                    turn.content,
                    serde_json::to_string(&turn.citations)?,
                    turn.created_at.to_rfc3339(),
                ],
            )?;
        }

        for source_id in context_sources {
            tx.execute(
                "INSERT OR IGNORE INTO conversation_sources (conversation_id, source_id) VALUES (?1, ?2)",
                params![id.to_string(), source_id.to_string()],
            )?;
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE conversations SET last_activity_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![now, id.to_string()],
        )?;

        tx.commit()?;
        debug!("Appended exchange at position {} to conversation {}", next, id);
        Ok(())
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        let conn = self.lock()?;
        let preferences = conn
            .query_row(
                "SELECT model, temperature, max_tokens, default_system_prompt
                 FROM preferences WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserPreferences {
                        user_id: user_id.to_string(),
                        model: row.get(0)?,
                        temperature: row.get::<_, f64>(1)? as f32,
                        max_tokens: row.get(2)?,
                        default_system_prompt: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(preferences)
    }

    async fn save_preferences(&self, preferences: &UserPreferences) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO preferences (user_id, model, temperature, max_tokens, default_system_prompt, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                model = excluded.model,
                temperature = excluded.temperature,
                max_tokens = excluded.max_tokens,
                default_system_prompt = excluded.default_system_prompt,
                updated_at = excluded.updated_at
            "#,
            params![
                preferences.user_id,
                preferences.model,
                preferences.temperature as f64,
                preferences.max_tokens,
                preferences.default_system_prompt,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!("Saved preferences for {}", preferences.user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn citation() -> Citation {
        Citation {
            source_id: Uuid::new_v4(),
            kind: SourceKind::Video,
            title: "Talk".to_string(),
            author: None,
            timestamp: Some("01:05".to_string()),
            start_seconds: 65.0,
            snippet: "snippet".to_string(),
            score: 0.9,
            url: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=65s".to_string()),
            thumbnail_url: None,
        }
    }

    #[tokio::test]
    async fn test_exchanges_append_in_order() {
        let store = SqliteStore::in_memory().unwrap();
        let conversation = store.create_conversation("u1", "First", None).await.unwrap();
        let source = Uuid::new_v4();

        store
            .append_exchange(
                "u1",
                conversation.id,
                &Turn::user("what is it?", vec![citation()]),
                &Turn::assistant("it is this"),
                &[source],
            )
            .await
            .unwrap();
        store
            .append_exchange("u1", conversation.id, &Turn::user("thanks", vec![]), &Turn::assistant("welcome"), &[source])
            .await
            .unwrap();

        let loaded = store.get_conversation("u1", conversation.id).await.unwrap().unwrap();
        let roles: Vec<TurnRole> = loaded.turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![TurnRole::User, TurnRole::Assistant, TurnRole::User, TurnRole::Assistant]);
        assert_eq!(loaded.turns[0].citations.len(), 1);
        assert!(loaded.turns[1].citations.is_empty());
        assert_eq!(loaded.turns[3].content, "welcome");
        assert_eq!(loaded.context_sources, vec![source]);
    }

    #[tokio::test]
    async fn test_conversations_are_owner_scoped() {
        let store = SqliteStore::in_memory().unwrap();
        let conversation = store.create_conversation("u1", "Mine", None).await.unwrap();

        assert!(store.get_conversation("u2", conversation.id).await.unwrap().is_none());
        assert!(store.list_conversations("u2").await.unwrap().is_empty());
        assert!(store.rename_conversation("u2", conversation.id, "x").await.is_err());
        assert!(store.delete_conversation("u2", conversation.id).await.is_err());
        assert!(store
            .append_exchange("u2", conversation.id, &Turn::user("hi", vec![]), &Turn::assistant("hey"), &[])
            .await
            .is_err());

        store.rename_conversation("u1", conversation.id, "Renamed").await.unwrap();
        store.set_conversation_prompt("u1", conversation.id, Some("Be terse.")).await.unwrap();
        let loaded = store.get_conversation("u1", conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Renamed");
        assert_eq!(loaded.system_prompt.as_deref(), Some("Be terse."));

        store.delete_conversation("u1", conversation.id).await.unwrap();
        assert!(store.list_conversations("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preferences_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_preferences("u1").await.unwrap().is_none());

        let mut prefs = UserPreferences {
            user_id: "u1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.5,
            max_tokens: 800,
            default_system_prompt: None,
        };
        store.save_preferences(&prefs).await.unwrap();
        prefs.max_tokens = 1200;
        store.save_preferences(&prefs).await.unwrap();

        let loaded = store.get_preferences("u1").await.unwrap().unwrap();
        assert_eq!(loaded.max_tokens, 1200);
        assert!((loaded.temperature - 0.5).abs() < f32::EPSILON);
    }
}
