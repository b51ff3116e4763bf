use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use tokio::sync::Mutex;

use super::{SnippetStorage, StoreResult, UserStorage};
use crate::error::StoreError;
use crate::model::{
    Account, Comment, CommentId, Highlight, NewComment, NewSnippet, Rating, Snippet, SnippetId,
    UserId, is_valid_vote,
};

const SYSTEM_MIGRATIONS: &[(&str, &str)] = &[(
    "system/000_migrations_table.sql",
    include_str!("migrations/system/000_migrations_table.sql"),
)];

const MIGRATIONS: &[(&str, &str)] = &[("001_schema.sql", include_str!("migrations/001_schema.sql"))];

const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

const SNIPPET_COLUMNS: &str = r#"
    snippets.id,
    snippets.contents,
    snippets.language,
    snippets.author,
    snippets.highlight_state,
    snippets.highlight,
    snippets.created_at,
    COALESCE(SUM(CASE WHEN votes.vote = 1 THEN 1 ELSE 0 END), 0) AS likes,
    COALESCE(SUM(CASE WHEN votes.vote = -1 THEN 1 ELSE 0 END), 0) AS dislikes
"#;

/// libsql-backed store. Survives restarts; same contract as the memory store.
pub struct SqlStore {
    _db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
}

impl SqlStore {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let db = Builder::new_local(path).build().await?;
        Self::with_database(db).await
    }

    /// Private database that disappears with the store. Used by tests.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::with_database(db).await
    }

    async fn with_database(db: LibsqlDatabase) -> anyhow::Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS.iter().chain(MIGRATIONS) {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(SqlStore {
            _db: db,
            conn,
            tx_lock: Mutex::new(()),
        })
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> anyhow::Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> anyhow::Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> anyhow::Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await
    }

    fn to_sql_id(id: u64) -> i64 {
        id as i64
    }

    fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
    }

    fn row_to_account(row: &libsql::Row) -> StoreResult<Account> {
        Ok(Account {
            id: UserId(row.get::<i64>(0)? as u64),
            username: row.get(1)?,
            password_hash: row.get(2)?,
        })
    }

    fn row_to_snippet(row: &libsql::Row) -> StoreResult<Snippet> {
        let state: String = row.get(4)?;
        let value: Option<String> = row.get(5)?;
        let highlight = Highlight::from_parts(&state, value)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown highlight state {state:?}")))?;
        let created_at: String = row.get(6)?;

        Ok(Snippet {
            id: SnippetId(row.get::<i64>(0)? as u64),
            contents: row.get(1)?,
            language: row.get(2)?,
            author: UserId(row.get::<i64>(3)? as u64),
            highlight,
            rating: Rating {
                likes: row.get::<i64>(7)? as u32,
                dislikes: row.get::<i64>(8)? as u32,
            },
            current_user_vote: 0,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    fn row_to_comment(row: &libsql::Row) -> StoreResult<Comment> {
        let created_at: String = row.get(4)?;
        Ok(Comment {
            id: CommentId(row.get::<i64>(0)? as u64),
            contents: row.get(1)?,
            snippet: SnippetId(row.get::<i64>(2)? as u64),
            author: UserId(row.get::<i64>(3)? as u64),
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    async fn query_account(&self, query: &str, params: impl libsql::params::IntoParams) -> StoreResult<Option<Account>> {
        let mut rows = self.conn.query(query, params).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn query_snippets(&self, filter: &str, params: impl libsql::params::IntoParams) -> StoreResult<Vec<Snippet>> {
        let query = format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets \
             LEFT JOIN votes ON votes.snippet_id = snippets.id \
             WHERE {filter} \
             GROUP BY snippets.id \
             ORDER BY snippets.id"
        );

        let mut rows = self.conn.query(&query, params).await?;
        let mut snippets = Vec::new();
        while let Some(row) = rows.next().await? {
            snippets.push(Self::row_to_snippet(&row)?);
        }
        Ok(snippets)
    }

    async fn snippet_exists(&self, id: SnippetId) -> StoreResult<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM snippets WHERE id = ?", libsql::params![Self::to_sql_id(id.0)])
            .await?;
        Ok(rows.next().await?.is_some())
    }
}

impl UserStorage for SqlStore {
    async fn create_account(&self, username: &str, password_hash: &str) -> StoreResult<Account> {
        let query = "INSERT INTO users (username, password) VALUES (?, ?) RETURNING id, username, password";
        let already_exists = |e: libsql::Error| match e {
            libsql::Error::SqliteFailure(SQLITE_CONSTRAINT_UNIQUE, _) => {
                StoreError::AlreadyExists(username.to_string())
            }
            e => StoreError::Database(e),
        };

        // with RETURNING the constraint may fire on the first step, not on prepare
        let mut rows = self
            .conn
            .query(query, libsql::params![username, password_hash])
            .await
            .map_err(already_exists)?;

        match rows.next().await.map_err(already_exists)? {
            Some(row) => Self::row_to_account(&row),
            None => Err(StoreError::Corrupt("insert returned no account".to_string())),
        }
    }

    async fn get_account_by_id(&self, id: UserId) -> StoreResult<Account> {
        self.query_account(
            "SELECT id, username, password FROM users WHERE id = ?",
            libsql::params![Self::to_sql_id(id.0)],
        )
        .await?
        .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))
    }

    async fn get_account_by_username(&self, username: &str) -> StoreResult<Account> {
        self.query_account(
            "SELECT id, username, password FROM users WHERE username = ?",
            libsql::params![username],
        )
        .await?
        .ok_or_else(|| StoreError::AccountNotFound(username.to_string()))
    }
}

impl SnippetStorage for SqlStore {
    async fn add_snippet(&self, snippet: NewSnippet) -> StoreResult<SnippetId> {
        let query = r#"
            INSERT INTO snippets (contents, language, author, highlight_state, created_at)
            VALUES (?, ?, ?, 'pending', ?)
            RETURNING id
        "#;
        let mut rows = self
            .conn
            .query(
                query,
                libsql::params![
                    snippet.contents,
                    snippet.language,
                    Self::to_sql_id(snippet.author.0),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(SnippetId(row.get::<i64>(0)? as u64)),
            None => Err(StoreError::Corrupt("insert returned no snippet id".to_string())),
        }
    }

    async fn get_snippet(&self, id: SnippetId) -> StoreResult<Snippet> {
        self.query_snippets("snippets.id = ?", libsql::params![Self::to_sql_id(id.0)])
            .await?
            .pop()
            .ok_or(StoreError::SnippetNotFound(id))
    }

    async fn get_snippets_by_user(&self, user: UserId) -> StoreResult<Vec<Snippet>> {
        self.query_snippets("snippets.author = ?", libsql::params![Self::to_sql_id(user.0)])
            .await
    }

    async fn get_snippets_by_language(&self, language: &str) -> StoreResult<Vec<Snippet>> {
        self.query_snippets("snippets.language = ?", libsql::params![language])
            .await
    }

    async fn delete_snippet(&self, id: SnippetId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM snippets WHERE id = ?", libsql::params![Self::to_sql_id(id.0)])
            .await?;
        Ok(())
    }

    async fn set_snippet_highlight(&self, id: SnippetId, html: &str) -> StoreResult<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE snippets SET highlight_state = 'rendered', highlight = ? WHERE id = ?",
                libsql::params![html, Self::to_sql_id(id.0)],
            )
            .await?;
        if updated == 0 {
            return Err(StoreError::SnippetNotFound(id));
        }
        Ok(())
    }

    async fn mark_highlight_failed(&self, id: SnippetId, reason: &str) -> StoreResult<()> {
        let _guard = self.tx_lock.lock().await;
        let updated = self
            .conn
            .execute(
                r#"
                UPDATE snippets SET highlight_state = 'failed', highlight = ?
                WHERE id = ? AND highlight_state != 'rendered'
                "#,
                libsql::params![reason, Self::to_sql_id(id.0)],
            )
            .await?;
        if updated == 0 && !self.snippet_exists(id).await? {
            return Err(StoreError::SnippetNotFound(id));
        }
        Ok(())
    }

    async fn vote(&self, user: UserId, snippet: SnippetId, vote: i32) -> StoreResult<()> {
        if !is_valid_vote(vote) {
            return Err(StoreError::InvalidVote(vote));
        }
        let query = r#"
            INSERT INTO votes (user_id, snippet_id, vote) VALUES (?, ?, ?)
            ON CONFLICT (user_id, snippet_id) DO UPDATE SET vote = excluded.vote
        "#;
        self.conn
            .execute(
                query,
                libsql::params![Self::to_sql_id(user.0), Self::to_sql_id(snippet.0), vote],
            )
            .await?;
        Ok(())
    }

    async fn get_vote(&self, user: UserId, snippet: SnippetId) -> StoreResult<i32> {
        let mut rows = self
            .conn
            .query(
                "SELECT vote FROM votes WHERE user_id = ? AND snippet_id = ?",
                libsql::params![Self::to_sql_id(user.0), Self::to_sql_id(snippet.0)],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i32>(0)?),
            None => Ok(0),
        }
    }

    async fn add_comment(&self, comment: NewComment) -> StoreResult<CommentId> {
        let query = r#"
            INSERT INTO comments (contents, snippet_id, author, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
        "#;
        let mut rows = self
            .conn
            .query(
                query,
                libsql::params![
                    comment.contents,
                    Self::to_sql_id(comment.snippet.0),
                    Self::to_sql_id(comment.author.0),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(CommentId(row.get::<i64>(0)? as u64)),
            None => Err(StoreError::Corrupt("insert returned no comment id".to_string())),
        }
    }

    async fn get_comment(&self, id: CommentId) -> StoreResult<Comment> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, contents, snippet_id, author, created_at FROM comments WHERE id = ?",
                libsql::params![Self::to_sql_id(id.0)],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Self::row_to_comment(&row),
            None => Err(StoreError::CommentNotFound(id)),
        }
    }

    async fn get_comments(&self, snippet: SnippetId) -> StoreResult<Vec<Comment>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, contents, snippet_id, author, created_at FROM comments WHERE snippet_id = ? ORDER BY id",
                libsql::params![Self::to_sql_id(snippet.0)],
            )
            .await?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next().await? {
            comments.push(Self::row_to_comment(&row)?);
        }
        Ok(comments)
    }

    async fn delete_comment(&self, id: CommentId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM comments WHERE id = ?", libsql::params![Self::to_sql_id(id.0)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_applied_once() {
        let store = SqlStore::in_memory().await.unwrap();
        for (filename, sql) in SYSTEM_MIGRATIONS.iter().chain(MIGRATIONS) {
            SqlStore::run_migration(&store.conn, filename, sql).await.unwrap();
        }
        let mut rows = store
            .conn
            .query("SELECT COUNT(*) FROM _migrations", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = SqlStore::in_memory().await.unwrap();
        let alice = store.create_account("alice", "hash").await.unwrap();
        assert_eq!(alice.id, UserId(1));
        let err = store.create_account("alice", "other").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(name) if name == "alice"));
        assert_eq!(
            store.get_account_by_username("alice").await.unwrap().password_hash,
            "hash"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_signups_see_already_exists() {
        let store = std::sync::Arc::new(SqlStore::in_memory().await.unwrap());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.create_account("alice", &format!("hash{i}")).await
            }));
        }

        let (mut created, mut duplicates) = (0, 0);
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(StoreError::AlreadyExists(name)) if name == "alice" => duplicates += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((created, duplicates), (1, 15));

        // the failed inserts did not consume ids
        let bob = store.create_account("bob", "hash").await.unwrap();
        assert_eq!(bob.id, UserId(2));
    }

    #[tokio::test]
    async fn snippet_lifecycle() {
        let store = SqlStore::in_memory().await.unwrap();
        let id = store
            .add_snippet(NewSnippet {
                contents: "print(1)".into(),
                language: "python".into(),
                author: UserId(1),
            })
            .await
            .unwrap();

        let snippet = store.get_snippet(id).await.unwrap();
        assert_eq!(snippet.highlight, Highlight::Pending);
        assert_eq!(snippet.language, "python");

        store.mark_highlight_failed(id, "boom").await.unwrap();
        assert_eq!(
            store.get_snippet(id).await.unwrap().highlight,
            Highlight::Failed("boom".into())
        );

        store.set_snippet_highlight(id, "<pre>print(1)</pre>").await.unwrap();
        store.mark_highlight_failed(id, "late failure").await.unwrap();
        assert_eq!(
            store.get_snippet(id).await.unwrap().highlighted_contents(),
            "<pre>print(1)</pre>"
        );

        store.delete_snippet(id).await.unwrap();
        assert!(matches!(
            store.get_snippet(id).await,
            Err(StoreError::SnippetNotFound(_))
        ));
        store.delete_snippet(id).await.unwrap();
        assert!(matches!(
            store.set_snippet_highlight(id, "x").await,
            Err(StoreError::SnippetNotFound(_))
        ));
        assert!(matches!(
            store.mark_highlight_failed(id, "x").await,
            Err(StoreError::SnippetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn votes_upsert_and_feed_rating() {
        let store = SqlStore::in_memory().await.unwrap();
        let id = store
            .add_snippet(NewSnippet {
                contents: "x".into(),
                language: "rust".into(),
                author: UserId(1),
            })
            .await
            .unwrap();

        store.vote(UserId(2), id, 1).await.unwrap();
        store.vote(UserId(2), id, -1).await.unwrap();
        store.vote(UserId(3), id, 1).await.unwrap();
        assert_eq!(store.get_vote(UserId(2), id).await.unwrap(), -1);
        assert_eq!(store.get_vote(UserId(4), id).await.unwrap(), 0);
        assert!(matches!(
            store.vote(UserId(2), id, 5).await,
            Err(StoreError::InvalidVote(5))
        ));

        let snippets = store.get_snippets_by_language("rust").await.unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].rating, Rating { likes: 1, dislikes: 1 });
    }

    #[tokio::test]
    async fn comments_round_trip() {
        let store = SqlStore::in_memory().await.unwrap();
        let id = store
            .add_comment(NewComment {
                contents: "nice".into(),
                snippet: SnippetId(3),
                author: UserId(1),
            })
            .await
            .unwrap();
        let comment = store.get_comment(id).await.unwrap();
        assert_eq!(comment.contents, "nice");
        assert_eq!(store.get_comments(SnippetId(3)).await.unwrap().len(), 1);

        store.delete_comment(id).await.unwrap();
        assert!(store.get_comments(SnippetId(3)).await.unwrap().is_empty());
        assert!(matches!(
            store.get_comment(id).await,
            Err(StoreError::CommentNotFound(_))
        ));
    }
}
