//! Storage backends for accounts, snippets, votes and comments.
//!
//! Both backends implement [`UserStorage`] and [`SnippetStorage`], so the
//! service and the highlight dispatcher can run against either of them:
//!
//! - [`MemoryStore`]: everything behind one mutex, lost on restart.
//! - [`SqlStore`]: libsql database with embedded migrations.
//!
//! [`Backend`] picks one of them at startup from the config file.

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

use std::future::Future;
use std::path::Path;

use crate::config::{Config, StorageKind};
use crate::error::StoreError;
use crate::model::{
    Account, Comment, CommentId, NewComment, NewSnippet, Snippet, SnippetId, UserId,
};

pub type StoreResult<T> = Result<T, StoreError>;

pub trait UserStorage: Send + Sync {
    /// Fails with [`StoreError::AlreadyExists`] when the username is taken.
    fn create_account(
        &self,
        username: &str,
        password_hash: &str,
    ) -> impl Future<Output = StoreResult<Account>> + Send;

    fn get_account_by_id(&self, id: UserId) -> impl Future<Output = StoreResult<Account>> + Send;

    fn get_account_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = StoreResult<Account>> + Send;
}

pub trait SnippetStorage: Send + Sync {
    fn add_snippet(&self, snippet: NewSnippet) -> impl Future<Output = StoreResult<SnippetId>> + Send;

    fn get_snippet(&self, id: SnippetId) -> impl Future<Output = StoreResult<Snippet>> + Send;

    fn get_snippets_by_user(&self, user: UserId) -> impl Future<Output = StoreResult<Vec<Snippet>>> + Send;

    fn get_snippets_by_language(
        &self,
        language: &str,
    ) -> impl Future<Output = StoreResult<Vec<Snippet>>> + Send;

    /// Deleting a missing snippet is not an error.
    fn delete_snippet(&self, id: SnippetId) -> impl Future<Output = StoreResult<()>> + Send;

    fn set_snippet_highlight(
        &self,
        id: SnippetId,
        html: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Records a failed render. Ignored when the snippet is already rendered.
    fn mark_highlight_failed(
        &self,
        id: SnippetId,
        reason: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Inserts or overwrites the vote of `user` on `snippet`.
    fn vote(&self, user: UserId, snippet: SnippetId, vote: i32) -> impl Future<Output = StoreResult<()>> + Send;

    /// Returns 0 when the user never voted on the snippet.
    fn get_vote(&self, user: UserId, snippet: SnippetId) -> impl Future<Output = StoreResult<i32>> + Send;

    fn add_comment(&self, comment: NewComment) -> impl Future<Output = StoreResult<CommentId>> + Send;

    fn get_comment(&self, id: CommentId) -> impl Future<Output = StoreResult<Comment>> + Send;

    fn get_comments(&self, snippet: SnippetId) -> impl Future<Output = StoreResult<Vec<Comment>>> + Send;

    /// Deleting a missing comment is not an error.
    fn delete_comment(&self, id: CommentId) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Storage chosen at startup.
pub enum Backend {
    Memory(MemoryStore),
    Sql(SqlStore),
}

impl Backend {
    pub async fn new(cfg: &Config, data_dir: &Path) -> anyhow::Result<Self> {
        match cfg.app.storage {
            StorageKind::Memory => {
                tracing::info!("[storage] using in-memory store");
                Ok(Backend::Memory(MemoryStore::new()))
            }
            StorageKind::Libsql => {
                let path = data_dir.join(cfg.app.get_db());
                tracing::info!(path = ?path, "[storage] using libsql store");
                Ok(Backend::Sql(SqlStore::open(&path).await?))
            }
        }
    }
}

macro_rules! delegate {
    ($target:expr, $store:ident => $call:expr) => {
        match $target {
            Backend::Memory($store) => $call.await,
            Backend::Sql($store) => $call.await,
        }
    };
}

impl UserStorage for Backend {
    async fn create_account(&self, username: &str, password_hash: &str) -> StoreResult<Account> {
        delegate!(self, s => s.create_account(username, password_hash))
    }

    async fn get_account_by_id(&self, id: UserId) -> StoreResult<Account> {
        delegate!(self, s => s.get_account_by_id(id))
    }

    async fn get_account_by_username(&self, username: &str) -> StoreResult<Account> {
        delegate!(self, s => s.get_account_by_username(username))
    }
}

impl SnippetStorage for Backend {
    async fn add_snippet(&self, snippet: NewSnippet) -> StoreResult<SnippetId> {
        delegate!(self, s => s.add_snippet(snippet))
    }

    async fn get_snippet(&self, id: SnippetId) -> StoreResult<Snippet> {
        delegate!(self, s => s.get_snippet(id))
    }

    async fn get_snippets_by_user(&self, user: UserId) -> StoreResult<Vec<Snippet>> {
        delegate!(self, s => s.get_snippets_by_user(user))
    }

    async fn get_snippets_by_language(&self, language: &str) -> StoreResult<Vec<Snippet>> {
        delegate!(self, s => s.get_snippets_by_language(language))
    }

    async fn delete_snippet(&self, id: SnippetId) -> StoreResult<()> {
        delegate!(self, s => s.delete_snippet(id))
    }

    async fn set_snippet_highlight(&self, id: SnippetId, html: &str) -> StoreResult<()> {
        delegate!(self, s => s.set_snippet_highlight(id, html))
    }

    async fn mark_highlight_failed(&self, id: SnippetId, reason: &str) -> StoreResult<()> {
        delegate!(self, s => s.mark_highlight_failed(id, reason))
    }

    async fn vote(&self, user: UserId, snippet: SnippetId, vote: i32) -> StoreResult<()> {
        delegate!(self, s => s.vote(user, snippet, vote))
    }

    async fn get_vote(&self, user: UserId, snippet: SnippetId) -> StoreResult<i32> {
        delegate!(self, s => s.get_vote(user, snippet))
    }

    async fn add_comment(&self, comment: NewComment) -> StoreResult<CommentId> {
        delegate!(self, s => s.add_comment(comment))
    }

    async fn get_comment(&self, id: CommentId) -> StoreResult<Comment> {
        delegate!(self, s => s.get_comment(id))
    }

    async fn get_comments(&self, snippet: SnippetId) -> StoreResult<Vec<Comment>> {
        delegate!(self, s => s.get_comments(snippet))
    }

    async fn delete_comment(&self, id: CommentId) -> StoreResult<()> {
        delegate!(self, s => s.delete_comment(id))
    }
}
