use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{SnippetStorage, StoreResult, UserStorage};
use crate::error::StoreError;
use crate::model::{
    Account, Comment, CommentId, Highlight, NewComment, NewSnippet, Rating, Snippet, SnippetId,
    UserId, is_valid_vote,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<UserId, Account>,
    accounts_by_username: HashMap<String, UserId>,
    snippets: HashMap<SnippetId, Snippet>,
    votes: HashMap<(UserId, SnippetId), i32>,
    comments: HashMap<CommentId, Comment>,
    next_user_id: u64,
    next_snippet_id: u64,
    next_comment_id: u64,
}

impl Inner {
    fn rating(&self, snippet: SnippetId) -> Rating {
        let mut rating = Rating::default();
        for (&(_, s), &vote) in &self.votes {
            if s != snippet {
                continue;
            }
            match vote {
                1 => rating.likes += 1,
                -1 => rating.dislikes += 1,
                _ => {}
            }
        }
        rating
    }

    fn snippet_with_rating(&self, snippet: &Snippet) -> Snippet {
        let mut snippet = snippet.clone();
        snippet.rating = self.rating(snippet.id);
        snippet
    }

    fn snippets_where(&self, keep: impl Fn(&Snippet) -> bool) -> Vec<Snippet> {
        let mut snippets: Vec<Snippet> = self
            .snippets
            .values()
            .filter(|s| keep(s))
            .map(|s| self.snippet_with_rating(s))
            .collect();
        snippets.sort_by_key(|s| s.id);
        snippets
    }
}

/// In-memory store. A single mutex covers every collection and is held for
/// the whole of each operation, so all operations are totally ordered.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_user_id: 1,
                next_snippet_id: 1,
                next_comment_id: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl UserStorage for MemoryStore {
    async fn create_account(&self, username: &str, password_hash: &str) -> StoreResult<Account> {
        let mut inner = self.lock()?;
        if inner.accounts_by_username.contains_key(username) {
            return Err(StoreError::AlreadyExists(username.to_string()));
        }

        let account = Account {
            id: UserId(inner.next_user_id),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        inner.next_user_id += 1;
        inner
            .accounts_by_username
            .insert(account.username.clone(), account.id);
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account_by_id(&self, id: UserId) -> StoreResult<Account> {
        self.lock()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))
    }

    async fn get_account_by_username(&self, username: &str) -> StoreResult<Account> {
        let inner = self.lock()?;
        inner
            .accounts_by_username
            .get(username)
            .and_then(|id| inner.accounts.get(id))
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(username.to_string()))
    }
}

impl SnippetStorage for MemoryStore {
    async fn add_snippet(&self, snippet: NewSnippet) -> StoreResult<SnippetId> {
        let mut inner = self.lock()?;
        let id = SnippetId(inner.next_snippet_id);
        inner.next_snippet_id += 1;
        inner.snippets.insert(
            id,
            Snippet {
                id,
                contents: snippet.contents,
                highlight: Highlight::Pending,
                language: snippet.language,
                author: snippet.author,
                rating: Rating::default(),
                current_user_vote: 0,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_snippet(&self, id: SnippetId) -> StoreResult<Snippet> {
        let inner = self.lock()?;
        inner
            .snippets
            .get(&id)
            .map(|s| inner.snippet_with_rating(s))
            .ok_or(StoreError::SnippetNotFound(id))
    }

    async fn get_snippets_by_user(&self, user: UserId) -> StoreResult<Vec<Snippet>> {
        Ok(self.lock()?.snippets_where(|s| s.author == user))
    }

    async fn get_snippets_by_language(&self, language: &str) -> StoreResult<Vec<Snippet>> {
        Ok(self.lock()?.snippets_where(|s| s.language == language))
    }

    async fn delete_snippet(&self, id: SnippetId) -> StoreResult<()> {
        self.lock()?.snippets.remove(&id);
        Ok(())
    }

    async fn set_snippet_highlight(&self, id: SnippetId, html: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let snippet = inner
            .snippets
            .get_mut(&id)
            .ok_or(StoreError::SnippetNotFound(id))?;
        snippet.highlight = Highlight::Rendered(html.to_string());
        Ok(())
    }

    async fn mark_highlight_failed(&self, id: SnippetId, reason: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let snippet = inner
            .snippets
            .get_mut(&id)
            .ok_or(StoreError::SnippetNotFound(id))?;
        if !snippet.highlight.is_rendered() {
            snippet.highlight = Highlight::Failed(reason.to_string());
        }
        Ok(())
    }

    async fn vote(&self, user: UserId, snippet: SnippetId, vote: i32) -> StoreResult<()> {
        if !is_valid_vote(vote) {
            return Err(StoreError::InvalidVote(vote));
        }
        self.lock()?.votes.insert((user, snippet), vote);
        Ok(())
    }

    async fn get_vote(&self, user: UserId, snippet: SnippetId) -> StoreResult<i32> {
        Ok(self
            .lock()?
            .votes
            .get(&(user, snippet))
            .copied()
            .unwrap_or(0))
    }

    async fn add_comment(&self, comment: NewComment) -> StoreResult<CommentId> {
        let mut inner = self.lock()?;
        let id = CommentId(inner.next_comment_id);
        inner.next_comment_id += 1;
        inner.comments.insert(
            id,
            Comment {
                id,
                contents: comment.contents,
                snippet: comment.snippet,
                author: comment.author,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_comment(&self, id: CommentId) -> StoreResult<Comment> {
        self.lock()?
            .comments
            .get(&id)
            .cloned()
            .ok_or(StoreError::CommentNotFound(id))
    }

    async fn get_comments(&self, snippet: SnippetId) -> StoreResult<Vec<Comment>> {
        let inner = self.lock()?;
        let mut comments: Vec<Comment> = inner
            .comments
            .values()
            .filter(|c| c.snippet == snippet)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.id);
        Ok(comments)
    }

    async fn delete_comment(&self, id: CommentId) -> StoreResult<()> {
        self.lock()?.comments.remove(&id);
        Ok(())
    }
}
