//! Use cases behind the HTTP API.
//!
//! [`Splinter`] checks credentials and authorship, then calls the store and
//! hands freshly created snippets to the highlight dispatcher.

mod validation;

pub use validation::{validate_password, validate_username};

use std::sync::Arc;

use serde::Serialize;

use crate::auth::{TokenAuthenticator, hash_password, verify_password};
use crate::error::{ServiceError, ValidationError};
use crate::highlighter::{Dispatcher, Renderer};
use crate::model::{Comment, CommentId, NewComment, NewSnippet, Snippet, SnippetId, User, UserId};
use crate::storage::{SnippetStorage, UserStorage};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// A created snippet. `warning` is set when highlighting could not be
/// queued; the snippet itself is stored either way.
#[derive(Debug, Clone, Serialize)]
pub struct PostedSnippet {
    pub snippet: Snippet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct Splinter<S, R> {
    store: Arc<S>,
    highlighter: Arc<Dispatcher<S, R>>,
    auth: TokenAuthenticator,
}

impl<S, R> Splinter<S, R>
where
    S: UserStorage + SnippetStorage + 'static,
    R: Renderer,
{
    pub fn new(store: Arc<S>, highlighter: Arc<Dispatcher<S, R>>, auth: TokenAuthenticator) -> Self {
        Self {
            store,
            highlighter,
            auth,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn highlighter(&self) -> &Arc<Dispatcher<S, R>> {
        &self.highlighter
    }

    pub async fn create_account(&self, username: &str, password: &str) -> ServiceResult<User> {
        validate_username(username)?;
        validate_password(password)?;

        let password_hash = hash_password(password)?;
        let account = self.store.create_account(username, &password_hash).await?;
        tracing::info!(user = %account.id, username = %account.username, "account created");
        Ok(User::from(&account))
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> ServiceResult<Session> {
        validate_username(username)?;
        validate_password(password)?;

        let account = match self.store.get_account_by_username(username).await {
            Ok(account) => account,
            Err(e) if e.is_not_found() => return Err(ServiceError::InvalidLogin),
            Err(e) => return Err(e.into()),
        };
        if !verify_password(&account.password_hash, password)? {
            return Err(ServiceError::InvalidPassword);
        }

        Ok(Session {
            token: self.auth.issue_token(account.id),
            user: User::from(&account),
        })
    }

    pub fn user_id_by_token(&self, token: &str) -> ServiceResult<UserId> {
        Ok(self.auth.user_id_by_token(token)?)
    }

    pub async fn get_user(&self, user: UserId) -> ServiceResult<User> {
        let account = self.store.get_account_by_id(user).await?;
        Ok(User::from(&account))
    }

    pub async fn post_snippet(&self, author: UserId, contents: &str, language: &str) -> ServiceResult<PostedSnippet> {
        if contents.trim().is_empty() {
            return Err(ValidationError::EmptySnippet.into());
        }
        if language.trim().is_empty() {
            return Err(ValidationError::EmptyLanguage.into());
        }

        let id = self
            .store
            .add_snippet(NewSnippet {
                contents: contents.to_string(),
                language: language.trim().to_string(),
                author,
            })
            .await?;
        let snippet = self.store.get_snippet(id).await?;

        let warning = match self.highlighter.post(snippet.clone()) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(snippet = %id, error = %e, "snippet stored without highlighting");
                Some(e.to_string())
            }
        };

        Ok(PostedSnippet { snippet, warning })
    }

    async fn with_current_vote(&self, mut snippet: Snippet, current: UserId) -> ServiceResult<Snippet> {
        snippet.current_user_vote = self.store.get_vote(current, snippet.id).await?;
        Ok(snippet)
    }

    async fn with_current_votes(&self, snippets: Vec<Snippet>, current: UserId) -> ServiceResult<Vec<Snippet>> {
        let mut out = Vec::with_capacity(snippets.len());
        for snippet in snippets {
            out.push(self.with_current_vote(snippet, current).await?);
        }
        Ok(out)
    }

    pub async fn get_snippets_by_user(&self, user: UserId, current: UserId) -> ServiceResult<Vec<Snippet>> {
        let snippets = self.store.get_snippets_by_user(user).await?;
        self.with_current_votes(snippets, current).await
    }

    pub async fn get_snippets_by_language(&self, language: &str, current: UserId) -> ServiceResult<Vec<Snippet>> {
        let snippets = self.store.get_snippets_by_language(language).await?;
        self.with_current_votes(snippets, current).await
    }

    pub async fn get_snippet(&self, current: UserId, id: SnippetId) -> ServiceResult<Snippet> {
        let snippet = self.store.get_snippet(id).await?;
        self.with_current_vote(snippet, current).await
    }

    pub async fn delete_snippet(&self, current: UserId, id: SnippetId) -> ServiceResult<()> {
        let snippet = self.store.get_snippet(id).await?;
        if snippet.author != current {
            return Err(ServiceError::MustBeSnippetAuthor(current));
        }
        self.store.delete_snippet(id).await?;
        tracing::info!(snippet = %id, user = %current, "snippet deleted");
        Ok(())
    }

    pub async fn vote(&self, current: UserId, id: SnippetId, vote: i32) -> ServiceResult<()> {
        self.store.get_snippet(id).await?;
        self.store.vote(current, id, vote).await?;
        Ok(())
    }

    pub async fn post_comment(&self, author: UserId, contents: &str, snippet: SnippetId) -> ServiceResult<Comment> {
        if contents.trim().is_empty() {
            return Err(ValidationError::EmptyComment.into());
        }
        self.store.get_snippet(snippet).await?;

        let id = self
            .store
            .add_comment(NewComment {
                contents: contents.to_string(),
                snippet,
                author,
            })
            .await?;
        Ok(self.store.get_comment(id).await?)
    }

    pub async fn get_comments(&self, snippet: SnippetId) -> ServiceResult<Vec<Comment>> {
        Ok(self.store.get_comments(snippet).await?)
    }

    pub async fn delete_comment(&self, current: UserId, id: CommentId) -> ServiceResult<()> {
        let comment = self.store.get_comment(id).await?;
        if comment.author != current {
            return Err(ServiceError::MustBeCommentAuthor(current));
        }
        self.store.delete_comment(id).await?;
        Ok(())
    }
}
