use crate::model::{CommentId, SnippetId, UserId};
use std::process::ExitStatus;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("no such snippet: {0}")]
    SnippetNotFound(SnippetId),
    #[error("no such comment: {0}")]
    CommentNotFound(CommentId),
    #[error("account already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid vote: {0}")]
    InvalidVote(i32),
    #[error("store lock poisoned: {0}")]
    Lock(String),
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::AccountNotFound(_) | StoreError::SnippetNotFound(_) | StoreError::CommentNotFound(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("highlight queue is full, snippet {0} not queued")]
    QueueFull(SnippetId),
    #[error("highlight queue is closed, snippet {0} not queued")]
    Closed(SnippetId),
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to spawn renderer: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("renderer io: {0}")]
    Io(#[from] std::io::Error),
    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("renderer produced invalid utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("render timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("malformed token")]
    MalformedToken,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed password hash")]
    MalformedHash,
    #[error("password hashing failed: {0}")]
    Hashing(pbkdf2::password_hash::Error),
    #[error("token secret rejected")]
    InvalidSecret,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("username contains invalid character")]
    UsernameInvalidCharacters,
    #[error("username is too short")]
    UsernameTooShort,
    #[error("username is too long")]
    UsernameTooLong,
    #[error("password contains invalid character")]
    PasswordInvalidCharacters,
    #[error("password is too short")]
    PasswordTooShort,
    #[error("password is too long")]
    PasswordTooLong,
    #[error("snippet contents are empty")]
    EmptySnippet,
    #[error("language is empty")]
    EmptyLanguage,
    #[error("comment contents are empty")]
    EmptyComment,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("login not found")]
    InvalidLogin,
    #[error("invalid password")]
    InvalidPassword,
    #[error("user {0} must be the snippet's author")]
    MustBeSnippetAuthor(UserId),
    #[error("user {0} must be the comment's author")]
    MustBeCommentAuthor(UserId),
}
