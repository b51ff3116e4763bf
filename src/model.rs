use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                $name(id)
            }
        }
    };
}

id_type!(UserId);
id_type!(SnippetId);
id_type!(CommentId);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

impl From<&Account> for User {
    fn from(account: &Account) -> Self {
        User {
            id: account.id,
            username: account.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub likes: u32,
    pub dislikes: u32,
}

/// Rendering state of a snippet.
///
/// `Rendered` is terminal with respect to failures: once a snippet has
/// rendered markup, a later failure report does not replace it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Highlight {
    #[default]
    Pending,
    Rendered(String),
    Failed(String),
}

impl Highlight {
    pub fn as_str(&self) -> &'static str {
        match self {
            Highlight::Pending => "pending",
            Highlight::Rendered(_) => "rendered",
            Highlight::Failed(_) => "failed",
        }
    }

    pub fn from_parts(state: &str, value: Option<String>) -> Option<Self> {
        match state {
            "pending" => Some(Highlight::Pending),
            "rendered" => Some(Highlight::Rendered(value.unwrap_or_default())),
            "failed" => Some(Highlight::Failed(value.unwrap_or_default())),
            _ => None,
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, Highlight::Rendered(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Highlight::Pending => None,
            Highlight::Rendered(s) | Highlight::Failed(s) => Some(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: SnippetId,
    pub contents: String,
    pub highlight: Highlight,
    pub language: String,
    pub author: UserId,
    pub rating: Rating,
    #[serde(default)]
    pub current_user_vote: i32,
    pub created_at: DateTime<Utc>,
}

impl Snippet {
    /// Rendered markup, or an empty string while pending or after a failure.
    pub fn highlighted_contents(&self) -> &str {
        match &self.highlight {
            Highlight::Rendered(html) => html,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnippet {
    pub contents: String,
    pub language: String,
    pub author: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub contents: String,
    pub snippet: SnippetId,
    pub author: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub contents: String,
    pub snippet: SnippetId,
    pub author: UserId,
}

pub const VOTE_VALUES: [i32; 3] = [-1, 0, 1];

pub fn is_valid_vote(vote: i32) -> bool {
    VOTE_VALUES.contains(&vote)
}
