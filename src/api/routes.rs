use axum::{
    Router,
    routing::{delete, get, post},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create_account", post(handler::create_account))
        .route("/authenticate", post(handler::authenticate))
        .route("/users/current", get(handler::get_current_user))
        .route("/users/:user", get(handler::get_user))
        .route("/users/:user/snippets", get(handler::get_snippets_by_user))
        .route("/snippets", post(handler::post_snippet))
        .route("/snippets/language/:language", get(handler::get_snippets_by_language))
        .route(
            "/snippets/:snippet",
            get(handler::get_snippet).delete(handler::delete_snippet),
        )
        .route("/snippets/:snippet/vote", post(handler::vote))
        .route(
            "/snippets/:snippet/comments",
            get(handler::get_comments).post(handler::post_comment),
        )
        .route("/comments/:comment", delete(handler::delete_comment))
}
