//! Version 1 of the HTTP API.
//!
//! Every route except `create_account` and `authenticate` requires the
//! `Authorization` header to carry a token issued by `authenticate`.
//!
//! # Usage
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .nest("/api/v1", api::routes())
//!     .with_state(app_state);
//! ```

mod handler;
mod routes;

pub use handler::{ApiResponse, CurrentUser, ErrorResponse, status_for};
pub use routes::routes;
