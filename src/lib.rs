use std::error::Error;

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod highlighter;
pub mod model;
pub mod service;
pub mod storage;

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RenderError, ServiceError, StoreError};
    use crate::model::SnippetId;

    #[test]
    fn unpack_error_walks_the_source_chain() {
        let err = RenderError::Spawn(std::io::Error::new(std::io::ErrorKind::NotFound, "no pygmentize"));
        assert_eq!(
            unpack_error(&err),
            "failed to spawn renderer: no pygmentize: no pygmentize"
        );

        let err = ServiceError::Store(StoreError::SnippetNotFound(SnippetId(3)));
        assert_eq!(unpack_error(&err), "no such snippet: 3");
    }
}
