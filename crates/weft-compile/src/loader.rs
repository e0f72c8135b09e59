#![forbid(unsafe_code)]

//! The template loader boundary.
//!
//! Markup-fetching directives (`e-req`, `e-include` fallback) obtain their
//! markup through [`TemplateLoader`]. The compiler only consumes the
//! returned string; where it comes from (disk, network, embedded assets) is
//! the host's business. [`InMemoryLoader`] ships for tests and embedding.

use std::cell::RefCell;

use ahash::HashMap;

/// Why a template could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// No template registered or reachable at the path.
    NotFound { path: String },
    /// The backing source failed.
    Io { path: String, message: String },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "template not found: {path}"),
            Self::Io { path, message } => write!(f, "failed loading {path}: {message}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Supplies markup for a template path.
pub trait TemplateLoader {
    fn request(&self, path: &str) -> Result<String, LoadError>;
}

/// Loader over a fixed in-memory path → markup table.
#[derive(Default)]
pub struct InMemoryLoader {
    templates: RefCell<HashMap<String, String>>,
}

impl InMemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) markup under a path.
    pub fn insert(&self, path: impl Into<String>, markup: impl Into<String>) {
        self.templates
            .borrow_mut()
            .insert(path.into(), markup.into());
    }
}

impl TemplateLoader for InMemoryLoader {
    fn request(&self, path: &str) -> Result<String, LoadError> {
        self.templates
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                path: path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let loader = InMemoryLoader::new();
        loader.insert("card.html", "<div>card</div>");
        assert_eq!(loader.request("card.html").unwrap(), "<div>card</div>");
        assert_eq!(
            loader.request("missing.html"),
            Err(LoadError::NotFound {
                path: "missing.html".to_string()
            })
        );
    }
}
