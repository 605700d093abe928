//! Per-call dispatch context.

use super::metadata::{MetaValue, Metadata, MIRROR};
use crate::cancellation::CancellationToken;
use std::sync::Arc;

/// Explicit per-call context passed to enqueue operations and batch handlers.
///
/// Carries a metadata overlay and an optional cancellation token. Cloning is
/// cheap: the metadata is shared and only copied when a clone adds entries.
#[derive(Debug, Clone, Default)]
pub struct Context {
    metadata: Arc<Metadata>,
    cancel_token: Option<Arc<CancellationToken>>,
}

impl Context {
    /// Creates an empty context with no metadata and no cancellation.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Creates a context that marks its traffic as mirrored.
    #[must_use]
    pub fn mirror() -> Self {
        Self::background().with_value(MIRROR, "1")
    }

    /// Overlays `md` on this context's metadata. Keys in `md` win.
    #[must_use]
    pub fn with_metadata(mut self, md: Metadata) -> Self {
        if self.metadata.is_empty() {
            self.metadata = Arc::new(md);
        } else {
            Arc::make_mut(&mut self.metadata).extend(&md);
        }
        self
    }

    /// Sets a single metadata entry.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        Arc::make_mut(&mut self.metadata).insert(key, value);
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Returns the metadata overlay.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the cancellation token, if any.
    #[must_use]
    pub fn cancel_token(&self) -> Option<&Arc<CancellationToken>> {
        self.cancel_token.as_ref()
    }

    /// Returns true if this context carries the mirror flag.
    #[must_use]
    pub fn is_mirror(&self) -> bool {
        self.metadata.bool(MIRROR)
    }

    /// Returns true if the attached token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Returns a description of why the context was cancelled.
    #[must_use]
    pub fn cancel_reason(&self) -> String {
        self.cancel_token
            .as_ref()
            .and_then(|t| t.reason())
            .unwrap_or_else(|| "context canceled".to_string())
    }

    /// Completes when the context is cancelled. Never completes without a token.
    pub async fn cancelled(&self) {
        match &self.cancel_token {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    }
}
