//! Shared state for the API layer.

use std::sync::Arc;

use crate::portal::MeditLink;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub portal: Arc<MeditLink>,
}

impl ApiContext {
    pub fn new(portal: Arc<MeditLink>) -> Self {
        Self { portal }
    }
}
