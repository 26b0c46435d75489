//! Previously stored offers, used when live sources come back short.

use std::sync::Arc;

use async_trait::async_trait;

use super::{OfferSource, SourceError};
use crate::models::{Offer, SearchFilters, SortBy, SourceType};
use crate::repository::OfferStore;

pub struct DatabaseSource {
    store: Arc<dyn OfferStore>,
}

impl DatabaseSource {
    pub fn new(store: Arc<dyn OfferStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OfferSource for DatabaseSource {
    fn name(&self) -> &str {
        "database"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Cache
    }

    fn is_fallback(&self) -> bool {
        true
    }

    async fn fetch(&self, filters: &SearchFilters) -> Result<Vec<Offer>, SourceError> {
        let query = filters.clone().sort_by(SortBy::Updated);
        Ok(self.store.search(&query).await?)
    }
}
