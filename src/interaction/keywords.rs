//! The canonical set of known keywords.

use std::collections::HashSet;

use crate::{prelude::*, service::db::{DbClient, Keyword}};

/// Keyword registry backed by the store.
///
/// There is no cache: every read goes to the store.
#[derive(Clone)]
pub struct KeywordRegistry {
    db: DbClient,
}

impl KeywordRegistry {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    /// Insert every keyword that is not already present.
    ///
    /// Blank names and repeats within `defaults` are skipped. Existing rows are never touched.
    /// Returns how many keywords were inserted.
    #[instrument(skip_all, fields(defaults = defaults.len()))]
    pub async fn ensure_seeded<S: AsRef<str>>(&self, defaults: &[S]) -> Res<usize> {
        let mut seen = HashSet::new();
        let mut inserted = 0;

        for name in defaults.iter().map(|n| n.as_ref().trim()) {
            if name.is_empty() || !seen.insert(name) {
                continue;
            }

            if self.db.insert_keyword_if_absent(name).await? {
                debug!("Seeded keyword `{}`.", name);
                inserted += 1;
            }
        }

        info!("Keyword registry seeded ({} new).", inserted);

        Ok(inserted)
    }

    /// All known keywords.
    pub async fn all(&self) -> Res<Vec<Keyword>> {
        self.db.list_keywords().await
    }
}
