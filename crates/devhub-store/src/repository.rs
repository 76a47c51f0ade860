//! Typed repositories over the document store, one per record collection.

use std::{marker::PhantomData, sync::Arc};

use chrono::{SubsecRound, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    document::{Document, DocumentBody, DocumentStore, Query},
    error::StoreError,
    records::{CodeSnippet, LearningNote, PortfolioLink, Record},
};

pub type PortfolioRepository = Repository<PortfolioLink>;
pub type SnippetRepository = Repository<CodeSnippet>;
pub type NoteRepository = Repository<LearningNote>;

/// CRUD access to the collection bound to `R`.
///
/// Every call is a single document read or write. There is no version check
/// on update, so concurrent writers to one id are last-write-wins.
#[derive(Debug)]
pub struct Repository<R> {
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: Record> Repository<R> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// All records in the collection's display order.
    pub async fn list(&self) -> Result<Vec<R>, StoreError> {
        let records = self.run(Query::new()).await?;
        info!(collection = R::COLLECTION, count = records.len(), "listed records");
        Ok(records)
    }

    pub async fn filter_by_equality(
        &self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<R>, StoreError> {
        let value = value.into();
        let records = self
            .run(Query::new().where_equal(field, value.clone()))
            .await?;
        info!(
            collection = R::COLLECTION,
            field,
            %value,
            count = records.len(),
            "filtered records"
        );
        Ok(records)
    }

    pub async fn filter_by_array_contains(
        &self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<R>, StoreError> {
        let value = value.into();
        let records = self
            .run(Query::new().where_array_contains(field, value.clone()))
            .await?;
        info!(
            collection = R::COLLECTION,
            field,
            %value,
            count = records.len(),
            "filtered records by array membership"
        );
        Ok(records)
    }

    /// Point lookup. `Ok(None)` means the id does not exist.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<R>, StoreError> {
        match self.store.get(R::COLLECTION, id).await? {
            Some(doc) => decode(doc).map(Some),
            None => {
                warn!(collection = R::COLLECTION, id, "record not found");
                Ok(None)
            }
        }
    }

    /// Stores a new record and returns the id the store assigned to it.
    pub async fn create(&self, mut record: R) -> Result<String, StoreError> {
        record.prepare_create(Utc::now().trunc_subsecs(6));
        let body = encode(&record)?;
        let id = self.store.add(R::COLLECTION, body).await?;
        info!(collection = R::COLLECTION, id = %id, "created record");
        Ok(id)
    }

    /// Full replace of the document at `id`. Fields absent from `record` are
    /// not carried over from the stored version.
    pub async fn update(&self, id: &str, mut record: R) -> Result<(), StoreError> {
        record.prepare_update(Utc::now().trunc_subsecs(6));
        let body = encode(&record)?;
        self.store.set(R::COLLECTION, id, body).await?;
        info!(collection = R::COLLECTION, id, "updated record");
        Ok(())
    }

    /// Removes the record. Deleting a missing id is not an error.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let existed = self.store.delete(R::COLLECTION, id).await?;
        info!(collection = R::COLLECTION, id, existed, "deleted record");
        Ok(())
    }

    async fn run(&self, query: Query) -> Result<Vec<R>, StoreError> {
        let (field, direction) = R::ORDER_BY;
        self.store
            .query(R::COLLECTION, &query.order_by(field, direction))
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }
}

impl Repository<PortfolioLink> {
    pub async fn list_by_category(&self, category: &str) -> Result<Vec<PortfolioLink>, StoreError> {
        self.filter_by_equality("category", category).await
    }
}

impl Repository<CodeSnippet> {
    /// Snippets flagged for display in the portfolio.
    pub async fn list_public(&self) -> Result<Vec<CodeSnippet>, StoreError> {
        self.filter_by_equality("isPublic", true).await
    }

    pub async fn list_by_language(&self, language: &str) -> Result<Vec<CodeSnippet>, StoreError> {
        self.filter_by_equality("language", language).await
    }

    pub async fn list_by_tag(&self, tag: &str) -> Result<Vec<CodeSnippet>, StoreError> {
        self.filter_by_array_contains("tags", tag).await
    }
}

impl Repository<LearningNote> {
    pub async fn list_by_category(&self, category: &str) -> Result<Vec<LearningNote>, StoreError> {
        self.filter_by_equality("category", category).await
    }
}

fn encode<R: Record>(record: &R) -> Result<DocumentBody, StoreError> {
    let value = serde_json::to_value(record).map_err(|source| StoreError::Encode {
        collection: R::COLLECTION.to_string(),
        source,
    })?;
    match value {
        Value::Object(mut body) => {
            body.remove("id");
            Ok(body)
        }
        _ => Err(StoreError::NotAnObject(R::COLLECTION.to_string())),
    }
}

fn decode<R: Record>(doc: Document) -> Result<R, StoreError> {
    let Document { id, body } = doc;
    let mut record: R =
        serde_json::from_value(Value::Object(body)).map_err(|source| StoreError::Decode {
            collection: R::COLLECTION.to_string(),
            id: id.clone(),
            source,
        })?;
    record.set_id(id);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Database;
    use chrono::{Duration, TimeZone};

    async fn store() -> Arc<dyn DocumentStore> {
        Arc::new(Database::connect("sqlite::memory:").await.unwrap())
    }

    fn link(title: &str, order: i64, category: Option<&str>) -> PortfolioLink {
        PortfolioLink {
            title: title.into(),
            url: format!("https://example.com/{title}"),
            order: Some(order),
            category: category.map(str::to_string),
            ..PortfolioLink::default()
        }
    }

    fn snippet(title: &str, language: &str, tags: &[&str], public: bool) -> CodeSnippet {
        CodeSnippet {
            title: title.into(),
            code: format!("// {title}"),
            language: language.into(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            is_public: public,
            ..CodeSnippet::default()
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_input_with_id() {
        let repo = PortfolioRepository::new(store().await);
        let input = PortfolioLink {
            icon: Some("github".into()),
            description: Some("code".into()),
            ..link("GitHub", 1, Some("social"))
        };

        let id = repo.create(input.clone()).await.unwrap();
        let fetched = repo.get_by_id(&id).await.unwrap().unwrap();

        assert_eq!(fetched.id.as_deref(), Some(id.as_str()));
        assert_eq!(PortfolioLink { id: None, ..fetched }, input);
    }

    #[tokio::test]
    async fn missing_id_is_absent_not_error() {
        let repo = NoteRepository::new(store().await);
        assert!(repo.get_by_id("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn portfolio_list_is_ordered_by_order() {
        let repo = PortfolioRepository::new(store().await);
        for (title, order) in [("c", 30), ("a", 10), ("b", 20), ("a2", 10)] {
            repo.create(link(title, order, None)).await.unwrap();
        }

        let orders: Vec<i64> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|link| link.order.unwrap())
            .collect();
        assert!(orders.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(orders.len(), 4);
    }

    #[tokio::test]
    async fn category_filter_is_ordered_subset_of_list() {
        let repo = PortfolioRepository::new(store().await);
        repo.create(link("blog", 3, Some("writing"))).await.unwrap();
        repo.create(link("gh", 1, Some("code"))).await.unwrap();
        repo.create(link("medium", 2, Some("writing"))).await.unwrap();
        repo.create(link("misc", 0, None)).await.unwrap();

        let expected: Vec<PortfolioLink> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|link| link.category.as_deref() == Some("writing"))
            .collect();
        let filtered = repo.list_by_category("writing").await.unwrap();

        assert_eq!(filtered, expected);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].title, "medium");
    }

    #[tokio::test]
    async fn snippet_create_stamps_timestamps_and_lists_newest_first() {
        let repo = SnippetRepository::new(store().await);
        let bogus = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();

        let mut first = snippet("first", "rust", &[], false);
        first.created_at = Some(bogus);
        let first_id = repo.create(first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second_id = repo.create(snippet("second", "rust", &[], false)).await.unwrap();

        let stored = repo.get_by_id(&first_id).await.unwrap().unwrap();
        let created = stored.created_at.unwrap();
        assert_ne!(created, bogus);
        assert_eq!(stored.updated_at, Some(created));
        assert!(Utc::now() - created < Duration::minutes(1));

        let ids: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter_map(|snippet| snippet.id)
            .collect();
        assert_eq!(ids, vec![second_id, first_id]);
    }

    #[tokio::test]
    async fn snippet_update_is_full_replace_and_restamps_updated_at() {
        let repo = SnippetRepository::new(store().await);
        let mut original = snippet("fib", "python", &["algo"], true);
        original.description = Some("memoized".into());
        let id = repo.create(original).await.unwrap();
        let stored = repo.get_by_id(&id).await.unwrap().unwrap();

        let replacement = CodeSnippet {
            created_at: stored.created_at,
            ..snippet("fib v2", "python", &[], false)
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repo.update(&id, replacement).await.unwrap();

        let updated = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(updated.title, "fib v2");
        assert!(updated.description.is_none());
        assert!(updated.tags.is_empty());
        assert!(!updated.is_public);
        assert_eq!(updated.created_at, stored.created_at);
        assert!(updated.updated_at > stored.updated_at);
    }

    #[tokio::test]
    async fn snippet_filters() {
        let repo = SnippetRepository::new(store().await);
        let public_id = repo
            .create(snippet("fib", "python", &["algo", "dp"], true))
            .await
            .unwrap();
        repo.create(snippet("server", "rust", &["web"], false))
            .await
            .unwrap();

        let public = repo.list_public().await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].id.as_deref(), Some(public_id.as_str()));

        assert_eq!(repo.list_by_language("rust").await.unwrap().len(), 1);
        assert!(repo.list_by_language("go").await.unwrap().is_empty());

        let tagged = repo.list_by_tag("dp").await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].title, "fib");
    }

    #[tokio::test]
    async fn delete_removes_record_and_tolerates_missing() {
        let repo = NoteRepository::new(store().await);
        let id = repo
            .create(LearningNote {
                title: "GKE".into(),
                content: "autopilot".into(),
                ..LearningNote::default()
            })
            .await
            .unwrap();

        repo.delete(&id).await.unwrap();
        assert!(repo.get_by_id(&id).await.unwrap().is_none());
        repo.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn notes_list_newest_date_first() {
        let repo = NoteRepository::new(store().await);
        for (title, day) in [("old", 1), ("new", 20), ("mid", 10)] {
            repo.create(LearningNote {
                title: title.into(),
                content: "c".into(),
                date: Some(Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()),
                ..LearningNote::default()
            })
            .await
            .unwrap();
        }

        let titles: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|note| note.title)
            .collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
    }
}
