//! Mutation-coordinating store
//!
//! Owns the transient, rebuildable projection of backend state: the paper
//! list and the entity index. Every fetch and search is tagged with a
//! monotonically increasing sequence number so an in-flight response that
//! arrives after a newer one is discarded instead of overwriting it. Every
//! successful mutation invalidates the projection and completes a full
//! fetch-and-rebuild cycle before the call returns, so callers never see a
//! success acknowledgment paired with a stale index.

use crate::index::{EntityIndex, IndexEntry};
use crate::search::{self, EntityQuery, SearchMode, SearchResults};
use crate::transport::Backend;
use paperscope_common::{
    models::{DeleteAck, EntityFeed, GraphPayload, Paper},
    AppConfig, ClientError, IntegrityWarning, Result,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// The in-memory projection plus the bookkeeping that keeps it consistent.
#[derive(Debug, Default)]
struct Projection {
    papers: Vec<Paper>,
    index: EntityIndex,
    /// The result set the presentation layer currently sees.
    visible: Option<SearchResults>,
    /// Sequence of the last update applied to papers/index.
    applied_seq: u64,
    /// Sequence of the last update applied to the visible result set.
    visible_seq: u64,
    /// False between invalidate() and the next completed rebuild.
    fresh: bool,
}

/// Coordinates fetches, searches, and mutations against a [`Backend`].
///
/// All methods take `&self`; state lives behind a mutex that is never held
/// across an await, so concurrent calls interleave only at the transport
/// boundary.
pub struct Store<B: Backend> {
    backend: B,
    config: AppConfig,
    state: Mutex<Projection>,
    seq: AtomicU64,
    pending_mutations: AtomicUsize,
}

impl<B: Backend> Store<B> {
    pub fn new(backend: B, config: AppConfig) -> Self {
        Self {
            backend,
            config,
            state: Mutex::new(Projection::default()),
            seq: AtomicU64::new(0),
            pending_mutations: AtomicUsize::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock(&self) -> MutexGuard<'_, Projection> {
        // A poisoned lock only means another call panicked mid-update; the
        // projection is rebuildable, so keep going with what is there.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the projection stale. The next completed rebuild clears it.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.fresh = false;
        tracing::debug!("projection invalidated");
    }

    /// Whether the projection reflects the last acknowledged backend state.
    pub fn is_fresh(&self) -> bool {
        self.lock().fresh
    }

    /// Fetch papers and entities, rebuild the index, and apply the result
    /// unless a newer update already landed.
    pub async fn refresh(&self) -> Result<()> {
        let seq = self.next_seq();
        let (papers, entities) =
            futures::try_join!(self.backend.list_papers(), self.backend.list_entities())?;
        let index = EntityIndex::build(&EntityFeed::Entities(entities));
        self.apply_index(seq, Some(papers), index);
        Ok(())
    }

    /// Fetch the paper list and update the projection's copy.
    ///
    /// Some backend variants embed occurrence links in the paper list; when
    /// they do, the nested shape carries everything a rebuild needs and the
    /// index is refreshed from it too.
    pub async fn fetch_papers(&self) -> Result<Vec<Paper>> {
        let seq = self.next_seq();
        let papers = self.backend.list_papers().await?;
        if papers.iter().any(|p| p.entities.is_some()) {
            let index = EntityIndex::build(&EntityFeed::Papers(papers.clone()));
            self.apply_index(seq, Some(papers.clone()), index);
        } else {
            let mut state = self.lock();
            if seq < state.applied_seq {
                tracing::debug!(seq, latest = state.applied_seq, "stale paper fetch discarded");
            } else {
                state.applied_seq = seq;
                state.papers = papers.clone();
            }
        }
        Ok(papers)
    }

    /// Fetch a single paper record. Pure passthrough; the projection is not
    /// touched.
    pub async fn fetch_paper(&self, paper_id: i64) -> Result<Paper> {
        self.backend.get_paper(paper_id).await
    }

    /// Fetch the entity feed, rebuild the index, and return the entries.
    pub async fn fetch_entities(&self) -> Result<Vec<IndexEntry>> {
        let seq = self.next_seq();
        let entities = self.backend.list_entities().await?;
        let index = EntityIndex::build(&EntityFeed::Entities(entities));
        let entries: Vec<IndexEntry> = index.entries().cloned().collect();
        self.apply_index(seq, None, index);
        Ok(entries)
    }

    /// Search entities with free-text and type predicates.
    ///
    /// Small indexes are filtered client-side; anything over the configured
    /// limit delegates to the server-side endpoint and the response is
    /// trusted verbatim (no re-filtering). Either way the result set is
    /// applied under its sequence number, so a slow older query can never
    /// overwrite a newer one; the returned set is whatever is visible after
    /// the call.
    pub async fn search_entities(&self, query: &EntityQuery) -> Result<SearchResults> {
        let seq = self.next_seq();

        let local_snapshot = {
            let state = self.lock();
            let local = state.fresh && state.index.len() <= self.config.search.local_filter_limit;
            local.then(|| state.index.clone())
        };

        let results = match local_snapshot {
            Some(index) => search::filter_entities(&index, query),
            None => {
                let entities = self
                    .backend
                    .search_entities(&query.text, query.entity_type.as_deref())
                    .await?;
                let entries = entities.iter().map(IndexEntry::from_entity).collect();
                SearchResults::new(entries, SearchMode::Remote)
            }
        };

        Ok(self.apply_search(seq, results))
    }

    /// Upload a PDF, then rebuild before acknowledging.
    ///
    /// Non-PDF filenames are rejected locally without touching the
    /// transport, so the existing paper list is left exactly as it was.
    pub async fn upload_paper(&self, filename: &str, bytes: Vec<u8>) -> Result<Paper> {
        if !is_pdf_filename(filename) {
            return Err(ClientError::validation(format!(
                "only PDF files can be uploaded, got {:?}",
                filename
            )));
        }

        let mutation = self.begin_mutation("upload", filename);
        match self.backend.upload_paper(filename, bytes).await {
            Ok(paper) => {
                self.invalidate();
                if let Err(err) = self.refresh().await {
                    mutation.failed(&err);
                    return Err(err);
                }
                mutation.succeeded();
                Ok(paper)
            }
            Err(err) => {
                mutation.failed(&err);
                Err(err)
            }
        }
    }

    /// Delete a paper, then rebuild before acknowledging. Occurrence links
    /// referencing the paper cascade server-side; the rebuild makes that
    /// visible here.
    pub async fn delete_paper(&self, paper_id: i64) -> Result<DeleteAck> {
        let mutation = self.begin_mutation("delete", &paper_id.to_string());
        match self.backend.delete_paper(paper_id).await {
            Ok(ack) => {
                self.invalidate();
                if let Err(err) = self.refresh().await {
                    mutation.failed(&err);
                    return Err(err);
                }
                mutation.succeeded();
                Ok(ack)
            }
            Err(err) => {
                mutation.failed(&err);
                Err(err)
            }
        }
    }

    /// Graph payload passthrough for the relationship view.
    pub async fn graph(&self) -> Result<GraphPayload> {
        self.backend.graph().await
    }

    /// The projection's paper list.
    pub fn papers(&self) -> Vec<Paper> {
        self.lock().papers.clone()
    }

    /// The projection's index entries in ascending entity-id order.
    pub fn entities(&self) -> Vec<IndexEntry> {
        self.lock().index.entries().cloned().collect()
    }

    /// Integrity warnings from the last applied rebuild.
    pub fn warnings(&self) -> Vec<IntegrityWarning> {
        self.lock().index.warnings().to_vec()
    }

    /// The result set the presentation layer currently sees, if any search
    /// or rebuild has completed.
    pub fn visible(&self) -> Option<SearchResults> {
        self.lock().visible.clone()
    }

    /// Number of mutations currently in flight. Mutations are never
    /// coalesced; each runs independently and triggers its own rebuild.
    pub fn pending_mutations(&self) -> usize {
        self.pending_mutations.load(Ordering::SeqCst)
    }

    fn apply_index(&self, seq: u64, papers: Option<Vec<Paper>>, index: EntityIndex) {
        let mut state = self.lock();
        if seq < state.applied_seq {
            tracing::debug!(seq, latest = state.applied_seq, "stale rebuild discarded");
            return;
        }
        state.applied_seq = seq;
        if let Some(papers) = papers {
            state.papers = papers;
        }
        if seq >= state.visible_seq {
            state.visible = Some(SearchResults::new(
                index.entries().cloned().collect(),
                SearchMode::Local,
            ));
            state.visible_seq = seq;
        }
        state.index = index;
        state.fresh = true;
        tracing::debug!(seq, entities = state.index.len(), "rebuild applied");
    }

    fn apply_search(&self, seq: u64, results: SearchResults) -> SearchResults {
        let mut state = self.lock();
        if seq < state.visible_seq {
            tracing::debug!(
                seq,
                latest = state.visible_seq,
                "stale search response discarded"
            );
            return state
                .visible
                .clone()
                .unwrap_or_else(|| SearchResults::new(Vec::new(), SearchMode::Local));
        }
        state.visible_seq = seq;
        state.visible = Some(results.clone());
        results
    }

    fn begin_mutation(&self, op: &'static str, subject: &str) -> MutationGuard<'_> {
        self.pending_mutations.fetch_add(1, Ordering::SeqCst);
        tracing::info!(op, subject, state = "submitting", "mutation started");
        MutationGuard {
            op,
            subject: subject.to_string(),
            pending: &self.pending_mutations,
        }
    }
}

/// Tracks one mutation through `submitting -> (success | failed) -> idle`.
struct MutationGuard<'a> {
    op: &'static str,
    subject: String,
    pending: &'a AtomicUsize,
}

impl MutationGuard<'_> {
    fn succeeded(self) {
        tracing::info!(
            op = self.op,
            subject = %self.subject,
            state = "idle",
            outcome = "success",
            "mutation acknowledged and index rebuilt"
        );
    }

    fn failed(self, err: &ClientError) {
        tracing::warn!(
            op = self.op,
            subject = %self.subject,
            state = "idle",
            outcome = "failed",
            error = %err,
            "mutation failed, projection untouched"
        );
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

fn is_pdf_filename(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    lower.len() > ".pdf".len() && lower.ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paperscope_common::models::{Entity, EntityPaper};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// In-memory backend with the same cascade semantics as the real one:
    /// deleting a paper removes its occurrence links and entities left with
    /// no papers are cleaned up.
    #[derive(Default)]
    struct FakeState {
        papers: Mutex<Vec<Paper>>,
        entities: Mutex<Vec<Entity>>,
        upload_calls: AtomicUsize,
        fail_deletes: bool,
        slow_query_started: Notify,
        slow_query_release: Notify,
    }

    #[derive(Clone, Default)]
    struct FakeBackend {
        inner: Arc<FakeState>,
    }

    impl FakeBackend {
        fn with_data(papers: Vec<Paper>, entities: Vec<Entity>) -> Self {
            let backend = FakeBackend::default();
            *backend.inner.papers.lock().unwrap() = papers;
            *backend.inner.entities.lock().unwrap() = entities;
            backend
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn list_papers(&self) -> Result<Vec<Paper>> {
            Ok(self.inner.papers.lock().unwrap().clone())
        }

        async fn get_paper(&self, paper_id: i64) -> Result<Paper> {
            self.inner
                .papers
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.paper_id == paper_id)
                .cloned()
                .ok_or(ClientError::Server {
                    status: 404,
                    message: "paper not found".to_string(),
                })
        }

        async fn upload_paper(&self, filename: &str, _bytes: Vec<u8>) -> Result<Paper> {
            self.inner.upload_calls.fetch_add(1, Ordering::SeqCst);
            let mut papers = self.inner.papers.lock().unwrap();
            let paper = Paper {
                paper_id: papers.iter().map(|p| p.paper_id).max().unwrap_or(0) + 1,
                paper_name: filename.to_string(),
                entities: None,
            };
            papers.push(paper.clone());
            Ok(paper)
        }

        async fn delete_paper(&self, paper_id: i64) -> Result<DeleteAck> {
            if self.inner.fail_deletes {
                return Err(ClientError::Server {
                    status: 404,
                    message: "paper not found".to_string(),
                });
            }
            self.inner
                .papers
                .lock()
                .unwrap()
                .retain(|p| p.paper_id != paper_id);
            let mut entities = self.inner.entities.lock().unwrap();
            for entity in entities.iter_mut() {
                entity.papers.retain(|p| p.paper_id != paper_id);
            }
            entities.retain(|e| !e.papers.is_empty());
            Ok(DeleteAck {
                message: "paper deleted".to_string(),
            })
        }

        async fn list_entities(&self) -> Result<Vec<Entity>> {
            Ok(self.inner.entities.lock().unwrap().clone())
        }

        async fn search_entities(
            &self,
            query: &str,
            entity_type: Option<&str>,
        ) -> Result<Vec<Entity>> {
            if query == "slow" {
                self.inner.slow_query_started.notify_one();
                self.inner.slow_query_release.notified().await;
            }
            let needle = query.to_lowercase();
            Ok(self
                .inner
                .entities
                .lock()
                .unwrap()
                .iter()
                .filter(|e| {
                    let type_ok = entity_type.map_or(true, |ty| e.entity_type == ty);
                    type_ok
                        && (needle.is_empty()
                            || query == "slow"
                            || e.entity_name.to_lowercase().contains(&needle))
                })
                .cloned()
                .collect())
        }

        async fn graph(&self) -> Result<GraphPayload> {
            Ok(GraphPayload {
                nodes: Vec::new(),
                edges: Vec::new(),
            })
        }
    }

    fn paper(id: i64, name: &str) -> Paper {
        Paper {
            paper_id: id,
            paper_name: name.to_string(),
            entities: None,
        }
    }

    fn entity(id: i64, name: &str, ty: &str, papers: Vec<(i64, &str, u64)>) -> Entity {
        Entity {
            entity_id: id,
            entity_name: name.to_string(),
            entity_type: ty.to_string(),
            papers: papers
                .into_iter()
                .map(|(paper_id, paper_name, count)| EntityPaper {
                    paper_id,
                    paper_name: paper_name.to_string(),
                    count,
                })
                .collect(),
        }
    }

    fn seeded_backend() -> FakeBackend {
        FakeBackend::with_data(
            vec![paper(1, "p1.pdf"), paper(2, "p2.pdf")],
            vec![
                entity(1, "Ada Lovelace", "PERSON", vec![(1, "p1.pdf", 3)]),
                entity(2, "ACME", "ORG", vec![(1, "p1.pdf", 2), (2, "p2.pdf", 5)]),
            ],
        )
    }

    fn store_with(backend: FakeBackend) -> Store<FakeBackend> {
        Store::new(backend, AppConfig::default())
    }

    #[tokio::test]
    async fn refresh_populates_the_projection() {
        let store = store_with(seeded_backend());
        store.refresh().await.unwrap();

        assert!(store.is_fresh());
        assert_eq!(store.papers().len(), 2);
        let entities = store.entities();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[1].total_count(), 7);
        assert_eq!(store.visible().unwrap().total, 2);
    }

    #[tokio::test]
    async fn delete_rebuilds_before_acknowledging() {
        let store = store_with(seeded_backend());
        store.refresh().await.unwrap();

        store.delete_paper(1).await.unwrap();

        // No stale view: the rebuild completed before the ack returned
        assert!(store.is_fresh());
        let entities = store.entities();
        assert!(entities.iter().all(|e| !e.mentions_paper(1)));
        // Ada only occurred in p1 and is gone entirely
        assert!(!entities.iter().any(|e| e.entity_id == 1));
        assert_eq!(entities[0].total_count(), 5);
        assert_eq!(store.papers().len(), 1);
    }

    #[tokio::test]
    async fn failed_delete_leaves_projection_untouched() {
        let seeded = seeded_backend();
        let backend = FakeBackend {
            inner: Arc::new(FakeState {
                papers: Mutex::new(seeded.inner.papers.lock().unwrap().clone()),
                entities: Mutex::new(seeded.inner.entities.lock().unwrap().clone()),
                fail_deletes: true,
                ..FakeState::default()
            }),
        };
        let store = store_with(backend);
        store.refresh().await.unwrap();
        let before = store.entities();

        let err = store.delete_paper(99).await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 404, .. }));
        assert_eq!(store.entities(), before);
        assert!(store.is_fresh());
    }

    #[tokio::test]
    async fn upload_rejects_non_pdf_without_touching_transport() {
        let backend = seeded_backend();
        let store = store_with(backend.clone());
        store.refresh().await.unwrap();

        let err = store
            .upload_paper("notes.txt", b"not a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation { .. }));
        assert_eq!(backend.inner.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.papers().len(), 2);
    }

    #[tokio::test]
    async fn upload_success_refreshes_the_paper_list() {
        let backend = seeded_backend();
        let store = store_with(backend.clone());
        store.refresh().await.unwrap();

        let uploaded = store
            .upload_paper("thesis.pdf", b"%PDF-1.4".to_vec())
            .await
            .unwrap();
        assert_eq!(uploaded.paper_name, "thesis.pdf");
        assert!(store
            .papers()
            .iter()
            .any(|p| p.paper_id == uploaded.paper_id));
        assert_eq!(store.pending_mutations(), 0);
    }

    #[tokio::test]
    async fn paper_first_feed_rebuilds_the_index_too() {
        let nested_papers = vec![Paper {
            paper_id: 1,
            paper_name: "p1.pdf".to_string(),
            entities: Some(vec![paperscope_common::models::PaperEntity {
                entity_id: 1,
                entity_name: "Ada Lovelace".to_string(),
                entity_type: "PERSON".to_string(),
                count: 3,
            }]),
        }];
        let store = store_with(FakeBackend::with_data(nested_papers, Vec::new()));

        store.fetch_papers().await.unwrap();

        assert!(store.is_fresh());
        let entities = store.entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].total_count(), 3);
    }

    #[tokio::test]
    async fn small_index_searches_locally() {
        let store = store_with(seeded_backend());
        store.refresh().await.unwrap();

        let results = store
            .search_entities(&EntityQuery::new("", Some("PERSON".to_string())))
            .await
            .unwrap();
        assert_eq!(results.mode, SearchMode::Local);
        assert_eq!(results.total, 1);
        assert_eq!(results.entries[0].entity_name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn oversized_index_delegates_to_remote_search() {
        let mut config = AppConfig::default();
        config.search.local_filter_limit = 0;
        let store = Store::new(seeded_backend(), config);
        store.refresh().await.unwrap();

        let results = store
            .search_entities(&EntityQuery::new("acme", None))
            .await
            .unwrap();
        assert_eq!(results.mode, SearchMode::Remote);
        assert_eq!(results.total, 1);
        assert_eq!(results.entries[0].entity_id, 2);
    }

    #[tokio::test]
    async fn stale_search_response_is_discarded() {
        let backend = seeded_backend();
        let mut config = AppConfig::default();
        // Force the remote path so the fake can stall query #1
        config.search.local_filter_limit = 0;
        let store = Arc::new(Store::new(backend.clone(), config));
        store.refresh().await.unwrap();

        let slow_store = store.clone();
        let first = tokio::spawn(async move {
            slow_store
                .search_entities(&EntityQuery::new("slow", None))
                .await
        });
        // Wait until query #1 is suspended at the transport boundary
        backend.inner.slow_query_started.notified().await;

        let second = store
            .search_entities(&EntityQuery::new("acme", None))
            .await
            .unwrap();
        assert_eq!(second.entries[0].entity_id, 2);

        // Let query #1 complete after query #2; it must not win
        backend.inner.slow_query_release.notify_one();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, second);
        let visible = store.visible().unwrap();
        assert_eq!(visible.total, 1);
        assert_eq!(visible.entries[0].entity_id, 2);
    }
}
