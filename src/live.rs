// malformed documents are skipped, store failures always surface as errors
use crate::cache::QueryCache;
use crate::error::AppError;
use crate::metrics::STORE_ERRORS;
use crate::models::{GameLiveStatus, GameStatus, StreamSession, StreamStatus};
use crate::store::{Direction, Document, DocumentStore, FieldValue, Query, StoreError};
use std::cmp::Ordering;
use std::sync::Arc;

pub const DEFAULT_RECENT_STREAMS: usize = 50;
pub const MAX_RECENT_STREAMS: usize = 200;

#[derive(Debug, Clone)]
pub struct Collections {
    pub games: String,
    pub streams: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            games: "basketball_games".to_string(),
            streams: "live_streams".to_string(),
        }
    }
}

pub struct LiveStateReader {
    store: Arc<dyn DocumentStore>,
    cache: QueryCache,
    collections: Collections,
}

impl LiveStateReader {
    pub fn new(store: Arc<dyn DocumentStore>, cache: QueryCache, collections: Collections) -> Self {
        Self {
            store,
            cache,
            collections,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    async fn fetch(&self, operation: &'static str, query: Query) -> Result<Vec<Document>, AppError> {
        if let Some(docs) = self.cache.get(&query) {
            return Ok(docs);
        }
        match self.store.run_query(&query).await {
            Ok(docs) => {
                self.cache.insert(&query, docs.clone());
                Ok(docs)
            }
            Err(err) => {
                STORE_ERRORS.inc();
                tracing::error!(
                    operation,
                    collection = %query.collection,
                    backend = self.store.backend_name(),
                    error = %err,
                    "document store query failed"
                );
                Err(match err {
                    StoreError::Unavailable(_) => {
                        AppError::ServiceUnavailable("live data is temporarily unavailable".to_string())
                    }
                    StoreError::Rejected { .. } | StoreError::Decode(_) => {
                        AppError::Internal("failed to load live data".to_string())
                    }
                })
            }
        }
    }

    // games on court (live or halftime), most recent first
    pub async fn list_active_games(&self) -> Result<Vec<GameLiveStatus>, AppError> {
        let statuses = GameStatus::active()
            .iter()
            .map(|s| FieldValue::from(s.as_str()))
            .collect();
        let query = Query::collection(&self.collections.games)
            .filter_in("status", statuses)
            .order_by("date", Direction::Descending);

        let docs = self.fetch("list_active_games", query).await?;
        let mut games: Vec<GameLiveStatus> = parse_all(&docs);
        // the store orders by native type first, so mixed date encodings need a
        // second pass over the normalized values; undated games go last
        games.sort_by(|a, b| match (&a.date, &b.date) {
            (Some(a), Some(b)) => b.cmp(a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        Ok(games)
    }

    pub async fn get_active_stream_for_game(
        &self,
        game_id: &str,
    ) -> Result<Option<StreamSession>, AppError> {
        if game_id.trim().is_empty() {
            return Err(AppError::InvalidInput("gameId must not be empty".to_string()));
        }
        let query = Query::collection(&self.collections.streams)
            .filter_eq("gameId", game_id)
            .filter_eq("status", StreamStatus::Live.as_str());

        // first live document that parses; a broken one must not hide a good one
        let docs = self.fetch("get_active_stream_for_game", query).await?;
        Ok(docs.iter().find_map(parse_one::<StreamSession>))
    }

    // stream history, newest first, capped at `limit` (and at MAX_RECENT_STREAMS)
    pub async fn list_recent_streams(&self, limit: usize) -> Result<Vec<StreamSession>, AppError> {
        let limit = limit.min(MAX_RECENT_STREAMS);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query = Query::collection(&self.collections.streams)
            .order_by("createdAt", Direction::Descending)
            .limit(limit);

        let docs = self.fetch("list_recent_streams", query).await?;
        let mut streams: Vec<StreamSession> = parse_all(&docs);
        streams.truncate(limit);
        Ok(streams)
    }
}

fn parse_one<'a, T>(doc: &'a Document) -> Option<T>
where
    T: TryFrom<&'a Document, Error = crate::models::RecordError>,
{
    match T::try_from(doc) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(error = %err, "skipping malformed document");
            None
        }
    }
}

fn parse_all<'a, T>(docs: &'a [Document]) -> Vec<T>
where
    T: TryFrom<&'a Document, Error = crate::models::RecordError>,
{
    docs.iter().filter_map(parse_one).collect()
}
