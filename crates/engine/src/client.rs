//! Query cache: paginated expense lists, monthly summaries and the
//! invalidation that ties them to entry creation.
//!
//! Every cache entry follows the same rules:
//!
//! - at most one fetch is in flight per [`QueryKey`]; extra calls while one is
//!   pending return the current view and issue nothing;
//! - the lock is never held across a request, so each transition (start a
//!   fetch, commit its result) is a single critical section;
//! - every entry carries a generation, and every fetch a ticket, both drawn
//!   from one counter that never repeats. Invalidation gives the entry a new
//!   generation, and a response whose ticket or generation no longer matches
//!   its entry is dropped instead of committed. This also holds for a key
//!   that was removed and created again while a fetch was pending.

use std::collections::HashMap;

use api_types::{
    Envelope,
    chart::{CategoryTotal, ChannelTotal},
    expense::{ExpenseNew, ExpenseRecord},
    summary::SummaryAggregate,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    EngineError,
    normalize::decode_page,
    pages::{PageMeta, PageSequence},
    query::{ChartFilters, ExpenseFilters, QueryCategory, QueryKey, SummaryQuery},
    transport::{Params, Transport},
    validation::ExpenseDraft,
};

const EXPENSES_PATH: &str = "/expenses";
const SUMMARY_PATH: &str = "/summary";
const CATEGORY_CHART_PATH: &str = "/expenses-chart/category";
const CHANNEL_CHART_PATH: &str = "/expenses-chart/channel";
const CREATE_EXPENSE_PATH: &str = "/regular-expenses";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    LoadingFirstPage,
    Ready,
    LoadingNextPage,
}

/// What a list view renders.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpensesView {
    pub key: QueryKey,
    pub items: Vec<ExpenseRecord>,
    pub meta: PageMeta,
    pub pages_loaded: usize,
    pub status: FetchStatus,
    pub is_loading: bool,
    pub is_fetching_next_page: bool,
    pub has_next_page: bool,
    pub is_stale: bool,
    pub error: Option<String>,
}

/// What the summary cards render.
///
/// `degraded` is set when the fetch failed and the zeros are a stand-in, not
/// a real month without activity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SummaryView {
    pub aggregate: SummaryAggregate,
    pub degraded: bool,
    pub is_loading: bool,
}

impl SummaryView {
    pub fn degraded() -> Self {
        Self {
            aggregate: SummaryAggregate::default(),
            degraded: true,
            is_loading: false,
        }
    }
}

struct ListEntry {
    params: Params,
    limit: Option<u32>,
    pages: PageSequence,
    status: FetchStatus,
    stale: bool,
    generation: u64,
    pending: Option<u64>,
    error: Option<String>,
    observers: usize,
}

impl ListEntry {
    fn new(filters: &ExpenseFilters, generation: u64) -> Self {
        Self {
            params: filters.params(),
            limit: filters.limit,
            pages: PageSequence::default(),
            status: FetchStatus::Idle,
            stale: false,
            generation,
            pending: None,
            error: None,
            observers: 0,
        }
    }

    fn in_flight(&self) -> bool {
        self.pending.is_some()
    }

    fn begin(&mut self, status: FetchStatus, ticket: u64) -> Fetch {
        self.status = status;
        self.pending = Some(ticket);
        Fetch {
            ticket,
            generation: self.generation,
        }
    }

    fn needs_fetch(&self) -> bool {
        !self.in_flight() && (self.pages.is_empty() || self.stale)
    }

    fn settle(&mut self) {
        self.status = if self.pages.is_empty() {
            FetchStatus::Idle
        } else {
            FetchStatus::Ready
        };
    }

    fn view(&self, key: &QueryKey) -> ExpensesView {
        ExpensesView {
            key: key.clone(),
            items: self.pages.items(),
            meta: self.pages.meta(self.limit),
            pages_loaded: self.pages.len(),
            status: self.status,
            is_loading: self.status == FetchStatus::LoadingFirstPage,
            is_fetching_next_page: self.status == FetchStatus::LoadingNextPage,
            has_next_page: self.pages.has_next_page(),
            is_stale: self.stale,
            error: self.error.clone(),
        }
    }
}

struct SummaryEntry {
    params: Params,
    data: Option<SummaryView>,
    pending: Option<u64>,
    stale: bool,
    generation: u64,
    observers: usize,
}

impl SummaryEntry {
    fn new(query: &SummaryQuery, generation: u64) -> Self {
        Self {
            params: query.params(),
            data: None,
            pending: None,
            stale: false,
            generation,
            observers: 0,
        }
    }

    fn needs_fetch(&self) -> bool {
        self.pending.is_none() && (self.data.is_none() || self.stale)
    }

    fn begin(&mut self, ticket: u64) -> Fetch {
        self.pending = Some(ticket);
        Fetch {
            ticket,
            generation: self.generation,
        }
    }

    fn current(&self) -> SummaryView {
        let mut view = self.data.unwrap_or(SummaryView {
            aggregate: SummaryAggregate::default(),
            degraded: false,
            is_loading: false,
        });
        view.is_loading = self.pending.is_some();
        view
    }
}

#[derive(Default)]
struct QueryCache {
    lists: HashMap<QueryKey, ListEntry>,
    summaries: HashMap<QueryKey, SummaryEntry>,
    /// Last generation or ticket handed out.
    counter: u64,
}

fn next_id(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

/// Identity of one request: which fetch it is and which generation of the
/// entry it was started for.
#[derive(Clone, Copy, Debug)]
struct Fetch {
    ticket: u64,
    generation: u64,
}

#[derive(Clone, Copy, Debug)]
enum PageRequest {
    First,
    Next(u64),
}

impl PageRequest {
    fn number(self) -> u64 {
        match self {
            Self::First => 1,
            Self::Next(page) => page,
        }
    }
}

/// Owns the cache and the transport. One instance per session (or per test).
pub struct QueryClient<T> {
    transport: T,
    cache: Mutex<QueryCache>,
}

impl<T: Transport> QueryClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cache: Mutex::new(QueryCache::default()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reads the list for `filters`, fetching page 1 when nothing is cached
    /// or the cached pages are stale.
    pub async fn expenses(&self, filters: &ExpenseFilters) -> Result<ExpensesView, EngineError> {
        let key = filters.key();
        let (params, fetch) = {
            let mut guard = self.cache.lock().await;
            let cache = &mut *guard;
            let entry = cache
                .lists
                .entry(key.clone())
                .or_insert_with(|| ListEntry::new(filters, next_id(&mut cache.counter)));
            if !entry.needs_fetch() {
                return Ok(entry.view(&key));
            }
            let fetch = entry.begin(FetchStatus::LoadingFirstPage, next_id(&mut cache.counter));
            (entry.params.clone(), fetch)
        };

        self.run_list_fetch(&key, params, PageRequest::First, fetch)
            .await
    }

    /// Cached view without triggering any fetch.
    pub async fn cached_expenses(&self, filters: &ExpenseFilters) -> Option<ExpensesView> {
        let key = filters.key();
        let cache = self.cache.lock().await;
        cache.lists.get(&key).map(|entry| entry.view(&key))
    }

    /// Loads the page after the last one.
    ///
    /// Does nothing when no page is loaded yet, when a fetch for this key is
    /// already pending, or when the last page says there is nothing more. A
    /// stale list is refetched from page 1 instead of being extended.
    pub async fn fetch_next_page(
        &self,
        filters: &ExpenseFilters,
    ) -> Result<ExpensesView, EngineError> {
        let key = filters.key();
        let (params, request, fetch) = {
            let mut guard = self.cache.lock().await;
            let cache = &mut *guard;
            let Some(entry) = cache.lists.get_mut(&key) else {
                tracing::debug!(query = %key, "next page requested before the first one");
                return Ok(ListEntry::new(filters, 0).view(&key));
            };
            if entry.in_flight() {
                tracing::debug!(query = %key, "fetch already pending, ignoring next page request");
                return Ok(entry.view(&key));
            }
            if entry.pages.is_empty() {
                return Ok(entry.view(&key));
            }
            let request = if entry.stale {
                PageRequest::First
            } else {
                match entry.pages.next_page() {
                    Some(page) => PageRequest::Next(page),
                    None => return Ok(entry.view(&key)),
                }
            };
            let status = match request {
                PageRequest::First => FetchStatus::LoadingFirstPage,
                PageRequest::Next(_) => FetchStatus::LoadingNextPage,
            };
            let fetch = entry.begin(status, next_id(&mut cache.counter));
            (entry.params.clone(), request, fetch)
        };

        self.run_list_fetch(&key, params, request, fetch)
            .await
    }

    async fn run_list_fetch(
        &self,
        key: &QueryKey,
        mut params: Params,
        request: PageRequest,
        fetch: Fetch,
    ) -> Result<ExpensesView, EngineError> {
        let page = request.number();
        params.retain(|(name, _)| *name != "page");
        params.push(("page", page.to_string()));

        tracing::info!(query = %key, page, "fetching expenses page");
        let result = match self.transport.get(EXPENSES_PATH, &params).await {
            Ok(body) => decode_page(body),
            Err(err) => Err(err.into()),
        };

        let mut cache = self.cache.lock().await;
        let Some(entry) = cache.lists.get_mut(key) else {
            tracing::debug!(query = %key, "query removed while fetching, dropping response");
            return result.map(|_| detached_view(key));
        };
        if entry.pending != Some(fetch.ticket) {
            // The key was removed and created again; the new entry owns its
            // own fetch state.
            tracing::debug!(query = %key, page, "query replaced while fetching, dropping response");
            return Ok(entry.view(key));
        }
        entry.pending = None;
        if entry.generation != fetch.generation {
            tracing::debug!(query = %key, page, "query invalidated while fetching, dropping response");
            entry.settle();
            return Ok(entry.view(key));
        }

        match result {
            Ok(fetched) => {
                if !fetched.is_well_formed() {
                    tracing::warn!(query = %key, page, "page metadata is not numeric");
                }
                match request {
                    PageRequest::First => entry.pages.replace(fetched),
                    PageRequest::Next(_) => entry.pages.append(fetched),
                }
                entry.stale = false;
                entry.error = None;
                entry.status = FetchStatus::Ready;
                tracing::info!(query = %key, pages = entry.pages.len(), "expenses page committed");
                Ok(entry.view(key))
            }
            Err(err) => {
                tracing::warn!(query = %key, page, "expenses fetch failed: {err}");
                entry.error = Some(err.to_string());
                entry.settle();
                Err(err)
            }
        }
    }

    /// Monthly summary. Never fails: on any error the zero aggregate is
    /// returned with `degraded` set.
    pub async fn summary(&self, query: &SummaryQuery) -> SummaryView {
        let key = query.key();
        let (params, fetch) = {
            let mut guard = self.cache.lock().await;
            let cache = &mut *guard;
            let entry = cache
                .summaries
                .entry(key.clone())
                .or_insert_with(|| SummaryEntry::new(query, next_id(&mut cache.counter)));
            if !entry.needs_fetch() {
                return entry.current();
            }
            let fetch = entry.begin(next_id(&mut cache.counter));
            (entry.params.clone(), fetch)
        };

        self.run_summary_fetch(&key, params, fetch).await
    }

    async fn run_summary_fetch(&self, key: &QueryKey, params: Params, fetch: Fetch) -> SummaryView {
        tracing::info!(query = %key, "fetching summary");
        let result = match self.transport.get(SUMMARY_PATH, &params).await {
            Ok(body) => decode_summary(body),
            Err(err) => Err(err.into()),
        };
        let view = match result {
            Ok(aggregate) => SummaryView {
                aggregate,
                degraded: false,
                is_loading: false,
            },
            Err(err) => {
                tracing::warn!(query = %key, "summary unavailable, showing zeros: {err}");
                SummaryView::degraded()
            }
        };

        let mut cache = self.cache.lock().await;
        let Some(entry) = cache.summaries.get_mut(key) else {
            return view;
        };
        if entry.pending != Some(fetch.ticket) {
            tracing::debug!(query = %key, "summary replaced while fetching, dropping response");
            return entry.current();
        }
        entry.pending = None;
        if entry.generation != fetch.generation {
            tracing::debug!(query = %key, "summary invalidated while fetching, dropping response");
            return entry.current();
        }
        entry.data = Some(view);
        // A stand-in is retried on the next read.
        entry.stale = view.degraded;
        view
    }

    /// Spending by category for a date range. Not cached.
    pub async fn category_chart(
        &self,
        filters: &ChartFilters,
    ) -> Result<Vec<CategoryTotal>, EngineError> {
        let body = self
            .transport
            .get(CATEGORY_CHART_PATH, &filters.params())
            .await
            .inspect_err(|err| tracing::warn!("category chart unavailable: {err}"))?;
        decode_list(body)
    }

    /// Spending by channel for a date range. Not cached.
    pub async fn channel_chart(
        &self,
        filters: &ChartFilters,
    ) -> Result<Vec<ChannelTotal>, EngineError> {
        let body = self
            .transport
            .get(CHANNEL_CHART_PATH, &filters.params())
            .await
            .inspect_err(|err| tracing::warn!("channel chart unavailable: {err}"))?;
        decode_list(body)
    }

    /// Validates and submits a new entry. See [`QueryClient::submit_expense`].
    pub async fn create_expense(&self, draft: &ExpenseDraft) -> Result<Vec<QueryKey>, EngineError> {
        let body = draft.validate()?;
        self.submit_expense(&body).await
    }

    /// Posts an entry, then marks every expenses and summary query stale and
    /// refetches the ones currently observed. Returns the invalidated keys.
    pub async fn submit_expense(&self, body: &ExpenseNew) -> Result<Vec<QueryKey>, EngineError> {
        let payload = serde_json::to_value(body)?;
        self.transport.post(CREATE_EXPENSE_PATH, payload).await?;
        tracing::info!(title = %body.title, "entry created");

        let stale = self
            .invalidate_queries(|key| {
                matches!(
                    key.category(),
                    QueryCategory::Expenses | QueryCategory::Summary
                )
            })
            .await;
        self.refetch_active().await;
        Ok(stale)
    }

    /// Marks matching entries stale and drops any response still in flight
    /// for them. Nothing is fetched here.
    pub async fn invalidate_queries<P>(&self, predicate: P) -> Vec<QueryKey>
    where
        P: Fn(&QueryKey) -> bool + Send,
    {
        let mut guard = self.cache.lock().await;
        let cache = &mut *guard;
        let mut keys = Vec::new();
        for (key, entry) in cache.lists.iter_mut() {
            if predicate(key) {
                entry.stale = true;
                entry.generation = next_id(&mut cache.counter);
                keys.push(key.clone());
            }
        }
        for (key, entry) in cache.summaries.iter_mut() {
            if predicate(key) {
                entry.stale = true;
                entry.generation = next_id(&mut cache.counter);
                keys.push(key.clone());
            }
        }
        tracing::info!(count = keys.len(), "queries invalidated");
        keys
    }

    /// Forgets matching entries. Late responses for them are discarded.
    pub async fn remove_queries<P>(&self, predicate: P) -> usize
    where
        P: Fn(&QueryKey) -> bool + Send,
    {
        let mut cache = self.cache.lock().await;
        let before = cache.lists.len() + cache.summaries.len();
        cache.lists.retain(|key, _| !predicate(key));
        cache.summaries.retain(|key, _| !predicate(key));
        before - (cache.lists.len() + cache.summaries.len())
    }

    /// Registers an active view of the list.
    pub async fn observe_expenses(&self, filters: &ExpenseFilters) -> QueryKey {
        let key = filters.key();
        let mut guard = self.cache.lock().await;
        let cache = &mut *guard;
        cache
            .lists
            .entry(key.clone())
            .or_insert_with(|| ListEntry::new(filters, next_id(&mut cache.counter)))
            .observers += 1;
        key
    }

    /// Registers an active view of the summary.
    pub async fn observe_summary(&self, query: &SummaryQuery) -> QueryKey {
        let key = query.key();
        let mut guard = self.cache.lock().await;
        let cache = &mut *guard;
        cache
            .summaries
            .entry(key.clone())
            .or_insert_with(|| SummaryEntry::new(query, next_id(&mut cache.counter)))
            .observers += 1;
        key
    }

    pub async fn unobserve(&self, key: &QueryKey) {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.lists.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
        if let Some(entry) = cache.summaries.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }

    /// Refetches every stale entry that has an active observer.
    pub async fn refetch_active(&self) {
        let (lists, summaries) = {
            let mut guard = self.cache.lock().await;
            let cache = &mut *guard;
            let mut lists = Vec::new();
            for (key, entry) in cache.lists.iter_mut() {
                if entry.observers > 0 && entry.stale && !entry.in_flight() {
                    let fetch =
                        entry.begin(FetchStatus::LoadingFirstPage, next_id(&mut cache.counter));
                    lists.push((key.clone(), entry.params.clone(), fetch));
                }
            }
            let mut summaries = Vec::new();
            for (key, entry) in cache.summaries.iter_mut() {
                if entry.observers > 0 && entry.stale && entry.pending.is_none() {
                    let fetch = entry.begin(next_id(&mut cache.counter));
                    summaries.push((key.clone(), entry.params.clone(), fetch));
                }
            }
            (lists, summaries)
        };

        for (key, params, fetch) in lists {
            if let Err(err) = self
                .run_list_fetch(&key, params, PageRequest::First, fetch)
                .await
            {
                tracing::warn!(query = %key, "background refetch failed: {err}");
            }
        }
        for (key, params, fetch) in summaries {
            self.run_summary_fetch(&key, params, fetch).await;
        }
    }
}

fn detached_view(key: &QueryKey) -> ExpensesView {
    ListEntry::new(&ExpenseFilters::default(), 0).view(key)
}

fn decode_summary(body: Value) -> Result<SummaryAggregate, EngineError> {
    let envelope: Envelope<SummaryAggregate> = serde_json::from_value(body)?;
    envelope
        .data
        .ok_or_else(|| EngineError::MalformedPayload("missing \"data\" in summary".to_string()))
}

fn decode_list<T: DeserializeOwned>(body: Value) -> Result<Vec<T>, EngineError> {
    let envelope: Envelope<Vec<T>> = serde_json::from_value(body)?;
    Ok(envelope.data.unwrap_or_default())
}
