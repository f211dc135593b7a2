use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use api_types::{Currency, SortOrder};
use chrono::NaiveDate;
use engine::{
    ChartFilters, EngineError, ExpenseDraft, ExpenseFilters, FetchStatus, Field, Params,
    QueryCategory, QueryClient, SummaryQuery, Transport, TransportError,
};
use serde_json::{Value, json};

type Handler = dyn Fn(&str, &Params) -> Result<Value, TransportError> + Send + Sync;

/// In-memory server: answers from a closure and records every request.
struct FakeTransport {
    handler: Box<Handler>,
    delay: Duration,
    /// Per-call delays, used in order before falling back to `delay`.
    delays: Mutex<VecDeque<Duration>>,
    gets: Mutex<Vec<(String, Params)>>,
    posts: Mutex<Vec<(String, Value)>>,
}

impl FakeTransport {
    fn new(handler: impl Fn(&str, &Params) -> Result<Value, TransportError> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            delays: Mutex::new(VecDeque::new()),
            gets: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.delays.lock().unwrap().extend(delays);
        self
    }

    fn gets_to(&self, path: &str) -> Vec<Params> {
        self.gets
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, params)| params.clone())
            .collect()
    }

    fn posts(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

impl Transport for FakeTransport {
    async fn get(&self, path: &str, params: &Params) -> Result<Value, TransportError> {
        let (response, delay) = {
            self.gets
                .lock()
                .unwrap()
                .push((path.to_string(), params.clone()));
            let delay = self.delays.lock().unwrap().pop_front().unwrap_or(self.delay);
            ((self.handler)(path, params), delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        self.posts.lock().unwrap().push((path.to_string(), body));
        Ok(json!({ "success": true, "data": { "id": "new" } }))
    }
}

fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.as_str())
}

fn record(id: &str, currency: &str) -> Value {
    json!({
        "id": id,
        "title": format!("entry {id}"),
        "amount": 12.5,
        "date": "2025-03-04T00:00:00.000Z",
        "type": "expense",
        "currency": currency,
        "channel": "cash",
        "category": "groceries"
    })
}

/// Serves `/expenses` with `total` records, string metadata like the real
/// backend, and a fixed summary.
fn backend(total: u64) -> impl Fn(&str, &Params) -> Result<Value, TransportError> + Send + Sync {
    move |path: &str, params: &Params| match path {
        "/expenses" => {
            let page: u64 = param(params, "page").unwrap_or("1").parse().unwrap();
            let limit: u64 = param(params, "limit").unwrap_or("20").parse().unwrap();
            let currency = param(params, "currency").unwrap_or("MYR");
            let first = (page - 1) * limit;
            let items: Vec<_> = (first..(first + limit).min(total))
                .map(|i| record(&format!("{currency}-{i}"), currency))
                .collect();
            Ok(json!({
                "success": true,
                "data": {
                    "items": items,
                    "total": total.to_string(),
                    "page": page.to_string(),
                    "limit": limit.to_string()
                }
            }))
        }
        "/summary" => Ok(json!({
            "success": true,
            "data": {
                "income": 5000,
                "expense": 3000,
                "savings": 2000,
                "netPosition": 1500,
                "potentialNextMonthCCBill": 420.5
            }
        })),
        _ => Err(TransportError::NotFound),
    }
}

fn filters(currency: Currency) -> ExpenseFilters {
    ExpenseFilters {
        order: Some(SortOrder::Desc),
        limit: Some(2),
        currency: Some(currency),
        ..ExpenseFilters::default()
    }
}

fn march() -> SummaryQuery {
    SummaryQuery {
        month: "2025-03".to_string(),
        currency: Currency::Myr,
    }
}

fn draft() -> ExpenseDraft {
    ExpenseDraft {
        title: Some("Groceries".to_string()),
        amount: Some(54.2),
        date: NaiveDate::from_ymd_opt(2025, 3, 9),
        entry_type: Some("expense".to_string()),
        currency: Some("MYR".to_string()),
        channel: Some("debitCard".to_string()),
        category: Some("groceries".to_string()),
        notes: None,
        billing_month: None,
    }
}

fn ids(view: &engine::ExpensesView) -> Vec<String> {
    view.items.iter().map(|r| r.id.clone()).collect()
}

#[tokio::test]
async fn first_read_fetches_page_one_with_metadata() {
    let client = QueryClient::new(FakeTransport::new(backend(5)));

    let view = client.expenses(&filters(Currency::Myr)).await.unwrap();

    assert_eq!(ids(&view), ["MYR-0", "MYR-1"]);
    assert_eq!((view.meta.total, view.meta.page, view.meta.limit), (5.0, 1.0, 2.0));
    assert_eq!(view.meta.page_count, 3.0);
    assert!(view.has_next_page);
    assert_eq!(view.status, FetchStatus::Ready);

    // Fresh data is served from the cache.
    client.expenses(&filters(Currency::Myr)).await.unwrap();
    assert_eq!(client.transport().gets_to("/expenses").len(), 1);
}

#[tokio::test]
async fn different_filters_never_share_pages() {
    let client = QueryClient::new(FakeTransport::new(backend(5)));
    let myr = filters(Currency::Myr);
    let inr = filters(Currency::Inr);

    client.expenses(&myr).await.unwrap();
    client.expenses(&inr).await.unwrap();
    let myr_view = client.fetch_next_page(&myr).await.unwrap();
    let inr_view = client.cached_expenses(&inr).await.unwrap();

    assert_eq!(ids(&myr_view), ["MYR-0", "MYR-1", "MYR-2", "MYR-3"]);
    assert_eq!(ids(&inr_view), ["INR-0", "INR-1"]);
    assert_ne!(myr_view.key, inr_view.key);
}

#[tokio::test]
async fn pages_accumulate_until_the_last_one() {
    let client = QueryClient::new(FakeTransport::new(backend(5)));
    let f = filters(Currency::Myr);

    client.expenses(&f).await.unwrap();
    client.fetch_next_page(&f).await.unwrap();
    let view = client.fetch_next_page(&f).await.unwrap();
    assert_eq!(view.items.len(), 5);
    assert_eq!(view.pages_loaded, 3);
    assert!(!view.has_next_page);

    // Nothing more to load: no request.
    let again = client.fetch_next_page(&f).await.unwrap();
    assert_eq!(again.items, view.items);
    assert_eq!(client.transport().gets_to("/expenses").len(), 3);
}

#[tokio::test]
async fn concurrent_next_page_calls_issue_one_request() {
    let transport = FakeTransport::new(backend(5)).with_delay(Duration::from_millis(20));
    let client = QueryClient::new(transport);
    let f = filters(Currency::Myr);
    client.expenses(&f).await.unwrap();

    let (a, b) = tokio::join!(client.fetch_next_page(&f), client.fetch_next_page(&f));
    a.unwrap();
    b.unwrap();

    let page_two: Vec<_> = client
        .transport()
        .gets_to("/expenses")
        .into_iter()
        .filter(|params| param(params, "page") == Some("2"))
        .collect();
    assert_eq!(page_two.len(), 1);
    let view = client.cached_expenses(&f).await.unwrap();
    assert_eq!(view.pages_loaded, 2);
    assert_eq!(view.items.len(), 4);
}

#[tokio::test]
async fn next_page_before_first_load_does_nothing() {
    let client = QueryClient::new(FakeTransport::new(backend(5)));

    let view = client.fetch_next_page(&filters(Currency::Myr)).await.unwrap();

    assert!(view.items.is_empty());
    assert!(!view.has_next_page);
    assert!(client.transport().gets_to("/expenses").is_empty());
}

#[tokio::test]
async fn next_page_decision_uses_the_last_page() {
    // The total shrinks from 4 to 3 between the two fetches.
    let client = QueryClient::new(FakeTransport::new(|_, params: &Params| {
        let page = param(params, "page").unwrap_or("1");
        let (names, total) = if page == "1" { (vec!["a", "b"], 4) } else { (vec!["c"], 3) };
        let items: Vec<_> = names.iter().map(|id| record(id, "MYR")).collect();
        Ok(json!({ "data": { "items": items, "total": total, "page": page, "limit": 2 } }))
    }));
    let f = filters(Currency::Myr);

    assert!(client.expenses(&f).await.unwrap().has_next_page);
    let view = client.fetch_next_page(&f).await.unwrap();
    assert!(!view.has_next_page);
    assert_eq!(view.meta.total, 3.0);
}

#[tokio::test]
async fn list_failure_is_reported_and_recorded() {
    let client = QueryClient::new(FakeTransport::new(|_, _: &Params| {
        Err(TransportError::Server {
            status: 500,
            message: "boom".to_string(),
        })
    }));
    let f = filters(Currency::Myr);

    let err = client.expenses(&f).await.unwrap_err();
    assert!(matches!(err, EngineError::Transport(TransportError::Server { status: 500, .. })));

    let view = client.cached_expenses(&f).await.unwrap();
    assert_eq!(view.status, FetchStatus::Idle);
    assert!(view.error.is_some());

    // A later read tries again.
    let _ = client.expenses(&f).await;
    assert_eq!(client.transport().gets_to("/expenses").len(), 2);
}

#[tokio::test]
async fn summary_is_decoded_and_cached() {
    let client = QueryClient::new(FakeTransport::new(backend(0)));

    let view = client.summary(&march()).await;
    assert!(!view.degraded);
    assert_eq!(view.aggregate.income, 5000.0);
    assert_eq!(view.aggregate.potential_next_month_cc_bill, 420.5);

    client.summary(&march()).await;
    assert_eq!(client.transport().gets_to("/summary").len(), 1);
    let params = &client.transport().gets_to("/summary")[0];
    assert_eq!(param(params, "month"), Some("2025-03"));
    assert_eq!(param(params, "currency"), Some("MYR"));
}

#[tokio::test]
async fn summary_failure_degrades_to_zeros() {
    let client = QueryClient::new(FakeTransport::new(|_, _: &Params| {
        Err(TransportError::Network("connection refused".to_string()))
    }));

    let view = client.summary(&march()).await;

    assert!(view.degraded);
    assert_eq!(view.aggregate.income, 0.0);
    assert_eq!(view.aggregate.expense, 0.0);
    assert_eq!(view.aggregate.savings, 0.0);
    assert_eq!(view.aggregate.net_position, 0.0);

    // The stand-in is not kept as fresh data.
    client.summary(&march()).await;
    assert_eq!(client.transport().gets_to("/summary").len(), 2);
}

#[tokio::test]
async fn creating_an_entry_marks_lists_and_summaries_stale() {
    let client = QueryClient::new(FakeTransport::new(backend(5)));
    let f = filters(Currency::Myr);
    client.expenses(&f).await.unwrap();
    client.fetch_next_page(&f).await.unwrap();
    client.summary(&march()).await;

    let stale = client.create_expense(&draft()).await.unwrap();

    assert_eq!(client.transport().posts(), 1);
    assert_eq!(stale.len(), 2);
    assert!(stale.iter().any(|key| key.category() == QueryCategory::Expenses));
    assert!(stale.iter().any(|key| key.category() == QueryCategory::Summary));
    // Nobody is watching, so nothing was refetched yet.
    assert_eq!(client.transport().gets_to("/expenses").len(), 2);
    assert!(client.cached_expenses(&f).await.unwrap().is_stale);

    // The next read starts over from page 1.
    let view = client.expenses(&f).await.unwrap();
    assert!(!view.is_stale);
    assert_eq!(view.pages_loaded, 1);
    let gets = client.transport().gets_to("/expenses");
    assert_eq!(gets.len(), 3);
    assert_eq!(param(&gets[2], "page"), Some("1"));

    client.summary(&march()).await;
    assert_eq!(client.transport().gets_to("/summary").len(), 2);
}

#[tokio::test]
async fn observed_queries_refetch_after_create() {
    let client = QueryClient::new(FakeTransport::new(backend(5)));
    let f = filters(Currency::Myr);
    let key = client.observe_expenses(&f).await;
    client.expenses(&f).await.unwrap();
    client.observe_summary(&march()).await;
    client.summary(&march()).await;

    client.create_expense(&draft()).await.unwrap();

    assert_eq!(client.transport().gets_to("/expenses").len(), 2);
    assert_eq!(client.transport().gets_to("/summary").len(), 2);
    assert!(!client.cached_expenses(&f).await.unwrap().is_stale);

    client.unobserve(&key).await;
    client.create_expense(&draft()).await.unwrap();
    assert_eq!(client.transport().gets_to("/expenses").len(), 2);
}

#[tokio::test]
async fn stale_next_page_request_refetches_from_the_start() {
    let client = QueryClient::new(FakeTransport::new(backend(5)));
    let f = filters(Currency::Myr);
    client.expenses(&f).await.unwrap();
    client
        .invalidate_queries(|key| key.category() == QueryCategory::Expenses)
        .await;

    let view = client.fetch_next_page(&f).await.unwrap();

    assert_eq!(view.pages_loaded, 1);
    let gets = client.transport().gets_to("/expenses");
    assert_eq!(param(&gets[1], "page"), Some("1"));
}

#[tokio::test]
async fn response_for_an_invalidated_query_is_dropped() {
    let transport = FakeTransport::new(backend(5)).with_delay(Duration::from_millis(60));
    let client = QueryClient::new(Arc::new(transport));
    let f = filters(Currency::Myr);

    let (view, invalidated) = tokio::join!(client.expenses(&f), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.invalidate_queries(|_| true).await
    });

    assert_eq!(invalidated.len(), 1);
    let view = view.unwrap();
    assert!(view.items.is_empty());
    assert!(view.is_stale);
    assert_eq!(view.status, FetchStatus::Idle);

    let view = client.expenses(&f).await.unwrap();
    assert_eq!(view.items.len(), 2);
    assert_eq!(client.transport().gets_to("/expenses").len(), 2);
}

#[tokio::test]
async fn removed_queries_start_from_scratch() {
    let client = QueryClient::new(FakeTransport::new(backend(5)));
    let f = filters(Currency::Myr);
    client.expenses(&f).await.unwrap();

    let removed = client.remove_queries(|_| true).await;

    assert_eq!(removed, 1);
    assert!(client.cached_expenses(&f).await.is_none());
}

/// Answers every call with one record or income tagged by the call number.
fn numbered_calls() -> impl Fn(&str, &Params) -> Result<Value, TransportError> + Send + Sync {
    let calls = AtomicUsize::new(0);
    move |path: &str, _: &Params| {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        match path {
            "/expenses" => Ok(json!({
                "success": true,
                "data": {
                    "items": [record(&format!("call-{call}"), "MYR")],
                    "total": "4",
                    "page": "1",
                    "limit": "2"
                }
            })),
            "/summary" => Ok(json!({ "success": true, "data": { "income": call } })),
            _ => Err(TransportError::NotFound),
        }
    }
}

#[tokio::test]
async fn late_response_never_lands_in_a_recreated_query() {
    let transport = FakeTransport::new(numbered_calls())
        .with_delays([Duration::from_millis(40), Duration::from_millis(100)]);
    let client = QueryClient::new(Arc::new(transport));
    let f = filters(Currency::Myr);

    let (old, new, (during, next)) = tokio::join!(
        client.expenses(&f),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            client.remove_queries(|_| true).await;
            client.expenses(&f).await
        },
        async {
            // The first response has arrived, the second has not.
            tokio::time::sleep(Duration::from_millis(60)).await;
            let during = client.cached_expenses(&f).await;
            (during, client.fetch_next_page(&f).await)
        }
    );

    assert!(old.unwrap().items.is_empty());
    let during = during.unwrap();
    assert!(during.items.is_empty());
    assert_eq!(during.status, FetchStatus::LoadingFirstPage);
    assert!(next.unwrap().items.is_empty());

    assert_eq!(ids(&new.unwrap()), vec!["call-1"]);
    let gets = client.transport().gets_to("/expenses");
    assert_eq!(gets.len(), 2);
    assert!(gets.iter().all(|params| param(params, "page") == Some("1")));

    let view = client.cached_expenses(&f).await.unwrap();
    assert_eq!(ids(&view), vec!["call-1"]);
    assert_eq!(view.status, FetchStatus::Ready);
}

#[tokio::test]
async fn late_summary_never_lands_in_a_recreated_query() {
    let transport = FakeTransport::new(numbered_calls())
        .with_delays([Duration::from_millis(40), Duration::from_millis(100)]);
    let client = QueryClient::new(Arc::new(transport));

    let first = march();
    let (_, new, during) = tokio::join!(
        client.summary(&first),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            client.remove_queries(|_| true).await;
            client.summary(&march()).await
        },
        async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            client.summary(&march()).await
        }
    );

    assert!(during.is_loading);
    assert_eq!(during.aggregate.income, 0.0);
    assert_eq!(new.aggregate.income, 1.0);
    assert_eq!(client.transport().gets_to("/summary").len(), 2);
    assert_eq!(client.summary(&march()).await.aggregate.income, 1.0);
}

#[tokio::test]
async fn invalid_draft_is_never_sent() {
    let client = QueryClient::new(FakeTransport::new(backend(5)));
    let draft = ExpenseDraft {
        channel: Some("creditCard".to_string()),
        ..draft()
    };

    let err = client.create_expense(&draft).await.unwrap_err();

    let EngineError::Validation(errors) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(errors.field(Field::BillingMonth).is_some());
    assert_eq!(client.transport().posts(), 0);
}

#[tokio::test]
async fn charts_read_the_envelope_data() {
    let client = QueryClient::new(FakeTransport::new(|path: &str, _: &Params| match path {
        "/expenses-chart/category" => Ok(json!({
            "success": true,
            "data": [
                { "category": "rent", "total": 1800 },
                { "category": "other", "total": 90, "breakdown": [
                    { "category": "shopping", "total": 60 },
                    { "category": "cricket", "total": 30 }
                ] }
            ]
        })),
        "/expenses-chart/channel" => Ok(json!({ "success": true })),
        _ => Err(TransportError::NotFound),
    }));
    let range = ChartFilters {
        start: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        currency: Currency::Myr,
    };

    let categories = client.category_chart(&range).await.unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[1].category, "other");
    assert_eq!(categories[1].breakdown.as_ref().map(Vec::len), Some(2));

    assert!(client.channel_chart(&range).await.unwrap().is_empty());
}
