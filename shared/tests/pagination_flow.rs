use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crux_core::testing::AppTester;
use crux_http::protocol::{HttpRequest, HttpResponse};
use url::Url;
use wanted_core::capabilities::{HttpTransport, MemoryKvStore, TransportError};
use wanted_core::catalog::FetchError;
use wanted_core::event::RecordUid;
use wanted_core::pagination::NavIntent;
use wanted_core::record::{Page, Record};
use wanted_core::runtime::Runtime;
use wanted_core::{App, Effect, Event, Model};

fn page(n: u32, count: usize, total: u64) -> Page {
    Page {
        page_number: n,
        items: (0..count)
            .map(|i| Record::new(format!("p{n}-{i}"), format!("PERSON {n}-{i}")))
            .collect(),
        total_count: total,
    }
}

fn fetched(n: u32, result: Result<Page, FetchError>) -> Event {
    Event::PageFetched {
        page: n,
        result: Box::new(result),
    }
}

/// Page numbers of the catalog requests among `effects`.
fn page_requests(effects: &[Effect]) -> Vec<u32> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Http(request) => page_of(&request.operation.url),
            _ => None,
        })
        .collect()
}

fn page_of(url: &str) -> Option<u32> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

fn tester() -> (AppTester<App, Effect>, Model) {
    (AppTester::default(), Model::default())
}

#[test]
fn test_total_45_gives_window_of_three() {
    let (app, mut model) = tester();

    let update = app.update(Event::AppStarted, &mut model);
    assert_eq!(page_requests(&update.effects), vec![1]);

    let _ = app.update(fetched(1, Ok(page(1, 20, 45))), &mut model);
    let vm = app.view(&model);
    assert_eq!(vm.page.total_pages, 3);
    assert_eq!(vm.page.window, vec![1, 2, 3]);
    assert!(!vm.page.has_previous);
    assert!(vm.page.has_next);
    assert_eq!(vm.items.len(), 20);
}

#[test]
fn test_concurrent_requests_for_page_five_fetch_once() {
    let (app, mut model) = tester();

    let mut all = Vec::new();
    for _ in 0..3 {
        all.extend(app.update(Event::GoToPage { page: 5 }, &mut model).effects);
    }
    assert_eq!(page_requests(&all), vec![5]);

    let _ = app.update(fetched(5, Ok(page(5, 20, 200))), &mut model);
    let again = app.update(Event::GoToPage { page: 5 }, &mut model);
    assert!(page_requests(&again.effects).is_empty());
}

#[test]
fn test_failed_page_keeps_previous_data_visible() {
    let (app, mut model) = tester();
    let _ = app.update(Event::AppStarted, &mut model);
    let _ = app.update(fetched(1, Ok(page(1, 20, 45))), &mut model);

    let update = app.update(Event::GoToPage { page: 2 }, &mut model);
    assert_eq!(page_requests(&update.effects), vec![2]);

    let loading = app.view(&model);
    assert!(loading.page.is_loading);
    assert!(loading.page.is_placeholder);
    assert_eq!(loading.items[0].uid, "p1-0");

    let _ = app.update(fetched(2, Err(FetchError::network("connection reset"))), &mut model);
    let failed = app.view(&model);
    assert_eq!(failed.page.current_page, 2);
    assert_eq!(failed.items[0].uid, "p1-0");
    let err = failed.page.error.expect("page 2 carries the error");
    assert_eq!(err.code, "NETWORK_ERROR");
    assert!(err.is_retryable);

    // Page 1 itself is untouched by page 2's failure.
    let _ = app.update(Event::Navigate(NavIntent::Previous), &mut model);
    let back = app.view(&model);
    assert!(back.page.error.is_none());
    assert!(!back.page.is_placeholder);
}

#[test]
fn test_late_result_for_other_page_does_not_replace_current() {
    let (app, mut model) = tester();
    let _ = app.update(Event::GoToPage { page: 1 }, &mut model);
    let _ = app.update(Event::GoToPage { page: 2 }, &mut model);

    let _ = app.update(fetched(2, Ok(page(2, 3, 45))), &mut model);
    let _ = app.update(fetched(1, Ok(page(1, 20, 45))), &mut model);

    let vm = app.view(&model);
    assert_eq!(vm.page.current_page, 2);
    assert_eq!(vm.items.len(), 3);
    assert!(vm.items.iter().all(|c| c.uid.starts_with("p2-")));
}

#[test]
fn test_out_of_range_navigation_is_clamped_after_data() {
    let (app, mut model) = tester();

    let update = app.update(Event::GoToPage { page: 7 }, &mut model);
    assert_eq!(page_requests(&update.effects), vec![7]);
    assert_eq!(app.view(&model).page.current_page, 7);

    let update = app.update(fetched(7, Ok(page(7, 0, 45))), &mut model);
    assert_eq!(page_requests(&update.effects), vec![3]);
    let vm = app.view(&model);
    assert_eq!(vm.page.current_page, 3);
    assert!(vm.page.error.is_none());
    assert!(vm.page.is_loading);
}

#[test]
fn test_empty_catalog_has_single_page() {
    let (app, mut model) = tester();
    let _ = app.update(Event::AppStarted, &mut model);
    let _ = app.update(fetched(1, Ok(page(1, 0, 0))), &mut model);

    let vm = app.view(&model);
    assert_eq!(vm.page.total_pages, 1);
    assert_eq!(vm.page.window, vec![1]);
    assert!(vm.items.is_empty());
    assert!(vm.page.error.is_none());
}

#[test]
fn test_navigation_intents_follow_window() {
    let (app, mut model) = tester();
    let _ = app.update(Event::AppStarted, &mut model);
    let _ = app.update(fetched(1, Ok(page(1, 20, 1000))), &mut model);

    let update = app.update(Event::Navigate(NavIntent::Last), &mut model);
    assert_eq!(page_requests(&update.effects), vec![50]);
    assert_eq!(app.view(&model).page.window, (45..=50).collect::<Vec<_>>());

    let update = app.update(Event::Navigate(NavIntent::Page(12)), &mut model);
    assert_eq!(page_requests(&update.effects), vec![12]);
    assert_eq!(app.view(&model).page.window, (7..=16).collect::<Vec<_>>());

    let update = app.update(Event::Navigate(NavIntent::First), &mut model);
    assert!(page_requests(&update.effects).is_empty());
    assert!(!app.view(&model).page.has_previous);
}

/// Serves a fixed-size catalog and counts requests per page.
struct FakeCatalog {
    total: u64,
    calls: Mutex<HashMap<u32, usize>>,
    records: AtomicUsize,
}

impl FakeCatalog {
    fn new(total: u64) -> Self {
        Self {
            total,
            calls: Mutex::new(HashMap::new()),
            records: AtomicUsize::new(0),
        }
    }

    fn calls_for(&self, n: u32) -> usize {
        self.calls.lock().unwrap().get(&n).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum::<usize>() + self.records.load(Ordering::SeqCst)
    }

    fn page_body(&self, n: u32) -> String {
        let start = u64::from(n - 1) * 20;
        let count = self.total.saturating_sub(start).min(20);
        let items: Vec<String> = (0..count)
            .map(|i| format!(r#"{{"uid": "p{n}-{i}", "title": "PERSON {n}-{i}"}}"#))
            .collect();
        format!(r#"{{"total": {}, "items": [{}]}}"#, self.total, items.join(","))
    }
}

#[async_trait]
impl HttpTransport for FakeCatalog {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        tokio::task::yield_now().await;
        if let Some(uid) = request.url.strip_prefix("https://api.fbi.gov/@wanted-person/") {
            self.records.fetch_add(1, Ordering::SeqCst);
            let body = format!(r#"{{"uid": "{uid}", "title": "FETCHED"}}"#);
            return Ok(HttpResponse::ok().body(body.into_bytes()).build());
        }
        let n = page_of(&request.url).ok_or_else(|| TransportError::InvalidRequest {
            reason: format!("no page in {}", request.url),
        })?;
        *self.calls.lock().unwrap().entry(n).or_default() += 1;
        Ok(HttpResponse::ok().body(self.page_body(n).into_bytes()).build())
    }
}

fn runtime(catalog: &Arc<FakeCatalog>) -> Runtime<FakeCatalog> {
    Runtime::new(Arc::clone(catalog), Arc::new(MemoryKvStore::new()))
}

#[tokio::test]
async fn test_runtime_deduplicates_in_flight_page() {
    let catalog = Arc::new(FakeCatalog::new(200));
    let mut runtime = runtime(&catalog);

    runtime.dispatch(Event::GoToPage { page: 5 });
    runtime.dispatch(Event::GoToPage { page: 5 });
    runtime.dispatch(Event::FilterChanged { query: "5-1".into() });
    runtime.settle().await;

    assert_eq!(catalog.calls_for(5), 1);
    let titles: Vec<_> = runtime.view().items.into_iter().map(|c| c.title).collect();
    assert_eq!(
        titles,
        vec![
            "PERSON 5-1", "PERSON 5-10", "PERSON 5-11", "PERSON 5-12", "PERSON 5-13",
            "PERSON 5-14", "PERSON 5-15", "PERSON 5-16", "PERSON 5-17", "PERSON 5-18",
            "PERSON 5-19",
        ]
    );
}

#[tokio::test]
async fn test_runtime_applies_results_to_their_own_pages() {
    let catalog = Arc::new(FakeCatalog::new(45));
    let mut runtime = runtime(&catalog);

    runtime.dispatch(Event::GoToPage { page: 1 });
    runtime.dispatch(Event::GoToPage { page: 2 });
    runtime.dispatch(Event::GoToPage { page: 3 });
    runtime.settle().await;

    assert_eq!(runtime.view().items.len(), 5);
    runtime.dispatch(Event::GoToPage { page: 1 });
    assert_eq!(runtime.view().items.len(), 20);
    runtime.dispatch(Event::GoToPage { page: 2 });
    assert_eq!(runtime.view().items.len(), 20);
    assert_eq!(runtime.outstanding(), 0);
}

#[tokio::test]
async fn test_runtime_detail_is_fetched_once() {
    let catalog = Arc::new(FakeCatalog::new(1));
    let mut runtime = runtime(&catalog);
    let uid = RecordUid::new("abc");

    runtime.dispatch(Event::OpenRecord { uid: uid.clone() });
    runtime.dispatch(Event::OpenRecord { uid: uid.clone() });
    runtime.settle().await;
    runtime.dispatch(Event::CloseRecord);
    runtime.dispatch(Event::OpenRecord { uid });

    assert_eq!(catalog.records.load(Ordering::SeqCst), 1);
    let detail = runtime.view().detail.unwrap();
    assert_eq!(detail.record.unwrap().title, "FETCHED");
}

#[tokio::test]
async fn test_deep_page_makes_exactly_one_request() {
    let catalog = Arc::new(FakeCatalog::new(200));
    let mut runtime = runtime(&catalog);

    runtime.dispatch(Event::GoToPage { page: 5 });
    runtime.settle().await;

    assert_eq!(catalog.total_calls(), 1);
    assert_eq!(catalog.calls_for(1), 0);
    assert_eq!(runtime.view().page.current_page, 5);
}

#[tokio::test]
async fn test_loading_reports_makes_no_catalog_request() {
    let catalog = Arc::new(FakeCatalog::new(200));
    let mut runtime = runtime(&catalog);

    runtime.dispatch(Event::LoadReports);
    runtime.dispatch(Event::DeleteReport { position: 0 });
    runtime.settle().await;

    assert_eq!(catalog.total_calls(), 0);
    assert_eq!(runtime.view().error.unwrap().code, "INDEX_ERROR");
}
