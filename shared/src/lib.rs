#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod event;
pub mod filter;
pub mod model;
pub mod pagination;
pub mod query_cache;
pub mod record;
pub mod report_store;
pub mod runtime;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use crux_core::App as CruxApp;
pub use event::Event;
pub use model::Model;

/// Items per page on the remote catalog.
pub const PAGE_SIZE: u32 = 20;
/// Width of the page-number window.
pub const MAX_VISIBLE_PAGES: u32 = 10;
pub const DESCRIPTION_PREVIEW_LENGTH: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Decode,
    Storage,
    Validation,
    Index,
    NotFound,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Decode => "DECODE_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Index => "INDEX_ERROR",
            Self::NotFound => "NOT_FOUND",
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: BTreeMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal_message: None,
            context: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to reach the catalog. Please check your connection and try again.".into()
            }
            ErrorKind::Decode => "The catalog returned data that could not be read.".into(),
            ErrorKind::Storage => "Unable to save your reports on this device.".into(),
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::Index => "That report no longer exists.".into(),
            ErrorKind::NotFound => "The requested item could not be found.".into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<catalog::FetchError> for AppError {
    fn from(e: catalog::FetchError) -> Self {
        match &e {
            catalog::FetchError::Network { status, .. } => {
                let err = Self::new(ErrorKind::Network, e.to_string());
                match status {
                    Some(s) => err.with_context("http_status", s.to_string()),
                    None => err,
                }
            }
            catalog::FetchError::Decode { .. } => Self::new(ErrorKind::Decode, e.to_string()),
            catalog::FetchError::InvalidRequest { .. } => {
                Self::new(ErrorKind::Validation, e.to_string())
            }
        }
    }
}

impl From<report_store::ReportStoreError> for AppError {
    fn from(e: report_store::ReportStoreError) -> Self {
        use report_store::ReportStoreError as E;
        let kind = match &e {
            E::Index { .. } => ErrorKind::Index,
            E::NotFound(_) => ErrorKind::NotFound,
            E::Storage(_) | E::Serialize(_) => ErrorKind::Storage,
        };
        let message = match kind {
            ErrorKind::Storage => "could not save reports".to_string(),
            _ => e.to_string(),
        };
        Self::new(kind, message).with_internal(e.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::new(ErrorKind::Validation, e.to_string())
    }
}

impl From<event::ValidationError> for AppError {
    fn from(e: event::ValidationError) -> Self {
        Self::new(ErrorKind::Validation, format!("note is invalid: {e}"))
    }
}

// --- View boundary ---

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFacingError {
    pub code: String,
    pub message: String,
    pub is_retryable: bool,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.user_facing_message(),
            is_retryable: e.is_retryable(),
        }
    }
}

impl From<&catalog::FetchError> for UserFacingError {
    fn from(e: &catalog::FetchError) -> Self {
        Self::from(&AppError::from(e.clone()))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordCard {
    pub uid: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub description_preview: String,
}

impl From<&record::Record> for RecordCard {
    fn from(r: &record::Record) -> Self {
        Self {
            uid: r.uid.to_string(),
            title: r.title.clone(),
            thumbnail_url: r.thumbnail_url().map(str::to_string),
            description_preview: preview(&r.description, DESCRIPTION_PREVIEW_LENGTH),
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageView {
    pub current_page: u32,
    pub total_pages: u32,
    pub window: Vec<u32>,
    pub has_previous: bool,
    pub has_next: bool,
    pub is_loading: bool,
    /// Items belong to the previously displayed page while this one loads.
    pub is_placeholder: bool,
    pub error: Option<UserFacingError>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportView {
    pub position: usize,
    pub id: String,
    pub record_uid: String,
    pub title: String,
    pub image_url: Option<String>,
    pub note: String,
}

impl ReportView {
    fn new(position: usize, r: &report_store::Report) -> Self {
        Self {
            position,
            id: r.id.to_string(),
            record_uid: r.record_uid.to_string(),
            title: r.title.clone(),
            image_url: r.image_url.clone(),
            note: r.note.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetailView {
    pub uid: String,
    pub is_loading: bool,
    pub error: Option<UserFacingError>,
    pub record: Option<record::RecordDetail>,
    pub reports: Vec<ReportView>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewModel {
    /// Current page's items after the title filter.
    pub items: Vec<RecordCard>,
    pub filter: String,
    pub page: PageView,
    pub detail: Option<DetailView>,
    pub reports: Vec<ReportView>,
    /// A reports write is outstanding or queued.
    pub is_saving_reports: bool,
    pub error: Option<UserFacingError>,
}

pub mod app {
    use super::*;
    use crate::capabilities::Capabilities;
    use crate::event::{Note, RecordUid};
    use crate::filter::filter_records;
    use crate::query_cache::Request;
    use crate::report_store::{Report, ReportMutation, StoreStep, REPORTS_KEY};
    use tracing::{debug, info, warn};

    #[derive(Default)]
    pub struct App;

    impl App {
        /// Asks for the current page. Issues a request only if nothing is
        /// cached or in flight for it.
        fn request_current_page(model: &mut Model, caps: &Capabilities) {
            let page = model.current_page();
            match model.pages.request(&page) {
                Request::Started => Self::fetch_page(model, page, caps),
                Request::Cached => model.pages.mark_displayed(&page),
                Request::AlreadyInFlight => {}
            }
        }

        fn fetch_page(model: &mut Model, page: u32, caps: &Capabilities) {
            match model.catalog.page_url(page, model.pagination.page_size()) {
                Ok(url) => {
                    debug!(page, "requesting page");
                    caps.http
                        .get(url.as_str())
                        .header("Accept", "application/json")
                        .send(move |outcome| Event::PageFetched {
                            page,
                            result: Box::new(catalog::page_from_response(page, outcome)),
                        });
                }
                Err(e) => {
                    warn!(page, error = %e, "cannot build page request");
                    model.pages.resolve(page, Err(e));
                }
            }
        }

        fn fetch_record(model: &mut Model, uid: RecordUid, caps: &Capabilities) {
            match model.catalog.record_url(&uid) {
                Ok(url) => {
                    debug!(%uid, "requesting record");
                    caps.http
                        .get(url.as_str())
                        .header("Accept", "application/json")
                        .send(move |outcome| {
                            let result = catalog::record_from_response(&uid, outcome);
                            Event::RecordFetched {
                                uid,
                                result: Box::new(result),
                            }
                        });
                }
                Err(e) => {
                    warn!(%uid, error = %e, "cannot build record request");
                    model.records.resolve(uid, Err(e));
                }
            }
        }

        fn page_arrived(
            model: &mut Model,
            page: u32,
            result: Result<record::Page, catalog::FetchError>,
            caps: &Capabilities,
        ) {
            match result {
                Ok(data) => {
                    let total = data.total_count;
                    debug!(page, items = data.items.len(), total, "page arrived");
                    model.pages.resolve(page, Ok(data));
                    if model.pagination.on_page_data_arrived(total) {
                        Self::request_current_page(model, caps);
                        return;
                    }
                    let current = model.current_page();
                    model.pages.mark_displayed(&current);
                }
                Err(e) => {
                    warn!(page, error = %e, "page fetch failed");
                    model.pages.resolve(page, Err(e));
                }
            }
        }

        fn load_reports(model: &mut Model, caps: &Capabilities) {
            if model.reports.begin_load() {
                debug!("reading reports slot");
                caps.kv.get(REPORTS_KEY.to_string(), |result| {
                    Event::ReportsLoaded(Box::new(result.map_err(|e| e.to_string())))
                });
            }
        }

        /// Issues the write the store asked for and surfaces its last error.
        fn follow_store(model: &mut Model, step: StoreStep, caps: &Capabilities) {
            if let Some(bytes) = step.write {
                caps.kv.set(REPORTS_KEY.to_string(), bytes, |result| {
                    Event::ReportsWritten(result.map(drop).map_err(|e| e.to_string()))
                });
            }
            if let Some(e) = step.errors.into_iter().last() {
                let e = AppError::from(e);
                warn!(error = %e, "report action failed");
                model.active_error = Some(e);
            }
        }

        fn mutate_reports(model: &mut Model, mutation: ReportMutation, caps: &Capabilities) {
            model.active_error = None;
            let step = model.reports.submit(mutation);
            Self::follow_store(model, step, caps);
        }

        fn sighting(model: &Model, uid: RecordUid, note: String) -> AppResult<Report> {
            let note = Note::new(note)?;
            let record = model.records.get(&uid).ok_or_else(|| {
                AppError::new(
                    ErrorKind::Validation,
                    "Open the record before reporting a sighting.",
                )
                .with_context("uid", uid.to_string())
            })?;
            Ok(Report::new(
                uid.clone(),
                record.title.clone(),
                record.thumbnail_url().map(str::to_string),
                note,
            ))
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            match event {
                Event::Configure(config) => match config.validate() {
                    Ok(()) => {
                        info!(list_url = %config.catalog.list_url, "core configured");
                        model.reconfigure(&config);
                    }
                    Err(e) => {
                        warn!(error = %e, "configuration rejected");
                        model.active_error = Some(AppError::from(e));
                    }
                },

                Event::AppStarted => {
                    info!("core started");
                    Self::load_reports(model, caps);
                    Self::request_current_page(model, caps);
                }

                Event::LoadReports => Self::load_reports(model, caps),

                Event::ReportsLoaded(result) => {
                    let step = model.reports.load(*result);
                    info!(reports = model.reports.len(), "reports loaded");
                    Self::follow_store(model, step, caps);
                }

                Event::ReportsWritten(result) => {
                    let step = model.reports.write_finished(result);
                    Self::follow_store(model, step, caps);
                }

                Event::GoToPage { page } => {
                    model.pagination.go_to_page(page);
                    Self::request_current_page(model, caps);
                }

                Event::Navigate(intent) => {
                    model.pagination.navigate(intent);
                    Self::request_current_page(model, caps);
                }

                Event::RetryPage => {
                    let page = model.current_page();
                    if model.pages.refetch(&page).needs_fetch() {
                        Self::fetch_page(model, page, caps);
                    }
                }

                Event::PageFetched { page, result } => {
                    Self::page_arrived(model, page, *result, caps);
                }

                Event::FilterChanged { query } => {
                    model.filter = query;
                }

                Event::ClearFilter => {
                    model.filter.clear();
                }

                Event::OpenRecord { uid } => {
                    if model.records.request(&uid).needs_fetch() {
                        Self::fetch_record(model, uid.clone(), caps);
                    }
                    model.selected = Some(uid);
                }

                Event::CloseRecord => {
                    model.selected = None;
                }

                Event::RetryRecord => {
                    if let Some(uid) = model.selected.clone() {
                        if model.records.refetch(&uid).needs_fetch() {
                            Self::fetch_record(model, uid, caps);
                        }
                    }
                }

                Event::RecordFetched { uid, result } => {
                    model.records.resolve(uid, *result);
                }

                Event::ReportSighting { uid, note } => match Self::sighting(model, uid, note) {
                    Ok(report) => Self::mutate_reports(model, ReportMutation::Append(report), caps),
                    Err(e) => {
                        warn!(error = %e, "sighting rejected");
                        model.active_error = Some(e);
                    }
                },

                Event::DeleteReport { position } => {
                    Self::mutate_reports(model, ReportMutation::DeleteAt(position), caps);
                }

                Event::DeleteReportById { id } => {
                    Self::mutate_reports(model, ReportMutation::DeleteById(id), caps);
                }

                Event::DismissError => {
                    model.active_error = None;
                }
            }

            caps.render.render();
        }

        fn view(&self, model: &Model) -> ViewModel {
            let current = model.current_page();
            let snapshot = model.pages.snapshot(&current);

            let items = snapshot
                .data
                .map(|p| {
                    filter_records(&p.items, &model.filter)
                        .iter()
                        .map(RecordCard::from)
                        .collect()
                })
                .unwrap_or_default();

            let page = PageView {
                current_page: current,
                total_pages: model.pagination.total_pages(),
                window: model.pagination.visible_window(),
                has_previous: model.pagination.has_previous(),
                has_next: model.pagination.has_next(),
                is_loading: snapshot.is_loading,
                is_placeholder: snapshot.is_placeholder,
                error: snapshot.error.map(UserFacingError::from),
            };

            let detail = model.selected.as_ref().map(|uid| {
                let snap = model.records.snapshot(uid);
                DetailView {
                    uid: uid.to_string(),
                    is_loading: snap.is_loading,
                    error: snap.error.map(UserFacingError::from),
                    record: snap.data.map(record::Record::detail),
                    reports: model
                        .reports
                        .reports_for(uid)
                        .map(|(i, r)| ReportView::new(i, r))
                        .collect(),
                }
            });

            ViewModel {
                items,
                filter: model.filter.clone(),
                page,
                detail,
                reports: model
                    .reports
                    .reports()
                    .iter()
                    .enumerate()
                    .map(|(i, r)| ReportView::new(i, r))
                    .collect(),
                is_saving_reports: model.reports.is_saving(),
                error: model.active_error.as_ref().map(UserFacingError::from),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{http_ok, http_status};
    use crate::capabilities::{resolve_kv, KeyValueStore, KvKey, MemoryKvStore};
    use crate::catalog::FetchError;
    use crate::config::Config;
    use crate::event::RecordUid;
    use crate::record::{Page, Record};
    use crate::report_store::REPORTS_KEY;
    use crux_core::testing::AppTester;

    /// Drives the app the way a shell would, answering storage from memory.
    struct Harness {
        app: AppTester<App, Effect>,
        model: Model,
        kv: MemoryKvStore,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_kv(MemoryKvStore::new())
        }

        fn with_kv(kv: MemoryKvStore) -> Self {
            Self {
                app: AppTester::default(),
                model: Model::default(),
                kv,
            }
        }

        /// Applies `event`, answers every storage effect it leads to, and
        /// returns the remaining effects.
        fn send(&mut self, event: Event) -> Vec<Effect> {
            let mut pending = self.app.update(event, &mut self.model).effects;
            let mut rest = Vec::new();
            while let Some(effect) = pending.pop() {
                match effect {
                    Effect::KeyValue(mut request) => {
                        let output = resolve_kv(&self.kv, &request.operation);
                        let update = self.app.resolve(&mut request, output).unwrap();
                        pending.extend(update.effects);
                        for event in update.events {
                            pending.extend(self.app.update(event, &mut self.model).effects);
                        }
                    }
                    other => rest.push(other),
                }
            }
            rest
        }

        fn view(&self) -> ViewModel {
            self.app.view(&self.model)
        }

        fn stored(&self) -> Option<String> {
            self.kv.get(&KvKey::new(REPORTS_KEY).unwrap()).unwrap()
        }
    }

    fn requested_urls(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Http(request) => Some(request.operation.url.clone()),
                _ => None,
            })
            .collect()
    }

    fn page_url(n: u32) -> String {
        format!("https://api.fbi.gov/@wanted?page={n}&pageSize=20")
    }

    fn page(n: u32, titles: &[&str], total: u64) -> Page {
        Page {
            page_number: n,
            items: titles
                .iter()
                .map(|t| Record::new(format!("{n}-{t}"), *t))
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

    mod error_tests {
        use super::*;

        #[test]
        fn only_network_errors_are_retryable() {
            assert!(ErrorKind::Network.is_retryable());
            for kind in [
                ErrorKind::Decode,
                ErrorKind::Storage,
                ErrorKind::Validation,
                ErrorKind::Index,
                ErrorKind::NotFound,
            ] {
                assert!(!kind.is_retryable(), "{kind:?}");
            }
        }

        #[test]
        fn fetch_status_lands_in_context() {
            let err = AppError::from(FetchError::Network {
                status: Some(502),
                message: "bad gateway".into(),
            });
            assert_eq!(err.kind, ErrorKind::Network);
            assert_eq!(err.context.get("http_status").map(String::as_str), Some("502"));
        }

        #[test]
        fn validation_message_is_shown_verbatim() {
            let err = AppError::new(ErrorKind::Validation, "note is too long");
            assert_eq!(err.user_facing_message(), "note is too long");
            assert_eq!(err.to_string(), "[VALIDATION_ERROR] note is too long");
        }

        #[test]
        fn preview_cuts_on_char_boundary() {
            assert_eq!(preview("héllo wörld", 5), "héllo…");
            assert_eq!(preview("short", 10), "short");
        }
    }

    mod update_tests {
        use super::*;

        #[test]
        fn start_reads_reports_and_requests_page_one() {
            let app = AppTester::<App, Effect>::default();
            let mut model = Model::default();
            let update = app.update(Event::AppStarted, &mut model);

            assert_eq!(requested_urls(&update.effects), vec![page_url(1)]);
            assert!(update
                .effects
                .iter()
                .any(|e| matches!(e, Effect::KeyValue(_))));
            assert!(app.view(&model).page.is_loading);
        }

        #[test]
        fn load_reports_makes_no_catalog_request() {
            let mut h = Harness::new();
            let effects = h.send(Event::LoadReports);
            assert!(requested_urls(&effects).is_empty());
            assert!(h.model.reports.is_loaded());
            assert!(!h.view().page.is_loading);
        }

        #[test]
        fn going_to_a_page_requests_only_that_page() {
            let mut h = Harness::new();
            let effects = h.send(Event::GoToPage { page: 5 });
            assert_eq!(requested_urls(&effects), vec![page_url(5)]);
        }

        #[test]
        fn every_update_renders() {
            let app = AppTester::<App, Effect>::default();
            let mut model = Model::default();
            let update = app.update(Event::DismissError, &mut model);
            assert!(update.effects.iter().any(|e| matches!(e, Effect::Render(_))));
            assert_eq!(update.effects.len(), 1);
        }

        #[test]
        fn http_answer_is_decoded_into_the_page() {
            let app = AppTester::<App, Effect>::default();
            let mut model = Model::default();
            let update = app.update(Event::GoToPage { page: 1 }, &mut model);
            let mut request = update
                .effects
                .into_iter()
                .find_map(|e| match e {
                    Effect::Http(r) => Some(r),
                    _ => None,
                })
                .unwrap();
            assert_eq!(request.operation.method, "GET");

            let body = r#"{"total": 45, "items": [{"uid": "a", "title": "ALPHA"}]}"#;
            let answered = app.resolve(&mut request, http_ok(body)).unwrap();
            for event in answered.events {
                let _ = app.update(event, &mut model);
            }

            let vm = app.view(&model);
            assert_eq!(vm.items[0].title, "ALPHA");
            assert_eq!(vm.page.window, vec![1, 2, 3]);
            assert!(!vm.page.is_loading);
        }

        #[test]
        fn server_error_status_is_retryable_network_error() {
            let app = AppTester::<App, Effect>::default();
            let mut model = Model::default();
            let update = app.update(Event::GoToPage { page: 1 }, &mut model);
            let mut request = update
                .effects
                .into_iter()
                .find_map(|e| match e {
                    Effect::Http(r) => Some(r),
                    _ => None,
                })
                .unwrap();

            let answered = app.resolve(&mut request, http_status(503)).unwrap();
            for event in answered.events {
                let _ = app.update(event, &mut model);
            }

            let err = app.view(&model).page.error.unwrap();
            assert_eq!(err.code, "NETWORK_ERROR");
            assert!(err.is_retryable);
        }

        #[test]
        fn cached_page_is_not_refetched() {
            let mut h = Harness::new();
            let _ = h.send(Event::AppStarted);
            let _ = h.send(fetched(1, Ok(page(1, &["A"], 45))));
            let _ = h.send(Event::GoToPage { page: 2 });
            let _ = h.send(fetched(2, Ok(page(2, &["B"], 45))));

            let effects = h.send(Event::GoToPage { page: 1 });
            assert!(requested_urls(&effects).is_empty());
            assert_eq!(h.view().items[0].title, "A");
        }

        #[test]
        fn filter_applies_to_current_page_and_persists() {
            let mut h = Harness::new();
            let _ = h.send(Event::AppStarted);
            let _ = h.send(fetched(1, Ok(page(1, &["JOHN DOE", "JANE ROE"], 45))));
            let _ = h.send(Event::FilterChanged { query: "roe".into() });
            let titles: Vec<_> = h.view().items.into_iter().map(|c| c.title).collect();
            assert_eq!(titles, vec!["JANE ROE"]);

            let _ = h.send(Event::GoToPage { page: 2 });
            let _ = h.send(fetched(2, Ok(page(2, &["ROE JR", "SMITH"], 45))));
            let vm = h.view();
            assert_eq!(vm.filter, "roe");
            assert_eq!(vm.items.len(), 1);

            let _ = h.send(Event::ClearFilter);
            assert_eq!(h.view().items.len(), 2);
        }

        #[test]
        fn retry_refetches_failed_page_once() {
            let mut h = Harness::new();
            let _ = h.send(Event::AppStarted);
            let _ = h.send(fetched(1, Err(FetchError::network("down"))));
            assert!(h.view().page.error.is_some());

            let first = h.send(Event::RetryPage);
            let second = h.send(Event::RetryPage);
            assert_eq!(requested_urls(&first), vec![page_url(1)]);
            assert!(requested_urls(&second).is_empty());

            let _ = h.send(fetched(1, Ok(page(1, &["A"], 1))));
            assert!(h.view().page.error.is_none());
        }

        #[test]
        fn decode_error_is_not_retryable_in_view() {
            let mut h = Harness::new();
            let _ = h.send(Event::AppStarted);
            let _ = h.send(fetched(1, Err(FetchError::decode("bad json"))));
            let err = h.view().page.error.unwrap();
            assert_eq!(err.code, "DECODE_ERROR");
            assert!(!err.is_retryable);
        }

        #[test]
        fn configure_switches_endpoint_and_page_size() {
            let mut h = Harness::new();
            let mut config = Config::default();
            config.catalog.list_url = "https://mirror.example/list".into();
            config.pagination.page_size = 5;
            let _ = h.send(Event::Configure(Box::new(config)));

            let effects = h.send(Event::GoToPage { page: 2 });
            assert_eq!(
                requested_urls(&effects),
                vec!["https://mirror.example/list?page=2&pageSize=5".to_string()]
            );
        }

        #[test]
        fn invalid_configuration_is_rejected_and_previous_kept() {
            let mut h = Harness::new();
            let mut config = Config::default();
            config.catalog.list_url = "file:///etc/passwd".into();
            let _ = h.send(Event::Configure(Box::new(config)));

            assert_eq!(h.view().error.unwrap().code, "VALIDATION_ERROR");
            let effects = h.send(Event::GoToPage { page: 1 });
            assert_eq!(requested_urls(&effects), vec![page_url(1)]);
        }
    }

    mod detail_tests {
        use super::*;

        fn opened(h: &mut Harness, uid: &str) {
            let _ = h.send(Event::OpenRecord { uid: RecordUid::new(uid) });
            let mut r = Record::new(uid, "JOHN DOE");
            r.images.push(record::RecordImage {
                thumbnail_url: "https://img/t.jpg".into(),
                large_url: "https://img/l.jpg".into(),
                caption: None,
            });
            let _ = h.send(Event::RecordFetched {
                uid: RecordUid::new(uid),
                result: Box::new(Ok(r)),
            });
        }

        fn loaded() -> Harness {
            let mut h = Harness::new();
            let _ = h.send(Event::LoadReports);
            h
        }

        #[test]
        fn open_record_fetches_once_and_has_no_placeholder() {
            let mut h = loaded();
            opened(&mut h, "a");

            let first = h.send(Event::OpenRecord { uid: RecordUid::new("b") });
            let second = h.send(Event::OpenRecord { uid: RecordUid::new("b") });
            assert_eq!(
                requested_urls(&first),
                vec!["https://api.fbi.gov/@wanted-person/b".to_string()]
            );
            assert!(requested_urls(&second).is_empty());

            let detail = h.view().detail.unwrap();
            assert_eq!(detail.uid, "b");
            assert!(detail.is_loading);
            assert!(detail.record.is_none());
        }

        #[test]
        fn detail_view_uses_fallbacks() {
            let mut h = loaded();
            opened(&mut h, "a");
            let record = h.view().detail.unwrap().record.unwrap();
            assert_eq!(record.title, "JOHN DOE");
            assert_eq!(record.hair, record::NOT_AVAILABLE);
        }

        #[test]
        fn report_sighting_uses_cached_record_and_persists() {
            let mut h = loaded();
            opened(&mut h, "a");
            let _ = h.send(Event::ReportSighting {
                uid: RecordUid::new("a"),
                note: "seen at mall".into(),
            });

            let vm = h.view();
            assert!(vm.error.is_none());
            assert!(!vm.is_saving_reports);
            assert_eq!(vm.reports.len(), 1);
            assert_eq!(vm.reports[0].title, "JOHN DOE");
            assert_eq!(vm.reports[0].image_url.as_deref(), Some("https://img/t.jpg"));
            assert_eq!(vm.detail.unwrap().reports.len(), 1);
            assert!(h.stored().unwrap().contains("seen at mall"));
        }

        #[test]
        fn detail_lists_only_its_own_reports_with_global_positions() {
            let mut h = loaded();
            for uid in ["a", "b", "a"] {
                opened(&mut h, uid);
                let _ = h.send(Event::ReportSighting {
                    uid: RecordUid::new(uid),
                    note: format!("seen {uid}"),
                });
            }
            let _ = h.send(Event::OpenRecord { uid: RecordUid::new("a") });

            let positions: Vec<_> = h
                .view()
                .detail
                .unwrap()
                .reports
                .into_iter()
                .map(|r| r.position)
                .collect();
            assert_eq!(positions, vec![0, 2]);
        }

        #[test]
        fn empty_note_is_saved() {
            let mut h = loaded();
            opened(&mut h, "a");
            let _ = h.send(Event::ReportSighting {
                uid: RecordUid::new("a"),
                note: String::new(),
            });
            let vm = h.view();
            assert!(vm.error.is_none());
            assert_eq!(vm.reports.len(), 1);
            assert_eq!(vm.reports[0].note, "");
        }

        #[test]
        fn report_for_uncached_record_is_rejected() {
            let mut h = loaded();
            let _ = h.send(Event::ReportSighting {
                uid: RecordUid::new("ghost"),
                note: "seen".into(),
            });
            let vm = h.view();
            assert!(vm.reports.is_empty());
            assert_eq!(vm.error.unwrap().code, "VALIDATION_ERROR");
            assert!(h.stored().is_none());
        }

        #[test]
        fn oversize_note_is_rejected() {
            let mut h = loaded();
            opened(&mut h, "a");
            let _ = h.send(Event::ReportSighting {
                uid: RecordUid::new("a"),
                note: "x".repeat(5000),
            });
            assert!(h.view().reports.is_empty());
            assert!(h.model.active_error.is_some());
        }

        #[test]
        fn oversize_stored_note_is_kept_when_appending() {
            let long = "x".repeat(5000);
            let raw = format!(
                r#"[{{"id":"1","uid":"a","title":"A","description":"{long}"}},{{"id":"2","uid":"b","title":null,"description":"short"}}]"#
            );
            let kv = MemoryKvStore::new().with_raw(REPORTS_KEY, raw);
            let mut h = Harness::with_kv(kv);
            let _ = h.send(Event::LoadReports);
            assert_eq!(h.view().reports.len(), 2);

            opened(&mut h, "c");
            let _ = h.send(Event::ReportSighting {
                uid: RecordUid::new("c"),
                note: "new".into(),
            });

            let stored: Vec<serde_json::Value> =
                serde_json::from_str(&h.stored().unwrap()).unwrap();
            assert_eq!(stored.len(), 3);
            assert_eq!(stored[0]["description"].as_str().map(str::len), Some(5000));
            assert_eq!(stored[1]["description"], "short");
        }

        #[test]
        fn bad_delete_position_sets_index_error() {
            let mut h = loaded();
            let _ = h.send(Event::DeleteReport { position: 3 });
            assert_eq!(h.model.active_error.as_ref().map(|e| e.kind), Some(ErrorKind::Index));

            let _ = h.send(Event::DismissError);
            assert!(h.view().error.is_none());
        }

        #[test]
        fn sighting_before_load_is_written_after_it() {
            let app = AppTester::<App, Effect>::default();
            let mut model = Model::default();
            let _ = app.update(Event::LoadReports, &mut model);
            let _ = app.update(
                Event::RecordFetched {
                    uid: RecordUid::new("a"),
                    result: Box::new(Ok(Record::new("a", "JOHN DOE"))),
                },
                &mut model,
            );
            let update = app.update(
                Event::ReportSighting {
                    uid: RecordUid::new("a"),
                    note: "seen".into(),
                },
                &mut model,
            );
            assert!(!update
                .effects
                .iter()
                .any(|e| matches!(e, Effect::KeyValue(_))));
            assert!(app.view(&model).is_saving_reports);

            let loaded = app.update(Event::ReportsLoaded(Box::new(Ok(None))), &mut model);
            assert!(loaded
                .effects
                .iter()
                .any(|e| matches!(e, Effect::KeyValue(_))));
        }
    }
}
