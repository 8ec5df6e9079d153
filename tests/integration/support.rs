//! Scripted in-memory renderer and sink helpers for end-to-end runs

use async_trait::async_trait;
use catalog_harvest::config::{Config, OutputConfig, RendererConfig, ScraperConfig, SiteConfig};
use catalog_harvest::render::{RenderContext, RenderError, RenderResult, RenderSession, Renderer};
use catalog_harvest::storage::{CsvSink, FileInfo, RecordSink, StorageError, StorageResult};
use catalog_harvest::Record;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const BASE_URL: &str = "https://catalog.example.org/Home/Escolas";

/// Absolute detail URL for a school code
pub fn detail_url(code: u32) -> String {
    format!("https://catalog.example.org/Home/DetalhesEscola?codesc={}", code)
}

/// What the fake catalog serves
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// School codes listed on each page, page 1 first
    pub pages: Vec<Vec<u32>>,

    /// The next control disappears once this page is shown
    pub last_reachable: u32,

    /// Codes whose detail page never loads
    pub failing: HashSet<u32>,

    /// Item total printed in the summary line
    pub total_items: u64,

    /// How long each detail load takes
    pub detail_latency: Duration,
}

impl Catalog {
    /// Catalog whose pages are all reachable
    pub fn new(pages: Vec<Vec<u32>>) -> Self {
        let last_reachable = pages.len() as u32;
        let total_items = pages.iter().map(|p| p.len() as u64).sum();
        Self {
            pages,
            last_reachable,
            failing: HashSet::new(),
            total_items,
            detail_latency: Duration::ZERO,
        }
    }

    fn listing_html(&self, page: u32) -> String {
        let rows: String = self
            .pages
            .get(page as usize - 1)
            .map(|codes| {
                codes
                    .iter()
                    .map(|code| {
                        format!(
                            r#"<tr><td><a href="/Home/DetalhesEscola?codesc={0}">EE {0}</a></td></tr>"#,
                            code
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let buttons: String = (1..=self.pages.len())
            .map(|n| format!(r#"<a class="paginate_button">{}</a>"#, n))
            .collect();

        format!(
            r#"<html><body>
            <table id="tabelabusca"><tbody>{}</tbody></table>
            <div id="tabelabusca_info">Mostrando de 1 até 100 de {} registros</div>
            <div class="dataTables_paginate">{}</div>
            </body></html>"#,
            rows, self.total_items, buttons
        )
    }
}

fn detail_html(code: &str) -> String {
    let tag = if code.ends_with('0') { "Regular" } else { "PEI" };
    format!(
        r#"<html><body><div class="conteudo">
        <h2 id="nome-escola">EE {}</h2>
        <div class="tag"><p class="tags">{}</p></div>
        <div class="escola-dados"><p>Bairro: Centro</p><p>Município: Campinas</p></div>
        </div></body></html>"#,
        code, tag
    )
}

/// Observed renderer activity
#[derive(Debug, Default)]
pub struct Activity {
    pub contexts_opened: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub detail_loads: AtomicUsize,
    pub loads_in_flight: AtomicUsize,
    pub peak_loads_in_flight: AtomicUsize,
}

pub struct ScriptedRenderer {
    catalog: Arc<Catalog>,
    pub activity: Arc<Activity>,
}

impl ScriptedRenderer {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            activity: Arc::new(Activity::default()),
        }
    }
}

struct ScriptedContext {
    catalog: Arc<Catalog>,
    activity: Arc<Activity>,
}

struct ScriptedSession {
    catalog: Arc<Catalog>,
    activity: Arc<Activity>,
    location: Mutex<String>,
    page: AtomicU32,
    loading: AtomicBool,
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> RenderResult<Arc<dyn RenderContext>> {
        self.activity.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedContext {
            catalog: self.catalog.clone(),
            activity: self.activity.clone(),
        }))
    }
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn new_session(&self) -> RenderResult<Box<dyn RenderSession>> {
        self.activity.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            catalog: self.catalog.clone(),
            activity: self.activity.clone(),
            location: Mutex::new(String::new()),
            page: AtomicU32::new(1),
            loading: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> RenderResult<()> {
        self.activity.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ScriptedSession {
    fn code(url: &str) -> Option<&str> {
        url.split_once("codesc=").map(|(_, code)| code)
    }
}

#[async_trait]
impl RenderSession for ScriptedSession {
    async fn goto(&self, url: &str) -> RenderResult<()> {
        if let Some(code) = Self::code(url) {
            self.activity.detail_loads.fetch_add(1, Ordering::SeqCst);
            if !self.loading.swap(true, Ordering::SeqCst) {
                let now = self.activity.loads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.activity
                    .peak_loads_in_flight
                    .fetch_max(now, Ordering::SeqCst);
            }
            if !self.catalog.detail_latency.is_zero() {
                tokio::time::sleep(self.catalog.detail_latency).await;
            }
            let failing = code
                .parse::<u32>()
                .map(|c| self.catalog.failing.contains(&c))
                .unwrap_or(false);
            if failing {
                return Err(RenderError::Http(format!("502 Bad Gateway for {}", url)));
            }
        } else {
            self.page.store(1, Ordering::SeqCst);
        }
        *self.location.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> RenderResult<()> {
        Ok(())
    }

    async fn select_option(&self, _selector: &str, _value: &str) -> RenderResult<()> {
        Ok(())
    }

    async fn click(&self, selector: &str) -> RenderResult<()> {
        if self.page.load(Ordering::SeqCst) >= self.catalog.last_reachable {
            return Err(RenderError::ElementNotFound(selector.to_string()));
        }
        self.page.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(&self, _selector: &str) -> RenderResult<bool> {
        let page = self.page.load(Ordering::SeqCst);
        Ok(page < self.catalog.last_reachable && (page as usize) < self.catalog.pages.len())
    }

    async fn content(&self) -> RenderResult<String> {
        let location = self.location.lock().unwrap().clone();
        match Self::code(&location) {
            Some(code) => Ok(detail_html(code)),
            None => Ok(self.catalog.listing_html(self.page.load(Ordering::SeqCst))),
        }
    }

    async fn close(&self) -> RenderResult<()> {
        if self.loading.swap(false, Ordering::SeqCst) {
            self.activity.loads_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.activity.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink that cancels the run once `limit` records have been appended
pub struct InterruptingSink {
    inner: CsvSink,
    limit: usize,
    appended: AtomicUsize,
    cancel: CancellationToken,
}

impl InterruptingSink {
    pub fn new(dir: &Path, limit: usize, cancel: CancellationToken) -> Self {
        Self {
            inner: CsvSink::new(dir),
            limit,
            appended: AtomicUsize::new(0),
            cancel,
        }
    }

    pub fn final_sync_count(&self) -> u32 {
        self.inner.final_sync_count()
    }
}

impl RecordSink for InterruptingSink {
    fn initialize(&self, path: Option<&Path>) -> StorageResult<PathBuf> {
        self.inner.initialize(path)
    }

    fn append_record(&self, record: &Record) -> StorageResult<()> {
        self.inner.append_record(record)?;
        if self.appended.fetch_add(1, Ordering::SeqCst) + 1 == self.limit {
            self.cancel.cancel();
        }
        Ok(())
    }

    fn verify_integrity(&self) -> bool {
        self.inner.verify_integrity()
    }

    fn count_persisted_records(&self) -> usize {
        self.inner.count_persisted_records()
    }

    fn force_sync(&self) -> StorageResult<()> {
        self.inner.force_sync()
    }

    fn close(&self) -> StorageResult<()> {
        self.inner.close()
    }

    fn file_info(&self) -> Option<FileInfo> {
        self.inner.file_info()
    }

    fn path(&self) -> Option<PathBuf> {
        self.inner.path()
    }
}

/// Sink that notes renderer activity when it is closed and can fail an append
pub struct WatchedSink {
    inner: CsvSink,
    activity: Arc<Activity>,
    fail_on: Option<usize>,
    appends: AtomicUsize,
    contexts_closed_at_close: Mutex<Option<usize>>,
}

impl WatchedSink {
    pub fn new(dir: &Path, activity: Arc<Activity>) -> Self {
        Self {
            inner: CsvSink::new(dir),
            activity,
            fail_on: None,
            appends: AtomicUsize::new(0),
            contexts_closed_at_close: Mutex::new(None),
        }
    }

    /// The `n`-th append (1-based) fails without writing
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    /// Render contexts already closed when the sink was first closed
    pub fn contexts_closed_at_close(&self) -> Option<usize> {
        *self.contexts_closed_at_close.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl RecordSink for WatchedSink {
    fn initialize(&self, path: Option<&Path>) -> StorageResult<PathBuf> {
        self.inner.initialize(path)
    }

    fn append_record(&self, record: &Record) -> StorageResult<()> {
        let n = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(n) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.append_record(record)
    }

    fn verify_integrity(&self) -> bool {
        self.inner.verify_integrity()
    }

    fn count_persisted_records(&self) -> usize {
        self.inner.count_persisted_records()
    }

    fn force_sync(&self) -> StorageResult<()> {
        self.inner.force_sync()
    }

    fn close(&self) -> StorageResult<()> {
        let mut seen = self.contexts_closed_at_close.lock().unwrap();
        if seen.is_none() {
            *seen = Some(self.activity.contexts_closed.load(Ordering::SeqCst));
        }
        self.inner.close()
    }

    fn file_info(&self) -> Option<FileInfo> {
        self.inner.file_info()
    }

    fn path(&self) -> Option<PathBuf> {
        self.inner.path()
    }
}

/// Configuration with every artificial delay removed
pub fn fast_config(results_dir: &Path) -> Config {
    Config {
        scraper: ScraperConfig {
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 2,
            delay_between_requests_ms: 0,
            delay_between_batches_ms: 0,
            settle_delay_ms: 0,
            timeout_ms: 1000,
            ..ScraperConfig::default()
        },
        site: SiteConfig::with_base_url(BASE_URL),
        renderer: RendererConfig::default(),
        output: OutputConfig {
            results_dir: results_dir.to_path_buf(),
            ..OutputConfig::default()
        },
    }
}
