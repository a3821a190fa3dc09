//! Collector Agent - pulls market, filing, news and macro data
//!
//! Data sources are registered per provider. Every collected item is
//! published on the topic matching its kind. Source failures never escape:
//! they become `collection_error` events and an empty result.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::traits::{Agent, AgentStatus};
use crate::bus::{
    CandleBatch, CollectionFailure, CollectionNotice, CollectionSummary, Event, EventBus,
    EventPayload,
};
use crate::domain::{CollectedData, DataKind, DataSourceKind, MarketData};
use crate::error::{CollaboratorError, Result};

const SOURCE: &str = "collector_agent";

/// What to fetch from a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    pub kind: DataKind,
    pub symbols: Vec<String>,
}

/// A provider adapter (brokerage, filings, news, macro series)
#[async_trait]
pub trait DataSource: Send + Sync {
    fn source(&self) -> DataSourceKind;

    async fn health_check(&self) -> bool;

    async fn collect(
        &self,
        request: &CollectionRequest,
    ) -> std::result::Result<Vec<CollectedData>, CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionFrequency {
    Realtime,
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "1h")]
    Hourly,
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1w")]
    Weekly,
}

impl CollectionFrequency {
    /// Next due time after `now`. Daily tasks run at `daily_at`, weekly tasks
    /// on the following Monday at `daily_at`.
    pub fn next_run_after(&self, now: DateTime<Utc>, tick: Duration, daily_at: NaiveTime) -> DateTime<Utc> {
        match self {
            CollectionFrequency::Realtime => now + tick,
            CollectionFrequency::Minute1 => now + Duration::minutes(1),
            CollectionFrequency::Minute5 => now + Duration::minutes(5),
            CollectionFrequency::Minute15 => now + Duration::minutes(15),
            CollectionFrequency::Hourly => now + Duration::hours(1),
            CollectionFrequency::Daily => {
                let today = now.date_naive().and_time(daily_at).and_utc();
                if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            CollectionFrequency::Weekly => {
                let days_until_monday = 7 - now.weekday().num_days_from_monday() as i64;
                (now.date_naive() + Duration::days(days_until_monday))
                    .and_time(daily_at)
                    .and_utc()
            }
        }
    }
}

/// A recurring collection job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionTask {
    pub id: String,
    pub source: DataSourceKind,
    pub frequency: CollectionFrequency,
    pub kind: DataKind,
    pub symbols: Vec<String>,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    /// `None` means due on the next tick
    pub next_run: Option<DateTime<Utc>>,
}

impl CollectionTask {
    pub fn new(
        id: &str,
        source: DataSourceKind,
        frequency: CollectionFrequency,
        kind: DataKind,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            source,
            frequency,
            kind,
            symbols,
            enabled: true,
            last_run: None,
            next_run: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run.map_or(true, |at| now >= at)
    }
}

/// Standard job set for a symbol universe
pub fn default_tasks(universe: &[String]) -> Vec<CollectionTask> {
    let symbols = universe.to_vec();
    vec![
        CollectionTask::new(
            "realtime_prices",
            DataSourceKind::Kis,
            CollectionFrequency::Realtime,
            DataKind::Tick,
            symbols.clone(),
        ),
        CollectionTask::new(
            "minute_candles_1m",
            DataSourceKind::Kis,
            CollectionFrequency::Minute1,
            DataKind::MinuteCandles,
            symbols.clone(),
        ),
        CollectionTask::new(
            "daily_ohlcv",
            DataSourceKind::Kis,
            CollectionFrequency::Daily,
            DataKind::DailyOhlcv,
            symbols.clone(),
        ),
        CollectionTask::new(
            "dart_financials",
            DataSourceKind::Dart,
            CollectionFrequency::Weekly,
            DataKind::FinancialStatement,
            symbols.clone(),
        ),
        CollectionTask::new(
            "news",
            DataSourceKind::NaverNews,
            CollectionFrequency::Hourly,
            DataKind::News,
            symbols,
        ),
        CollectionTask::new(
            "bok_indicators",
            DataSourceKind::Bok,
            CollectionFrequency::Daily,
            DataKind::MacroIndicator,
            Vec::new(),
        ),
        CollectionTask::new(
            "fred_indicators",
            DataSourceKind::Fred,
            CollectionFrequency::Daily,
            DataKind::MacroIndicator,
            Vec::new(),
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Run the periodic task scheduler while started
    #[serde(default = "default_scheduler_enabled")]
    pub scheduler_enabled: bool,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// UTC time for daily and weekly jobs (06:40 UTC is 15:40 in Seoul)
    #[serde(default = "default_daily_run_time")]
    pub daily_run_time: NaiveTime,
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_tick_secs() -> u64 {
    60
}

fn default_daily_run_time() -> NaiveTime {
    NaiveTime::from_hms_opt(6, 40, 0).unwrap_or_default()
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            scheduler_enabled: default_scheduler_enabled(),
            tick_secs: default_tick_secs(),
            daily_run_time: default_daily_run_time(),
        }
    }
}

/// Read-only scheduler view
#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub running: bool,
    pub sources: Vec<DataSourceKind>,
    pub tasks: Vec<CollectionTask>,
}

/// Map a collected item to its bus payload
fn payload_for(item: &CollectedData) -> EventPayload {
    match &item.data {
        MarketData::Tick(tick) => EventPayload::PriceTick(tick.clone()),
        MarketData::Orderbook(book) => EventPayload::OrderbookSnapshot(book.clone()),
        MarketData::DailyOhlcv { symbol, candles } => EventPayload::DailyOhlcv(CandleBatch {
            symbol: symbol.clone(),
            candles: candles.clone(),
        }),
        MarketData::MinuteCandles { symbol, candles } => EventPayload::MinuteCandles(CandleBatch {
            symbol: symbol.clone(),
            candles: candles.clone(),
        }),
        MarketData::FinancialStatement(statement) => {
            EventPayload::FinancialStatementUpdate(statement.clone())
        }
        MarketData::News(article) => EventPayload::NewsArticle(article.clone()),
        MarketData::MacroIndicator(indicator) => EventPayload::MacroIndicatorUpdate(indicator.clone()),
    }
}

/// State shared with the scheduler task
struct CollectorShared {
    config: CollectorConfig,
    bus: Arc<EventBus>,
    sources: RwLock<HashMap<DataSourceKind, Arc<dyn DataSource>>>,
    tasks: RwLock<BTreeMap<String, CollectionTask>>,
}

impl CollectorShared {
    async fn collect(
        &self,
        source: DataSourceKind,
        kind: DataKind,
        symbols: &[String],
        task_id: Option<&str>,
    ) -> Vec<CollectedData> {
        let task_id = task_id.map(str::to_string);
        let failure = |error: String, transient: bool| {
            Event::new(
                SOURCE,
                EventPayload::CollectionError(CollectionFailure {
                    source,
                    task_id: task_id.clone(),
                    error,
                    transient,
                }),
            )
        };

        let adapter = self.sources.read().await.get(&source).cloned();
        let Some(adapter) = adapter else {
            warn!("No data source registered for {}", source);
            self.bus
                .publish(failure(format!("no data source registered for {}", source), false))
                .await;
            return Vec::new();
        };

        self.bus
            .publish(Event::new(
                SOURCE,
                EventPayload::CollectionStarted(CollectionNotice {
                    source,
                    kind,
                    symbols: symbols.to_vec(),
                    task_id: task_id.clone(),
                }),
            ))
            .await;

        if !adapter.health_check().await {
            warn!("Health check failed for {}", source);
            self.bus
                .publish(failure("health check failed".to_string(), true))
                .await;
            return Vec::new();
        }

        let request = CollectionRequest {
            kind,
            symbols: symbols.to_vec(),
        };
        let items = match adapter.collect(&request).await {
            Ok(items) => items,
            Err(e) => {
                error!("Collection from {} failed: {}", source, e);
                self.bus.publish(failure(e.to_string(), e.is_transient())).await;
                return Vec::new();
            }
        };

        let event_source = format!("collector:{}", source);
        for item in &items {
            self.bus
                .publish(Event::new(event_source.clone(), payload_for(item)))
                .await;
        }

        debug!("Collected {} {:?} items from {}", items.len(), kind, source);
        self.bus
            .publish(Event::new(
                SOURCE,
                EventPayload::CollectionComplete(CollectionSummary {
                    source,
                    kind,
                    items: items.len(),
                    task_id,
                }),
            ))
            .await;
        items
    }

    /// Run every due task once
    async fn run_due_tasks(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<CollectionTask> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.is_due(now))
            .cloned()
            .collect();

        let tick = Duration::seconds(self.config.tick_secs as i64);
        for task in &due {
            info!("Executing collection task: {}", task.id);
            self.collect(task.source, task.kind, &task.symbols, Some(&task.id))
                .await;

            if let Some(stored) = self.tasks.write().await.get_mut(&task.id) {
                stored.last_run = Some(now);
                stored.next_run = Some(stored.frequency.next_run_after(
                    now,
                    tick,
                    self.config.daily_run_time,
                ));
            }
        }
        due.len()
    }
}

pub struct CollectorAgent {
    shared: Arc<CollectorShared>,
    running: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl CollectorAgent {
    pub fn new(config: CollectorConfig, bus: Arc<EventBus>) -> Self {
        Self {
            shared: Arc::new(CollectorShared {
                config,
                bus,
                sources: RwLock::new(HashMap::new()),
                tasks: RwLock::new(BTreeMap::new()),
            }),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            scheduler: Mutex::new(None),
        }
    }

    pub async fn register_source(&self, source: Arc<dyn DataSource>) {
        let kind = source.source();
        self.shared.sources.write().await.insert(kind, source);
        info!("Registered data source: {}", kind);
    }

    pub async fn register_task(&self, task: CollectionTask) {
        info!("Registered collection task: {} ({:?})", task.id, task.frequency);
        self.shared.tasks.write().await.insert(task.id.clone(), task);
    }

    pub async fn remove_task(&self, task_id: &str) -> bool {
        self.shared.tasks.write().await.remove(task_id).is_some()
    }

    /// Collect on demand. Failures are published and yield an empty result.
    pub async fn trigger_collection(
        &self,
        source: DataSourceKind,
        kind: DataKind,
        symbols: &[String],
    ) -> Vec<CollectedData> {
        self.shared.collect(source, kind, symbols, None).await
    }

    pub async fn run_due_tasks(&self) -> usize {
        self.shared.run_due_tasks(Utc::now()).await
    }

    pub async fn get_status(&self) -> CollectorStatus {
        let mut sources: Vec<DataSourceKind> =
            self.shared.sources.read().await.keys().copied().collect();
        sources.sort_by_key(|s| s.as_str());
        CollectorStatus {
            running: self.running.load(Ordering::SeqCst),
            sources,
            tasks: self.shared.tasks.read().await.values().cloned().collect(),
        }
    }
}

#[async_trait]
impl Agent for CollectorAgent {
    fn name(&self) -> &str {
        SOURCE
    }

    fn status(&self) -> AgentStatus {
        AgentStatus::from_running(self.running.load(Ordering::SeqCst))
    }

    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if self.shared.config.scheduler_enabled {
            let (tx, mut rx) = watch::channel(false);
            let shared = Arc::clone(&self.shared);
            let tick = std::time::Duration::from_secs(shared.config.tick_secs.max(1));
            let handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            shared.run_due_tasks(Utc::now()).await;
                        }
                        changed = rx.changed() => {
                            if changed.is_err() || *rx.borrow() {
                                break;
                            }
                        }
                    }
                }
                debug!("Collector scheduler exited");
            });
            *self.shutdown.lock().await = Some(tx);
            *self.scheduler.lock().await = Some(handle);
        }

        info!("Collector Agent started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.scheduler.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Collector scheduler ended abnormally: {}", e);
            }
        }

        info!("Collector Agent stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventType;
    use crate::domain::{Candle, PriceTick};
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    struct StubSource {
        kind: DataSourceKind,
        healthy: bool,
        fail: Option<CollaboratorError>,
    }

    #[async_trait]
    impl DataSource for StubSource {
        fn source(&self) -> DataSourceKind {
            self.kind
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }

        async fn collect(
            &self,
            request: &CollectionRequest,
        ) -> std::result::Result<Vec<CollectedData>, CollaboratorError> {
            if let Some(e) = &self.fail {
                return Err(e.clone());
            }
            Ok(request
                .symbols
                .iter()
                .map(|symbol| {
                    CollectedData::new(
                        self.kind,
                        MarketData::DailyOhlcv {
                            symbol: symbol.clone(),
                            candles: vec![Candle {
                                timestamp: Utc::now(),
                                open: dec!(70000),
                                high: dec!(71000),
                                low: dec!(69000),
                                close: dec!(70500),
                                volume: 1000,
                            }],
                        },
                    )
                })
                .collect())
        }
    }

    async fn counter(bus: &EventBus, topic: EventType) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.subscribe_fn(topic, "counter", move |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await;
        count
    }

    fn symbols() -> Vec<String> {
        vec!["005930".to_string(), "000660".to_string()]
    }

    #[tokio::test]
    async fn test_collection_publishes_items_and_summary() {
        let bus = Arc::new(EventBus::new());
        let ohlcv = counter(&bus, EventType::DailyOhlcv).await;
        let complete = counter(&bus, EventType::CollectionComplete).await;
        let agent = CollectorAgent::new(CollectorConfig::default(), Arc::clone(&bus));
        agent
            .register_source(Arc::new(StubSource {
                kind: DataSourceKind::Kis,
                healthy: true,
                fail: None,
            }))
            .await;

        let items = agent
            .trigger_collection(DataSourceKind::Kis, DataKind::DailyOhlcv, &symbols())
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(ohlcv.load(Ordering::SeqCst), 2);
        assert_eq!(complete.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_become_error_events() {
        let bus = Arc::new(EventBus::new());
        let errors = counter(&bus, EventType::CollectionError).await;
        let agent = CollectorAgent::new(CollectorConfig::default(), Arc::clone(&bus));
        agent
            .register_source(Arc::new(StubSource {
                kind: DataSourceKind::Dart,
                healthy: false,
                fail: None,
            }))
            .await;
        agent
            .register_source(Arc::new(StubSource {
                kind: DataSourceKind::Kis,
                healthy: true,
                fail: Some(CollaboratorError::unavailable("kis", "503")),
            }))
            .await;

        let unhealthy = agent
            .trigger_collection(DataSourceKind::Dart, DataKind::FinancialStatement, &symbols())
            .await;
        let failing = agent
            .trigger_collection(DataSourceKind::Kis, DataKind::DailyOhlcv, &symbols())
            .await;
        let missing = agent
            .trigger_collection(DataSourceKind::Fred, DataKind::MacroIndicator, &[])
            .await;

        assert!(unhealthy.is_empty() && failing.is_empty() && missing.is_empty());
        assert_eq!(errors.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_payload_mapping() {
        let tick = CollectedData::new(
            DataSourceKind::Kis,
            MarketData::Tick(PriceTick {
                symbol: "005930".into(),
                price: dec!(70000),
                volume: 1,
                timestamp: Utc::now(),
            }),
        );
        assert_eq!(payload_for(&tick).event_type(), EventType::PriceTick);
    }

    #[tokio::test]
    async fn test_due_tasks_are_rescheduled() {
        let bus = Arc::new(EventBus::new());
        let agent = CollectorAgent::new(CollectorConfig::default(), Arc::clone(&bus));
        agent
            .register_source(Arc::new(StubSource {
                kind: DataSourceKind::Kis,
                healthy: true,
                fail: None,
            }))
            .await;
        for task in default_tasks(&symbols()) {
            agent.register_task(task).await;
        }

        // Every task is due on the first tick, including ones without a source
        assert_eq!(agent.run_due_tasks().await, 7);
        assert_eq!(agent.run_due_tasks().await, 0);

        let status = agent.get_status().await;
        assert!(status.tasks.iter().all(|t| t.last_run.is_some() && t.next_run.is_some()));
    }

    #[test]
    fn test_next_run_times() {
        let at = NaiveTime::from_hms_opt(6, 40, 0).unwrap();
        let tick = Duration::seconds(60);
        // Wednesday
        let morning = chrono::NaiveDate::from_ymd_opt(2024, 3, 6)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap()
            .and_utc();

        let daily = CollectionFrequency::Daily.next_run_after(morning, tick, at);
        assert_eq!(daily.date_naive(), morning.date_naive());
        let evening = morning + Duration::hours(12);
        let daily = CollectionFrequency::Daily.next_run_after(evening, tick, at);
        assert_eq!(daily.date_naive(), evening.date_naive().succ_opt().unwrap());

        let weekly = CollectionFrequency::Weekly.next_run_after(morning, tick, at);
        assert_eq!(weekly.weekday(), chrono::Weekday::Mon);
        assert_eq!(weekly.date_naive(), chrono::NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    }

    #[tokio::test]
    async fn test_start_stop_scheduler() {
        let agent = CollectorAgent::new(CollectorConfig::default(), Arc::new(EventBus::new()));
        agent.start().await.unwrap();
        assert!(agent.status().is_running());
        agent.stop().await.unwrap();
        assert_eq!(agent.status(), AgentStatus::Stopped);
        // Idempotent
        agent.stop().await.unwrap();
    }
}
