use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use pretty_assertions::assert_eq;
use scout_core::{
    AbortCause, CancelMode, CrawlConfig, ErrorKind, FetchError, FetchedPage, ListingRecord,
    PageCursor, QuerySpec, RunOutcome, RunPhase,
};
use scout_engine::{CrawlError, CrawlOrchestrator, FetchPort, OutputSink, SinkError};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

type Reply = Result<FetchedPage, FetchError>;

/// Answers from a per-(keyword, cursor) script; unscripted pages are empty.
struct ScriptedPort {
    hold: Duration,
    holds: HashMap<String, Duration>,
    script: Mutex<HashMap<(String, PageCursor), VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, PageCursor)>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedPort {
    fn new(hold: Duration) -> Self {
        Self {
            hold,
            holds: HashMap::new(),
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn reply(self, keyword: &str, cursor: PageCursor, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry((keyword.to_string(), cursor))
            .or_default()
            .push_back(reply);
        self
    }

    fn hold_for(mut self, keyword: &str, hold: Duration) -> Self {
        self.holds.insert(keyword.to_string(), hold);
        self
    }

    fn calls(&self) -> Vec<(String, PageCursor)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FetchPort for ScriptedPort {
    async fn fetch_page(&self, query: &QuerySpec, cursor: &PageCursor) -> Reply {
        let key = (query.keyword().to_string(), cursor.clone());
        self.calls.lock().unwrap().push(key.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let hold = self.holds.get(query.keyword()).copied().unwrap_or(self.hold);
        tokio::time::sleep(hold).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(FetchedPage::last(Vec::new())))
    }
}

#[derive(Default)]
struct TestSink {
    records: Mutex<Vec<ListingRecord>>,
}

impl TestSink {
    fn titles(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.title.clone())
            .collect()
    }

    fn sorted_identities(&self) -> Vec<String> {
        let mut identities: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.identity.clone())
            .collect();
        identities.sort();
        identities
    }
}

impl OutputSink for TestSink {
    fn emit(&self, record: &ListingRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn listing(title: &str) -> ListingRecord {
    ListingRecord::new(
        title,
        "Acme",
        "India",
        "",
        format!("https://jobs.example.com/view/{}", title.replace(' ', "-")),
    )
}

fn page(titles: &[&str], next: Option<u64>) -> Reply {
    Ok(FetchedPage::new(
        titles.iter().map(|t| listing(t)).collect(),
        next.map(PageCursor::Offset),
    ))
}

fn config(max_concurrent: usize) -> CrawlConfig {
    CrawlConfig {
        max_concurrent,
        min_delay: Duration::ZERO,
        retry_base_delay: Duration::from_millis(100),
        retry_max_delay: Duration::from_secs(1),
        ..CrawlConfig::default()
    }
}

fn query(keyword: &str, pages: u32) -> QuerySpec {
    QuerySpec::new(keyword, pages).unwrap()
}

async fn run(
    port: ScriptedPort,
    config: CrawlConfig,
    queries: Vec<QuerySpec>,
) -> (Result<scout_core::CompletionReport, CrawlError>, Arc<ScriptedPort>, Arc<TestSink>) {
    let port = Arc::new(port);
    let sink = Arc::new(TestSink::default());
    let orchestrator = CrawlOrchestrator::new(port.clone(), sink.clone(), config);
    let result = orchestrator.start(queries).await;
    (result, port, sink)
}

#[tokio::test(start_paused = true)]
async fn crawls_breadth_first_across_queries() {
    init_logging();
    let port = ScriptedPort::new(Duration::from_millis(10))
        .reply("a", PageCursor::Start, page(&["a1"], Some(1)))
        .reply("b", PageCursor::Start, page(&["b1"], Some(1)))
        .reply("a", PageCursor::Offset(1), page(&["a2"], Some(2)))
        .reply("b", PageCursor::Offset(1), page(&["b2"], Some(2)));

    let (result, port, sink) = run(port, config(1), vec![query("a", 2), query("b", 2)]).await;

    let report = result.expect("run completes");
    assert!(report.is_completed());
    assert_eq!(report.emitted_count, 4);
    assert_eq!(
        port.calls(),
        vec![
            ("a".to_string(), PageCursor::Start),
            ("b".to_string(), PageCursor::Start),
            ("a".to_string(), PageCursor::Offset(1)),
            ("b".to_string(), PageCursor::Offset(1)),
        ]
    );
    assert_eq!(sink.titles(), vec!["a1", "b1", "a2", "b2"]);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried() {
    init_logging();
    let port = ScriptedPort::new(Duration::from_millis(10))
        .reply("a", PageCursor::Start, Err(FetchError::transient("429")))
        .reply("a", PageCursor::Start, page(&["a1"], None));

    let (result, port, sink) = run(port, config(1), vec![query("a", 1)]).await;

    let report = result.expect("run completes");
    assert!(report.permanent_failures.is_empty());
    assert_eq!(port.calls().len(), 2);
    assert_eq!(sink.titles(), vec!["a1"]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_become_a_permanent_failure() {
    init_logging();
    let mut port = ScriptedPort::new(Duration::from_millis(10));
    for _ in 0..3 {
        port = port.reply("a", PageCursor::Start, Err(FetchError::transient("503")));
    }
    let port = port.reply("b", PageCursor::Start, page(&["b1"], None));
    let config = CrawlConfig {
        max_retries: 2,
        ..config(1)
    };

    let (result, port, sink) = run(port, config, vec![query("a", 1), query("b", 1)]).await;

    let report = result.expect("other queries still complete");
    assert!(report.is_completed());
    assert_eq!(report.permanent_failures.len(), 1);
    assert_eq!(report.permanent_failures[0].task.attempt, 2);
    assert_eq!(report.permanent_failures[0].error.kind, ErrorKind::Transient);
    let a_calls = port.calls().iter().filter(|(k, _)| k == "a").count();
    assert_eq!(a_calls, 3);
    assert_eq!(sink.titles(), vec!["b1"]);
}

#[tokio::test(start_paused = true)]
async fn fatal_error_aborts_the_run() {
    init_logging();
    let port = ScriptedPort::new(Duration::from_millis(10))
        .reply("a", PageCursor::Start, Err(FetchError::fatal("401")))
        .reply("b", PageCursor::Start, page(&["b1"], Some(1)));
    let port = Arc::new(port);
    let sink = Arc::new(TestSink::default());
    let orchestrator = CrawlOrchestrator::new(port.clone(), sink.clone(), config(1));
    let phase = orchestrator.subscribe_phase();

    let err = orchestrator
        .start(vec![query("a", 3), query("b", 3)])
        .await
        .expect_err("fatal aborts");

    match err {
        CrawlError::Fatal {
            error,
            task,
            report,
        } => {
            assert_eq!(error.kind, ErrorKind::Fatal);
            assert_eq!(task.query.keyword(), "a");
            assert_eq!(report.emitted_count, 0);
            assert!(matches!(
                report.outcome,
                RunOutcome::Aborted(AbortCause::Fatal { .. })
            ));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(*phase.borrow(), RunPhase::Aborted);
    assert_eq!(port.calls().len(), 1);
    assert!(sink.titles().is_empty());
}

#[tokio::test(start_paused = true)]
async fn duplicate_listings_are_emitted_once() {
    init_logging();
    let port = ScriptedPort::new(Duration::from_millis(10))
        .reply("a", PageCursor::Start, page(&["shared", "a-only"], None))
        .reply("b", PageCursor::Start, page(&["shared"], None));

    let (result, _port, sink) = run(port, config(2), vec![query("a", 1), query("b", 1)]).await;

    let report = result.expect("run completes");
    assert_eq!(report.emitted_count, 2);
    assert_eq!(report.duplicate_count, 1);
    assert_eq!(sink.titles().iter().filter(|t| *t == "shared").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn record_cap_stops_the_run_early() {
    init_logging();
    let port = ScriptedPort::new(Duration::from_millis(10))
        .reply("a", PageCursor::Start, page(&["1", "2", "3", "4", "5"], Some(5)));
    let config = CrawlConfig {
        max_records: Some(3),
        ..config(1)
    };

    let (result, port, sink) = run(port, config, vec![query("a", 4)]).await;

    let report = result.expect("run completes");
    assert!(report.is_completed());
    assert!(report.record_cap_reached);
    assert_eq!(sink.titles(), vec!["1", "2", "3"]);
    assert_eq!(port.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn respects_max_concurrent() {
    init_logging();
    let port = ScriptedPort::new(Duration::from_millis(200));
    let queries = (0..6).map(|i| query(&format!("q{i}"), 1)).collect();

    let (result, port, _sink) = run(port, config(2), queries).await;

    assert!(result.expect("run completes").is_completed());
    assert_eq!(port.calls().len(), 6);
    assert_eq!(port.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn graceful_abort_drains_in_flight_and_reports_cancelled() {
    init_logging();
    let port = Arc::new(
        ScriptedPort::new(Duration::from_secs(1))
            .reply("a", PageCursor::Start, page(&["a1"], Some(1))),
    );
    let sink = Arc::new(TestSink::default());
    let orchestrator = CrawlOrchestrator::new(port.clone(), sink.clone(), config(1));
    let abort = orchestrator.abort_handle();
    let phase = orchestrator.subscribe_phase();

    let trigger = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        abort.abort(CancelMode::Graceful);
    };
    let (result, ()) = tokio::join!(orchestrator.start(vec![query("a", 3), query("b", 3)]), trigger);

    let report = result.expect("cancellation is not an error");
    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(AbortCause::Cancelled {
            mode: CancelMode::Graceful
        })
    );
    assert_eq!(port.calls().len(), 1);
    assert_eq!(port.active.load(Ordering::SeqCst), 0);
    assert_eq!(report.discarded_count, 2);
    assert!(sink.titles().is_empty());
    assert_eq!(*phase.borrow(), RunPhase::Aborted);
}

#[tokio::test(start_paused = true)]
async fn immediate_abort_cancels_in_flight() {
    init_logging();
    let port = Arc::new(ScriptedPort::new(Duration::from_secs(30)));
    let sink = Arc::new(TestSink::default());
    let orchestrator = CrawlOrchestrator::new(port.clone(), sink.clone(), config(2));
    let abort = orchestrator.abort_handle();

    let trigger = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        abort.abort(CancelMode::Immediate);
    };
    let started = tokio::time::Instant::now();
    let (result, ()) = tokio::join!(orchestrator.start(vec![query("a", 1), query("b", 1)]), trigger);

    let report = result.expect("cancellation is not an error");
    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(AbortCause::Cancelled {
            mode: CancelMode::Immediate
        })
    );
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(report.discarded_count, 2);
    assert!(abort.is_aborted());
}

#[tokio::test]
async fn zero_concurrency_is_rejected() {
    let (result, port, _sink) = run(
        ScriptedPort::new(Duration::ZERO),
        config(0),
        vec![query("a", 1)],
    )
    .await;

    assert!(matches!(result, Err(CrawlError::InvalidConfig(_))));
    assert!(port.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn immediate_abort_discards_instead_of_failing() {
    init_logging();
    let config = CrawlConfig {
        max_retries: 0,
        ..config(2)
    };
    for _ in 0..64 {
        let port = Arc::new(ScriptedPort::new(Duration::from_secs(30)));
        let orchestrator =
            CrawlOrchestrator::new(port, Arc::new(TestSink::default()), config.clone());
        let abort = orchestrator.abort_handle();
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            abort.abort(CancelMode::Immediate);
        };
        let (result, ()) =
            tokio::join!(orchestrator.start(vec![query("a", 1), query("b", 1)]), trigger);

        let report = result.expect("cancellation is not an error");
        assert!(report.permanent_failures.is_empty());
        assert_eq!(report.discarded_count, 2);
    }
}

#[tokio::test(start_paused = true)]
async fn fatal_immediate_cancel_leaves_abort_handle_untouched() {
    init_logging();
    let port = Arc::new(
        ScriptedPort::new(Duration::from_secs(30))
            .hold_for("a", Duration::from_millis(10))
            .reply("a", PageCursor::Start, Err(FetchError::fatal("403"))),
    );
    let config = CrawlConfig {
        fatal_cancel_mode: CancelMode::Immediate,
        ..config(2)
    };
    let orchestrator = CrawlOrchestrator::new(port.clone(), Arc::new(TestSink::default()), config);
    let abort = orchestrator.abort_handle();
    let started = tokio::time::Instant::now();

    let err = orchestrator
        .start(vec![query("a", 1), query("b", 1)])
        .await
        .expect_err("fatal aborts");

    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(!abort.is_aborted());
    match err {
        CrawlError::Fatal { report, .. } => {
            assert_eq!(report.permanent_failures.len(), 1);
            assert_eq!(report.discarded_count, 1);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn huge_max_concurrent_runs_instead_of_panicking() {
    init_logging();
    let queries = (0..3).map(|i| query(&format!("q{i}"), 1)).collect();

    let (result, port, _sink) = run(
        ScriptedPort::new(Duration::from_millis(10)),
        config(usize::MAX),
        queries,
    )
    .await;

    assert!(result.expect("run completes").is_completed());
    assert_eq!(port.peak.load(Ordering::SeqCst), 3);
}

fn repeatable_script() -> ScriptedPort {
    ScriptedPort::new(Duration::from_millis(50))
        .hold_for("b", Duration::from_millis(80))
        .reply("a", PageCursor::Start, Err(FetchError::transient("503")))
        .reply("a", PageCursor::Start, page(&["a1", "shared"], Some(2)))
        .reply("b", PageCursor::Start, page(&["shared", "b1"], Some(2)))
        .reply("a", PageCursor::Offset(2), page(&["a2", "b1"], None))
        .reply("b", PageCursor::Offset(2), Err(FetchError::malformed("bad markup")))
}

#[tokio::test(start_paused = true)]
async fn same_queries_twice_give_the_same_result() {
    init_logging();
    let queries = || vec![query("a", 3), query("b", 3)];

    let (first, _, first_sink) = run(repeatable_script(), config(2), queries()).await;
    let (second, _, second_sink) = run(repeatable_script(), config(2), queries()).await;

    let first = first.expect("first run completes");
    let second = second.expect("second run completes");
    assert_eq!(first.emitted_count, 4);
    assert_eq!(first.duplicate_count, 2);
    assert_eq!(first.permanent_failures.len(), 1);
    assert_eq!(first, second);
    assert_eq!(first_sink.sorted_identities(), second_sink.sorted_identities());
}
