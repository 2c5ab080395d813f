//! Flow runner: one fresh device session per flow

use crate::error::CliResult;
use crate::output::ProgressReporter;
use appscout::flows::{self, Flow, FlowContext};
use appscout::media::{push_png, QrGenerator, QrKind, QrOverrides};
use appscout::{
    AppiumServerFixture, AppiumSession, BoxedSession, Fixture, FixtureManager, ScoutConfig,
    ScoutResult, Session, SessionFixture,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Opens a new session for each flow
pub type Connector = Arc<dyn Fn() -> ScoutResult<BoxedSession> + Send + Sync>;

/// Outcome of one flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    /// Flow name
    pub name: String,
    /// Whether the flow passed
    pub passed: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Wall time including session setup
    pub duration: Duration,
    /// Screenshot saved on failure
    pub screenshot: Option<PathBuf>,
}

impl FlowResult {
    /// Create a passing result
    #[must_use]
    pub fn pass(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
            duration,
            screenshot: None,
        }
    }

    /// Create a failing result
    #[must_use]
    pub fn fail(name: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.into()),
            duration,
            screenshot: None,
        }
    }
}

/// Aggregated results of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// RFC 3339 start time
    pub started_at: String,
    /// Platform the flows ran on
    pub platform: String,
    /// Individual results, in run order
    pub results: Vec<FlowResult>,
    /// Total duration
    pub duration: Duration,
}

impl RunReport {
    /// Get number of passed flows
    #[must_use]
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Get number of failed flows
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Get total number of flows run
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Check if all flows passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Failed flows
    #[must_use]
    pub fn failures(&self) -> Vec<&FlowResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }
}

/// Runs flows against Appium, or against whatever a custom connector returns
pub struct FlowRunner {
    suite: ScoutConfig,
    reporter: ProgressReporter,
    connector: Connector,
    manage_server: bool,
    fail_fast: bool,
    qr: Option<QrKind>,
}

impl std::fmt::Debug for FlowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRunner")
            .field("platform", &self.suite.platform)
            .field("manage_server", &self.manage_server)
            .field("fail_fast", &self.fail_fast)
            .field("qr", &self.qr)
            .finish_non_exhaustive()
    }
}

impl FlowRunner {
    /// Runner creating Appium sessions from the suite config
    pub fn new(suite: ScoutConfig, reporter: ProgressReporter) -> ScoutResult<Self> {
        let url = suite.appium_url(suite.platform)?;
        let caps = suite.capabilities(suite.platform)?;
        let connector: Connector = Arc::new(move || {
            let session: BoxedSession = Box::new(AppiumSession::create(&url, &caps)?);
            Ok(session)
        });
        Ok(Self {
            suite,
            reporter,
            connector,
            manage_server: true,
            fail_fast: false,
            qr: None,
        })
    }

    /// Runner with a custom connector; no Appium server is managed
    pub fn with_connector<F>(suite: ScoutConfig, reporter: ProgressReporter, connect: F) -> Self
    where
        F: Fn() -> ScoutResult<BoxedSession> + Send + Sync + 'static,
    {
        Self {
            suite,
            reporter,
            connector: Arc::new(connect),
            manage_server: false,
            fail_fast: false,
            qr: None,
        }
    }

    /// Stop after the first failure
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Generate and push a fresh QR image before `pay_by_qr`
    #[must_use]
    pub const fn with_qr(mut self, kind: Option<QrKind>) -> Self {
        self.qr = kind;
        self
    }

    /// Get the reporter
    #[must_use]
    pub const fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Run `selected` in order
    pub fn run(&mut self, selected: &[&'static Flow]) -> CliResult<RunReport> {
        let start = Instant::now();
        let mut report = RunReport {
            started_at: chrono::Utc::now().to_rfc3339(),
            platform: self.suite.platform.to_string(),
            ..RunReport::default()
        };

        if selected.is_empty() {
            self.reporter.warning("No flows selected");
            return Ok(report);
        }

        let mut fixtures = FixtureManager::new();
        if self.manage_server {
            fixtures.register(AppiumServerFixture::from_config(&self.suite, self.suite.platform)?);
        }
        fixtures.setup_all()?;

        self.reporter.header(&format!("Flows on {}", self.suite.platform));
        self.reporter.start_progress(selected.len() as u64, "starting");

        for flow in selected {
            self.reporter.set_message(flow.name);
            let result = self.run_one(flow);

            if result.passed {
                self.reporter.success(&format!("{} ({:.1}s)", flow.name, result.duration.as_secs_f64()));
            } else {
                self.reporter.failure(&format!(
                    "{}: {}",
                    flow.name,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
                if let Some(path) = &result.screenshot {
                    self.reporter.info(&format!("screenshot: {}", path.display()));
                }
            }

            let stop = !result.passed && self.fail_fast;
            report.results.push(result);
            self.reporter.increment(1);
            if stop {
                break;
            }
        }

        self.reporter.finish();
        if let Err(e) = fixtures.teardown_all() {
            tracing::warn!(error = %e, "fixture teardown failed");
        }

        report.duration = start.elapsed();
        self.reporter.summary(report.passed(), report.failed(), report.duration);
        Ok(report)
    }

    fn run_one(&self, flow: &Flow) -> FlowResult {
        let connector = Arc::clone(&self.connector);
        let mut fixture = SessionFixture::new(flow.name, self.suite.artifacts_dir.clone(), move || connector());
        let start = Instant::now();

        let outcome = fixture.setup().and_then(|()| self.drive(&fixture, flow));
        if outcome.is_err() {
            fixture.mark_failed();
        }
        if let Err(e) = fixture.teardown() {
            tracing::warn!(flow = flow.name, error = %e, "session teardown failed");
        }

        let duration = start.elapsed();
        match outcome {
            Ok(()) => FlowResult::pass(flow.name, duration),
            Err(e) => {
                let mut result = FlowResult::fail(flow.name, e.to_string(), duration);
                result.screenshot = fixture.screenshot().map(std::path::Path::to_path_buf);
                result
            }
        }
    }

    fn drive(&self, fixture: &SessionFixture, flow: &Flow) -> ScoutResult<()> {
        let session = fixture.session()?;
        let mut ctx = FlowContext::from_config(session, &self.suite);
        if flow.name == "pay_by_qr" {
            if let Some(kind) = self.qr {
                ctx = ctx.with_qr_file(self.stage_qr(session, kind)?);
            }
        }
        if flow.needs_login {
            flows::login(&ctx)?;
        }
        flow.run(&ctx)
    }

    fn stage_qr(&self, session: &dyn Session, kind: QrKind) -> ScoutResult<String> {
        let generator = QrGenerator::new(&self.suite.qr);
        let (payload, path) = generator.png(kind, &QrOverrides::default())?;
        push_png(session, &path, &self.suite.qr.device_dir)?;
        tracing::info!(kind = %kind, id = %payload.id, "staged QR image");
        Ok(payload.file_name())
    }
}
