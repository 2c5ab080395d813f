//! Fixture Management
//!
//! Setup and teardown of the resources a UI flow needs: the Appium server,
//! a device session, and small closures for per-run chores.
//!
//! Fixtures are set up highest priority first and torn down in reverse.
//! A failed setup tears down whatever was already set up.

use crate::appium::{AppiumServer, AppiumSession};
use crate::config::ScoutConfig;
use crate::platform::Platform;
use crate::result::{ScoutError, ScoutResult};
use crate::session::Session;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::OnceLock;
use std::time::Duration;

/// How long to wait for an Appium server to answer `/status`
pub const APPIUM_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Trait for fixtures that can be set up and torn down.
pub trait Fixture: Send {
    /// Set up the fixture before a flow runs.
    fn setup(&mut self) -> ScoutResult<()>;

    /// Tear down the fixture after the flow.
    fn teardown(&mut self) -> ScoutResult<()>;

    /// Fixture name for logs
    fn name(&self) -> &str;

    /// Higher = set up first, torn down last.
    fn priority(&self) -> i32 {
        0
    }
}

/// State of a fixture in the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    /// Registered but not set up
    Registered,
    /// Set up successfully
    SetUp,
    /// Torn down
    TornDown,
    /// Setup or teardown failed
    Failed,
}

struct FixtureEntry {
    fixture: Box<dyn Fixture>,
    state: FixtureState,
}

/// Priority-ordered fixture manager
#[derive(Default)]
pub struct FixtureManager {
    fixtures: Vec<FixtureEntry>,
    setup_order: Vec<usize>,
}

impl std::fmt::Debug for FixtureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureManager")
            .field("fixtures", &self.list())
            .field("set_up", &self.setup_order.len())
            .finish()
    }
}

impl FixtureManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixture. Fixtures with the same name are replaced.
    pub fn register<F: Fixture + 'static>(&mut self, fixture: F) {
        let entry = FixtureEntry {
            fixture: Box::new(fixture),
            state: FixtureState::Registered,
        };
        let name = entry.fixture.name().to_string();
        if let Some(existing) = self.fixtures.iter_mut().find(|e| e.fixture.name() == name) {
            *existing = entry;
        } else {
            self.fixtures.push(entry);
        }
    }

    /// Number of registered fixtures
    #[must_use]
    pub fn count(&self) -> usize {
        self.fixtures.len()
    }

    /// State of the fixture called `name`
    #[must_use]
    pub fn state(&self, name: &str) -> Option<FixtureState> {
        self.fixtures
            .iter()
            .find(|e| e.fixture.name() == name)
            .map(|e| e.state)
    }

    /// Registered fixture names
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.fixtures.iter().map(|e| e.fixture.name()).collect()
    }

    /// Set up every fixture, highest priority first.
    ///
    /// On failure, fixtures already set up are torn down before the error
    /// is returned.
    pub fn setup_all(&mut self) -> ScoutResult<()> {
        let mut ordered: Vec<usize> = (0..self.fixtures.len()).collect();
        // stable: equal priorities keep registration order
        ordered.sort_by_key(|&i| std::cmp::Reverse(self.fixtures[i].fixture.priority()));
        self.setup_order.clear();

        for index in ordered {
            let entry = &mut self.fixtures[index];
            if !matches!(entry.state, FixtureState::Registered | FixtureState::TornDown) {
                continue;
            }
            tracing::debug!(fixture = entry.fixture.name(), "setup");
            if let Err(e) = entry.fixture.setup() {
                entry.state = FixtureState::Failed;
                let message = format!("Fixture '{}' setup failed: {e}", entry.fixture.name());
                if let Err(teardown) = self.teardown_all() {
                    tracing::warn!(error = %teardown, "teardown after failed setup");
                }
                return Err(ScoutError::FixtureError { message });
            }
            entry.state = FixtureState::SetUp;
            self.setup_order.push(index);
        }
        Ok(())
    }

    /// Tear down in reverse setup order; every fixture gets its turn and the
    /// first error is returned.
    pub fn teardown_all(&mut self) -> ScoutResult<()> {
        let mut first_error: Option<ScoutError> = None;
        for &index in self.setup_order.iter().rev() {
            let entry = &mut self.fixtures[index];
            if entry.state != FixtureState::SetUp {
                continue;
            }
            tracing::debug!(fixture = entry.fixture.name(), "teardown");
            match entry.fixture.teardown() {
                Ok(()) => entry.state = FixtureState::TornDown,
                Err(e) => {
                    entry.state = FixtureState::Failed;
                    if first_error.is_none() {
                        first_error = Some(ScoutError::FixtureError {
                            message: format!("Fixture '{}' teardown failed: {e}", entry.fixture.name()),
                        });
                    }
                }
            }
        }
        self.setup_order.clear();
        first_error.map_or(Ok(()), Err)
    }
}

type Hook = Box<dyn FnMut() -> ScoutResult<()> + Send>;

/// A fixture built from closures.
pub struct SimpleFixture {
    name: String,
    priority: i32,
    setup_fn: Option<Hook>,
    teardown_fn: Option<Hook>,
}

impl std::fmt::Debug for SimpleFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleFixture")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl SimpleFixture {
    /// Create a fixture that does nothing yet
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            setup_fn: None,
            teardown_fn: None,
        }
    }

    /// Set the setup closure
    #[must_use]
    pub fn with_setup<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> ScoutResult<()> + Send + 'static,
    {
        self.setup_fn = Some(Box::new(f));
        self
    }

    /// Set the teardown closure
    #[must_use]
    pub fn with_teardown<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> ScoutResult<()> + Send + 'static,
    {
        self.teardown_fn = Some(Box::new(f));
        self
    }

    /// Set the priority
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Fixture for SimpleFixture {
    fn setup(&mut self) -> ScoutResult<()> {
        self.setup_fn.as_mut().map_or(Ok(()), |f| f())
    }

    fn teardown(&mut self) -> ScoutResult<()> {
        self.teardown_fn.as_mut().map_or(Ok(()), |f| f())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

// =============================================================================
// APPIUM SERVER
// =============================================================================

/// Makes sure an Appium server answers before sessions are created.
///
/// External servers are only waited for. Otherwise a local `appium` process
/// is started (unless one already answers) and terminated on teardown.
#[derive(Debug)]
pub struct AppiumServerFixture {
    server: AppiumServer,
    external: bool,
    program: String,
    ready_timeout: Duration,
    process: Option<Child>,
}

impl AppiumServerFixture {
    /// Fixture for `server`
    #[must_use]
    pub fn new(server: AppiumServer, external: bool) -> Self {
        Self {
            server,
            external,
            program: "appium".to_string(),
            ready_timeout: APPIUM_READY_TIMEOUT,
            process: None,
        }
    }

    /// Fixture for the configured endpoint of `platform`
    pub fn from_config(config: &ScoutConfig, platform: Platform) -> ScoutResult<Self> {
        let (host, port) = config.appium_host_port(platform)?;
        Ok(Self::new(AppiumServer::new(host, port), config.appium_external))
    }

    /// Use another launcher binary
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Override the readiness timeout
    #[must_use]
    pub const fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Server endpoint
    #[must_use]
    pub const fn server(&self) -> &AppiumServer {
        &self.server
    }

    /// Launch arguments for a managed server
    #[must_use]
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            "--address".to_string(),
            self.server.host().to_string(),
            "--port".to_string(),
            self.server.port().to_string(),
            "--relaxed-security".to_string(),
        ]
    }

    fn stop(&mut self) -> ScoutResult<()> {
        if let Some(mut child) = self.process.take() {
            tracing::info!(pid = child.id(), "stopping Appium");
            child.kill()?;
            child.wait()?;
        }
        Ok(())
    }
}

impl Fixture for AppiumServerFixture {
    fn setup(&mut self) -> ScoutResult<()> {
        if self.external {
            return if self.server.wait_ready(self.ready_timeout)? {
                Ok(())
            } else {
                Err(ScoutError::FixtureError {
                    message: format!("external Appium server at {} is not reachable", self.server.url()),
                })
            };
        }
        if self.server.is_ready()? {
            tracing::info!(url = %self.server.url(), "reusing running Appium server");
            return Ok(());
        }

        tracing::info!(url = %self.server.url(), "starting Appium");
        let child = Command::new(&self.program)
            .args(self.launch_args())
            .spawn()
            .map_err(|e| ScoutError::FixtureError {
                message: format!("cannot start {}: {e}", self.program),
            })?;
        self.process = Some(child);

        if self.server.wait_ready(self.ready_timeout)? {
            Ok(())
        } else {
            self.stop()?;
            Err(ScoutError::FixtureError {
                message: format!("Appium did not start on {}", self.server.url()),
            })
        }
    }

    fn teardown(&mut self) -> ScoutResult<()> {
        self.stop()
    }

    fn name(&self) -> &str {
        "appium-server"
    }

    fn priority(&self) -> i32 {
        100
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Session usable from the fixture's owner thread
pub type BoxedSession = Box<dyn Session + Send + Sync>;

type Connector = Box<dyn FnMut() -> ScoutResult<BoxedSession> + Send>;

fn slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]+").expect("static pattern"))
}

/// File-system safe version of a test name
#[must_use]
pub fn slug(name: &str) -> String {
    slug_re().replace_all(name, "_").into_owned()
}

/// Save a PNG screenshot as `<slug>_<platform>_screenshot.png` under `dir`
pub fn save_failure_screenshot(
    session: &dyn Session,
    dir: &Path,
    test_name: &str,
) -> ScoutResult<PathBuf> {
    let png = session.screenshot()?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "{}_{}_screenshot.png",
        slug(test_name),
        session.platform()
    ));
    std::fs::write(&path, png)?;
    tracing::info!(path = %path.display(), "saved failure screenshot");
    Ok(path)
}

/// One device session per flow.
///
/// Teardown screenshots the device if the flow was marked failed, then
/// quits the session. Neither step can fail the teardown.
pub struct SessionFixture {
    test_name: String,
    artifacts_dir: PathBuf,
    connect: Connector,
    session: Option<BoxedSession>,
    failed: bool,
    screenshot: Option<PathBuf>,
}

impl std::fmt::Debug for SessionFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFixture")
            .field("test_name", &self.test_name)
            .field("connected", &self.session.is_some())
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl SessionFixture {
    /// Fixture with a custom connector
    pub fn new<F>(test_name: impl Into<String>, artifacts_dir: impl Into<PathBuf>, connect: F) -> Self
    where
        F: FnMut() -> ScoutResult<BoxedSession> + Send + 'static,
    {
        Self {
            test_name: test_name.into(),
            artifacts_dir: artifacts_dir.into(),
            connect: Box::new(connect),
            session: None,
            failed: false,
            screenshot: None,
        }
    }

    /// Appium session for `platform` built from `config`
    pub fn appium(config: &ScoutConfig, platform: Platform, test_name: impl Into<String>) -> ScoutResult<Self> {
        let url = config.appium_url(platform)?;
        let caps = config.capabilities(platform)?;
        Ok(Self::new(test_name, config.artifacts_dir.clone(), move || {
            let session: BoxedSession = Box::new(AppiumSession::create(&url, &caps)?);
            Ok(session)
        }))
    }

    /// Live session, once set up
    pub fn session(&self) -> ScoutResult<&dyn Session> {
        self.session
            .as_deref()
            .map(|s| s as &dyn Session)
            .ok_or_else(|| ScoutError::FixtureError {
                message: format!("session for '{}' is not set up", self.test_name),
            })
    }

    /// Record that the flow failed
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Screenshot written during teardown, if any
    #[must_use]
    pub fn screenshot(&self) -> Option<&Path> {
        self.screenshot.as_deref()
    }
}

impl Fixture for SessionFixture {
    fn setup(&mut self) -> ScoutResult<()> {
        self.failed = false;
        self.screenshot = None;
        self.session = Some((self.connect)()?);
        Ok(())
    }

    fn teardown(&mut self) -> ScoutResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        if self.failed {
            match save_failure_screenshot(session.as_ref(), &self.artifacts_dir, &self.test_name) {
                Ok(path) => self.screenshot = Some(path),
                Err(e) => tracing::warn!(error = %e, "failure screenshot not saved"),
            }
        }
        if let Err(e) = session.quit() {
            tracing::debug!(error = %e, "quit failed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.test_name
    }

    fn priority(&self) -> i32 {
        50
    }
}
