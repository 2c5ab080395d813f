//! Subcommand implementations

use crate::commands::{CleanGalleryArgs, FindArgs, QrArgs, QueriesArgs, RunArgs, StatusArgs, TapArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, ProgressReporter};
use crate::runner::FlowRunner;
use appscout::flows::{select_flows, FLOWS};
use appscout::media::{clean_gallery, push_png, QrGenerator, QrOverrides};
use appscout::query::webview_text_query;
use appscout::{
    AppiumServerFixture, AppiumSession, ScoutConfig, ScoutError, SearchTarget, Session, TextFinder,
};
use std::time::Duration;

/// Reporter honouring `-q` and `--color`
#[must_use]
pub fn reporter(config: &CliConfig) -> ProgressReporter {
    ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
}

/// Open a session, run `f`, always quit
fn with_session<T>(suite: &ScoutConfig, f: impl FnOnce(&dyn Session) -> CliResult<T>) -> CliResult<T> {
    let url = suite.appium_url(suite.platform)?;
    let caps = suite.capabilities(suite.platform)?;
    let session = AppiumSession::create(&url, &caps)?;
    let result = f(&session);
    if let Err(e) = session.quit() {
        tracing::debug!(error = %e, "quit failed");
    }
    result
}

fn target(text: &str, timeout: Option<u64>) -> SearchTarget {
    let target = SearchTarget::new(text);
    match timeout {
        Some(ms) => target.with_timeout(ms),
        None => target,
    }
}

/// `status`: wait for the Appium server
pub fn status(config: &CliConfig, args: &StatusArgs) -> CliResult<()> {
    let suite = config.load_suite()?;
    let out = reporter(config);
    let fixture = AppiumServerFixture::from_config(&suite, suite.platform)?;
    let server = fixture.server();
    out.info(&format!("waiting for Appium at {}", server.url()));
    if server.wait_ready(Duration::from_secs(args.timeout))? {
        out.success(&format!("Appium ready at {}", server.url()));
        Ok(())
    } else {
        Err(ScoutError::Timeout {
            ms: args.timeout.saturating_mul(1000),
        }
        .into())
    }
}

/// `contexts`: list contexts, current one starred
pub fn contexts(config: &CliConfig) -> CliResult<()> {
    let suite = config.load_suite()?;
    let out = reporter(config);
    with_session(&suite, |session| {
        let current = session.current_context()?;
        for name in session.contexts()? {
            let mark = if name == current { "*" } else { " " };
            out.print(&format!("{mark} {name}"));
        }
        Ok(())
    })
}

/// `find`: locate and describe
pub fn find(config: &CliConfig, args: &FindArgs) -> CliResult<()> {
    let suite = config.load_suite()?;
    let out = reporter(config);
    with_session(&suite, |session| {
        let finder = TextFinder::with_options(session, suite.finder_options());
        let found = if args.all {
            finder.find_all_anywhere(target(&args.text, args.timeout))?
        } else {
            finder.find_anywhere(target(&args.text, args.timeout))?.into_iter().collect()
        };
        if found.is_empty() {
            return Err(CliError::not_found(format!("'{}'", args.text)));
        }
        for element in &found {
            let rect = element.rect()?;
            out.print(&format!(
                "{} at ({:.0}, {:.0}) {:.0}x{:.0}",
                element.describe(),
                rect.x,
                rect.y,
                rect.width,
                rect.height
            ));
        }
        Ok(())
    })
}

/// `tap`: locate and click through the fallback tiers
pub fn tap(config: &CliConfig, args: &TapArgs) -> CliResult<()> {
    let suite = config.load_suite()?;
    let out = reporter(config);
    with_session(&suite, |session| {
        let finder = TextFinder::with_options(session, suite.finder_options());
        let element = finder
            .find_anywhere(target(&args.text, args.timeout))?
            .ok_or_else(|| CliError::not_found(format!("'{}'", args.text)))?;
        let outcome = element.click()?;
        out.success(&format!(
            "tapped {} via {} (tier {}) in {}",
            element.label(),
            outcome.tier,
            outcome.index,
            outcome.context
        ));
        Ok(())
    })
}

/// `queries`: print the queries a search would issue, no device needed
pub fn queries(config: &CliConfig, args: &QueriesArgs) -> CliResult<()> {
    let suite = config.load_suite()?;
    let out = reporter(config);
    let text = args.text.trim();
    if text.is_empty() {
        return Err(CliError::invalid_argument("search text is empty"));
    }
    for by in suite.platform.native_queries(text) {
        out.print(&format!("native  {by}"));
    }
    if let Some(by) = webview_text_query(text) {
        out.print(&format!("webview {by}"));
    }
    Ok(())
}

/// `qr`: render a payment code, optionally push it to the device
pub fn qr(config: &CliConfig, args: &QrArgs) -> CliResult<()> {
    let suite = config.load_suite()?;
    let out = reporter(config);
    let mut generator = QrGenerator::new(&suite.qr);
    if let Some(dir) = &args.out {
        generator = generator.with_out_dir(dir);
    }
    let overrides = QrOverrides {
        id: args.id.clone(),
        amount: args.amount.clone(),
        ..QrOverrides::default()
    };
    let (payload, path) = generator.png(args.kind.into(), &overrides)?;
    out.print(&path.display().to_string());
    out.info(&payload.url);

    if args.push {
        with_session(&suite, |session| {
            let device_path = push_png(session, &path, &suite.qr.device_dir)?;
            out.success(&format!("pushed to {device_path}"));
            Ok(())
        })?;
    }
    Ok(())
}

/// `clean-gallery`: empty the device gallery
pub fn clean(config: &CliConfig, args: &CleanGalleryArgs) -> CliResult<()> {
    let suite = config.load_suite()?;
    let out = reporter(config);
    let udid = suite.ios.sim_udid.clone().or_else(|| suite.ios.udid.clone());
    with_session(&suite, |session| {
        clean_gallery(session, udid.as_deref(), args.album.as_deref())?;
        out.success("gallery cleaned");
        Ok(())
    })
}

/// `flows`: list registered flows
pub fn list_flows(config: &CliConfig) {
    let out = reporter(config);
    for flow in &FLOWS {
        let login = if flow.needs_login { " (after login)" } else { "" };
        out.print(&format!("{:<18} {}{login}", flow.name, flow.summary));
    }
}

/// `run`: run flows, non-zero exit when any fails
pub fn run(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let selected = select_flows(&args.flows)?;
    let suite = config.load_suite()?;
    let format: OutputFormat = args.format.into();
    let mut runner = FlowRunner::new(suite, reporter(config))?
        .with_fail_fast(args.fail_fast)
        .with_qr(args.qr.map(Into::into));

    let report = runner.run(&selected)?;
    if format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&report).map_err(ScoutError::from)?;
        runner.reporter().print(&json);
    }

    if report.all_passed() {
        Ok(())
    } else {
        Err(CliError::flow_failed(format!(
            "{} of {} flows failed",
            report.failed(),
            report.total()
        )))
    }
}
