//! QR fixtures and device gallery helpers.
//!
//! [`QrGenerator`] renders payment QR codes the scanner flow picks from the
//! gallery; [`push_png`] puts them there and [`clean_gallery`] empties the
//! gallery between runs.

use crate::config::QrConfig;
use crate::platform::Platform;
use crate::result::{ScoutError, ScoutResult};
use crate::session::Session;
use image::Luma;
use qrcode::{EcLevel, QrCode};
use rand::Rng;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

/// Module size in pixels
pub const MODULE_PX: u32 = 10;

const SHELL: &str = "mobile: shell";

/// Payment QR flavours understood by the app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrKind {
    /// Megapolis contract payment
    Megapolis,
    /// Universal distributor invoice
    Universal,
}

impl QrKind {
    /// Lowercase name, used as file prefix
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Megapolis => "megapolis",
            Self::Universal => "universal",
        }
    }
}

impl std::fmt::Display for QrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QrKind {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "megapolis" => Ok(Self::Megapolis),
            "universal" => Ok(Self::Universal),
            other => Err(ScoutError::config(format!("unknown QR kind: {other}"))),
        }
    }
}

/// Per-code values; unset fields fall back to the configured defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QrOverrides {
    /// Contract (megapolis) or invoice id (universal); random 6 digits if unset
    pub id: Option<String>,
    /// Buyer IIN
    pub iin: Option<String>,
    /// Client id
    pub client: Option<String>,
    /// Distributor id
    pub distributor: Option<String>,
    /// Amount
    pub amount: Option<String>,
    /// Invoice title (universal); defaults to the invoice id
    pub title: Option<String>,
}

/// A payment URL and the id baked into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    /// Flavour
    pub kind: QrKind,
    /// Contract or invoice id
    pub id: String,
    /// Encoded URL
    pub url: String,
}

impl QrPayload {
    /// `<kind>_<id>.png`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_{}.png", self.kind, self.id)
    }
}

/// Random six digit id
#[must_use]
pub fn random_id() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), &urlencoding::encode(value))
    })
}

/// Builds payment URLs and renders them as PNG files
#[derive(Debug, Clone)]
pub struct QrGenerator {
    config: QrConfig,
    out_dir: PathBuf,
}

impl QrGenerator {
    /// Generator writing to the configured output directory
    #[must_use]
    pub fn new(config: &QrConfig) -> Self {
        Self {
            out_dir: config.out_dir.clone(),
            config: config.clone(),
        }
    }

    /// Write PNGs somewhere else
    #[must_use]
    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    /// Output directory
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Payment URL for `kind`, values percent-encoded
    pub fn build_url(&self, kind: QrKind, overrides: &QrOverrides) -> ScoutResult<QrPayload> {
        let c = &self.config;
        let pick = |value: &Option<String>, default: &str| value.clone().unwrap_or_else(|| default.to_string());
        let id = overrides.id.clone().unwrap_or_else(random_id);
        let amount = pick(&overrides.amount, &c.amount);

        let url = match kind {
            QrKind::Megapolis => {
                if c.megapolis_template.is_empty() {
                    return Err(ScoutError::config("megapolis QR template is not set (QR_MEGA_TMPL)"));
                }
                let iin = pick(&overrides.iin, &c.iin);
                fill(
                    &c.megapolis_template,
                    &[("contract", id.as_str()), ("iin", iin.as_str()), ("amount", amount.as_str())],
                )
            }
            QrKind::Universal => {
                if c.universal_template.is_empty() {
                    return Err(ScoutError::config("universal QR template is not set (QR_UNI_TMPL)"));
                }
                let distributor = pick(&overrides.distributor, &c.distributor);
                let client = pick(&overrides.client, &c.client);
                let title = pick(&overrides.title, &id);
                fill(
                    &c.universal_template,
                    &[
                        ("distributor", distributor.as_str()),
                        ("client", client.as_str()),
                        ("invoiceId", id.as_str()),
                        ("amount", amount.as_str()),
                        ("invoiceTitle", title.as_str()),
                    ],
                )
            }
        };
        Ok(QrPayload { kind, id, url })
    }

    /// Render `payload` (EC level M, 10 px modules, standard quiet zone)
    pub fn render(&self, payload: &QrPayload) -> ScoutResult<PathBuf> {
        let code = QrCode::with_error_correction_level(payload.url.as_bytes(), EcLevel::M)
            .map_err(|e| ScoutError::media(format!("cannot encode QR: {e}")))?;
        let image = code
            .render::<Luma<u8>>()
            .module_dimensions(MODULE_PX, MODULE_PX)
            .quiet_zone(true)
            .build();

        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(payload.file_name());
        image
            .save(&path)
            .map_err(|e| ScoutError::media(format!("cannot write {}: {e}", path.display())))?;
        tracing::info!(kind = %payload.kind, id = %payload.id, path = %path.display(), "rendered QR");
        Ok(path)
    }

    /// Build and render in one go
    pub fn png(&self, kind: QrKind, overrides: &QrOverrides) -> ScoutResult<(QrPayload, PathBuf)> {
        let payload = self.build_url(kind, overrides)?;
        let path = self.render(&payload)?;
        Ok((payload, path))
    }
}

fn shell(session: &dyn Session, command: &str, args: &[&str]) -> ScoutResult<Value> {
    session.execute_script(SHELL, vec![json!({ "command": command, "args": args })])
}

/// Push a PNG into the device gallery and have the media scanner index it.
///
/// Returns the device path. Android only.
pub fn push_png(session: &dyn Session, local: &Path, device_dir: &str) -> ScoutResult<String> {
    if session.platform() == Platform::Ios {
        return Err(ScoutError::media("pushing images to the iOS photo library is not supported"));
    }
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ScoutError::media(format!("bad file name: {}", local.display())))?;
    let device_dir = device_dir.trim_end_matches('/');
    let device_path = format!("{device_dir}/{name}");
    let bytes = std::fs::read(local)?;

    shell(session, "mkdir", &["-p", device_dir])?;
    session.push_file(&device_path, &bytes)?;
    let uri = format!("file://{device_path}");
    shell(
        session,
        "am",
        &["broadcast", "-a", "android.intent.action.MEDIA_SCANNER_SCAN_FILE", "-d", &uri],
    )?;
    tracing::info!(path = %device_path, bytes = bytes.len(), "pushed image");
    Ok(device_path)
}

/// Empty the device gallery.
///
/// Android: removes `/sdcard/DCIM` and `/sdcard/Pictures` content (or just
/// `Pictures/<album>`) and rescans. iOS simulators are erased with
/// `xcrun simctl` on macOS; real iOS devices are left alone.
pub fn clean_gallery(session: &dyn Session, ios_udid: Option<&str>, only_album: Option<&str>) -> ScoutResult<()> {
    match session.platform() {
        Platform::Ios => {
            let simulator = session
                .capabilities()
                .get("appium:isSimulator")
                .or_else(|| session.capabilities().get("isSimulator"))
                .map_or(true, |v| v.as_bool().unwrap_or(true));
            if simulator {
                erase_simulator(ios_udid.unwrap_or("booted"))
            } else {
                tracing::info!("real iOS device, gallery left as is");
                Ok(())
            }
        }
        _ => clean_android(session, only_album),
    }
}

fn clean_android(session: &dyn Session, only_album: Option<&str>) -> ScoutResult<()> {
    let (script, targets) = match only_album {
        Some(album) => {
            let folder = format!("/sdcard/Pictures/{album}");
            (
                format!("rm -rf \"{folder}\"/* 2>/dev/null || true; mkdir -p \"{folder}\""),
                vec![folder],
            )
        }
        None => (
            "rm -rf /sdcard/DCIM/* /sdcard/Pictures/* 2>/dev/null || true; mkdir -p /sdcard/DCIM/Camera /sdcard/Pictures"
                .to_string(),
            vec!["/sdcard/DCIM".to_string(), "/sdcard/Pictures".to_string()],
        ),
    };
    shell(session, "sh", &["-c", &script])?;

    for target in &targets {
        match shell(session, "cmd", &["media", "rescan", target]) {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, path = %target, "cmd media rescan failed, broadcasting");
                let uri = format!("file://{target}");
                shell(
                    session,
                    "am",
                    &["broadcast", "-a", "android.intent.action.MEDIA_SCANNER_SCAN_DIR", "-d", &uri],
                )?;
            }
        }
    }
    tracing::info!(album = only_album.unwrap_or("*"), "gallery cleaned");
    Ok(())
}

fn erase_simulator(udid: &str) -> ScoutResult<()> {
    if !cfg!(target_os = "macos") {
        tracing::debug!("not on macOS, simulator left as is");
        return Ok(());
    }
    // shutdown fails when the simulator is already down
    if let Err(e) = Command::new("xcrun").args(["simctl", "shutdown", udid]).status() {
        tracing::debug!(error = %e, "simctl shutdown");
    }
    for step in ["erase", "boot"] {
        let status = Command::new("xcrun").args(["simctl", step, udid]).status()?;
        if !status.success() {
            return Err(ScoutError::media(format!("xcrun simctl {step} {udid} failed: {status}")));
        }
    }
    Ok(())
}
