//! Suite configuration.
//!
//! Layered: built-in defaults, then an optional YAML file, then environment
//! variables. Environment reads go through a lookup function so tests can
//! inject values without touching the process environment.

use crate::platform::Platform;
use crate::result::{ScoutError, ScoutResult};
use crate::wait::{WaitOptions, DEFAULT_FIND_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SCREEN_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "appscout.yaml";

/// Port distance between parallel workers
pub const WORKER_PORT_STRIDE: u16 = 10;

/// Default Appium port for Android sessions
pub const DEFAULT_ANDROID_PORT: u16 = 4723;

/// Default Appium port for iOS sessions
pub const DEFAULT_IOS_PORT: u16 = 4724;

const DEFAULT_HOST: &str = "127.0.0.1";

/// Appium endpoint for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Full server URL; when set, host and port are ignored
    pub url: Option<String>,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl EndpointConfig {
    fn local(port: u16) -> Self {
        Self {
            url: None,
            host: DEFAULT_HOST.to_string(),
            port,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::local(DEFAULT_ANDROID_PORT)
    }
}

/// Android device and app settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidConfig {
    /// Appium endpoint
    pub appium: EndpointConfig,
    /// Device name
    pub device_name: String,
    /// Device udid
    pub udid: String,
    /// OS version
    pub platform_version: String,
    /// Application package
    pub app_package: String,
    /// Launch activity
    pub app_activity: String,
    /// Path to the .apk
    pub app_path: Option<PathBuf>,
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self {
            appium: EndpointConfig::local(DEFAULT_ANDROID_PORT),
            device_name: "emulator-5554".to_string(),
            udid: "emulator-5554".to_string(),
            platform_version: "11.0".to_string(),
            app_package: "kz.halyk.onlinebank.stage".to_string(),
            app_activity: "kz.halyk.onlinebank.ui_release4.screens.auth.AuthActivity".to_string(),
            app_path: None,
        }
    }
}

/// iOS device and app settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IosConfig {
    /// Appium endpoint
    pub appium: EndpointConfig,
    /// Device name
    pub device_name: String,
    /// OS version
    pub platform_version: String,
    /// Device or simulator udid
    pub udid: Option<String>,
    /// Simulator udid used for gallery resets
    pub sim_udid: Option<String>,
    /// Path to the .app / .ipa
    pub app_path: Option<PathBuf>,
}

impl Default for IosConfig {
    fn default() -> Self {
        Self {
            appium: EndpointConfig::local(DEFAULT_IOS_PORT),
            device_name: "iPhone 13".to_string(),
            platform_version: "15.0".to_string(),
            udid: None,
            sim_udid: None,
            app_path: None,
        }
    }
}

/// Locate timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    /// Cross-context search timeout
    pub timeout_ms: u64,
    /// Poll interval
    pub poll_ms: u64,
    /// Direct-locator wait timeout used by screens
    pub screen_timeout_ms: u64,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_FIND_TIMEOUT_MS,
            poll_ms: DEFAULT_POLL_INTERVAL_MS,
            screen_timeout_ms: DEFAULT_SCREEN_TIMEOUT_MS,
        }
    }
}

/// QR fixture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    /// Template with `{contract}`, `{iin}` and `{amount}` placeholders
    pub megapolis_template: String,
    /// Template with `{distributor}`, `{client}`, `{invoiceId}`, `{amount}` and `{invoiceTitle}`
    pub universal_template: String,
    /// Buyer IIN
    pub iin: String,
    /// Client id
    pub client: String,
    /// Distributor id
    pub distributor: String,
    /// Amount in tenge
    pub amount: String,
    /// Output directory for rendered PNGs
    pub out_dir: PathBuf,
    /// Device directory pushed images land in
    pub device_dir: String,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            megapolis_template:
                "https://stage.onlineduken.kz/pay?type=megapolis&contract={contract}&iin={iin}&amount={amount}"
                    .to_string(),
            universal_template:
                "https://stage.onlineduken.kz/pay?type=universal&distributor={distributor}&client={client}&invoiceId={invoiceId}&amount={amount}&title={invoiceTitle}"
                    .to_string(),
            iin: "900101300123".to_string(),
            client: "100001".to_string(),
            distributor: "200002".to_string(),
            amount: "1".to_string(),
            out_dir: PathBuf::from("artifacts/qr"),
            device_dir: "/sdcard/Pictures/OnlineDuken".to_string(),
        }
    }
}

/// Complete suite configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    /// Platform under test
    pub platform: Platform,
    /// Android settings
    pub android: AndroidConfig,
    /// iOS settings
    pub ios: IosConfig,
    /// App path used when the platform-specific one is unset
    pub app_path: Option<PathBuf>,
    /// Locate timing
    pub finder: FinderConfig,
    /// QR fixture settings
    pub qr: QrConfig,
    /// Running under CI
    pub ci: bool,
    /// Appium is managed outside the suite; only wait for it
    pub appium_external: bool,
    /// Parallel worker index
    pub worker: Option<u16>,
    /// Where screenshots and other artifacts go
    pub artifacts_dir: PathBuf,
    /// Directory relative paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Android,
            android: AndroidConfig::default(),
            ios: IosConfig::default(),
            app_path: None,
            finder: FinderConfig::default(),
            qr: QrConfig::default(),
            ci: false,
            appium_external: false,
            worker: None,
            artifacts_dir: PathBuf::from("artifacts"),
            base_dir: PathBuf::from("."),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> ScoutResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ScoutError::config(format!("{key}: cannot parse '{raw}'")))
}

fn check_poll(poll_ms: u64, source: &str) -> ScoutResult<()> {
    if poll_ms == 0 {
        return Err(ScoutError::config(format!("{source}: poll interval must be at least 1 ms")));
    }
    Ok(())
}

fn truthy(raw: &str) -> bool {
    !matches!(raw.trim().to_lowercase().as_str(), "" | "0" | "false" | "no" | "off")
}

impl ScoutConfig {
    /// Parse YAML
    pub fn from_yaml(yaml: &str) -> ScoutResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        check_poll(config.finder.poll_ms, "finder.poll_ms")?;
        Ok(config)
    }

    /// Load `path`, or `appscout.yaml` in the working directory if present,
    /// then apply the process environment.
    pub fn load(path: Option<&Path>) -> ScoutResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a YAML file; relative paths inside resolve against its directory
    pub fn from_file(path: &Path) -> ScoutResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScoutError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml(&text)?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Overlay environment variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> ScoutResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TEST_PLATFORM") {
            self.platform = v.parse()?;
        }

        // Android endpoint
        if let Some(url) = get("ANDROID_APPIUM_URL").or_else(|| get("APPIUM_ANDROID_URL")) {
            self.android.appium.url = Some(url);
        }
        if let Some(host) = get("ANDROID_APPIUM_HOST").or_else(|| get("APPIUM_HOST")) {
            self.android.appium.host = host;
        }
        if let Some(port) = get("ANDROID_APPIUM_PORT").or_else(|| get("APPIUM_PORT")) {
            self.android.appium.port = parse_env("ANDROID_APPIUM_PORT", &port)?;
        }

        // iOS endpoint; the shared port variable belongs to Android
        if let Some(url) = get("IOS_APPIUM_URL").or_else(|| get("APPIUM_IOS_URL")) {
            self.ios.appium.url = Some(url);
        }
        if let Some(host) = get("IOS_APPIUM_HOST").or_else(|| get("APPIUM_HOST")) {
            self.ios.appium.host = host;
        }
        if let Some(port) = get("IOS_APPIUM_PORT") {
            self.ios.appium.port = parse_env("IOS_APPIUM_PORT", &port)?;
        }

        // Devices and apps
        if let Some(v) = get("ANDROID_DEVICE_NAME") {
            self.android.device_name = v;
        }
        if let Some(v) = get("ANDROID_UDID") {
            self.android.udid = v;
        }
        if let Some(v) = get("ANDROID_VERSION") {
            self.android.platform_version = v;
        }
        if let Some(v) = get("ANDROID_APP_PATH") {
            self.android.app_path = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = get("IOS_DEVICE_NAME") {
            self.ios.device_name = v;
        }
        if let Some(v) = get("IOS_VERSION") {
            self.ios.platform_version = v;
        }
        if let Some(v) = get("IOS_UDID") {
            self.ios.udid = Some(v);
        }
        if let Some(v) = get("IOS_SIM_UDID") {
            self.ios.sim_udid = Some(v);
        }
        if let Some(v) = get("IOS_APP_PATH") {
            self.ios.app_path = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = get("APP_PATH") {
            self.app_path = Some(PathBuf::from(v.trim()));
        }

        // Run mode
        if let Some(v) = lookup("CI") {
            self.ci = truthy(&v);
        }
        if let Some(v) = lookup("APPIUM_EXTERNAL") {
            self.appium_external = truthy(&v);
        }
        if let Some(v) = get("APPSCOUT_WORKER") {
            self.worker = Some(parse_env("APPSCOUT_WORKER", &v)?);
        }
        if let Some(v) = get("APPSCOUT_FIND_TIMEOUT_MS") {
            self.finder.timeout_ms = parse_env("APPSCOUT_FIND_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("APPSCOUT_POLL_MS") {
            let poll_ms = parse_env("APPSCOUT_POLL_MS", &v)?;
            check_poll(poll_ms, "APPSCOUT_POLL_MS")?;
            self.finder.poll_ms = poll_ms;
        }
        if let Some(v) = get("APPSCOUT_ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(v);
        }

        // QR fixtures
        if let Some(v) = get("QR_MEGA_TMPL") {
            self.qr.megapolis_template = v;
        }
        if let Some(v) = get("QR_UNI_TMPL") {
            self.qr.universal_template = v;
        }
        if let Some(v) = get("QR_DEFAULT_IIN") {
            self.qr.iin = v;
        }
        if let Some(v) = get("QR_DEFAULT_CLIENT") {
            self.qr.client = v;
        }
        if let Some(v) = get("QR_DEFAULT_DISTRIBUTOR") {
            self.qr.distributor = v;
        }
        if let Some(v) = get("QR_DEFAULT_AMOUNT") {
            self.qr.amount = v;
        }
        Ok(())
    }

    /// Finder timing as wait options
    #[must_use]
    pub const fn finder_options(&self) -> WaitOptions {
        WaitOptions {
            timeout_ms: self.finder.timeout_ms,
            poll_interval_ms: self.finder.poll_ms,
        }
    }

    /// Direct-locator wait options used by screens
    #[must_use]
    pub const fn screen_wait_options(&self) -> WaitOptions {
        WaitOptions {
            timeout_ms: self.finder.screen_timeout_ms,
            poll_interval_ms: self.finder.poll_ms,
        }
    }

    fn endpoint(&self, platform: Platform) -> ScoutResult<&EndpointConfig> {
        match platform {
            Platform::Android => Ok(&self.android.appium),
            Platform::Ios => Ok(&self.ios.appium),
            Platform::Unknown => Err(ScoutError::config("no Appium endpoint for an unknown platform")),
        }
    }

    /// Host and port, shifted by the worker offset
    pub fn appium_host_port(&self, platform: Platform) -> ScoutResult<(String, u16)> {
        let endpoint = self.endpoint(platform)?;
        let offset = self.worker.unwrap_or(0).checked_mul(WORKER_PORT_STRIDE);
        let port = offset
            .and_then(|o| endpoint.port.checked_add(o))
            .ok_or_else(|| ScoutError::config(format!("worker {:?} overflows port {}", self.worker, endpoint.port)))?;
        Ok((endpoint.host.clone(), port))
    }

    /// Server URL; explicit URLs are used as given
    pub fn appium_url(&self, platform: Platform) -> ScoutResult<String> {
        if let Some(url) = &self.endpoint(platform)?.url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        let (host, port) = self.appium_host_port(platform)?;
        Ok(format!("http://{host}:{port}"))
    }

    /// Resolve the app binary for `platform`; it must exist
    pub fn resolve_app_path(&self, platform: Platform) -> ScoutResult<PathBuf> {
        let specific = match platform {
            Platform::Android => self.android.app_path.as_ref(),
            Platform::Ios => self.ios.app_path.as_ref(),
            Platform::Unknown => None,
        };
        let raw = specific.or(self.app_path.as_ref()).ok_or_else(|| {
            ScoutError::config(format!(
                "{}_APP_PATH or APP_PATH is not set",
                platform.as_str().to_uppercase()
            ))
        })?;
        let path = if raw.is_absolute() {
            raw.clone()
        } else {
            self.base_dir.join(raw)
        };
        if !path.exists() {
            return Err(ScoutError::config(format!("app not found: {}", path.display())));
        }
        Ok(path)
    }

    /// UiAutomator2 capabilities
    pub fn android_capabilities(&self) -> ScoutResult<Value> {
        let a = &self.android;
        let mut caps = Map::new();
        caps.insert("platformName".into(), json!("Android"));
        caps.insert("appium:automationName".into(), json!("UiAutomator2"));
        caps.insert("appium:deviceName".into(), json!(a.device_name));
        caps.insert("appium:udid".into(), json!(a.udid));
        caps.insert("appium:platformVersion".into(), json!(a.platform_version));
        caps.insert("appium:appPackage".into(), json!(a.app_package));
        caps.insert("appium:appActivity".into(), json!(a.app_activity));
        caps.insert(
            "appium:app".into(),
            json!(self.resolve_app_path(Platform::Android)?.display().to_string()),
        );
        caps.insert("appium:autoGrantPermissions".into(), json!(true));
        caps.insert("appium:autoAcceptAlerts".into(), json!(true));
        caps.insert("appium:newCommandTimeout".into(), json!(300));
        if self.ci {
            caps.insert("appium:androidInstallTimeout".into(), json!(90_000));
        }
        Ok(Value::Object(caps))
    }

    /// XCUITest capabilities
    pub fn ios_capabilities(&self) -> ScoutResult<Value> {
        let i = &self.ios;
        let mut caps = Map::new();
        caps.insert("platformName".into(), json!("iOS"));
        caps.insert("appium:automationName".into(), json!("XCUITest"));
        caps.insert("appium:deviceName".into(), json!(i.device_name));
        caps.insert("appium:platformVersion".into(), json!(i.platform_version));
        caps.insert(
            "appium:app".into(),
            json!(self.resolve_app_path(Platform::Ios)?.display().to_string()),
        );
        caps.insert("appium:autoAcceptAlerts".into(), json!(true));
        caps.insert("appium:newCommandTimeout".into(), json!(300));
        if let Some(udid) = &i.udid {
            caps.insert("appium:udid".into(), json!(udid));
        }
        Ok(Value::Object(caps))
    }

    /// Capabilities for `platform`
    pub fn capabilities(&self, platform: Platform) -> ScoutResult<Value> {
        match platform {
            Platform::Android => self.android_capabilities(),
            Platform::Ios => self.ios_capabilities(),
            Platform::Unknown => Err(ScoutError::config("cannot build capabilities for an unknown platform")),
        }
    }
}
