//! 运行选项（环境变量 + 可选 TOML 文件）
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::error::OptionsError;
use crate::scan::ScannerConfig;

pub const DEFAULT_SERVICE: &str = "dollar-checker";
pub const DEFAULT_AGENT_HOST: &str = "localhost";
pub const DEFAULT_AGENT_PORT: u16 = 8126;
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// 读取的环境变量名
pub mod keys {
    pub const TRACE_ENABLED: &str = "DD_TRACE_ENABLED";
    pub const SERVICE: &str = "DD_SERVICE";
    pub const ENV: &str = "DD_ENV";
    pub const VERSION: &str = "DD_VERSION";
    pub const AGENT_HOST: &str = "DD_AGENT_HOST";
    pub const AGENT_PORT: &str = "DD_AGENT_PORT";
    pub const API_KEY: &str = "DD_API_KEY";
    pub const APP_KEY: &str = "DD_APP_KEY";
}

/// 运行选项：启动时读取一次，之后显式向下传递
#[derive(Clone, PartialEq, Eq)]
pub struct CheckerOptions {
    pub trace_enabled: bool,
    pub service: String,
    pub env: Option<String>,
    pub version: Option<String>,
    pub agent_host: String,
    pub agent_port: u16,
    pub api_key: Option<String>,
    pub app_key: Option<String>,
    /// 实际出现过的键（环境变量名 -> 原始值），来自环境变量或配置文件
    pub provided: BTreeMap<&'static str, String>,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            trace_enabled: true,
            service: DEFAULT_SERVICE.to_string(),
            env: None,
            version: None,
            agent_host: DEFAULT_AGENT_HOST.to_string(),
            agent_port: DEFAULT_AGENT_PORT,
            api_key: None,
            app_key: None,
            provided: BTreeMap::new(),
        }
    }
}

// 凭据不进日志
impl fmt::Debug for CheckerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckerOptions")
            .field("trace_enabled", &self.trace_enabled)
            .field("service", &self.service)
            .field("env", &self.env)
            .field("version", &self.version)
            .field("agent_host", &self.agent_host)
            .field("agent_port", &self.agent_port)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("app_key", &self.app_key.as_ref().map(|_| "<redacted>"))
            .field("provided", &self.provided.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// TOML 配置文件结构（字段均可缺省）
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
    trace_enabled: Option<bool>,
    service: Option<String>,
    env: Option<String>,
    version: Option<String>,
    agent_host: Option<String>,
    agent_port: Option<u16>,
    api_key: Option<String>,
    app_key: Option<String>,
}

impl CheckerOptions {
    /// 从进程环境读取
    pub fn from_env() -> Result<Self, OptionsError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// 从任意键值来源读取（便于测试）
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, OptionsError> {
        let mut opts = Self::default();
        opts.apply_lookup(lookup)?;
        Ok(opts)
    }

    /// 先读 TOML 文件，再用环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self, OptionsError> {
        let Some(p) = path else { return Self::from_env() };
        let mut opts = Self::from_file(p)?;
        opts.apply_lookup(|k| std::env::var(k).ok())?;
        Ok(opts)
    }

    /// 仅从 TOML 文件读取；未出现的字段取默认值
    pub fn from_file(path: &Path) -> Result<Self, OptionsError> {
        let txt = std::fs::read_to_string(path)
            .map_err(|source| OptionsError::Read { path: path.to_path_buf(), source })?;
        let parsed: OptionsFile =
            toml::from_str(&txt).map_err(|source| OptionsError::Parse { path: path.to_path_buf(), source })?;

        let mut provided = BTreeMap::new();
        let mut note = |key: &'static str, v: Option<String>| {
            if let Some(v) = v { provided.insert(key, v); }
        };
        note(keys::TRACE_ENABLED, parsed.trace_enabled.map(|v| v.to_string()));
        note(keys::SERVICE, parsed.service.clone());
        note(keys::ENV, parsed.env.clone());
        note(keys::VERSION, parsed.version.clone());
        note(keys::AGENT_HOST, parsed.agent_host.clone());
        note(keys::AGENT_PORT, parsed.agent_port.map(|v| v.to_string()));
        note(keys::API_KEY, parsed.api_key.clone());
        note(keys::APP_KEY, parsed.app_key.clone());

        let d = Self::default();
        Ok(Self {
            trace_enabled: parsed.trace_enabled.unwrap_or(d.trace_enabled),
            service: parsed.service.unwrap_or(d.service),
            env: parsed.env,
            version: parsed.version,
            agent_host: parsed.agent_host.unwrap_or(d.agent_host),
            agent_port: match parsed.agent_port {
                Some(0) => return Err(OptionsError::InvalidPort { value: "0".to_string() }),
                Some(p) => p,
                None => d.agent_port,
            },
            api_key: parsed.api_key,
            app_key: parsed.app_key,
            provided,
        })
    }

    fn apply_lookup(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), OptionsError> {
        // 记录原始值（含空串），doctor 据此判断是否设置
        let mut lookup = |key: &'static str| {
            let v = lookup(key);
            if let Some(raw) = &v { self.provided.insert(key, raw.clone()); }
            v
        };
        let trace = lookup(keys::TRACE_ENABLED);
        let service = lookup(keys::SERVICE);
        let env = lookup(keys::ENV);
        let version = lookup(keys::VERSION);
        let host = lookup(keys::AGENT_HOST);
        let port = lookup(keys::AGENT_PORT);
        let api_key = lookup(keys::API_KEY);
        let app_key = lookup(keys::APP_KEY);

        if let Some(v) = trace {
            // 仅 "true"（忽略大小写）视为开启
            self.trace_enabled = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = non_empty(service) { self.service = v; }
        if let Some(v) = non_empty(env) { self.env = Some(v); }
        if let Some(v) = non_empty(version) { self.version = Some(v); }
        if let Some(v) = non_empty(host) { self.agent_host = v; }
        if let Some(v) = non_empty(port) {
            // 端口只在遥测开启时校验；关闭时保留默认值
            match parse_port(&v) {
                Ok(p) => self.agent_port = p,
                Err(e) if self.trace_enabled => return Err(e),
                Err(_) => warn!(value = %v, "ignoring invalid agent port while tracing is disabled"),
            }
        }
        if let Some(v) = non_empty(api_key) { self.api_key = Some(v); }
        if let Some(v) = non_empty(app_key) { self.app_key = Some(v); }
        Ok(())
    }

    /// 校验显式给出的 agent 端口（doctor 无论遥测开关都会探测 agent）
    pub fn validate_agent_port(&self) -> Result<(), OptionsError> {
        match non_empty(self.provided.get(keys::AGENT_PORT).cloned()) {
            Some(v) => parse_port(&v).map(|_| ()),
            None => Ok(()),
        }
    }

    /// 该键是否在环境变量或配置文件中出现过
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.provided.get(key).map(String::as_str)
    }

    /// 展示用的部署环境名（未设置时为 development）
    pub fn environment(&self) -> &str {
        self.env.as_deref().unwrap_or(DEFAULT_ENVIRONMENT)
    }

    /// agent `/info` 地址
    pub fn agent_info_url(&self) -> String {
        format!("http://{}:{}/info", self.agent_host, self.agent_port)
    }

    /// 派生扫描器配置
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig { telemetry_enabled: self.trace_enabled, service: self.service.clone() }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn parse_port(s: &str) -> Result<u16, OptionsError> {
    match s.trim().parse::<u16>() {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(OptionsError::InvalidPort { value: s.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let opts = CheckerOptions::from_lookup(|_| None).unwrap();
        assert_eq!(opts, CheckerOptions::default());
        assert!(opts.trace_enabled);
        assert_eq!(opts.environment(), "development");
        assert_eq!(opts.agent_info_url(), "http://localhost:8126/info");
    }

    #[test]
    fn reads_all_keys() {
        let opts = CheckerOptions::from_lookup(lookup_from(&[
            ("DD_TRACE_ENABLED", "TRUE"),
            ("DD_SERVICE", "svc"),
            ("DD_ENV", "staging"),
            ("DD_VERSION", "2.1.0"),
            ("DD_AGENT_HOST", "agent.local"),
            ("DD_AGENT_PORT", "9000"),
            ("DD_API_KEY", "secret-api"),
            ("DD_APP_KEY", "secret-app"),
        ]))
        .unwrap();

        assert!(opts.trace_enabled);
        assert_eq!(opts.service, "svc");
        assert_eq!(opts.environment(), "staging");
        assert_eq!(opts.version.as_deref(), Some("2.1.0"));
        assert_eq!(opts.agent_info_url(), "http://agent.local:9000/info");
        assert_eq!(opts.api_key.as_deref(), Some("secret-api"));
        assert_eq!(opts.app_key.as_deref(), Some("secret-app"));
    }

    #[test]
    fn anything_but_true_disables_tracing() {
        for v in ["false", "0", "yes", ""] {
            let opts = CheckerOptions::from_lookup(lookup_from(&[("DD_TRACE_ENABLED", v)])).unwrap();
            assert!(!opts.trace_enabled, "value {v:?}");
            assert!(!opts.scanner_config().telemetry_enabled);
        }
    }

    #[test]
    fn invalid_port_is_rejected() {
        for v in ["abc", "0", "70000"] {
            let err = CheckerOptions::from_lookup(lookup_from(&[("DD_AGENT_PORT", v)])).unwrap_err();
            assert!(matches!(err, OptionsError::InvalidPort { .. }), "value {v:?}");
        }
    }

    #[test]
    fn invalid_port_ignored_when_tracing_disabled() {
        let opts = CheckerOptions::from_lookup(lookup_from(&[
            ("DD_TRACE_ENABLED", "false"),
            ("DD_AGENT_PORT", "not-a-port"),
        ]))
        .unwrap();
        assert_eq!(opts.agent_port, 8126);
        assert!(matches!(opts.validate_agent_port(), Err(OptionsError::InvalidPort { .. })));
    }

    #[test]
    fn provided_keys_track_presence_not_value() {
        let opts = CheckerOptions::from_lookup(lookup_from(&[
            ("DD_AGENT_HOST", "localhost"),
            ("DD_AGENT_PORT", "8126"),
            ("DD_ENV", ""),
        ]))
        .unwrap();
        assert_eq!(opts.raw("DD_AGENT_HOST"), Some("localhost"));
        assert_eq!(opts.raw("DD_AGENT_PORT"), Some("8126"));
        assert_eq!(opts.raw("DD_ENV"), Some(""));
        assert_eq!(opts.raw("DD_SERVICE"), None);
        assert_eq!(opts.raw("DD_TRACE_ENABLED"), None);
        assert!(opts.validate_agent_port().is_ok());
    }

    #[test]
    fn debug_masks_credentials() {
        let opts = CheckerOptions::from_lookup(lookup_from(&[("DD_API_KEY", "hunter2")])).unwrap();
        let dbg = format!("{opts:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn file_values_with_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "service = \"from-file\"\nagent_port = 8200\ntrace_enabled = false").unwrap();

        let opts = CheckerOptions::from_file(f.path()).unwrap();
        assert_eq!(opts.raw("DD_SERVICE"), Some("from-file"));
        assert_eq!(opts.raw("DD_AGENT_HOST"), None);
        assert_eq!(opts.service, "from-file");
        assert_eq!(opts.agent_port, 8200);
        assert!(!opts.trace_enabled);
        assert_eq!(opts.agent_host, "localhost");
    }

    #[test]
    fn env_overrides_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "service = \"from-file\"\nenv = \"prod\"").unwrap();

        let mut opts = CheckerOptions::from_file(f.path()).unwrap();
        opts.apply_lookup(lookup_from(&[("DD_SERVICE", "from-env")])).unwrap();
        assert_eq!(opts.service, "from-env");
        assert_eq!(opts.environment(), "prod");
    }

    #[test]
    fn unknown_file_field_is_parse_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "colour = \"blue\"").unwrap();
        assert!(matches!(CheckerOptions::from_file(f.path()), Err(OptionsError::Parse { .. })));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = CheckerOptions::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, OptionsError::Read { .. }));
    }
}
