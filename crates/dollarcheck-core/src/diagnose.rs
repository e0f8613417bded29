//! 配置自检（doctor 子命令使用）
//!
//! 只负责收集结构化结果，文本渲染由 CLI 完成。
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::options::{keys, CheckerOptions, DEFAULT_AGENT_HOST, DEFAULT_AGENT_PORT};

/// agent 探测的默认超时
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// 凭据展示时使用的掩码
const SECRET_MASK: &str = "********************";

/// 工具自身信息
#[derive(Debug, Clone, Serialize)]
pub struct FeatureReport {
    pub tool: &'static str,
    pub version: &'static str,
    pub trace_enabled: bool,
    pub service: String,
    pub environment: String,
}

/// 单个环境变量的展示行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvRow {
    pub key: &'static str,
    pub display: String,
}

/// agent 探测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    UnexpectedStatus(u16),
    Unreachable(String),
    TimedOut,
}

/// doctor 汇总
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub features: FeatureReport,
    pub env: Vec<EnvRow>,
    pub agent_address: String,
    pub agent: AgentStatus,
}

impl FeatureReport {
    pub fn collect(opts: &CheckerOptions) -> Self {
        Self {
            tool: "dollar-checker",
            version: env!("CARGO_PKG_VERSION"),
            trace_enabled: opts.trace_enabled,
            service: opts.service.clone(),
            environment: opts.environment().to_string(),
        }
    }
}

/// 按固定顺序生成环境变量展示行
///
/// 只看键是否真的出现过（环境变量或配置文件），不拿解析后的值与默认值比较；
/// 凭据只显示是否设置。
pub fn env_rows(opts: &CheckerOptions) -> Vec<EnvRow> {
    let shown = |key: &'static str, unset: String| EnvRow {
        key,
        display: opts.raw(key).map(str::to_string).unwrap_or(unset),
    };
    let secret = |key: &'static str| EnvRow {
        key,
        display: match opts.raw(key) {
            Some(v) if !v.is_empty() => format!("{SECRET_MASK} (set)"),
            _ => "not set".to_string(),
        },
    };
    let not_set = || "not set".to_string();

    vec![
        shown(keys::TRACE_ENABLED, not_set()),
        shown(keys::SERVICE, not_set()),
        shown(keys::ENV, not_set()),
        shown(keys::VERSION, not_set()),
        shown(keys::AGENT_HOST, format!("not set (default: {DEFAULT_AGENT_HOST})")),
        shown(keys::AGENT_PORT, format!("not set (default: {DEFAULT_AGENT_PORT})")),
        secret(keys::API_KEY),
        secret(keys::APP_KEY),
    ]
}

/// GET `http://{host}:{port}/info`，不重试
pub fn probe_agent(opts: &CheckerOptions, timeout: Duration) -> AgentStatus {
    let url = opts.agent_info_url();
    debug!(%url, ?timeout, "probing agent");

    let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => return AgentStatus::Unreachable(e.to_string()),
    };

    match client.get(&url).send() {
        Ok(resp) if resp.status() == reqwest::StatusCode::OK => AgentStatus::Running,
        Ok(resp) => {
            warn!(status = resp.status().as_u16(), "agent answered with unexpected status");
            AgentStatus::UnexpectedStatus(resp.status().as_u16())
        }
        Err(e) if e.is_timeout() => AgentStatus::TimedOut,
        Err(e) => AgentStatus::Unreachable(e.to_string()),
    }
}

impl DoctorReport {
    pub fn collect(opts: &CheckerOptions, timeout: Duration) -> Self {
        Self {
            features: FeatureReport::collect(opts),
            env: env_rows(opts),
            agent_address: format!("{}:{}", opts.agent_host, opts.agent_port),
            agent: probe_agent(opts, timeout),
        }
    }
}

/// 自检结束后给出的后续步骤
pub fn next_steps() -> &'static [&'static str] {
    &[
        "Make sure the Datadog Agent is running",
        "Set DD_API_KEY and DD_APP_KEY in the environment or the config file",
        "Run: dollar-checker check 'test $'",
        "Go to Datadog: APM → Error Tracking",
        "Look for ForbiddenCharacterFound panics",
        "Click on the error → look for the 'Exception Replay' or 'Variables' tab",
    ]
}
