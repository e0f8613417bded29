//! 美元符号检查核心库
//!
//! 设计要点：
//! - 单次线性扫描，首个 `$` 决定结果；多次出现只报告第一个。
//! - 命中时先上报指标与 span 标签，再交由调用方以 panic 结束（不做恢复）。
//! - 配置与遥测句柄均显式传入，核心不读取进程级全局状态。

mod diagnose;
mod error;
mod options;
mod scan;
mod telemetry;
mod types;
mod window;

pub use diagnose::{env_rows, next_steps, probe_agent, AgentStatus, DoctorReport, EnvRow, FeatureReport, DEFAULT_PROBE_TIMEOUT};
pub use error::{ForbiddenCharacterFound, OptionsError};
pub use options::{keys, CheckerOptions};
pub use scan::{Scanner, ScannerConfig, FORBIDDEN_CHAR, METRIC_DOLLAR_FOUND, METRIC_SUCCESS};
pub use telemetry::{NoopTelemetry, SpanHandle, Tag, TagValue, Telemetry, TracingSpan, TracingTelemetry};
pub use types::{ScanFailure, ScanResult};
