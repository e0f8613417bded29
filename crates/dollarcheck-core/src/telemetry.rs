//! 遥测协作者（指标 + span 标签）
//!
//! 核心逻辑只通过 `Telemetry` / `SpanHandle` 两个 trait 上报，不关心具体后端：
//! - `TracingTelemetry`：计数器走 `metrics` 门面，span 走 `tracing`。
//! - `NoopTelemetry`：全部丢弃（遥测关闭时使用）。
//!
//! 当前 span 由调用方显式传入扫描函数，不做隐式上下文查找。
use std::fmt;

/// 指标标签（statsd 风格 `key:value`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self { key: key.into(), value: value.to_string() }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

/// span 标签值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => f.write_str(s),
            TagValue::Int(n) => write!(f, "{n}"),
            TagValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self { TagValue::Str(v.to_string()) }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self { TagValue::Str(v) }
}

impl From<char> for TagValue {
    fn from(v: char) -> Self { TagValue::Str(v.to_string()) }
}

impl From<usize> for TagValue {
    fn from(v: usize) -> Self { TagValue::Int(i64::try_from(v).unwrap_or(i64::MAX)) }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self { TagValue::Bool(v) }
}

/// 可附加标签的 span 句柄
pub trait SpanHandle {
    fn set_tag(&mut self, key: &str, value: TagValue);
}

/// 遥测后端
pub trait Telemetry {
    /// 计数器 +1
    fn emit_counter(&self, name: &str, tags: &[Tag]);
    /// 以 `name` 为 resource 开启并进入一个 span；句柄释放时退出
    ///
    /// 在另一个 span 句柄存活期间开启的 span 是它的子 span。
    fn start_span(&self, name: &str) -> Box<dyn SpanHandle>;
}

/// 基于 `metrics` + `tracing` 的实现
///
/// 未安装 metrics recorder 时计数器由门面静默丢弃，但仍会输出一条 debug 日志。
#[derive(Debug, Clone)]
pub struct TracingTelemetry {
    service: String,
}

impl TracingTelemetry {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }
}

impl Telemetry for TracingTelemetry {
    fn emit_counter(&self, name: &str, tags: &[Tag]) {
        let labels: Vec<metrics::Label> = tags
            .iter()
            .map(|t| metrics::Label::new(t.key.clone(), t.value.clone()))
            .collect();
        metrics::counter!(name.to_owned(), labels).increment(1);

        let rendered: Vec<String> = tags.iter().map(Tag::to_string).collect();
        tracing::debug!(metric = name, tags = ?rendered, service = %self.service, "counter incremented");
    }

    fn start_span(&self, name: &str) -> Box<dyn SpanHandle> {
        // 父 span 取当前已进入的 span
        let span = tracing::info_span!("dollar_checker", service = %self.service, resource = %name);
        Box::new(TracingSpan { span: span.entered() })
    }
}

/// 已进入的 `tracing` span；每个标签记为一条挂在该 span 下的 debug 事件
#[derive(Debug)]
pub struct TracingSpan {
    span: tracing::span::EnteredSpan,
}

impl SpanHandle for TracingSpan {
    fn set_tag(&mut self, key: &str, value: TagValue) {
        tracing::debug!(parent: &*self.span, tag.key = key, tag.value = %value, "span tag");
    }
}

/// 空实现（遥测关闭）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

struct NoopSpan;

impl SpanHandle for NoopSpan {
    fn set_tag(&mut self, _key: &str, _value: TagValue) {}
}

impl Telemetry for NoopTelemetry {
    fn emit_counter(&self, _name: &str, _tags: &[Tag]) {}

    fn start_span(&self, _name: &str) -> Box<dyn SpanHandle> {
        Box::new(NoopSpan)
    }
}
