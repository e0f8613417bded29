//! 扫描与上报主流程
use tracing::{error, info};

use crate::error::ForbiddenCharacterFound;
use crate::telemetry::{SpanHandle, Tag, Telemetry};
use crate::types::{ScanFailure, ScanResult};
use crate::window::{context_window, split_around};

/// 禁用字符
pub const FORBIDDEN_CHAR: char = '$';

/// 命中时的计数器名
pub const METRIC_DOLLAR_FOUND: &str = "dollar_checker.dollar_found";
/// 通过时的计数器名
pub const METRIC_SUCCESS: &str = "dollar_checker.success";

/// 扫描器配置（构造时显式传入，不读取进程级全局状态）
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// 关闭时不上报计数器，也不写错误/结果类 span 标签
    pub telemetry_enabled: bool,
    /// 写入 `app.name` 标签的服务名
    pub service: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { telemetry_enabled: true, service: "dollar-checker".to_string() }
    }
}

/// 扫描器：单次线性扫描 + 遥测上报
pub struct Scanner<'t> {
    config: ScannerConfig,
    telemetry: &'t dyn Telemetry,
}

impl<'t> Scanner<'t> {
    pub fn new(config: ScannerConfig, telemetry: &'t dyn Telemetry) -> Self {
        Self { config, telemetry }
    }

    /// 扫描 `text`，首个 `$` 决定结果；返回前完成指标与 span 标签上报
    pub fn scan(&self, text: &str, mut span: Option<&mut dyn SpanHandle>) -> ScanResult {
        if let Some(s) = span.as_deref_mut() {
            s.set_tag("app.name", self.config.service.as_str().into());
            s.set_tag("input.text", text.into());
            s.set_tag("input.length", text.chars().count().into());
            s.set_tag("check.character", FORBIDDEN_CHAR.into());
        }

        let hit = text.chars().position(|c| c == FORBIDDEN_CHAR);
        let Some(position) = hit else {
            info!(length = text.len(), "no dollar sign found");
            if self.config.telemetry_enabled {
                self.telemetry.emit_counter(METRIC_SUCCESS, &[]);
                if let Some(s) = span.as_deref_mut() {
                    s.set_tag("dollar.found", false.into());
                    s.set_tag("validation.passed", true.into());
                }
            }
            return ScanResult::Success;
        };

        let context = context_window(text, position);
        error!(position, context, "dollar sign detected");

        if self.config.telemetry_enabled {
            self.telemetry.emit_counter(
                METRIC_DOLLAR_FOUND,
                &[
                    Tag::new("position", position),
                    Tag::new("status", "error"),
                    Tag::new("exception", ForbiddenCharacterFound::KIND),
                ],
            );
            if let Some(s) = span.as_deref_mut() {
                let (before, after) = split_around(text, position);
                s.set_tag("error", true.into());
                s.set_tag("error.type", ForbiddenCharacterFound::KIND.into());
                s.set_tag("error.message", format!("Dollar sign found at position {position}").into());
                s.set_tag("dollar.found", true.into());
                s.set_tag("dollar.position", position.into());
                s.set_tag("dollar.context", context.into());
                s.set_tag("debug.input_text", text.into());
                s.set_tag("debug.character_index", position.into());
                s.set_tag("debug.before_context", before.into());
                s.set_tag("debug.after_context", after.into());
            }
        }

        ScanResult::Failure(ScanFailure { position, character: FORBIDDEN_CHAR, context: context.to_string() })
    }

    /// 扫描并将命中转换为 `ForbiddenCharacterFound`
    pub fn check(&self, text: &str, span: Option<&mut dyn SpanHandle>) -> Result<(), ForbiddenCharacterFound> {
        self.scan(text, span).into_result(text)
    }

    /// 扫描；命中时直接 panic（不做任何恢复，交由外部捕获）
    pub fn check_or_panic(&self, text: &str, span: Option<&mut dyn SpanHandle>) {
        if let Err(e) = self.check(text, span) {
            e.raise();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::recording::{RecordingSpan, RecordingTelemetry};
    use crate::telemetry::{NoopTelemetry, TagValue};
    use pretty_assertions::assert_eq;

    fn failure(position: usize, context: &str) -> ScanResult {
        ScanResult::Failure(ScanFailure { position, character: '$', context: context.to_string() })
    }

    #[test]
    fn examples() {
        let scanner = Scanner::new(ScannerConfig::default(), &NoopTelemetry);
        assert_eq!(scanner.scan("Hello World", None), ScanResult::Success);
        assert_eq!(scanner.scan("", None), ScanResult::Success);
        assert_eq!(scanner.scan("Price: $50", None), failure(7, "ice: $50"));
        assert_eq!(scanner.scan("$", None), failure(0, "$"));
    }

    #[test]
    fn only_first_occurrence_is_reported() {
        let scanner = Scanner::new(ScannerConfig::default(), &NoopTelemetry);
        assert_eq!(scanner.scan("a$b$c", None), failure(1, "a$b$c"));
    }

    #[test]
    fn position_is_character_index() {
        let scanner = Scanner::new(ScannerConfig::default(), &NoopTelemetry);
        assert_eq!(scanner.scan("€€€ $", None), failure(4, "€€€ $"));
    }

    #[test]
    fn failure_emits_counter_with_tags() {
        let rec = RecordingTelemetry::default();
        let scanner = Scanner::new(ScannerConfig::default(), &rec);
        scanner.scan("Price: $50", None);
        assert_eq!(
            rec.counters(),
            vec![(
                METRIC_DOLLAR_FOUND.to_string(),
                vec!["position:7".to_string(), "status:error".to_string(), "exception:ForbiddenCharacterFound".to_string()],
            )]
        );
    }

    #[test]
    fn success_emits_success_counter() {
        let rec = RecordingTelemetry::default();
        let scanner = Scanner::new(ScannerConfig::default(), &rec);
        scanner.scan("Hello World", None);
        assert_eq!(rec.counters(), vec![(METRIC_SUCCESS.to_string(), Vec::<String>::new())]);
    }

    #[test]
    fn disabled_telemetry_emits_nothing() {
        let rec = RecordingTelemetry::default();
        let config = ScannerConfig { telemetry_enabled: false, ..ScannerConfig::default() };
        let scanner = Scanner::new(config, &rec);
        let mut span = RecordingSpan::default();
        let result = scanner.scan("Price: $50", Some(&mut span));

        assert_eq!(result, failure(7, "ice: $50"));
        assert!(rec.counters().is_empty());
        // 入口标签始终写入，错误标签不写
        assert_eq!(span.get("input.text"), Some(TagValue::Str("Price: $50".into())));
        assert_eq!(span.get("error"), None);
    }

    #[test]
    fn failure_tags_span_with_debug_context() {
        let rec = RecordingTelemetry::default();
        let scanner = Scanner::new(ScannerConfig::default(), &rec);
        let mut span = RecordingSpan::default();
        scanner.scan("Price: $50", Some(&mut span));

        assert_eq!(span.get("app.name"), Some(TagValue::Str("dollar-checker".into())));
        assert_eq!(span.get("input.length"), Some(TagValue::Int(10)));
        assert_eq!(span.get("error"), Some(TagValue::Bool(true)));
        assert_eq!(span.get("error.type"), Some(TagValue::Str("ForbiddenCharacterFound".into())));
        assert_eq!(span.get("dollar.position"), Some(TagValue::Int(7)));
        assert_eq!(span.get("dollar.context"), Some(TagValue::Str("ice: $50".into())));
        assert_eq!(span.get("debug.input_text"), Some(TagValue::Str("Price: $50".into())));
        assert_eq!(span.get("debug.before_context"), Some(TagValue::Str("Price: ".into())));
        assert_eq!(span.get("debug.after_context"), Some(TagValue::Str("50".into())));
    }

    #[test]
    fn success_tags_span() {
        let scanner = Scanner::new(ScannerConfig::default(), &NoopTelemetry);
        let mut span = RecordingSpan::default();
        scanner.scan("Hello World", Some(&mut span));
        assert_eq!(span.get("dollar.found"), Some(TagValue::Bool(false)));
        assert_eq!(span.get("validation.passed"), Some(TagValue::Bool(true)));
    }

    #[test]
    fn check_returns_error_with_full_text() {
        let scanner = Scanner::new(ScannerConfig::default(), &NoopTelemetry);
        let err = scanner.check("Cost is $100", None).unwrap_err();
        assert_eq!(err.position, 8);
        assert_eq!(err.text, "Cost is $100");
        assert!(scanner.check("Price: 50 dollars", None).is_ok());
    }

    #[test]
    #[should_panic(expected = "Dollar sign ($) detected at position 0 in text: '$'")]
    fn check_or_panic_panics_on_hit() {
        let scanner = Scanner::new(ScannerConfig::default(), &NoopTelemetry);
        scanner.check_or_panic("$", None);
    }
}
