//! 公共类型（对外暴露）
use serde::Serialize;

use crate::error::ForbiddenCharacterFound;

/// 单次扫描的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanResult {
    Success,
    Failure(ScanFailure),
}

/// 命中详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    /// 首个禁用字符的字符下标（从 0 开始）
    pub position: usize,
    /// 命中的字符
    #[serde(rename = "char")]
    pub character: char,
    /// `[max(0, position-5), position+6)` 的上下文窗口
    pub context: String,
}

impl ScanResult {
    /// 转为 `Result`；失败时携带完整原文
    pub fn into_result(self, text: &str) -> Result<(), ForbiddenCharacterFound> {
        match self {
            ScanResult::Success => Ok(()),
            ScanResult::Failure(f) => Err(ForbiddenCharacterFound {
                position: f.position,
                character: f.character,
                text: text.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_status_tag() {
        let ok = serde_json::to_value(ScanResult::Success).unwrap();
        assert_eq!(ok, serde_json::json!({ "status": "success" }));

        let failed = ScanResult::Failure(ScanFailure { position: 0, character: '$', context: "$".into() });
        assert_eq!(
            serde_json::to_value(failed).unwrap(),
            serde_json::json!({ "status": "failure", "position": 0, "char": "$", "context": "$" })
        );
    }
}
