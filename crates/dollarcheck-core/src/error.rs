//! 错误类型（对外暴露）
use std::path::PathBuf;
use thiserror::Error;

/// 扫描命中禁用字符时的错误
///
/// 该错误不会在本地被恢复：CLI 在上报遥测后直接以 panic 结束进程，
/// 交由外部 APM 捕获。消息中原样包含位置与完整输入文本。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Dollar sign ({character}) detected at position {position} in text: '{text}'")]
pub struct ForbiddenCharacterFound {
    pub position: usize,
    pub character: char,
    pub text: String,
}

impl ForbiddenCharacterFound {
    /// 错误类型名（用于指标标签与 span 的 error.type）
    pub const KIND: &'static str = "ForbiddenCharacterFound";

    /// 以 panic 结束当前线程（不可恢复）
    pub fn raise(self) -> ! {
        panic!("{self}")
    }
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid agent port {value:?}: expected an integer in 1..=65535")]
    InvalidPort { value: String },

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
