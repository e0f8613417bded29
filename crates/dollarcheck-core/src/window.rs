//! 上下文窗口（按字符下标计算，内部使用）

/// 命中位置之前保留的字符数
pub(crate) const CONTEXT_BEFORE: usize = 5;
/// 命中位置之后保留的字符数（含命中字符本身）
pub(crate) const CONTEXT_AFTER: usize = 6;

/// 将字符下标换算为字节偏移；越界时返回文本长度
fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices().nth(char_idx).map(|(b, _)| b).unwrap_or(text.len())
}

/// 取字符区间 `[start, end)`，自动裁剪到文本边界
pub(crate) fn char_slice(text: &str, start: usize, end: usize) -> &str {
    if end <= start {
        return "";
    }
    let lo = byte_offset(text, start);
    let hi = byte_offset(text, end);
    &text[lo..hi]
}

/// 命中位置附近的上下文：`[max(0, pos-5), pos+6)`
pub(crate) fn context_window(text: &str, position: usize) -> &str {
    char_slice(text, position.saturating_sub(CONTEXT_BEFORE), position + CONTEXT_AFTER)
}

/// 以命中位置为界拆分：命中字符之前 / 之后（均不含命中字符）
pub(crate) fn split_around(text: &str, position: usize) -> (&str, &str) {
    let before = char_slice(text, 0, position);
    let after_start = byte_offset(text, position + 1);
    (before, &text[after_start..])
}
