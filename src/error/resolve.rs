//! 曲目解析相关错误

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// 没有找到匹配的曲目
    #[error("未找到曲目: {0}")]
    NotFound(String),
}
