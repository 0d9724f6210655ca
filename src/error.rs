use thiserror::Error;

/// 推送错误类型
#[derive(Debug, Clone, Error)]
pub enum PushError {
    /// 签名错误（密钥无效、算法与密钥不匹配、签名失败）
    #[error("Signing error: {0}")]
    Signing(String),
    /// 网络错误（DNS / TLS / 连接在收到响应前失败）
    #[error("Transport error: {0}")]
    Transport(String),
    /// Provider 返回非成功状态
    #[error("Provider rejected request: {}{}", .status, reason_suffix(.reason))]
    Rejected {
        status: String,
        reason: Option<String>,
    },
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),
    /// IO 错误
    #[error("IO error: {0}")]
    Io(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(" ({})", reason),
        None => String::new(),
    }
}

impl PushError {
    /// 用于 `DispatchResult.detail` 的描述
    ///
    /// Provider 拒绝时只返回状态与原因，其余错误统一以 `exception:` 开头
    pub fn detail(&self) -> String {
        match self {
            PushError::Rejected { status, reason } => {
                format!("{}{}", status, reason_suffix(reason))
            }
            other => format!("exception: {}", other),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, PushError::Rejected { .. })
    }
}

impl From<std::io::Error> for PushError {
    fn from(err: std::io::Error) -> Self {
        PushError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PushError {
    fn from(err: serde_json::Error) -> Self {
        PushError::Serialization(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for PushError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        PushError::Signing(err.to_string())
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PushError::Timeout(error_chain(&err))
        } else {
            PushError::Transport(error_chain(&err))
        }
    }
}

/// 拼接错误及其 `source()` 链，例如
/// `error sending request: client error (Connect): Connection refused`
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // 部分错误的 Display 已包含下层信息
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

impl From<tokio::time::error::Elapsed> for PushError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        PushError::Timeout(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, PushError>;
