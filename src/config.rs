use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PushError;
use crate::push::credential::{ApnsCredential, FcmCredential, KeySource, DEFAULT_TOKEN_TTL_MINUTES};
use crate::push::provider::apns::APNS_DEFAULT_PORT;
use crate::push::types::ApnsEnvironment;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "push.toml";

/// APNs 拒绝超过 60 分钟的 token
const APNS_MAX_TOKEN_TTL_MINUTES: u32 = 60;
/// 20 分钟内重复签发会被 APNs 限流
const APNS_MIN_REISSUE_MINUTES: u32 = 20;

/// 推送配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// FCM legacy HTTP 配置
    pub fcm: FcmSettings,
    /// APNs 配置
    pub apns: ApnsSettings,
    /// HTTP 客户端配置
    pub http: HttpSettings,
    /// 日志配置
    pub logging: LoggingSettings,
}

/// FCM 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FcmSettings {
    /// FCM server key（敏感，建议用环境变量覆盖）
    pub server_key: Option<String>,
    /// FCM sender ID
    pub sender_id: Option<String>,
    /// Android 通知默认 tag
    pub alarm_tag: String,
    /// 接口地址覆盖（代理或测试）
    pub endpoint: Option<String>,
}

impl Default for FcmSettings {
    fn default() -> Self {
        Self {
            server_key: None,
            sender_id: None,
            alarm_tag: "alarm".to_string(),
            endpoint: None,
        }
    }
}

/// APNs 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApnsSettings {
    /// Apple Developer Team ID
    pub team_id: Option<String>,
    /// App Bundle ID
    pub bundle_id: Option<String>,
    /// APNs Key ID
    pub key_id: Option<String>,
    /// 私钥文件路径（.p8）
    pub private_key_path: Option<String>,
    /// 私钥 PEM 内容（优先于 private_key_path）
    pub private_key: Option<String>,
    /// 签名算法
    pub algorithm: String,
    /// production / sandbox
    pub environment: ApnsEnvironment,
    /// token 缓存时间（分钟），0 表示每次都重新签发
    pub token_ttl_minutes: u32,
    /// 端口：443 或 2197
    pub port: u16,
    /// 接口地址覆盖（代理或测试）
    pub endpoint: Option<String>,
}

impl Default for ApnsSettings {
    fn default() -> Self {
        Self {
            team_id: None,
            bundle_id: None,
            key_id: None,
            private_key_path: None,
            private_key: None,
            algorithm: "ES256".to_string(),
            environment: ApnsEnvironment::Production,
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            port: APNS_DEFAULT_PORT,
            endpoint: None,
        }
    }
}

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 建连超时（秒）
    pub connect_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl HttpSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// 日志配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

/// 配置段状态
#[derive(Debug)]
pub enum SectionStatus<T> {
    /// 完全未配置
    Missing,
    /// 部分配置，列出缺失字段
    Incomplete(Vec<&'static str>),
    Ready(T),
}

impl FcmSettings {
    pub fn status(&self) -> SectionStatus<FcmCredential> {
        match (&self.server_key, &self.sender_id) {
            (Some(server_key), Some(sender_id)) => SectionStatus::Ready(FcmCredential::new(
                server_key.clone(),
                sender_id.clone(),
                self.alarm_tag.clone(),
            )),
            (None, None) => SectionStatus::Missing,
            (None, Some(_)) => SectionStatus::Incomplete(vec!["server_key"]),
            (Some(_), None) => SectionStatus::Incomplete(vec!["sender_id"]),
        }
    }
}

impl ApnsSettings {
    /// 构建 APNs 凭据；私钥解析失败返回 `PushError::Signing`
    pub fn status(&self) -> Result<SectionStatus<ApnsCredential>, PushError> {
        let has_key = self.private_key.is_some() || self.private_key_path.is_some();
        let fields = [
            ("team_id", self.team_id.is_some()),
            ("bundle_id", self.bundle_id.is_some()),
            ("key_id", self.key_id.is_some()),
            ("private_key_path", has_key),
        ];

        let missing: Vec<&'static str> = fields
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect();

        if missing.len() == fields.len() {
            return Ok(SectionStatus::Missing);
        }
        if !missing.is_empty() {
            return Ok(SectionStatus::Incomplete(missing));
        }

        let key = match (&self.private_key, &self.private_key_path) {
            (Some(pem), _) => KeySource::Pem(pem.as_bytes()),
            (None, Some(path)) => KeySource::Path(Path::new(path)),
            (None, None) => return Ok(SectionStatus::Incomplete(vec!["private_key_path"])),
        };

        let credential = ApnsCredential::new(
            self.team_id.clone().unwrap_or_default(),
            self.bundle_id.clone().unwrap_or_default(),
            self.key_id.clone().unwrap_or_default(),
            key,
            &self.algorithm,
            self.environment,
            self.token_ttl_minutes,
        )?;

        Ok(SectionStatus::Ready(credential))
    }
}

/// 配置检查结果
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl PushConfig {
    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("配置文件格式错误")
    }

    /// 从环境变量合并配置（PUSH_ 前缀）
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_lookup(|key| env::var(key).ok())
    }

    fn merge_from_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // FCM
        if let Some(v) = lookup("PUSH_FCM_SERVER_KEY") {
            self.fcm.server_key = Some(v);
        }
        if let Some(v) = lookup("PUSH_FCM_SENDER_ID") {
            self.fcm.sender_id = Some(v);
        }
        if let Some(v) = lookup("PUSH_FCM_ALARM_TAG") {
            self.fcm.alarm_tag = v;
        }
        if let Some(v) = lookup("PUSH_FCM_ENDPOINT") {
            self.fcm.endpoint = Some(v);
        }

        // APNs
        if let Some(v) = lookup("PUSH_APNS_TEAM_ID") {
            self.apns.team_id = Some(v);
        }
        if let Some(v) = lookup("PUSH_APNS_BUNDLE_ID") {
            self.apns.bundle_id = Some(v);
        }
        if let Some(v) = lookup("PUSH_APNS_KEY_ID") {
            self.apns.key_id = Some(v);
        }
        if let Some(v) = lookup("PUSH_APNS_PRIVATE_KEY_PATH") {
            self.apns.private_key_path = Some(v);
        }
        if let Some(v) = lookup("PUSH_APNS_PRIVATE_KEY") {
            self.apns.private_key = Some(v);
        }
        if let Some(v) = lookup("PUSH_APNS_ALGORITHM") {
            self.apns.algorithm = v;
        }
        if let Some(v) = lookup("PUSH_APNS_ENVIRONMENT") {
            self.apns.environment = v.parse().context("PUSH_APNS_ENVIRONMENT")?;
        }
        if let Some(v) = lookup("PUSH_APNS_TOKEN_TTL_MINUTES") {
            self.apns.token_ttl_minutes = v.parse().context("PUSH_APNS_TOKEN_TTL_MINUTES")?;
        }
        if let Some(v) = lookup("PUSH_APNS_PORT") {
            self.apns.port = v.parse().context("PUSH_APNS_PORT")?;
        }
        if let Some(v) = lookup("PUSH_APNS_ENDPOINT") {
            self.apns.endpoint = Some(v);
        }

        // HTTP
        if let Some(v) = lookup("PUSH_HTTP_REQUEST_TIMEOUT_SECS") {
            self.http.request_timeout_secs = v.parse().context("PUSH_HTTP_REQUEST_TIMEOUT_SECS")?;
        }

        // 日志
        if let Some(v) = lookup("PUSH_LOG_LEVEL") {
            self.logging.level = Some(v);
        }
        if let Some(v) = lookup("PUSH_LOG_FORMAT") {
            self.logging.format = Some(v);
        }

        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(level) = cli.get_log_level() {
            self.logging.level = Some(level);
        }
        if let Some(format) = cli.get_log_format() {
            self.logging.format = Some(format);
        }
        if let Some(file) = &cli.log_file {
            self.logging.file = Some(file.clone());
        }
        if let Some(env) = cli.apns_environment {
            self.apns.environment = env;
        }
        if let Some(timeout) = cli.request_timeout {
            self.http.request_timeout_secs = timeout;
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = match &cli.config_file {
            Some(config_file) if Path::new(config_file).exists() => {
                info!("从配置文件加载: {}", config_file);
                Self::from_toml_file(config_file)?
            }
            Some(config_file) => {
                tracing::warn!("配置文件不存在: {}", config_file);
                Self::default()
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("从默认配置文件加载: {}", DEFAULT_CONFIG_FILE);
                Self::from_toml_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        config.merge_from_env()?;
        config.merge_from_cli(cli);

        Ok(config)
    }

    /// 检查配置完整性和 token TTL 策略
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        let fcm_ready = match self.fcm.status() {
            SectionStatus::Ready(_) => true,
            SectionStatus::Missing => false,
            SectionStatus::Incomplete(missing) => {
                report
                    .errors
                    .push(format!("[fcm] incomplete, missing: {}", missing.join(", ")));
                false
            }
        };

        let apns_ready = match self.apns.status() {
            Ok(SectionStatus::Ready(_)) => true,
            Ok(SectionStatus::Missing) => false,
            Ok(SectionStatus::Incomplete(missing)) => {
                report
                    .errors
                    .push(format!("[apns] incomplete, missing: {}", missing.join(", ")));
                false
            }
            Err(e) => {
                report.errors.push(format!("[apns] {}", e));
                false
            }
        };

        if !fcm_ready && !apns_ready && report.errors.is_empty() {
            report
                .warnings
                .push("no push provider configured; every send will fail".to_string());
        }

        let ttl = self.apns.token_ttl_minutes;
        if ttl > APNS_MAX_TOKEN_TTL_MINUTES {
            report.errors.push(format!(
                "[apns] token_ttl_minutes={} exceeds the provider maximum of {} minutes",
                ttl, APNS_MAX_TOKEN_TTL_MINUTES
            ));
        } else if ttl < APNS_MIN_REISSUE_MINUTES {
            report.warnings.push(format!(
                "[apns] token_ttl_minutes={} is below {} minutes; the provider may throttle token reissue",
                ttl, APNS_MIN_REISSUE_MINUTES
            ));
        }

        if self.http.request_timeout_secs == 0 {
            report
                .errors
                .push("[http] request_timeout_secs must be greater than 0".to_string());
        }

        report
    }

    /// 隐藏敏感字段后的副本（用于展示）
    pub fn masked(&self) -> Self {
        let mut config = self.clone();
        if config.fcm.server_key.is_some() {
            config.fcm.server_key = Some("***".to_string());
        }
        if config.apns.private_key.is_some() {
            config.apns.private_key = Some("***".to_string());
        }
        config
    }
}

/// 启动早期只读取 [logging] 段
pub fn load_early_logging_config(config_file: Option<&str>) -> LoggingSettings {
    #[derive(Deserialize)]
    struct EarlyConfig {
        logging: Option<LoggingSettings>,
    }

    let path = config_file.unwrap_or(DEFAULT_CONFIG_FILE);
    fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<EarlyConfig>(&content).ok())
        .and_then(|c| c.logging)
        .unwrap_or_default()
}

/// 默认配置文件内容
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# push-dispatch 配置文件
# 此文件由 push-dispatch generate-config 生成
# 敏感字段建议用环境变量覆盖（PUSH_FCM_SERVER_KEY / PUSH_APNS_PRIVATE_KEY）

[fcm]
# server_key = ""
# sender_id = ""
alarm_tag = "alarm"

[apns]
# team_id = ""
# bundle_id = "com.example.app"
# key_id = ""
# private_key_path = "./AuthKey.p8"
algorithm = "ES256"
environment = "production"
# APNs token 最长 60 分钟有效，20 分钟内不应重复签发
token_ttl_minutes = 50
port = 443

[http]
request_timeout_secs = 30
connect_timeout_secs = 10

[logging]
level = "info"
format = "compact"
# file = "./logs/push.log"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TEST_KEY_PEM: &str = include_str!("../tests/fixtures/apns_auth_key.p8");

    #[test]
    fn test_default_template_parses() {
        let config = PushConfig::from_toml_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.fcm.alarm_tag, "alarm");
        assert_eq!(config.apns.token_ttl_minutes, 50);
        assert_eq!(config.apns.environment, ApnsEnvironment::Production);
        assert_eq!(config.logging.level.as_deref(), Some("info"));
        assert!(matches!(config.fcm.status(), SectionStatus::Missing));
        assert!(matches!(config.apns.status(), Ok(SectionStatus::Missing)));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = PushConfig::from_toml_str(
            r#"
            [fcm]
            server_key = "from-file"
            sender_id = "42"
            "#,
        )
        .unwrap();

        let vars: HashMap<&str, &str> = [
            ("PUSH_FCM_SERVER_KEY", "from-env"),
            ("PUSH_APNS_ENVIRONMENT", "sandbox"),
            ("PUSH_APNS_TOKEN_TTL_MINUTES", "30"),
        ]
        .into_iter()
        .collect();
        config
            .merge_from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.fcm.server_key.as_deref(), Some("from-env"));
        assert_eq!(config.fcm.sender_id.as_deref(), Some("42"));
        assert_eq!(config.apns.environment, ApnsEnvironment::Sandbox);
        assert_eq!(config.apns.token_ttl_minutes, 30);
    }

    #[test]
    fn test_invalid_env_value_is_error() {
        let mut config = PushConfig::default();
        let result = config.merge_from_lookup(|key| {
            (key == "PUSH_APNS_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_apns_status_ready_from_inline_key() {
        let settings = ApnsSettings {
            team_id: Some("T123".to_string()),
            bundle_id: Some("com.example.app".to_string()),
            key_id: Some("KID123".to_string()),
            private_key: Some(TEST_KEY_PEM.to_string()),
            ..ApnsSettings::default()
        };

        match settings.status() {
            Ok(SectionStatus::Ready(credential)) => {
                assert_eq!(credential.team_id(), "T123");
                assert_eq!(credential.token_ttl_minutes(), DEFAULT_TOKEN_TTL_MINUTES);
            }
            other => panic!("expected ready credential, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_reports_incomplete_and_ttl() {
        let mut config = PushConfig::default();
        config.fcm.server_key = Some("key".to_string());
        config.apns.token_ttl_minutes = 90;

        let report = config.validate();
        assert!(!report.is_ok());
        assert!(report.errors.iter().any(|e| e.contains("sender_id")));
        assert!(report.errors.iter().any(|e| e.contains("token_ttl_minutes=90")));
    }

    #[test]
    fn test_validate_warns_on_short_ttl() {
        let mut config = PushConfig::default();
        config.fcm.server_key = Some("key".to_string());
        config.fcm.sender_id = Some("1".to_string());
        config.apns.token_ttl_minutes = 0;

        let report = config.validate();
        assert!(report.is_ok());
        assert!(report.warnings.iter().any(|w| w.contains("throttle")));
    }

    #[test]
    fn test_masked_hides_secrets() {
        let mut config = PushConfig::default();
        config.fcm.server_key = Some("secret".to_string());
        config.apns.private_key = Some(TEST_KEY_PEM.to_string());

        let masked = config.masked();
        assert_eq!(masked.fcm.server_key.as_deref(), Some("***"));
        assert_eq!(masked.apns.private_key.as_deref(), Some("***"));
    }

    #[test]
    fn test_early_logging_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[logging]\nlevel = \"debug\"\nformat = \"json\"\n").unwrap();

        let logging = load_early_logging_config(file.path().to_str());
        assert_eq!(logging.level.as_deref(), Some("debug"));
        assert_eq!(logging.format.as_deref(), Some("json"));
    }
}
