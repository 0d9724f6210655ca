use std::fmt;
use std::path::Path;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, EncodingKey};

use crate::error::{PushError, Result};
use crate::push::types::ApnsEnvironment;

/// APNs 建议的 token 刷新间隔（分钟）：最长 60 分钟有效，20 分钟内不应重复签发
pub const DEFAULT_TOKEN_TTL_MINUTES: u32 = 50;

/// APNs 签名私钥来源
#[derive(Debug, Clone)]
pub enum KeySource<'a> {
    /// `.p8` 文件路径
    Path(&'a Path),
    /// PEM（PKCS#8）内容
    Pem(&'a [u8]),
}

/// APNs token 认证凭据
///
/// 构造后不可变，由单个 `TokenProvider` 独占
#[derive(Clone)]
pub struct ApnsCredential {
    team_id: String,
    bundle_id: String,
    key_id: String,
    signing_key: EncodingKey,
    algorithm: Algorithm,
    environment: ApnsEnvironment,
    token_ttl_minutes: u32,
}

impl ApnsCredential {
    /// 创建 APNs 凭据
    ///
    /// # 参数
    /// - team_id: Apple Developer Team ID（JWT `iss`）
    /// - bundle_id: App Bundle ID（`apns-topic`）
    /// - key_id: APNs Key ID（JWT `kid`）
    /// - key: 私钥来源（文件或 PEM 内容）
    /// - algorithm: 签名算法名称，APNs 要求 `ES256`
    pub fn new(
        team_id: impl Into<String>,
        bundle_id: impl Into<String>,
        key_id: impl Into<String>,
        key: KeySource<'_>,
        algorithm: &str,
        environment: ApnsEnvironment,
        token_ttl_minutes: u32,
    ) -> Result<Self> {
        let algorithm = Algorithm::from_str(algorithm)
            .map_err(|e| PushError::Signing(format!("unsupported algorithm '{}': {}", algorithm, e)))?;

        let pem = match key {
            KeySource::Path(path) => std::fs::read(path).map_err(|e| {
                PushError::Signing(format!(
                    "Failed to read APNs private key {}: {}",
                    path.display(),
                    e
                ))
            })?,
            KeySource::Pem(bytes) => bytes.to_vec(),
        };

        let signing_key = parse_signing_key(algorithm, &pem)?;

        Ok(Self {
            team_id: team_id.into(),
            bundle_id: bundle_id.into(),
            key_id: key_id.into(),
            signing_key,
            algorithm,
            environment,
            token_ttl_minutes,
        })
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn signing_key(&self) -> &EncodingKey {
        &self.signing_key
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn environment(&self) -> ApnsEnvironment {
        self.environment
    }

    pub fn token_ttl_minutes(&self) -> u32 {
        self.token_ttl_minutes
    }
}

impl fmt::Debug for ApnsCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApnsCredential")
            .field("team_id", &self.team_id)
            .field("bundle_id", &self.bundle_id)
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("environment", &self.environment)
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish_non_exhaustive()
    }
}

fn parse_signing_key(algorithm: Algorithm, pem: &[u8]) -> Result<EncodingKey> {
    let key = match algorithm {
        Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(pem),
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => EncodingKey::from_rsa_pem(pem),
        Algorithm::EdDSA => EncodingKey::from_ed_pem(pem),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            return Err(PushError::Signing(format!(
                "{:?} is a shared-secret algorithm and cannot sign provider tokens",
                algorithm
            )));
        }
    };

    key.map_err(|e| PushError::Signing(format!("Failed to parse APNs private key: {}", e)))
}

/// FCM legacy HTTP 凭据
///
/// 构造时一次性捕获，之后不可修改
#[derive(Clone)]
pub struct FcmCredential {
    server_key: String,
    sender_id: String,
    alarm_tag: String,
}

impl FcmCredential {
    /// # 参数
    /// - server_key: FCM server key
    /// - sender_id: FCM sender ID
    /// - alarm_tag: Android 通知默认 tag，相同 tag 的通知在通知栏中互相替换
    pub fn new(
        server_key: impl Into<String>,
        sender_id: impl Into<String>,
        alarm_tag: impl Into<String>,
    ) -> Self {
        Self {
            server_key: server_key.into(),
            sender_id: sender_id.into(),
            alarm_tag: alarm_tag.into(),
        }
    }

    pub fn server_key(&self) -> &str {
        &self.server_key
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn alarm_tag(&self) -> &str {
        &self.alarm_tag
    }
}

impl fmt::Debug for FcmCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmCredential")
            .field("server_key", &"***")
            .field("sender_id", &self.sender_id)
            .field("alarm_tag", &self.alarm_tag)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const TEST_KEY_PEM: &str = include_str!("../../tests/fixtures/apns_auth_key.p8");

    pub(crate) fn test_credential(ttl_minutes: u32) -> ApnsCredential {
        ApnsCredential::new(
            "T123",
            "com.example.app",
            "KID123",
            KeySource::Pem(TEST_KEY_PEM.as_bytes()),
            "ES256",
            ApnsEnvironment::Sandbox,
            ttl_minutes,
        )
        .unwrap()
    }

    #[test]
    fn test_load_from_pem() {
        let credential = test_credential(DEFAULT_TOKEN_TTL_MINUTES);
        assert_eq!(credential.team_id(), "T123");
        assert_eq!(credential.key_id(), "KID123");
        assert_eq!(credential.algorithm(), Algorithm::ES256);
        assert_eq!(credential.environment(), ApnsEnvironment::Sandbox);
        assert_eq!(credential.token_ttl_minutes(), 50);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_KEY_PEM.as_bytes()).unwrap();

        let credential = ApnsCredential::new(
            "T123",
            "com.example.app",
            "KID123",
            KeySource::Path(file.path()),
            "ES256",
            ApnsEnvironment::Production,
            20,
        )
        .unwrap();

        assert_eq!(credential.bundle_id(), "com.example.app");
    }

    #[test]
    fn test_missing_key_file_is_signing_error() {
        let result = ApnsCredential::new(
            "T123",
            "com.example.app",
            "KID123",
            KeySource::Path(Path::new("/nonexistent/AuthKey.p8")),
            "ES256",
            ApnsEnvironment::Production,
            20,
        );
        assert!(matches!(result, Err(PushError::Signing(_))));
    }

    #[test]
    fn test_unknown_or_symmetric_algorithm_rejected() {
        let result = ApnsCredential::new(
            "T123",
            "com.example.app",
            "KID123",
            KeySource::Pem(TEST_KEY_PEM.as_bytes()),
            "XX999",
            ApnsEnvironment::Production,
            20,
        );
        assert!(matches!(result, Err(PushError::Signing(_))));

        let result = ApnsCredential::new(
            "T123",
            "com.example.app",
            "KID123",
            KeySource::Pem(TEST_KEY_PEM.as_bytes()),
            "HS256",
            ApnsEnvironment::Production,
            20,
        );
        assert!(matches!(result, Err(PushError::Signing(_))));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let fcm = FcmCredential::new("super-secret", "1234", "alarm");
        let output = format!("{:?}", fcm);
        assert!(!output.contains("super-secret"));
        assert!(output.contains("1234"));
    }
}
