use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Header};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;
use crate::push::credential::ApnsCredential;

/// 时钟接口，测试中可替换为手动时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 已缓存的 provider token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub ttl_minutes: u32,
}

impl CachedToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::minutes(i64::from(self.ttl_minutes))
    }

    /// 仅当 `now < expires_at` 时可用
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

/// APNs JWT Claims
#[derive(Debug, Serialize)]
struct ProviderClaims<'a> {
    iss: &'a str,
    iat: i64,
}

/// APNs provider token 提供者
///
/// 缓存签发出的 token，直到过期才重新签发。并发调用在缓存未命中时
/// 只签发一次，所有等待者拿到同一个 token
pub struct TokenProvider {
    credential: ApnsCredential,
    clock: Arc<dyn Clock>,
    cache: RwLock<Option<CachedToken>>,
    minted: AtomicU64,
    #[cfg(any(test, feature = "test-util"))]
    miss_barrier: Option<Arc<tokio::sync::Barrier>>,
}

impl TokenProvider {
    pub fn new(credential: ApnsCredential) -> Self {
        Self::with_clock(credential, Arc::new(SystemClock))
    }

    pub fn with_clock(credential: ApnsCredential, clock: Arc<dyn Clock>) -> Self {
        Self {
            credential,
            clock,
            cache: RwLock::new(None),
            minted: AtomicU64::new(0),
            #[cfg(any(test, feature = "test-util"))]
            miss_barrier: None,
        }
    }

    pub fn credential(&self) -> &ApnsCredential {
        &self.credential
    }

    /// 获取当前有效的 token
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(token) = cache.as_ref() {
                if token.is_valid_at(self.clock.now()) {
                    return Ok(token.value.clone());
                }
            }
        }

        #[cfg(any(test, feature = "test-util"))]
        if let Some(barrier) = &self.miss_barrier {
            barrier.wait().await;
        }

        let mut cache = self.cache.write().await;
        // 等待写锁期间可能已有其他调用者完成签发
        let now = self.clock.now();
        if let Some(token) = cache.as_ref() {
            if token.is_valid_at(now) {
                debug!("[TOKEN] Reusing token minted by concurrent caller");
                return Ok(token.value.clone());
            }
        }

        let token = self.mint(now)?;
        let value = token.value.clone();
        *cache = Some(token);
        Ok(value)
    }

    /// 清空缓存，下一次 `get_token` 必定重新签发
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        if cache.take().is_some() {
            info!("[TOKEN] Cached provider token invalidated");
        }
    }

    fn mint(&self, now: DateTime<Utc>) -> Result<CachedToken> {
        let mut header = Header::new(self.credential.algorithm());
        header.kid = Some(self.credential.key_id().to_string());

        let claims = ProviderClaims {
            iss: self.credential.team_id(),
            iat: now.timestamp(),
        };

        let value = encode(&header, &claims, self.credential.signing_key())?;
        let count = self.minted.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            "[TOKEN] Minted provider token: key_id={}, iat={}, ttl_minutes={}, minted_total={}",
            self.credential.key_id(),
            claims.iat,
            self.credential.token_ttl_minutes(),
            count
        );

        Ok(CachedToken {
            value,
            issued_at: now,
            ttl_minutes: self.credential.token_ttl_minutes(),
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
impl TokenProvider {
    /// 当前缓存的 token（测试用）
    pub async fn cached_token(&self) -> Option<CachedToken> {
        self.cache.read().await.clone()
    }

    /// 读锁未命中后、争抢写锁前在 barrier 上等待（测试用）
    ///
    /// 用于让 N 个调用者同时越过快速路径
    pub fn with_miss_barrier(mut self, barrier: Arc<tokio::sync::Barrier>) -> Self {
        self.miss_barrier = Some(barrier);
        self
    }

    /// 累计签发次数（测试用）
    pub fn minted_count(&self) -> u64 {
        self.minted.load(Ordering::SeqCst)
    }
}

/// 可手动推进的时钟
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PushError;
    use crate::push::credential::tests::{test_credential, TEST_KEY_PEM};
    use crate::push::credential::KeySource;
    use crate::push::types::ApnsEnvironment;
    use chrono::TimeZone;
    use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
    use serde::Deserialize;

    const TEST_PUBLIC_KEY: &str = include_str!("../../tests/fixtures/apns_auth_key.pub.pem");

    #[derive(Debug, Deserialize)]
    struct Claims {
        iss: String,
        iat: i64,
    }

    fn decode_claims(token: &str) -> Claims {
        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let key = DecodingKey::from_ec_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap();
        decode::<Claims>(token, &key, &validation).unwrap().claims
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_token_reused_within_ttl() {
        let clock = Arc::new(ManualClock::new(start()));
        let provider = TokenProvider::with_clock(test_credential(50), clock.clone());

        let first = provider.get_token().await.unwrap();
        clock.advance(Duration::minutes(49));
        let second = provider.get_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.minted_count(), 1);
    }

    #[tokio::test]
    async fn test_token_regenerated_at_expiry() {
        let clock = Arc::new(ManualClock::new(start()));
        let provider = TokenProvider::with_clock(test_credential(50), clock.clone());

        provider.get_token().await.unwrap();
        clock.advance(Duration::minutes(50));
        provider.get_token().await.unwrap();

        assert_eq!(provider.minted_count(), 2);
        let cached = provider.cached_token().await.unwrap();
        assert_eq!(cached.issued_at, start() + Duration::minutes(50));
    }

    #[tokio::test]
    async fn test_zero_ttl_always_regenerates() {
        let clock = Arc::new(ManualClock::new(start()));
        let provider = TokenProvider::with_clock(test_credential(0), clock.clone());

        let first = provider.get_token().await.unwrap();
        clock.advance(Duration::seconds(1));
        let second = provider.get_token().await.unwrap();

        assert!(!first.is_empty());
        assert!(!second.is_empty());
        assert_eq!(provider.minted_count(), 2);
        assert_ne!(decode_claims(&first).iat, decode_claims(&second).iat);
    }

    #[tokio::test]
    async fn test_token_header_and_claims() {
        let provider = TokenProvider::with_clock(test_credential(50), Arc::new(ManualClock::new(start())));
        let token = provider.get_token().await.unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES256);
        assert_eq!(header.kid.as_deref(), Some("KID123"));

        let claims = decode_claims(&token);
        assert_eq!(claims.iss, "T123");
        assert_eq!(claims.iat, start().timestamp());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_mint() {
        const CALLERS: usize = 16;
        let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));
        let provider = Arc::new(
            TokenProvider::with_clock(test_credential(50), Arc::new(ManualClock::new(start())))
                .with_miss_barrier(barrier),
        );

        // 所有调用者都在读锁未命中后才开始争抢写锁
        let mut handles = Vec::new();
        for _ in 0..CALLERS {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move { provider.get_token().await.unwrap() }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap());
        }

        assert_eq!(provider.minted_count(), 1);
        assert!(tokens.iter().all(|t| t == &tokens[0]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_mint_multi_thread() {
        const CALLERS: usize = 8;
        let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));
        let provider = Arc::new(
            TokenProvider::with_clock(test_credential(50), Arc::new(ManualClock::new(start())))
                .with_miss_barrier(barrier),
        );

        let tokens = futures::future::join_all((0..CALLERS).map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.get_token().await.unwrap() })
        }))
        .await;

        assert_eq!(provider.minted_count(), 1);
        let first = tokens[0].as_ref().unwrap();
        assert!(tokens.iter().all(|t| t.as_ref().unwrap() == first));
    }

    #[tokio::test]
    async fn test_invalidate_forces_regeneration() {
        let provider = TokenProvider::with_clock(test_credential(50), Arc::new(ManualClock::new(start())));

        provider.get_token().await.unwrap();
        provider.invalidate().await;
        assert!(provider.cached_token().await.is_none());

        provider.get_token().await.unwrap();
        assert_eq!(provider.minted_count(), 2);
    }

    #[tokio::test]
    async fn test_algorithm_key_mismatch_is_signing_error() {
        // P-256 密钥无法用于 ES384
        let result = match ApnsCredential::new(
            "T123",
            "com.example.app",
            "KID123",
            KeySource::Pem(TEST_KEY_PEM.as_bytes()),
            "ES384",
            ApnsEnvironment::Sandbox,
            50,
        ) {
            Ok(credential) => TokenProvider::new(credential).get_token().await,
            Err(e) => Err(e),
        };

        assert!(matches!(result, Err(PushError::Signing(_))));
    }

    #[tokio::test]
    async fn test_malformed_key_is_signing_error() {
        let malformed = include_str!("../../tests/fixtures/malformed_key.p8");
        let result = match ApnsCredential::new(
            "T123",
            "com.example.app",
            "KID123",
            KeySource::Pem(malformed.as_bytes()),
            "ES256",
            ApnsEnvironment::Sandbox,
            50,
        ) {
            Ok(credential) => TokenProvider::new(credential).get_token().await,
            Err(e) => Err(e),
        };

        assert!(matches!(result, Err(PushError::Signing(_))));
    }

    #[test]
    fn test_cached_token_expiry_boundary() {
        let token = CachedToken {
            value: "abc".to_string(),
            issued_at: start(),
            ttl_minutes: 10,
        };
        assert!(token.is_valid_at(start() + Duration::minutes(9)));
        assert!(!token.is_valid_at(start() + Duration::minutes(10)));
    }
}
