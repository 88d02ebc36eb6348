//! Password hashing
//!
//! Each runtime hashes with its own native strategy:
//!
//! - `server`: Argon2id with the argon2 crate defaults, stored as a PHC
//!   string (`$argon2id$v=19$...`)
//! - `edge`: PBKDF2-HMAC-SHA256, 100 000 iterations, 16-byte salt and 32-byte
//!   key, stored as `pbkdf2:` + base64(salt || key)
//!
//! Verification ignores the native strategy and dispatches on the stored
//! prefix, so hashes written under one runtime keep working after moving to
//! the other. The prefix is authoritative: a hash is never retried with a
//! different algorithm.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Argon2,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::{AuthConfig, Runtime};

pub const PBKDF2_PREFIX: &str = "pbkdf2:";
/// PHC identifiers of the Argon2 variants, including the trailing `$`
pub const ARGON2_PREFIXES: [&str; 3] = ["$argon2id$", "$argon2i$", "$argon2d$"];

/// Fixed because the stored format does not record it.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
const PBKDF2_SALT_LEN: usize = 16;
const PBKDF2_KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum PasswordError {
    /// The stored hash carries no known prefix
    #[error("unrecognized password hash format")]
    UnrecognizedFormat,

    /// Known prefix, undecodable body
    #[error("corrupt {format} password hash: {reason}")]
    Corrupt {
        format: HashFormat,
        reason: String,
    },

    /// Known format this runtime has no verifier for
    #[error("{0} hashes cannot be verified in this runtime")]
    Unsupported(HashFormat),

    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Format of a stored hash, read from its prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashFormat {
    Argon2,
    Pbkdf2,
}

impl HashFormat {
    pub fn detect(stored: &str) -> Option<Self> {
        if ARGON2_PREFIXES.iter().any(|p| stored.starts_with(p)) {
            Some(HashFormat::Argon2)
        } else if stored.starts_with(PBKDF2_PREFIX) {
            Some(HashFormat::Pbkdf2)
        } else {
            None
        }
    }

    /// Prefixes a stored hash of this format starts with
    pub fn prefixes(&self) -> &'static [&'static str] {
        match self {
            HashFormat::Argon2 => &ARGON2_PREFIXES,
            HashFormat::Pbkdf2 => &[PBKDF2_PREFIX],
        }
    }

    pub fn native_for(runtime: Runtime) -> Self {
        match runtime {
            Runtime::Server => HashFormat::Argon2,
            Runtime::Edge => HashFormat::Pbkdf2,
        }
    }
}

impl std::fmt::Display for HashFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashFormat::Argon2 => f.write_str("argon2"),
            HashFormat::Pbkdf2 => f.write_str("pbkdf2"),
        }
    }
}

/// Verifiers available in the current runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasherCapabilities {
    pub argon2: bool,
    pub pbkdf2: bool,
}

impl HasherCapabilities {
    pub fn for_runtime(runtime: Runtime, config: &AuthConfig) -> Self {
        match runtime {
            Runtime::Server => Self {
                argon2: true,
                pbkdf2: true,
            },
            Runtime::Edge => Self {
                argon2: config.edge_supports_argon2,
                pbkdf2: true,
            },
        }
    }

    pub fn supports(&self, format: HashFormat) -> bool {
        match format {
            HashFormat::Argon2 => self.argon2,
            HashFormat::Pbkdf2 => self.pbkdf2,
        }
    }
}

/// Runtime-aware password hasher. Cheap to copy into handlers and blocking
/// tasks.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    runtime: Runtime,
    capabilities: HasherCapabilities,
}

impl PasswordHasher {
    pub fn new(runtime: Runtime, config: &AuthConfig) -> Self {
        Self {
            runtime,
            capabilities: HasherCapabilities::for_runtime(runtime, config),
        }
    }

    /// Hasher with the default capabilities of `runtime`
    pub fn for_runtime(runtime: Runtime) -> Self {
        Self::new(runtime, &AuthConfig::default())
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    pub fn native_format(&self) -> HashFormat {
        HashFormat::native_for(self.runtime)
    }

    /// Hash with the runtime's native strategy and a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        match self.native_format() {
            HashFormat::Argon2 => hash_argon2(password),
            HashFormat::Pbkdf2 => hash_pbkdf2(password),
        }
    }

    /// Check `password` against `stored`.
    ///
    /// `Ok(false)` means wrong password. Errors mean the stored hash itself
    /// cannot be used and the user needs a password reset.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, PasswordError> {
        let format = HashFormat::detect(stored).ok_or(PasswordError::UnrecognizedFormat)?;
        if !self.capabilities.supports(format) {
            return Err(PasswordError::Unsupported(format));
        }
        match format {
            HashFormat::Argon2 => verify_argon2(password, stored),
            HashFormat::Pbkdf2 => verify_pbkdf2(password, stored),
        }
    }

    /// Whether this runtime can verify `stored` at all
    pub fn is_hash_compatible(&self, stored: &str) -> bool {
        HashFormat::detect(stored)
            .map(|format| self.capabilities.supports(format))
            .unwrap_or(false)
    }

    /// True when `stored` was not produced by this runtime's native strategy
    pub fn needs_rehash(&self, stored: &str) -> bool {
        HashFormat::detect(stored) != Some(self.native_format())
    }

    /// [`hash`](Self::hash) on the blocking pool
    pub async fn hash_async(&self, password: String) -> Result<String, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError::Hashing(e.to_string()))?
    }

    /// [`verify`](Self::verify) on the blocking pool
    pub async fn verify_async(
        &self,
        password: String,
        stored: String,
    ) -> Result<bool, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| PasswordError::Hashing(e.to_string()))?
    }
}

fn hash_argon2(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;
    Ok(password_hash.to_string())
}

fn verify_argon2(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|e| PasswordError::Corrupt {
        format: HashFormat::Argon2,
        reason: e.to_string(),
    })?;
    // The PHC parser accepts strings with no salt or output
    if parsed.salt.is_none() || parsed.hash.is_none() {
        return Err(PasswordError::Corrupt {
            format: HashFormat::Argon2,
            reason: "missing salt or hash output".to_string(),
        });
    }

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Corrupt {
            format: HashFormat::Argon2,
            reason: e.to_string(),
        }),
    }
}

fn derive_pbkdf2(password: &str, salt: &[u8]) -> [u8; PBKDF2_KEY_LEN] {
    let mut key = [0u8; PBKDF2_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

fn hash_pbkdf2(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; PBKDF2_SALT_LEN];
    getrandom::fill(&mut salt).map_err(|e| PasswordError::Entropy(e.to_string()))?;

    let key = derive_pbkdf2(password, &salt);

    let mut blob = Vec::with_capacity(PBKDF2_SALT_LEN + PBKDF2_KEY_LEN);
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&key);
    Ok(format!("{}{}", PBKDF2_PREFIX, STANDARD.encode(blob)))
}

fn verify_pbkdf2(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let corrupt = |reason: String| PasswordError::Corrupt {
        format: HashFormat::Pbkdf2,
        reason,
    };

    let body = &stored[PBKDF2_PREFIX.len()..];
    let blob = STANDARD.decode(body).map_err(|e| corrupt(e.to_string()))?;
    if blob.len() != PBKDF2_SALT_LEN + PBKDF2_KEY_LEN {
        return Err(corrupt(format!(
            "expected {} bytes, found {}",
            PBKDF2_SALT_LEN + PBKDF2_KEY_LEN,
            blob.len()
        )));
    }

    let (salt, expected) = blob.split_at(PBKDF2_SALT_LEN);
    let candidate = derive_pbkdf2(password, salt);
    Ok(bool::from(candidate[..].ct_eq(expected)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> PasswordHasher {
        PasswordHasher::for_runtime(Runtime::Server)
    }

    fn edge() -> PasswordHasher {
        PasswordHasher::for_runtime(Runtime::Edge)
    }

    #[test]
    fn test_server_hashes_with_argon2id() {
        let hash = server().hash("test_password_123").unwrap();
        assert!(hash.starts_with("$argon2id$"), "Hash should use Argon2id");
        assert!(server().verify("test_password_123", &hash).unwrap());
        assert!(!server().verify("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_edge_hashes_with_pbkdf2() {
        let hash = edge().hash("test_password_123").unwrap();
        assert!(hash.starts_with(PBKDF2_PREFIX));

        let blob = STANDARD.decode(&hash[PBKDF2_PREFIX.len()..]).unwrap();
        assert_eq!(blob.len(), 48);

        assert!(edge().verify("test_password_123", &hash).unwrap());
        assert!(!edge().verify("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_same_password_hashes_differ_and_both_verify() {
        for hasher in [server(), edge()] {
            let first = hasher.hash("same_password").unwrap();
            let second = hasher.hash("same_password").unwrap();
            assert_ne!(first, second, "salts must differ");
            assert!(hasher.verify("same_password", &first).unwrap());
            assert!(hasher.verify("same_password", &second).unwrap());
        }
    }

    #[test]
    fn test_pbkdf2_verifies_on_server_by_prefix() {
        let stored = edge().hash("portable").unwrap();
        assert!(server().verify("portable", &stored).unwrap());
        assert!(!server().verify("other", &stored).unwrap());
    }

    #[test]
    fn test_known_pbkdf2_vector() {
        // salt = 16 zero bytes, password = "password"
        let salt = [0u8; PBKDF2_SALT_LEN];
        let key = derive_pbkdf2("password", &salt);
        let mut blob = salt.to_vec();
        blob.extend_from_slice(&key);
        let stored = format!("{}{}", PBKDF2_PREFIX, STANDARD.encode(&blob));

        assert!(edge().verify("password", &stored).unwrap());
        assert!(!edge().verify("Password", &stored).unwrap());
    }

    #[test]
    fn test_compatibility_matrix() {
        let argon = server().hash("pw").unwrap();
        let pbkdf = edge().hash("pw").unwrap();

        assert!(server().is_hash_compatible(&argon));
        assert!(server().is_hash_compatible(&pbkdf));
        assert!(!edge().is_hash_compatible(&argon));
        assert!(edge().is_hash_compatible(&pbkdf));

        let config = AuthConfig {
            edge_supports_argon2: true,
        };
        let capable_edge = PasswordHasher::new(Runtime::Edge, &config);
        assert!(capable_edge.is_hash_compatible(&argon));
        assert!(capable_edge.verify("pw", &argon).unwrap());

        assert!(!server().is_hash_compatible("md5$abc"));
        assert!(!edge().is_hash_compatible(""));
    }

    #[test]
    fn test_edge_refuses_argon2_without_capability() {
        let argon = server().hash("pw").unwrap();
        assert!(matches!(
            edge().verify("pw", &argon),
            Err(PasswordError::Unsupported(HashFormat::Argon2))
        ));
    }

    #[test]
    fn test_unrecognized_format_is_an_error() {
        for stored in ["invalid_hash_format", "", "bcrypt:abc", "$2b$12$abcdef"] {
            assert!(matches!(
                server().verify("pw", stored),
                Err(PasswordError::UnrecognizedFormat)
            ));
        }
    }

    #[test]
    fn test_corrupt_hashes_are_errors() {
        assert!(matches!(
            edge().verify("pw", "pbkdf2:!!not-base64!!"),
            Err(PasswordError::Corrupt {
                format: HashFormat::Pbkdf2,
                ..
            })
        ));
        let short = format!("{}{}", PBKDF2_PREFIX, STANDARD.encode([1u8; 10]));
        assert!(matches!(
            edge().verify("pw", &short),
            Err(PasswordError::Corrupt { .. })
        ));
        assert!(matches!(
            server().verify("pw", "$argon2id$garbage"),
            Err(PasswordError::Corrupt {
                format: HashFormat::Argon2,
                ..
            })
        ));
    }

    #[test]
    fn test_argon2_detection_requires_a_variant_id() {
        assert_eq!(HashFormat::detect("$argon2id$v=19$x"), Some(HashFormat::Argon2));
        assert_eq!(HashFormat::detect("$argon2i$v=19$x"), Some(HashFormat::Argon2));
        assert_eq!(HashFormat::detect("$argon2d$v=19$x"), Some(HashFormat::Argon2));
        for stored in ["$argon2xyz$v=19$abc", "$argon2", "$argon2$"] {
            assert_eq!(HashFormat::detect(stored), None);
            assert!(matches!(
                server().verify("pw", stored),
                Err(PasswordError::UnrecognizedFormat)
            ));
        }
    }

    #[test]
    fn test_argon2_without_salt_or_output_is_corrupt() {
        let full = server().hash("pw").unwrap();
        // Drop the trailing hash output segment
        let truncated = &full[..full.rfind('$').unwrap()];
        for stored in ["$argon2id$garbage", truncated] {
            assert!(
                matches!(
                    server().verify("pw", stored),
                    Err(PasswordError::Corrupt {
                        format: HashFormat::Argon2,
                        ..
                    })
                ),
                "{} should be corrupt",
                stored
            );
        }
    }

    #[test]
    fn test_needs_rehash() {
        let argon = server().hash("pw").unwrap();
        let pbkdf = edge().hash("pw").unwrap();
        assert!(!server().needs_rehash(&argon));
        assert!(server().needs_rehash(&pbkdf));
        assert!(edge().needs_rehash(&argon));
        assert!(!edge().needs_rehash(&pbkdf));
    }

    #[test]
    fn test_unicode_and_empty_passwords() {
        for password in ["", "密码测试🔐"] {
            let hash = edge().hash(password).unwrap();
            assert!(edge().verify(password, &hash).unwrap());
            assert!(!hash.contains("密码"));
        }
    }

    #[tokio::test]
    async fn test_async_variants() {
        let hasher = edge();
        let hash = hasher.hash_async("async_pw".to_string()).await.unwrap();
        assert!(hasher
            .verify_async("async_pw".to_string(), hash.clone())
            .await
            .unwrap());
        assert!(!hasher
            .verify_async("nope".to_string(), hash)
            .await
            .unwrap());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Each case runs 100k PBKDF2 rounds, keep the count small
        #![proptest_config(ProptestConfig::with_cases(4))]

        #[test]
        fn pbkdf2_hash_verifies_on_both_runtimes(password in "\\PC{0,32}") {
            let stored = PasswordHasher::for_runtime(Runtime::Edge).hash(&password).unwrap();
            prop_assert!(PasswordHasher::for_runtime(Runtime::Edge).verify(&password, &stored).unwrap());
            prop_assert!(PasswordHasher::for_runtime(Runtime::Server).verify(&password, &stored).unwrap());
        }
    }
}
