use crate::config::AuthConfig;
use crate::error::TokenError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::str::FromStr;

const TOKEN_ID_BYTES: usize = 20;

/// Only HMAC algorithms are ever accepted, whatever the token header claims.
const ALLOWED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub access_uuid: String,
    pub user_id: String,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub refresh_uuid: String,
    pub user_id: String,
    pub exp: i64,
}

/// One freshly issued session: both signed tokens plus the metadata needed
/// to register them in the session store.
#[derive(Debug, Clone)]
pub struct SessionTokenPair {
    pub user_id: String,
    pub access_token: String,
    pub access_token_id: String,
    pub access_expiry: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_id: String,
    pub refresh_expiry: DateTime<Utc>,
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str, name: &'static str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingKey(name));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }
}

/// Signs and verifies the access/refresh token pair.
///
/// Access and refresh tokens use separate secrets, so a token of one kind
/// never verifies as the other.
#[derive(Clone)]
pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    algorithm: Algorithm,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Result<Self, TokenError> {
        if config.access_secret == config.refresh_secret && !config.access_secret.is_empty() {
            return Err(TokenError::SharedKey);
        }

        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|_| TokenError::UnsupportedAlgorithm(config.algorithm.clone()))?;
        if !ALLOWED_ALGORITHMS.contains(&algorithm) {
            return Err(TokenError::UnsupportedAlgorithm(config.algorithm.clone()));
        }

        Ok(Self {
            access: KeyPair::from_secret(&config.access_secret, "access")?,
            refresh: KeyPair::from_secret(&config.refresh_secret, "refresh")?,
            algorithm,
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
        })
    }

    pub fn issue(&self, user_id: &str) -> Result<SessionTokenPair, TokenError> {
        let now = Utc::now();
        let access_token_id = new_token_id();
        let refresh_token_id = new_token_id();
        let access_expiry = now + self.access_ttl;
        let refresh_expiry = now + self.refresh_ttl;

        let access_claims = AccessClaims {
            access_uuid: access_token_id.clone(),
            user_id: user_id.to_string(),
            exp: access_expiry.timestamp(),
        };
        let refresh_claims = RefreshClaims {
            refresh_uuid: refresh_token_id.clone(),
            user_id: user_id.to_string(),
            exp: refresh_expiry.timestamp(),
        };

        let header = Header::new(self.algorithm);
        let access_token = encode(&header, &access_claims, &self.access.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        let refresh_token = encode(&header, &refresh_claims, &self.refresh.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(SessionTokenPair {
            user_id: user_id.to_string(),
            access_token,
            access_token_id,
            access_expiry,
            refresh_token,
            refresh_token_id,
            refresh_expiry,
        })
    }

    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.verify(token, &self.access.decoding)?;
        check_not_expired(claims.exp)?;
        Ok(claims)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.verify(token, &self.refresh.decoding)?;
        check_not_expired(claims.exp)?;
        Ok(claims)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Result<T, TokenError> {
        let header = decode_header(token)?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(TokenError::Invalid(format!("unexpected signing method: {:?}", header.alg)));
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = ALLOWED_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(decode::<T>(token, key, &validation)?.claims)
    }
}

/// `exp == now` counts as expired.
fn check_not_expired(exp: i64) -> Result<(), TokenError> {
    if exp <= Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }
    Ok(())
}

fn new_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
