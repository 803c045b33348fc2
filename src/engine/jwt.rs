//! Engine-API JWT bearer tokens. `spec.md` §4.C / §6: HS256 of `{iat: now_unix}` signed
//! with a shared secret, `iat` within +/-5s of now.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read JWT secret file {path}: {source}")]
    ReadSecret { path: String, source: std::io::Error },
    #[error("JWT secret must be 32 bytes of hex, got {0} bytes")]
    BadSecretLength(usize),
    #[error("could not hex-decode JWT secret: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("could not encode JWT: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

#[derive(Serialize)]
struct Claims {
    iat: u64,
}

/// Wraps the 32-byte shared secret and mints a fresh bearer token per call, matching
/// the spec's `iat` requirement that each token be minted close to "now".
#[derive(Clone)]
pub struct JwtAuth {
    secret: [u8; 32],
}

impl JwtAuth {
    pub fn from_hex_file(path: &str) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| Error::ReadSecret { path: path.to_string(), source })?;
        Self::from_hex_str(contents.trim())
    }

    pub fn from_hex_str(hex_str: &str) -> Result<Self, Error> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 32 {
            return Err(Error::BadSecretLength(bytes.len()));
        }
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&bytes);
        Ok(Self { secret })
    }

    pub fn bearer_token(&self) -> Result<String, Error> {
        let iat = SystemTime::now().duration_since(UNIX_EPOCH).expect("after epoch").as_secs();
        let token = encode(
            &Header::default(),
            &Claims { iat },
            &EncodingKey::from_secret(&self.secret),
        )?;
        Ok(format!("Bearer {token}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_secret() {
        let err = JwtAuth::from_hex_str("aabb").unwrap_err();
        assert!(matches!(err, Error::BadSecretLength(2)));
    }

    #[test]
    fn mints_a_bearer_token() {
        let auth = JwtAuth::from_hex_str(&"11".repeat(32)).unwrap();
        let token = auth.bearer_token().unwrap();
        assert!(token.starts_with("Bearer "));
    }
}
