//! Session capability tokens.
//!
//! Two token shapes, both HS256-signed with the session secret minted
//! at build time: a per-player token embedding only the player id, and
//! an administrative token embedding only an admin flag. Tokens do not
//! expire — a session lives for days and players hold one link for its
//! whole life — so verification pins the algorithm and disables the
//! expiry check instead of relying on `exp`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::PlayerId;
use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
struct PlayerClaims {
    /// Player id — the only identity the token carries.
    p: PlayerId,
}

#[derive(Debug, Serialize, Deserialize)]
struct AdminClaims {
    adm: bool,
}

/// Token signing/verification key, decoded from the urlsafe-base64
/// secret stored in the session meta.
#[derive(Clone)]
pub struct TokenKey {
    secret: Vec<u8>,
}

impl TokenKey {
    pub fn from_meta_secret(encoded: &str) -> Result<Self, AppError> {
        let secret = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| AppError::config(format!("session secret is not valid base64: {e}")))?;
        Ok(Self { secret })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        use rand::RngCore;
        let mut secret = vec![0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        Self { secret }
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims = Default::default();
    validation
}

pub fn mint_player_token(key: &TokenKey, player: PlayerId) -> Result<String, AppError> {
    encode(
        &Header::new(Algorithm::HS256),
        &PlayerClaims { p: player },
        &EncodingKey::from_secret(&key.secret),
    )
    .map_err(|e| AppError::internal(format!("failed to encode player token: {e}")))
}

/// Verify a player token and return the player id it names. Any
/// signature or shape problem maps to `Unauthorized`; the caller never
/// learns which byte was wrong.
pub fn verify_player_token(key: &TokenKey, token: &str) -> Result<PlayerId, AppError> {
    decode::<PlayerClaims>(token, &DecodingKey::from_secret(&key.secret), &validation())
        .map(|data| data.claims.p)
        .map_err(|_| AppError::unauthorized())
}

pub fn mint_admin_token(key: &TokenKey) -> Result<String, AppError> {
    encode(
        &Header::new(Algorithm::HS256),
        &AdminClaims { adm: true },
        &EncodingKey::from_secret(&key.secret),
    )
    .map_err(|e| AppError::internal(format!("failed to encode admin token: {e}")))
}

pub fn verify_admin_token(key: &TokenKey, token: &str) -> Result<(), AppError> {
    let data = decode::<AdminClaims>(token, &DecodingKey::from_secret(&key.secret), &validation())
        .map_err(|_| AppError::forbidden())?;
    if data.claims.adm {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}
