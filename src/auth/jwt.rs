/// Access Token Codec
///
/// Signs and verifies short-lived RS256 access tokens. Verification accepts
/// only the RSA signature family, so `none`, HMAC, and other algorithm
/// headers are rejected regardless of what the token claims.

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};

use crate::auth::claims::Claims;
use crate::auth::keys::KeyPair;
use crate::domain::Role;
use crate::error::{AppError, AuthError};

/// Lifetime of every access token
pub const ACCESS_TOKEN_LIFETIME_SECS: i64 = 15 * 60;

const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

#[derive(Clone)]
pub struct AccessTokenCodec {
    keys: Arc<KeyPair>,
}

impl AccessTokenCodec {
    pub fn new(keys: Arc<KeyPair>) -> Self {
        Self { keys }
    }

    /// Issue a 15 minute access token for a user
    ///
    /// # Errors
    /// `KeyNotLoaded` without a private key, `Internal` if signing fails
    pub fn issue(&self, user_id: &str, email: &str, role: Role) -> Result<String, AppError> {
        let claims = Claims::new(
            user_id,
            email,
            role,
            Duration::seconds(ACCESS_TOKEN_LIFETIME_SECS),
        );
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(
            &Header::new(SIGNING_ALGORITHM),
            claims,
            self.keys.encoding_key()?,
        )
        .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
    }

    /// Check the signature and decode the claims.
    ///
    /// Expiry is NOT checked here; see [`Claims::is_expired`].
    ///
    /// # Errors
    /// `InvalidToken` for any signature, algorithm, or format problem
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.validate_exp = false;

        decode::<Claims>(token, self.keys.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("Access token rejected: {}", e);
                AppError::Auth(AuthError::InvalidToken)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::{OTHER_PRIVATE_PEM, OTHER_PUBLIC_PEM, PRIVATE_PEM, PUBLIC_PEM};
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use jsonwebtoken::EncodingKey;

    fn codec() -> AccessTokenCodec {
        AccessTokenCodec::new(Arc::new(KeyPair::from_pem(PUBLIC_PEM, PRIVATE_PEM).unwrap()))
    }

    fn flip_char(c: char) -> char {
        if c == 'A' {
            'B'
        } else {
            'A'
        }
    }

    #[test]
    fn test_issue_and_verify_token() {
        let codec = codec();
        let token = codec
            .issue("V1StGXR8_Z5jdHi6B-myT", "a@x.com", Role::Buyer)
            .expect("Failed to issue token");
        let claims = codec.verify(&token).expect("Failed to verify token");

        assert_eq!(claims.id, "V1StGXR8_Z5jdHi6B-myT");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, Role::Buyer);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_LIFETIME_SECS);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_header_is_rs256() {
        let token = codec().issue("id", "a@x.com", Role::Admin).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
    }

    #[test]
    fn test_invalid_token() {
        let result = codec().verify("invalid.token.here");
        assert!(matches!(result, Err(AppError::Auth(AuthError::InvalidToken))));
    }

    #[test]
    fn test_tampered_signature() {
        let codec = codec();
        let token = codec.issue("id", "a@x.com", Role::Buyer).unwrap();

        let signature_start = token.rfind('.').unwrap() + 1;
        for offset in [0, 10, 100] {
            let mut chars: Vec<char> = token.chars().collect();
            let i = signature_start + offset;
            chars[i] = flip_char(chars[i]);
            let tampered: String = chars.into_iter().collect();

            assert!(codec.verify(&tampered).is_err(), "offset {}", offset);
        }
    }

    #[test]
    fn test_tampered_payload() {
        let codec = codec();
        let token = codec.issue("id", "a@x.com", Role::Buyer).unwrap();

        let forged = Claims::new("id", "a@x.com", Role::Admin, Duration::minutes(15));
        let forged_payload = encode_segment(&serde_json::to_value(&forged).unwrap());
        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(codec.verify(&tampered).is_err());
    }

    #[test]
    fn test_rejects_token_from_other_key() {
        let other = AccessTokenCodec::new(Arc::new(
            KeyPair::from_pem(OTHER_PUBLIC_PEM, OTHER_PRIVATE_PEM).unwrap(),
        ));
        let token = other.issue("id", "a@x.com", Role::Buyer).unwrap();

        assert!(codec().verify(&token).is_err());
    }

    #[test]
    fn test_rejects_symmetric_token() {
        let claims = Claims::new("id", "a@x.com", Role::Admin, Duration::minutes(15));
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(PUBLIC_PEM),
        )
        .unwrap();

        assert!(matches!(
            codec().verify(&token),
            Err(AppError::Auth(AuthError::InvalidToken))
        ));
    }

    #[test]
    fn test_rejects_unsigned_token() {
        let header = encode_segment(&serde_json::json!({"alg": "none", "typ": "JWT"}));
        let claims = Claims::new("id", "a@x.com", Role::Admin, Duration::minutes(15));
        let token = format!("{}.{}.", header, encode_segment(&serde_json::to_value(&claims).unwrap()));

        assert!(codec().verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_still_decodes() {
        let codec = codec();
        let claims = Claims::new("id", "a@x.com", Role::Buyer, Duration::minutes(-5));
        let token = codec.sign(&claims).unwrap();

        let decoded = codec.verify(&token).expect("expiry is checked by the caller");
        assert!(decoded.is_expired());
    }

    #[test]
    fn test_verifying_only_codec() {
        let signer = codec();
        let verifier = AccessTokenCodec::new(Arc::new(KeyPair::verifying_only(PUBLIC_PEM).unwrap()));

        let token = signer.issue("id", "a@x.com", Role::Buyer).unwrap();
        assert!(verifier.verify(&token).is_ok());
        assert!(matches!(
            verifier.issue("id", "a@x.com", Role::Buyer),
            Err(AppError::Auth(AuthError::KeyNotLoaded))
        ));
    }

    fn encode_segment(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }
}
