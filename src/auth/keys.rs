/// RSA Signing Keys
///
/// Loaded once at startup from PEM files and shared read-only (behind an
/// `Arc`) with the access token codec. There is no mutation after load.

use std::fs;
use std::path::Path;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::domain::Role;
use crate::error::{AppError, AuthError, ConfigError};

pub struct KeyPair {
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl KeyPair {
    /// Reads and parses both PEM files named in the settings.
    ///
    /// # Errors
    /// `Config` if a path is unset, a file cannot be read, a key cannot be
    /// parsed, or the two keys do not belong together.
    pub fn load(settings: &JwtSettings) -> Result<Self, AppError> {
        let public_pem = read_pem("jwt.public_key_path", &settings.public_key_path)?;
        let private_pem = read_pem("jwt.private_key_path", &settings.private_key_path)?;

        let keys = Self::from_pem(&public_pem, &private_pem)?;
        keys.ensure_matching()?;

        tracing::info!(
            public_key = %settings.public_key_path,
            "RSA signing keys loaded"
        );
        Ok(keys)
    }

    pub fn from_pem(public_pem: &[u8], private_pem: &[u8]) -> Result<Self, AppError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem).map_err(|e| {
            ConfigError::ParseError(format!("failed to parse private key: {}", e))
        })?;

        Ok(Self {
            encoding: Some(encoding),
            decoding: parse_public(public_pem)?,
        })
    }

    /// A keypair that can verify tokens but not issue them
    pub fn verifying_only(public_pem: &[u8]) -> Result<Self, AppError> {
        Ok(Self {
            encoding: None,
            decoding: parse_public(public_pem)?,
        })
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }

    pub(crate) fn encoding_key(&self) -> Result<&EncodingKey, AppError> {
        self.encoding
            .as_ref()
            .ok_or(AppError::Auth(AuthError::KeyNotLoaded))
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// Signs and verifies a throwaway token so a mismatched pair fails at startup
    /// instead of on the first request.
    fn ensure_matching(&self) -> Result<(), AppError> {
        let sample = Claims::new("self-check", "self-check@localhost", Role::Buyer, chrono::Duration::minutes(1));
        let token = encode(&Header::new(Algorithm::RS256), &sample, self.encoding_key()?)
            .map_err(|e| ConfigError::InvalidValue(format!("private key cannot sign: {}", e)))?;

        decode::<Claims>(&token, &self.decoding, &Validation::new(Algorithm::RS256))
            .map(|_| ())
            .map_err(|_| {
                ConfigError::InvalidValue("public key does not match private key".to_string())
                    .into()
            })
    }
}

fn parse_public(public_pem: &[u8]) -> Result<DecodingKey, AppError> {
    DecodingKey::from_rsa_pem(public_pem)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse public key: {}", e)).into())
}

fn read_pem(setting: &str, path: &str) -> Result<Vec<u8>, AppError> {
    if path.trim().is_empty() {
        return Err(ConfigError::MissingRequired(setting.to_string()).into());
    }

    fs::read(Path::new(path)).map_err(|e| {
        ConfigError::InvalidValue(format!("failed to read {} ({}): {}", setting, path, e)).into()
    })
}
