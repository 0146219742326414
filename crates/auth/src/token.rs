//! Bearer token issuance and validation (HS256, shared secret).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Deserialize;
use thiserror::Error;

use bizhub_core::{TenantId, UserId};

use crate::{JwtClaims, Role, TokenValidationError, UserClaim, validate_claims};

/// Longest accepted access token lifetime (one year).
pub const MAX_ACCESS_TOKEN_MINUTES: i64 = 60 * 24 * 365;

/// Token settings, loaded from configuration.
#[derive(Clone, Deserialize)]
pub struct JwtSettings {
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_true")]
    pub validate_issuer: bool,
    #[serde(default = "default_true")]
    pub validate_audience: bool,
    #[serde(default = "default_true")]
    pub validate_lifetime: bool,
    #[serde(default = "default_expire_minutes")]
    pub access_token_expire_minutes: i64,
}

fn default_issuer() -> String {
    "bizhub".to_string()
}

fn default_audience() -> String {
    "bizhub-clients".to_string()
}

fn default_true() -> bool {
    true
}

fn default_expire_minutes() -> i64 {
    60
}

impl JwtSettings {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: default_issuer(),
            audience: default_audience(),
            validate_issuer: true,
            validate_audience: true,
            validate_lifetime: true,
            access_token_expire_minutes: default_expire_minutes(),
        }
    }

    /// Configured token lifetime, bounded to `1..=MAX_ACCESS_TOKEN_MINUTES`.
    pub fn access_token_lifetime(&self) -> Result<Duration, TokenError> {
        let minutes = self.access_token_expire_minutes;
        if !(1..=MAX_ACCESS_TOKEN_MINUTES).contains(&minutes) {
            return Err(TokenError::InvalidLifetime(minutes));
        }
        Duration::try_minutes(minutes).ok_or(TokenError::InvalidLifetime(minutes))
    }
}

impl core::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("validate_issuer", &self.validate_issuer)
            .field("validate_audience", &self.validate_audience)
            .field("validate_lifetime", &self.validate_lifetime)
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to encode token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Lifetime(#[from] TokenValidationError),

    #[error("access token lifetime must be between 1 and 525600 minutes, got {0}")]
    InvalidLifetime(i64),
}

/// Build claims for a user with the configured issuer, audience and expiry.
pub fn claims_for(
    settings: &JwtSettings,
    user_id: UserId,
    tenant_id: TenantId,
    roles: Vec<Role>,
    claims: Vec<UserClaim>,
    now: DateTime<Utc>,
) -> Result<JwtClaims, TokenError> {
    let lifetime = settings.access_token_lifetime()?;
    let expires = now
        .checked_add_signed(lifetime)
        .ok_or(TokenError::InvalidLifetime(settings.access_token_expire_minutes))?;
    Ok(JwtClaims {
        sub: user_id,
        tenant_id,
        roles,
        claims,
        iss: settings.issuer.clone(),
        aud: settings.audience.clone(),
        iat: now.timestamp(),
        exp: expires.timestamp(),
    })
}

/// Issues and validates bearer tokens.
pub trait TokenService: Send + Sync {
    fn settings(&self) -> &JwtSettings;

    fn issue(&self, claims: &JwtClaims) -> Result<String, TokenError>;

    fn validate(&self, token: &str) -> Result<JwtClaims, TokenError>;
}

/// HS256 token service keyed by a shared secret.
pub struct Hs256TokenService {
    settings: JwtSettings,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256TokenService {
    pub fn new(settings: JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        if settings.validate_issuer {
            validation.set_issuer(&[settings.issuer.as_str()]);
        }
        if settings.validate_audience {
            validation.set_audience(&[settings.audience.as_str()]);
        } else {
            validation.validate_aud = false;
        }
        if !settings.validate_lifetime {
            validation.validate_exp = false;
            validation.required_spec_claims.remove("exp");
        }

        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            settings,
        }
    }
}

impl TokenService for Hs256TokenService {
    fn settings(&self) -> &JwtSettings {
        &self.settings
    }

    fn issue(&self, claims: &JwtClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(TokenError::Encode)
    }

    fn validate(&self, token: &str) -> Result<JwtClaims, TokenError> {
        let data = decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(TokenError::Invalid)?;
        if self.settings.validate_lifetime {
            validate_claims(&data.claims, Utc::now())?;
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> Hs256TokenService {
        Hs256TokenService::new(JwtSettings::with_secret(secret))
    }

    fn admin_claims(svc: &Hs256TokenService) -> JwtClaims {
        claims_for(
            svc.settings(),
            UserId::new(),
            TenantId::new(),
            vec![Role::ADMIN],
            vec![UserClaim::new("Edit Customer", "True")],
            Utc::now(),
        )
        .unwrap()
    }

    fn claims_with_lifetime(minutes: i64) -> Result<JwtClaims, TokenError> {
        let mut settings = JwtSettings::with_secret("s3cret");
        settings.access_token_expire_minutes = minutes;
        claims_for(&settings, UserId::new(), TenantId::new(), vec![], vec![], Utc::now())
    }

    #[test]
    fn issued_token_validates_and_round_trips_claims() {
        let svc = service("s3cret");
        let claims = admin_claims(&svc);
        let token = svc.issue(&claims).unwrap();
        assert_eq!(svc.validate(&token).unwrap(), claims);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = service("one").issue(&admin_claims(&service("one"))).unwrap();
        assert!(matches!(service("two").validate(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let issuer = service("s3cret");
        let mut claims = admin_claims(&issuer);
        claims.iss = "someone-else".into();
        let token = issuer.issue(&claims).unwrap();
        assert!(matches!(issuer.validate(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn audience_mismatch_is_rejected_unless_disabled() {
        let strict = service("s3cret");
        let mut claims = admin_claims(&strict);
        claims.aud = "other-app".into();
        let token = strict.issue(&claims).unwrap();
        assert!(strict.validate(&token).is_err());

        let mut settings = JwtSettings::with_secret("s3cret");
        settings.validate_audience = false;
        let lenient = Hs256TokenService::new(settings);
        assert!(lenient.validate(&token).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service("s3cret");
        let mut claims = admin_claims(&svc);
        claims.iat -= 3_600;
        claims.exp = claims.iat + 60;
        let token = svc.issue(&claims).unwrap();
        assert!(svc.validate(&token).is_err());
    }

    #[test]
    fn lifetime_outside_bounds_is_an_error_not_a_panic() {
        for minutes in [0, -5, MAX_ACCESS_TOKEN_MINUTES + 1, i64::MAX / 2, i64::MIN] {
            assert!(
                matches!(claims_with_lifetime(minutes), Err(TokenError::InvalidLifetime(m)) if m == minutes),
                "lifetime {minutes} should be rejected"
            );
        }
    }

    #[test]
    fn lifetime_sets_expiry_from_issue_time() {
        let claims = claims_with_lifetime(MAX_ACCESS_TOKEN_MINUTES).unwrap();
        assert_eq!(claims.exp - claims.iat, MAX_ACCESS_TOKEN_MINUTES * 60);

        let claims = claims_with_lifetime(15).unwrap();
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn token_from_issuer_with_clock_ahead_is_accepted() {
        let svc = service("s3cret");
        let mut claims = admin_claims(&svc);
        claims.iat += 5;
        let token = svc.issue(&claims).unwrap();
        assert!(svc.validate(&token).is_ok());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let rendered = format!("{:?}", JwtSettings::with_secret("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
