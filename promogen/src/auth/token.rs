//! Identity provider session token verification.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AuthConfig, JwtKey},
    errors::Error,
    types::UserId,
};

/// Claims the service reads from a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Origin the token was issued for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
}

/// Verify a bearer token and return its claims.
///
/// Without a configured key every token is rejected.
pub fn verify_session_token(token: &str, config: &AuthConfig) -> Result<SessionClaims, Error> {
    let Some(jwt) = config.jwt.as_ref() else {
        tracing::warn!("Bearer token presented but auth.jwt is not configured");
        return Err(Error::Unauthenticated { message: None });
    };

    let (key, algorithm) = match jwt {
        JwtKey::Rs256 { public_key } => (
            DecodingKey::from_rsa_pem(public_key.as_bytes()).map_err(|e| Error::Internal {
                operation: format!("load RS256 public key: {e}"),
            })?,
            Algorithm::RS256,
        ),
        JwtKey::Hs256 { secret } => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = config.leeway.as_secs();
    validation.validate_nbf = true;
    // Session tokens carry no audience; azp is checked below instead
    validation.validate_aud = false;
    if let Some(issuer) = &config.issuer {
        validation.set_issuer(&[issuer]);
    }

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::ExpiredSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::InvalidAlgorithm => Error::Unauthenticated { message: None },

        // Server errors (500) - key issues, internal failures
        ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::RsaFailedSigning
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::MissingAlgorithm
        | ErrorKind::Crypto(_) => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },

        _ => Error::Internal {
            operation: format!("JWT verification (unknown error): {e}"),
        },
    })?;

    let claims = token_data.claims;
    if !config.authorized_parties.is_empty()
        && !claims
            .azp
            .as_ref()
            .is_some_and(|azp| config.authorized_parties.iter().any(|party| party == azp))
    {
        tracing::debug!(azp = ?claims.azp, "Token issued for an unauthorized party");
        return Err(Error::Unauthenticated { message: None });
    }
    if claims.sub.is_empty() {
        return Err(Error::Unauthenticated { message: None });
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::Duration;

    const SECRET: &str = "test-secret-key-for-jwt";

    fn config() -> AuthConfig {
        AuthConfig {
            jwt: Some(JwtKey::Hs256 {
                secret: SECRET.to_string(),
            }),
            leeway: Duration::from_secs(0),
            ..Default::default()
        }
    }

    fn claims(sub: &str) -> SessionClaims {
        SessionClaims {
            sub: sub.to_string(),
            exp: Utc::now().timestamp() + 3600,
            nbf: None,
            iss: None,
            azp: None,
        }
    }

    fn sign(claims: &SessionClaims, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_valid_token() {
        let token = sign(&claims("user_1"), SECRET);
        let verified = verify_session_token(&token, &config()).unwrap();
        assert_eq!(verified.sub, "user_1");
    }

    #[test]
    fn test_rejections_are_unauthenticated() {
        let config = config();

        let wrong_key = sign(&claims("user_1"), "another-secret");
        assert!(matches!(
            verify_session_token(&wrong_key, &config),
            Err(Error::Unauthenticated { .. })
        ));

        let expired = sign(
            &SessionClaims {
                exp: Utc::now().timestamp() - 60,
                ..claims("user_1")
            },
            SECRET,
        );
        assert!(matches!(
            verify_session_token(&expired, &config),
            Err(Error::Unauthenticated { .. })
        ));

        let not_yet = sign(
            &SessionClaims {
                nbf: Some(Utc::now().timestamp() + 600),
                ..claims("user_1")
            },
            SECRET,
        );
        assert!(verify_session_token(&not_yet, &config).is_err());

        assert!(matches!(
            verify_session_token("not-a-jwt", &config),
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[test]
    fn test_unconfigured_key_rejects() {
        let token = sign(&claims("user_1"), SECRET);
        let result = verify_session_token(&token, &AuthConfig::default());
        assert!(matches!(result, Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_issuer_and_authorized_parties() {
        let config = AuthConfig {
            issuer: Some("https://clerk.example.com".to_string()),
            authorized_parties: vec!["https://app.example.com".to_string()],
            ..config()
        };

        let good = sign(
            &SessionClaims {
                iss: Some("https://clerk.example.com".to_string()),
                azp: Some("https://app.example.com".to_string()),
                ..claims("user_1")
            },
            SECRET,
        );
        assert!(verify_session_token(&good, &config).is_ok());

        let wrong_party = sign(
            &SessionClaims {
                iss: Some("https://clerk.example.com".to_string()),
                azp: Some("https://evil.example.com".to_string()),
                ..claims("user_1")
            },
            SECRET,
        );
        assert!(verify_session_token(&wrong_party, &config).is_err());

        let wrong_issuer = sign(
            &SessionClaims {
                iss: Some("https://other.example.com".to_string()),
                azp: Some("https://app.example.com".to_string()),
                ..claims("user_1")
            },
            SECRET,
        );
        assert!(verify_session_token(&wrong_issuer, &config).is_err());
    }
}
