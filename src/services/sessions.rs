use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User id, as a string per RFC 7519.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SessionError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Could not sign token: {0}")]
    Signing(String),
}

/// Issues and checks HS256 session tokens.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String, SessionError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<String, SessionError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    /// Returns the user id carried by `token`.
    pub fn verify(&self, token: &str) -> Result<i64, SessionError> {
        self.verify_at(token, Utc::now())
    }

    /// Accepts the token while `now <= exp`; there is no leeway.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<i64, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| SessionError::Invalid(e.to_string()))?;

        if now.timestamp() > data.claims.exp {
            return Err(SessionError::Expired);
        }

        data.claims
            .sub
            .parse()
            .map_err(|_| SessionError::Invalid("subject is not a user id".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn issuer() -> SessionIssuer {
        SessionIssuer::new("test-secret", 3600)
    }

    #[test]
    fn token_carries_user_id() {
        let sessions = issuer();
        let token = sessions.issue(42).unwrap();

        assert_eq!(sessions.verify(&token), Ok(42));
    }

    #[rstest]
    #[case(0, true)]
    #[case(1800, true)]
    #[case(3600, true)]
    #[case(3601, false)]
    #[case(86_400, false)]
    fn token_is_valid_until_exactly_one_hour(#[case] elapsed: i64, #[case] accepted: bool) {
        let sessions = issuer();
        let issued = Utc::now();
        let token = sessions.issue_at(7, issued).unwrap();

        let result = sessions.verify_at(&token, issued + Duration::seconds(elapsed));

        if accepted {
            assert_eq!(result, Ok(7));
        } else {
            assert_eq!(result, Err(SessionError::Expired));
        }
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let token = SessionIssuer::new("other-secret", 3600).issue(1).unwrap();

        assert!(matches!(
            issuer().verify(&token),
            Err(SessionError::Invalid(_))
        ));
    }

    #[rstest]
    #[case("")]
    #[case("not-a-token")]
    #[case("a.b.c")]
    fn malformed_tokens_are_rejected(#[case] token: &str) {
        assert!(matches!(
            issuer().verify(token),
            Err(SessionError::Invalid(_))
        ));
    }
}
