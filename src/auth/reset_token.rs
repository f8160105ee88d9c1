use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PURPOSE: &str = "password_reset";

#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    user_id: Uuid,
    purpose: String,
    iat: i64,
    exp: i64,
}

/// Stateless, signed password-reset tokens.
///
/// A token is an HS256 JWT carrying the user id and its issue time. It is
/// valid while `now - issued_at < window`. Nothing is stored server side, so a
/// token cannot be revoked: it stays usable for its whole window even after a
/// successful reset or a newer request.
#[derive(Clone)]
pub struct ResetTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    window: Duration,
}

impl ResetTokens {
    pub fn new(secret: &str, window: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            window,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = ResetClaims {
            user_id,
            purpose: PURPOSE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.window).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    /// The user id the token was issued for, or `None` when the token is
    /// forged, malformed, meant for something else, or expired.
    pub fn verify(&self, token: &str) -> Option<Uuid> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<Uuid> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged against `now` below, not the wall clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = decode::<ResetClaims>(token, &self.decoding_key, &validation)
            .ok()?
            .claims;
        if claims.purpose != PURPOSE {
            return None;
        }

        let age = now.timestamp() - claims.iat;
        if age < 0 || age >= self.window.num_seconds() {
            return None;
        }
        Some(claims.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use chrono::TimeZone;

    fn tokens() -> ResetTokens {
        ResetTokens::new("test_secret", Duration::minutes(30))
    }

    fn issued_at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_valid_inside_window() {
        let tokens = tokens();
        let user_id = Uuid::new_v4();
        let token = tokens.issue_at(user_id, issued_at()).unwrap();

        assert_eq!(tokens.verify_at(&token, issued_at()), Some(user_id));
        assert_eq!(
            tokens.verify_at(&token, issued_at() + Duration::minutes(29) + Duration::seconds(59)),
            Some(user_id)
        );
    }

    #[test]
    fn test_expires_at_window_boundary() {
        let tokens = tokens();
        let token = tokens.issue_at(Uuid::new_v4(), issued_at()).unwrap();

        assert_eq!(tokens.verify_at(&token, issued_at() + Duration::minutes(30)), None);
        assert_eq!(tokens.verify_at(&token, issued_at() + Duration::days(2)), None);
    }

    #[test]
    fn test_token_from_the_future_is_rejected() {
        let tokens = tokens();
        let token = tokens.issue_at(Uuid::new_v4(), issued_at()).unwrap();
        assert_eq!(tokens.verify_at(&token, issued_at() - Duration::seconds(1)), None);
    }

    #[test]
    fn test_other_secret_is_rejected() {
        let token = tokens().issue_at(Uuid::new_v4(), issued_at()).unwrap();
        let other = ResetTokens::new("another_secret", Duration::minutes(30));
        assert_eq!(other.verify_at(&token, issued_at()), None);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let tokens = tokens();
        let token = tokens.issue_at(Uuid::new_v4(), issued_at()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = serde_json::json!({
            "user_id": Uuid::new_v4(),
            "purpose": PURPOSE,
            "iat": issued_at().timestamp(),
            "exp": (issued_at() + Duration::minutes(30)).timestamp(),
        });
        let forged_payload = URL_SAFE_NO_PAD.encode(forged_claims.to_string());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(tokens.verify_at(&forged, issued_at()), None);
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let tokens = tokens();
        let token = tokens.issue_at(Uuid::new_v4(), issued_at()).unwrap();
        let (head, signature) = token.rsplit_once('.').unwrap();
        let first = signature.chars().next().unwrap();
        let swapped = if first == 'A' { 'B' } else { 'A' };
        let forged = format!("{}.{}{}", head, swapped, &signature[1..]);

        assert_eq!(tokens.verify_at(&forged, issued_at()), None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let tokens = tokens();
        assert_eq!(tokens.verify_at("", issued_at()), None);
        assert_eq!(tokens.verify_at("not.a.token", issued_at()), None);
    }

    #[test]
    fn test_token_is_not_revoked_by_reissue() {
        let tokens = tokens();
        let user_id = Uuid::new_v4();
        let first = tokens.issue_at(user_id, issued_at()).unwrap();
        let _second = tokens.issue_at(user_id, issued_at() + Duration::minutes(5)).unwrap();

        assert_eq!(tokens.verify_at(&first, issued_at() + Duration::minutes(10)), Some(user_id));
    }
}
