use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenAction {
    Confirm,
    ResetPassword,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    confirm: i64,
    action: TokenAction,
    iat: u64,
    exp: u64,
}

/// Signs and checks the time-limited tokens mailed to users.
#[derive(Clone)]
pub struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expiration: i64,
}

impl Keys {
    pub fn new(secret: &[u8], expiration: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            expiration,
        }
    }

    pub fn generate(&self, user_pk: i64, action: TokenAction) -> Result<String, AppError> {
        self.generate_with_expiration(user_pk, action, self.expiration)
    }

    pub fn generate_with_expiration(
        &self,
        user_pk: i64,
        action: TokenAction,
        expiration: i64,
    ) -> Result<String, AppError> {
        let iat = get_current_timestamp();
        let claims = TokenClaims {
            confirm: user_pk,
            action,
            iat,
            exp: (iat as i64).saturating_add(expiration).max(0) as u64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AppError::TokenSigning)
    }

    /// Fails unless the token is intact, unexpired, and was issued to `user_pk` for `action`.
    pub fn verify(&self, token: &str, user_pk: i64, action: TokenAction) -> Result<(), AppError> {
        let claims = decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(AppError::InvalidToken)?
            .claims;
        if claims.confirm != user_pk || claims.action != action {
            return Err(AppError::TokenMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Keys {
        Keys::new(b"hard to guess", 3600)
    }

    #[test]
    fn test_valid_token() {
        let keys = keys();
        let token = keys.generate(1, TokenAction::Confirm).unwrap();
        assert!(keys.verify(&token, 1, TokenAction::Confirm).is_ok());
    }

    #[test]
    fn test_token_for_another_user() {
        let keys = keys();
        let token = keys.generate(1, TokenAction::Confirm).unwrap();
        assert!(matches!(
            keys.verify(&token, 2, TokenAction::Confirm),
            Err(AppError::TokenMismatch)
        ));
    }

    #[test]
    fn test_token_for_another_action() {
        let keys = keys();
        let token = keys.generate(1, TokenAction::Confirm).unwrap();
        assert!(matches!(
            keys.verify(&token, 1, TokenAction::ResetPassword),
            Err(AppError::TokenMismatch)
        ));
    }

    #[test]
    fn test_expired_token() {
        let keys = keys();
        let token = keys
            .generate_with_expiration(1, TokenAction::Confirm, -10)
            .unwrap();
        assert!(matches!(
            keys.verify(&token, 1, TokenAction::Confirm),
            Err(AppError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_token_signed_with_another_secret() {
        let token = Keys::new(b"another secret", 3600)
            .generate(1, TokenAction::Confirm)
            .unwrap();
        assert!(matches!(
            keys().verify(&token, 1, TokenAction::Confirm),
            Err(AppError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_garbage_token() {
        assert!(matches!(
            keys().verify("not-a-token", 1, TokenAction::Confirm),
            Err(AppError::InvalidToken(_))
        ));
    }
}
