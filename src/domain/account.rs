//! OAuth account domain types.
//!
//! An account links a user to an identity at an OAuth provider. The pair
//! (provider, provider_account_id) identifies the remote identity globally.

use serde::{Deserialize, Serialize};

use super::{AccountId, UserId};

/// An OAuth provider linkage for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for this account link.
    pub id: AccountId,
    /// User this account belongs to.
    pub user_id: UserId,
    /// Account kind, e.g. "oauth" or "oidc".
    pub account_type: String,
    /// Provider name, e.g. "google".
    pub provider: String,
    /// Subject identifier at the provider.
    pub provider_account_id: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    /// Access token expiry as Unix seconds.
    pub expires_at: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
    pub session_state: Option<String>,
}

impl Account {
    /// Creates an OAuth account link with no tokens.
    pub fn oauth(
        user_id: UserId,
        provider: impl Into<String>,
        provider_account_id: impl Into<String>,
    ) -> Self {
        Self {
            id: AccountId::generate(),
            user_id,
            account_type: "oauth".to_string(),
            provider: provider.into(),
            provider_account_id: provider_account_id.into(),
            refresh_token: None,
            access_token: None,
            expires_at: None,
            token_type: None,
            scope: None,
            id_token: None,
            session_state: None,
        }
    }
}

/// Token material returned by a provider on sign-in or refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

impl OAuthTokens {
    /// Copies the token material onto an account.
    ///
    /// A missing refresh token keeps the stored one, since providers only
    /// return it on the first consent.
    pub fn apply_to(&self, account: &mut Account) {
        account.access_token = self.access_token.clone();
        if self.refresh_token.is_some() {
            account.refresh_token = self.refresh_token.clone();
        }
        account.expires_at = self.expires_at;
        account.token_type = self.token_type.clone();
        account.scope = self.scope.clone();
        account.id_token = self.id_token.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_account_defaults() {
        let account = Account::oauth(UserId::from("user-1"), "google", "sub-123");
        assert_eq!(account.account_type, "oauth");
        assert_eq!(account.provider, "google");
        assert!(account.refresh_token.is_none());
    }

    #[test]
    fn tokens_keep_existing_refresh_token() {
        let mut account = Account::oauth(UserId::from("user-1"), "google", "sub-123");
        account.refresh_token = Some("refresh-1".to_string());

        let tokens = OAuthTokens {
            access_token: Some("access-2".to_string()),
            expires_at: Some(1_700_000_000),
            ..Default::default()
        };
        tokens.apply_to(&mut account);

        assert_eq!(account.access_token.as_deref(), Some("access-2"));
        assert_eq!(account.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(account.expires_at, Some(1_700_000_000));
    }

    #[test]
    fn account_serialization() {
        let account = Account::oauth(UserId::from("user-1"), "google", "sub-123");
        let json = serde_json::to_string(&account).unwrap();
        let deserialized: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, account);
    }
}
