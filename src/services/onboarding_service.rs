//! Onboarding service for sign-in, sessions and mailbox connection.

use chrono::Utc;
use serde::Serialize;

use super::error::{Result, ServiceError};
use crate::config::TriageSettings;
use crate::domain::{
    Account, Category, GmailAccount, NewGmailAccount, NewUser, OAuthTokens, Session, User,
    UserId, UserUpdate, VerificationToken,
};
use crate::storage::queries::{accounts, categories, gmail_accounts, sessions, users, verification_tokens};
use crate::storage::Database;

/// Identity returned by an OAuth provider after consent.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider: String,
    pub provider_account_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub tokens: OAuthTokens,
}

/// A user together with the account link that signed them in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedAccount {
    pub user: User,
    pub account: Account,
    /// True if this sign-in created the user.
    pub new_user: bool,
}

/// A connected mailbox and the categories available to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectedMailbox {
    pub gmail: GmailAccount,
    pub categories: Vec<Category>,
}

/// Rows removed by [`OnboardingService::prune_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub sessions: usize,
    pub verification_tokens: usize,
}

/// Service for user onboarding and session bookkeeping.
pub struct OnboardingService {
    db: Database,
    settings: TriageSettings,
}

impl OnboardingService {
    pub fn new(db: Database, settings: TriageSettings) -> Self {
        Self { db, settings }
    }

    /// Signs in through an OAuth provider.
    ///
    /// A known provider identity gets its tokens refreshed. An unknown one is
    /// linked to the user with the same email, who is created if needed.
    pub async fn link_oauth_account(&self, profile: OAuthProfile) -> Result<LinkedAccount> {
        let linked = self
            .db
            .transaction(move |tx| {
                if let Some(existing) =
                    accounts::get_by_provider(tx, &profile.provider, &profile.provider_account_id)?
                {
                    let account = accounts::update_tokens(tx, &existing.id, &profile.tokens)?;
                    let user = users::require(tx, &account.user_id)?;
                    return Ok(LinkedAccount {
                        user,
                        account,
                        new_user: false,
                    });
                }

                let new_user = users::get_by_email(tx, &profile.email)?.is_none();

                let mut candidate = NewUser::with_email(profile.email);
                if let Some(name) = profile.name {
                    candidate = candidate.name(name);
                }
                if let Some(image) = profile.image {
                    candidate = candidate.image(image);
                }
                let user = users::upsert_by_email(tx, &candidate.into_user(Utc::now()))?;

                let mut account = Account::oauth(
                    user.id.clone(),
                    profile.provider,
                    profile.provider_account_id,
                );
                profile.tokens.apply_to(&mut account);
                let account = accounts::upsert(tx, &account)?;

                Ok(LinkedAccount {
                    user,
                    account,
                    new_user,
                })
            })
            .await
            .map_err(ServiceError::from_storage)?;

        tracing::info!(
            user_id = %linked.user.id,
            provider = %linked.account.provider,
            new_user = linked.new_user,
            "oauth account linked"
        );
        Ok(linked)
    }

    /// Connects a Gmail mailbox and ensures the default categories exist.
    ///
    /// Reconnecting the same Google identity refreshes its tokens and keeps
    /// its sync state. Existing categories are never modified.
    pub async fn connect_gmail(&self, connection: NewGmailAccount) -> Result<ConnectedMailbox> {
        let seeds = self.settings.default_categories.clone();

        let connected = self
            .db
            .transaction(move |tx| {
                users::require(tx, &connection.user_id)?;
                let now = Utc::now();
                let gmail = gmail_accounts::upsert(tx, &connection.into_account(now))?;

                for seed in &seeds {
                    if categories::get_by_name(tx, &gmail.user_id, &seed.name)?.is_some() {
                        continue;
                    }
                    let mut category = Category::new(gmail.user_id.clone(), seed.name.as_str(), now);
                    if let Some(description) = &seed.description {
                        category = category.with_description(description.as_str());
                    }
                    categories::insert(tx, &category)?;
                }

                let categories = categories::get_by_user(tx, &gmail.user_id)?;
                Ok(ConnectedMailbox { gmail, categories })
            })
            .await
            .map_err(ServiceError::from_storage)?;

        tracing::info!(
            gmail_account_id = %connected.gmail.id,
            email = %connected.gmail.email,
            categories = connected.categories.len(),
            "mailbox connected"
        );
        Ok(connected)
    }

    /// Starts a session for the user using the configured lifetime.
    pub async fn start_session(&self, user_id: &UserId) -> Result<Session> {
        let user_id = user_id.clone();
        let ttl = self.settings.session_ttl();

        self.db
            .transaction(move |tx| {
                users::require(tx, &user_id)?;
                let session = Session::issue(user_id, Utc::now(), ttl);
                sessions::insert(tx, &session)?;
                Ok(session)
            })
            .await
            .map_err(ServiceError::from_storage)
    }

    /// Looks up a live session and its user.
    ///
    /// An expired session is deleted and reported as absent.
    pub async fn resolve_session(&self, session_token: &str) -> Result<Option<(Session, User)>> {
        let token = session_token.to_string();

        let resolved = self
            .db
            .transaction(move |tx| {
                let Some(session) = sessions::get_by_token(tx, &token)? else {
                    return Ok(None);
                };
                if session.is_expired(Utc::now()) {
                    sessions::delete(tx, &session.id)?;
                    tracing::debug!(session_id = %session.id, "expired session removed");
                    return Ok(None);
                }
                let user = users::require(tx, &session.user_id)?;
                Ok(Some((session, user)))
            })
            .await?;
        Ok(resolved)
    }

    /// Pushes a session's expiry out by the configured lifetime.
    pub async fn refresh_session(&self, session_token: &str) -> Result<Session> {
        let token = session_token.to_string();
        let expires = Utc::now() + self.settings.session_ttl();

        self.db
            .with_conn(move |conn| sessions::extend(conn, &token, expires))
            .await
            .map_err(ServiceError::from_storage)
    }

    /// Ends a session. Returns false if the token was unknown.
    pub async fn end_session(&self, session_token: &str) -> Result<bool> {
        let token = session_token.to_string();

        let ended = self
            .db
            .transaction(move |tx| match sessions::get_by_token(tx, &token)? {
                Some(session) => sessions::delete(tx, &session.id),
                None => Ok(false),
            })
            .await?;
        Ok(ended)
    }

    /// Issues a verification token for `identifier`.
    pub async fn issue_verification(&self, identifier: &str) -> Result<VerificationToken> {
        let token = VerificationToken::issue(identifier, Utc::now(), self.settings.verification_ttl());

        let stored = token.clone();
        self.db
            .with_conn(move |conn| verification_tokens::insert(conn, &stored))
            .await?;
        Ok(token)
    }

    /// Redeems a verification token.
    ///
    /// The token is consumed whether or not it is still valid. A valid token
    /// marks the user with a matching email as verified.
    pub async fn redeem_verification(&self, identifier: &str, token: &str) -> Result<bool> {
        let identifier = identifier.to_string();
        let token = token.to_string();

        let redeemed = self
            .db
            .transaction(move |tx| {
                let now = Utc::now();
                let Some(found) = verification_tokens::consume(tx, &identifier, &token)? else {
                    return Ok(false);
                };
                if found.is_expired(now) {
                    tracing::debug!(identifier = %identifier, "verification token expired");
                    return Ok(false);
                }
                if let Some(user) = users::get_by_email(tx, &identifier)? {
                    users::update(tx, &user.id, &UserUpdate::new().email_verified(Some(now)))?;
                }
                Ok(true)
            })
            .await?;
        Ok(redeemed)
    }

    /// Deletes expired sessions and verification tokens.
    pub async fn prune_expired(&self) -> Result<PruneReport> {
        let report = self
            .db
            .transaction(|tx| {
                let now = Utc::now();
                Ok(PruneReport {
                    sessions: sessions::delete_expired(tx, now)?,
                    verification_tokens: verification_tokens::delete_expired(tx, now)?,
                })
            })
            .await?;

        tracing::info!(
            sessions = report.sessions,
            verification_tokens = report.verification_tokens,
            "expired credentials pruned"
        );
        Ok(report)
    }
}
