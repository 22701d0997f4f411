//! Account handlers

use axum::extract::State;
use axum::Json;
use headshot_types::{Account, AccountId, Plan, PlanTier, SubscriptionStatus};
use serde::Serialize;

use super::shared::current_account;
use crate::error::ApiResult;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// Account profile
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub email: String,
    pub plan: Plan,
    pub plan_tier: Option<PlanTier>,
    pub subscription_status: SubscriptionStatus,
    pub credits: i64,
    /// Paid plan with an attached subscription, not metered
    pub unlimited: bool,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            plan: account.plan,
            plan_tier: account.plan_tier,
            subscription_status: account.subscription_status,
            credits: account.credits,
            unlimited: account.has_unlimited_usage(),
        }
    }
}

/// POST /api/v1/account/ensure
///
/// Create the caller's account on first sign-in, refresh the email otherwise.
pub async fn ensure_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<AccountResponse>> {
    let account = state.accounts.sign_in(&user.identity).await?;
    Ok(Json(AccountResponse::from(&account)))
}

/// GET /api/v1/account
pub async fn get_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<AccountResponse>> {
    let account = current_account(&state, &user).await?;
    let balance = state.ledger.balance(account.id).await?;

    let mut response = AccountResponse::from(&account);
    response.credits = balance.credits;
    response.unlimited = balance.unlimited;
    Ok(Json(response))
}
