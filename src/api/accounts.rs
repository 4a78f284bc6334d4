/// Account endpoints under /account
use crate::{
    account::{
        EmailRequest, LoginRequest, ResetPasswordRequest, ResetTokenRequest, SignUpRequest,
        StatusMessage, UserInfo,
    },
    auth::{clear_cookie, session_cookie, AuthContext, OptionalAuthContext},
    context::AppContext,
    error::AppResult,
    session::SESSION_COOKIE,
};
use axum::{
    extract::{Path, State},
    http::header::SET_COOKIE,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Form, Router,
};

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/account/signup", post(sign_up))
        .route("/account/login", post(login))
        .route("/account/logout", delete(logout))
        .route("/account/getUser", get(get_user))
        .route("/account/confirm/:token", get(confirm_email))
        .route("/account/againemail", post(resend_confirmation))
        .route("/account/forgot", post(forgot_password))
        .route("/account/confirm-pass/:token", get(confirm_reset_link))
        .route("/account/reset", post(check_reset_token).put(reset_password))
}

async fn sign_up(
    State(ctx): State<AppContext>,
    caller: OptionalAuthContext,
    Form(req): Form<SignUpRequest>,
) -> AppResult<Json<StatusMessage>> {
    caller.require_signed_out()?;

    ctx.account_manager
        .register_account(&req.name, &req.email, &req.password)
        .await?;

    Ok(Json(StatusMessage::new("verify email to continue")))
}

async fn login(
    State(ctx): State<AppContext>,
    caller: OptionalAuthContext,
    Form(req): Form<LoginRequest>,
) -> AppResult<Response> {
    caller.require_signed_out()?;

    let (_, token) = ctx.account_manager.login(&req.email, &req.password).await?;
    let cookie = session_cookie(
        &token,
        ctx.config.session.ttl,
        ctx.config.session.cookie_secure,
    )?;

    Ok((
        [(SET_COOKIE, cookie)],
        Json(StatusMessage::new("logged in successfully")),
    )
        .into_response())
}

async fn logout(State(ctx): State<AppContext>, auth: AuthContext) -> AppResult<Response> {
    ctx.account_manager.logout(&auth.token).await?;

    Ok((
        [(SET_COOKIE, clear_cookie(SESSION_COOKIE))],
        Json(StatusMessage::new("logged out")),
    )
        .into_response())
}

async fn get_user(State(ctx): State<AppContext>, auth: AuthContext) -> AppResult<Json<UserInfo>> {
    Ok(Json(ctx.account_manager.get_user(&auth.account_id).await?))
}

async fn confirm_email(
    State(ctx): State<AppContext>,
    caller: OptionalAuthContext,
    Path(token): Path<String>,
) -> AppResult<Json<StatusMessage>> {
    caller.require_signed_out()?;

    ctx.account_manager.confirm_email(&token).await?;
    Ok(Json(StatusMessage::new("email is confirmed")))
}

async fn resend_confirmation(
    State(ctx): State<AppContext>,
    Form(req): Form<EmailRequest>,
) -> AppResult<Json<StatusMessage>> {
    ctx.account_manager.resend_confirmation(&req.email).await?;
    Ok(Json(StatusMessage::new("email sent again")))
}

async fn forgot_password(
    State(ctx): State<AppContext>,
    caller: OptionalAuthContext,
    Form(req): Form<EmailRequest>,
) -> AppResult<Json<StatusMessage>> {
    caller.require_signed_out()?;

    ctx.account_manager.request_password_reset(&req.email).await?;
    Ok(Json(StatusMessage::new("email has been sent to your account")))
}

async fn confirm_reset_link(
    State(ctx): State<AppContext>,
    caller: OptionalAuthContext,
    Path(token): Path<String>,
) -> AppResult<Json<StatusMessage>> {
    caller.require_signed_out()?;

    ctx.account_manager.validate_reset_token(&token).await?;
    Ok(Json(StatusMessage::new("token verified, type your new password")))
}

async fn check_reset_token(
    State(ctx): State<AppContext>,
    caller: OptionalAuthContext,
    Form(req): Form<ResetTokenRequest>,
) -> AppResult<Json<StatusMessage>> {
    caller.require_signed_out()?;

    ctx.account_manager.validate_reset_token(&req.token).await?;
    Ok(Json(StatusMessage::new("token verified, type your new password")))
}

async fn reset_password(
    State(ctx): State<AppContext>,
    caller: OptionalAuthContext,
    Form(req): Form<ResetPasswordRequest>,
) -> AppResult<Json<StatusMessage>> {
    caller.require_signed_out()?;

    ctx.account_manager
        .reset_password(&req.token, &req.pass, &req.confirm_pass)
        .await?;
    Ok(Json(StatusMessage::new("your password changed")))
}
