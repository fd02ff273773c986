//! HTTP request handlers for the keygate auth surface

use crate::guard::{bearer_token, status_for, AccessGuard};
use crate::server::{json_response, BoxBody};
use http_body_util::BodyExt;
use hyper::{Method, Request, Response, StatusCode};
use keygate_core::{
    secrets_match, AccountAuth, AccountId, AccountSecretStore, AuthService, KeygateError,
    MemoryAccountStore,
    TokenKind, TokenPair,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type SharedStore = Arc<MemoryAccountStore>;

/// Login credential checked by the server
///
/// Password verification proper (hashing, persistence) belongs to the
/// embedding application; the demo wiring keeps an operator-seeded map.
#[derive(Debug, Clone)]
pub struct Credential {
    pub password: String,
    pub account: AccountId,
}

/// Shared per-request handler state
#[derive(Clone)]
pub struct AppContext {
    pub service: Arc<AuthService<SharedStore>>,
    pub guard: Arc<AccessGuard<SharedStore>>,
    pub store: SharedStore,
    pub credentials: Arc<HashMap<String, Credential>>,
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    account: LoginBody,
}

#[derive(Serialize)]
struct AuthTokens {
    token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

#[derive(Serialize)]
struct AuthResponse {
    auth: AuthTokens,
}

/// Main request handler
pub async fn handle_request<B>(
    req: Request<B>,
    ctx: AppContext,
    remote: SocketAddr,
) -> Result<Response<BoxBody>, Infallible>
where
    B: hyper::body::Body,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Handling {} {} from {}", method, path, remote);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => handle_health(),
        (&Method::PUT, "/auth/login") => handle_login(req, &ctx).await,
        (&Method::PUT, "/auth/refresh") => handle_refresh(&req, &ctx),
        (&Method::GET, "/auth/me") => handle_me(&req, &ctx),
        (&Method::PUT, "/auth/key-rotate") => handle_rotate(&req, &ctx, remote),
        _ => json_response(
            StatusCode::NOT_FOUND,
            json!({"error": "Not found"}).to_string(),
        ),
    };

    info!("{} {} -> {}", method, path, response.status());
    Ok(response)
}

fn handle_health() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        json!({
            "status": "healthy",
            "version": "0.1.0",
            "service": "keygate"
        })
        .to_string(),
    )
}

/// Check credentials and issue a fresh token pair
async fn handle_login<B>(req: Request<B>, ctx: &AppContext) -> Response<BoxBody>
where
    B: hyper::body::Body,
{
    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({"error": "Failed to read request body"}).to_string(),
            )
        }
    };

    let login: LoginRequest = match serde_json::from_slice(&body) {
        Ok(login) => login,
        Err(_) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({"error": "Invalid login payload"}).to_string(),
            )
        }
    };

    // Unknown email and wrong password answer identically
    let Some(credential) = ctx.credentials.get(&login.account.email) else {
        debug!("Login failed: unknown email");
        return invalid_credentials();
    };
    if !secrets_match(&login.account.password, &credential.password) {
        debug!("Login failed: bad password for account {}", credential.account);
        return invalid_credentials();
    }

    let (permission, fingerprint) = match ctx.store.permission_and_fingerprint(credential.account)
    {
        Ok(live) => live,
        Err(KeygateError::AccountNotFound(_)) => return invalid_credentials(),
        Err(e) => return auth_error_response(&e),
    };

    match ctx.service.generate(&AccountAuth {
        id: credential.account,
        permission,
        fingerprint,
    }) {
        Ok(pair) => {
            info!("Issued token pair for account {}", credential.account);
            token_pair_response(pair)
        }
        Err(e) => auth_error_response(&e),
    }
}

/// Exchange the presented refresh token for a new pair
fn handle_refresh<B>(req: &Request<B>, ctx: &AppContext) -> Response<BoxBody> {
    let Some(token) = bearer_token(req) else {
        return auth_error_response(&KeygateError::Malformed);
    };

    match ctx.service.refresh(&token) {
        Ok(pair) => token_pair_response(pair),
        Err(e) => auth_error_response(&e),
    }
}

/// Echo the verified principal
fn handle_me<B>(req: &Request<B>, ctx: &AppContext) -> Response<BoxBody> {
    match ctx.guard.authenticate(req, TokenKind::Access) {
        Ok(principal) => json_response(
            StatusCode::OK,
            json!({
                "account": {
                    "id": principal.account_id.get(),
                    "permission": principal.permission.bits(),
                }
            })
            .to_string(),
        ),
        Err(e) => auth_error_response(&e),
    }
}

/// Rotate the signing key; reachable only from allowlisted addresses
fn handle_rotate<B>(req: &Request<B>, ctx: &AppContext, remote: SocketAddr) -> Response<BoxBody> {
    let source = match ctx.guard.require_allowed_ip(req, remote) {
        Ok(source) => source,
        Err(e) => {
            warn!("Key rotation denied for {}", remote);
            return auth_error_response(&e);
        }
    };

    let key = ctx.service.rotate_key();
    info!("Signing key rotated to {} by {}", key.version(), source);

    json_response(
        StatusCode::OK,
        json!({"keyVersion": key.version().get()}).to_string(),
    )
}

fn token_pair_response(pair: TokenPair) -> Response<BoxBody> {
    let body = AuthResponse {
        auth: AuthTokens {
            token: pair.access.clone(),
            refresh_token: pair.refresh,
        },
    };

    let mut response = json_response(
        StatusCode::OK,
        serde_json::to_string(&body).unwrap_or_default(),
    );
    if let Ok(cookie) =
        format!("token={}; Path=/; HttpOnly; SameSite=Lax", pair.access).parse()
    {
        response.headers_mut().insert("set-cookie", cookie);
    }
    response
}

fn invalid_credentials() -> Response<BoxBody> {
    json_response(
        StatusCode::UNAUTHORIZED,
        json!({"error": "Invalid credentials"}).to_string(),
    )
}

/// Map an auth failure to its response, logging signature failures apart
fn auth_error_response(error: &KeygateError) -> Response<BoxBody> {
    match error {
        KeygateError::SignatureInvalid => warn!("Rejected token with invalid signature"),
        KeygateError::StoreUnavailable(_)
        | KeygateError::Internal(_)
        | KeygateError::Serialization(_) => {
            tracing::error!("Auth failure: {}", error)
        }
        _ => debug!("Auth failure: {}", error),
    }

    let message = match error {
        // Tampered and unparseable tokens look identical on the wire
        KeygateError::Malformed | KeygateError::SignatureInvalid => "Invalid token",
        KeygateError::Expired => "Token expired",
        KeygateError::WrongKind { .. } => "Wrong token kind",
        KeygateError::Revoked | KeygateError::AccountNotFound(_) => "Token revoked",
        KeygateError::PermissionDenied => "Permission denied",
        KeygateError::Forbidden => "Forbidden",
        KeygateError::StoreUnavailable(_) => "Temporarily unavailable",
        KeygateError::Serialization(_) | KeygateError::Internal(_) => "Internal server error",
    };

    json_response(status_for(error), json!({"error": message}).to_string())
}
