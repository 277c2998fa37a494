//! Identity gateway. The identity provider signs a bearer token; this module
//! verifies it and exposes the caller's identity to handlers.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http, web, Error as ActixError, HttpMessage, HttpRequest, HttpResponse,
};
use futures::future::{ok, Ready};
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            user_id: claims.sub,
            email: claims.email,
            display_name: claims.name,
            photo_url: claims.picture,
        }
    }
}

pub fn verify_token(token: &str, secret: &str) -> Result<Identity> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|e| Error::Unauthorized(format!("Token decode error: {}", e)))?;
    Ok(data.claims.into())
}

/// Identity attached by [`Authentication`], or 401.
pub fn current_identity(req: &HttpRequest) -> Result<Identity> {
    req.extensions()
        .get::<Identity>()
        .cloned()
        .ok_or_else(|| Error::Unauthorized("Sign-in required".to_string()))
}

#[derive(Debug, Clone)]
pub struct Authentication {
    secret: String,
}

impl Authentication {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = ActixError;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service, secret: self.secret.clone() })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = ActixError;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Requests without a bearer token pass through; handlers decide if they need one.
        let bearer = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());

        if let Some(token) = bearer {
            match verify_token(&token, &self.secret) {
                Ok(identity) => {
                    debug!("Authenticated request for user {}", identity.user_id);
                    req.extensions_mut().insert(identity);
                }
                Err(e) => {
                    let (req_parts, _payload) = req.into_parts();
                    let resp = HttpResponse::Unauthorized()
                        .json(serde_json::json!({ "error": e.to_string() }))
                        .map_into_boxed_body();
                    let srv_resp = ServiceResponse::new(req_parts, resp);
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

/// POST /auth/session
/// Completes a sign-in: creates the user record on first login.
pub async fn start_session(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    let profile = data.tasks.ensure_user(&identity).await?;
    info!("Session started for {}", profile.id);
    Ok(HttpResponse::Ok().json(profile))
}

/// POST /auth/logout
/// Tokens are stateless, so there is nothing to revoke here.
pub async fn logout(req: HttpRequest) -> HttpResponse {
    if let Ok(identity) = current_identity(&req) {
        info!("User {} signed out", identity.user_id);
    }
    HttpResponse::NoContent().finish()
}

#[cfg(test)]
pub(crate) fn issue_token(identity: &Identity, secret: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: identity.user_id.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        email: identity.email.clone(),
        name: identity.display_name.clone(),
        picture: identity.photo_url.clone(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref())).unwrap()
}
