use actix_web::{web, HttpRequest, HttpResponse};

use crate::app_state::AppState;
use crate::auth::current_identity;
use crate::error::Result;

/// GET /users/me
pub async fn get_current_user(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    let profile = data.tasks.get_user(&identity.user_id).await?;
    Ok(HttpResponse::Ok().json(profile))
}
