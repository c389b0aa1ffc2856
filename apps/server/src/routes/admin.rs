//! Administrative surface, gated by the administrative token.
//!
//! Every route takes the token as a `token` query parameter, the same
//! transport the player connections use. The surface is deliberately
//! small: peek at the working set, force the pending transition, force
//! a death, broadcast a reload, and read the reconciled action log of
//! a closed phase.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::verify_admin_token;
use crate::domain::{Phase, Turn};
use crate::error::AppError;
use crate::state::app_state::AppState;

#[derive(Deserialize)]
pub struct AdminQuery {
    token: String,
}

#[derive(Deserialize)]
pub struct ModkillBody {
    player: String,
    reason: String,
}

#[derive(Deserialize)]
pub struct LogQuery {
    token: String,
    turn: Turn,
    phase: String,
}

async fn peek(
    query: web::Query<AdminQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    verify_admin_token(app_state.token_key(), &query.token)?;
    let dump = app_state.session().peek().await?;
    Ok(HttpResponse::Ok().content_type("text/plain").body(dump))
}

async fn poke(
    query: web::Query<AdminQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    verify_admin_token(app_state.token_key(), &query.token)?;
    app_state.session().poke().await;
    Ok(HttpResponse::Accepted().finish())
}

async fn modkill(
    query: web::Query<AdminQuery>,
    body: web::Json<ModkillBody>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    verify_admin_token(app_state.token_key(), &query.token)?;
    let ModkillBody { player, reason } = body.into_inner();
    app_state.session().modkill(&player, reason).await?;
    Ok(HttpResponse::Ok().finish())
}

async fn refresh(
    query: web::Query<AdminQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    verify_admin_token(app_state.token_key(), &query.token)?;
    app_state.session().broadcast_refresh().await;
    Ok(HttpResponse::Ok().finish())
}

async fn log(
    query: web::Query<LogQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    verify_admin_token(app_state.token_key(), &query.token)?;
    let phase = match query.phase.as_str() {
        "night" => Phase::Night,
        "day" => Phase::Day,
        other => {
            return Err(AppError::bad_request(
                "VALIDATION",
                format!("unknown phase {other:?}"),
            ))
        }
    };
    let report = app_state.session().reconciled_log(query.turn, phase).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/peek", web::get().to(peek))
        .route("/poke", web::post().to(poke))
        .route("/modkill", web::post().to(modkill))
        .route("/refresh", web::post().to(refresh))
        .route("/log", web::get().to(log));
}
