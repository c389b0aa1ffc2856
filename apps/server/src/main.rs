use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use nocturne::auth::{mint_admin_token, mint_player_token, TokenKey};
use nocturne::config::ServerConfig;
use nocturne::engine::{EngineClient, ProcessEngine};
use nocturne::routes;
use nocturne::session::SessionService;
use nocturne::state::app_state::AppState;
use nocturne::store::GameStore;
use nocturne::{sched, telemetry};
use nocturne::ws::hub::WsHub;
use tracing::info;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let store = match GameStore::open(&config.game_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("failed to open game directory: {e}");
            std::process::exit(1);
        }
    };

    let token_key = match TokenKey::from_meta_secret(&store.meta().secret) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("invalid session secret: {e}");
            std::process::exit(1);
        }
    };

    // Print the capability tokens so the operator can distribute the
    // player links and keep the admin token.
    for (id, player) in &store.meta().players {
        match mint_player_token(&token_key, *id) {
            Ok(token) => info!(player = %player.name, token, "player token"),
            Err(e) => {
                eprintln!("failed to mint player token: {e}");
                std::process::exit(1);
            }
        }
    }
    match mint_admin_token(&token_key) {
        Ok(token) => info!(token, "admin token"),
        Err(e) => {
            eprintln!("failed to mint admin token: {e}");
            std::process::exit(1);
        }
    }

    let engine = EngineClient::new(Arc::new(ProcessEngine::new(
        &config.engine_dir,
        config.engine_args.clone(),
    )));
    let hub = Arc::new(WsHub::new());
    let (sched_tx, sched_rx) = sched::channel();

    let session = match SessionService::start(store, engine, hub.clone(), sched_tx).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            eprintln!("failed to start session: {e}");
            std::process::exit(1);
        }
    };

    let initial_deadline = session.current_deadline().await;
    sched::spawn(session.clone(), sched_rx, initial_deadline);

    let app_state = AppState::new(session, hub, token_key);
    let data = web::Data::new(app_state);

    info!(host = %config.host, port = config.port, "server listening");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
