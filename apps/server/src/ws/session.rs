//! Per-connection websocket actor.
//!
//! The handshake is token-gated: the client presents its capability
//! token as a query parameter, and a verification failure rejects the
//! upgrade outright. After the upgrade the actor registers with the
//! hub, receives the full root view, and relays commands into the
//! session pipeline, answering each with exactly one ack or rej.

use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::hub::Outbound;
use super::protocol::{ClientCommand, RootBody, ServerMsg};
use crate::auth::verify_player_token;
use crate::domain::PlayerId;
use crate::state::app_state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Deserialize)]
pub struct ConnectQuery {
    token: String,
}

pub async fn upgrade(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<ConnectQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let player = verify_player_token(app_state.token_key(), &query.token)?;
    if !app_state.session().is_known_player(player).await {
        return Err(crate::error::AppError::unauthorized().into());
    }

    let client = WsClient::new(player, app_state);
    ws::start(client, &req, stream)
}

pub struct WsClient {
    player: PlayerId,
    conn_id: Option<Uuid>,
    app_state: web::Data<AppState>,
    last_heartbeat: Instant,
}

impl WsClient {
    fn new(player: PlayerId, app_state: web::Data<AppState>) -> Self {
        Self {
            player,
            conn_id: None,
            app_state,
            last_heartbeat: Instant::now(),
        }
    }

    fn send_msg(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMsg) {
        match serde_json::to_string(msg) {
            Ok(payload) => ctx.text(payload),
            Err(err) => warn!(error = %err, "failed to serialize outbound message"),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |actor, ctx| {
            if Instant::now().duration_since(actor.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(player = %actor.player, "heartbeat timed out");
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
                return;
            }
            ctx.ping(b"keepalive");
        });
    }

    fn send_initial_root(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let session = self.app_state.session();
        let player = self.player;
        ctx.spawn(
            async move { session.connect_root(player).await }
                .into_actor(self)
                .map(|res: Result<RootBody, _>, actor, ctx| match res {
                    Ok(body) => Self::send_msg(ctx, &ServerMsg::Root { body }),
                    Err(err) => {
                        // A live connection without a view is useless.
                        warn!(player = %actor.player, error = %err, "initial view failed");
                        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
                        ctx.stop();
                    }
                }),
        );
    }

    fn dispatch(&self, cmd: ClientCommand, ctx: &mut ws::WebsocketContext<Self>) {
        let session = self.app_state.session();
        let player = self.player;
        let seq_num = cmd.seq_num;
        ctx.spawn(
            async move { session.handle_command(player, cmd.kind).await }
                .into_actor(self)
                .map(move |res, _actor, ctx| match res {
                    Ok(()) => Self::send_msg(ctx, &ServerMsg::Ack { seq_num }),
                    Err(err) => Self::send_msg(
                        ctx,
                        &ServerMsg::Rej {
                            seq_num,
                            reason: err.to_string(),
                        },
                    ),
                }),
        );
    }
}

impl Actor for WsClient {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(player = %self.player, "connection opened");
        let recipient = ctx.address().recipient::<Outbound>();
        self.conn_id = Some(self.app_state.hub().register(self.player, recipient));
        self.start_heartbeat(ctx);
        self.send_initial_root(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(conn_id) = self.conn_id.take() {
            self.app_state.hub().unregister(self.player, conn_id);
        }
        info!(player = %self.player, "connection closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsClient {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => self.dispatch(cmd, ctx),
                    Err(err) => {
                        // Malformed frames carry no usable seq_num, so
                        // there is nothing to rej; close instead.
                        warn!(player = %self.player, error = %err, "malformed command");
                        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
                        ctx.stop();
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Unsupported)));
                ctx.stop();
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {
                self.last_heartbeat = Instant::now();
            }
            Err(err) => {
                warn!(player = %self.player, error = %err, "websocket protocol error");
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
                ctx.stop();
            }
        }
    }
}

impl Handler<Outbound> for WsClient {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) -> Self::Result {
        ctx.text(msg.0);
    }
}
