use actix_web::web;

pub mod admin;
pub mod health;

use crate::ws;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure_routes)
        .route("/ws", web::get().to(ws::session::upgrade))
        .service(web::scope("/admin").configure(admin::configure_routes));
}
