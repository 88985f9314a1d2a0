// src/main.rs

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// Declaração dos nossos módulos
mod common;
mod config;
mod crm;
mod docs;
mod handlers;
mod models;
mod services;

use crate::config::AppState;

/// Monta o router completo; separado do `main` para os testes de handler.
pub fn build_router(app_state: AppState) -> Router {
    // Rotas de acompanhamento (consulta filtrada + criação)
    let followup_routes = Router::new()
        .route("/api/followups", post(handlers::followups::save_followup))
        .route(
            "/api/customers/{identifier}/followups",
            get(handlers::followups::customer_followups),
        );

    // Rotas da área de membros
    let member_routes = Router::new().route(
        "/api/members/profile",
        post(handlers::members::member_profile),
    );

    // Combina tudo no router principal
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/token", get(handlers::token::get_token))
        .merge(followup_routes)
        .merge(member_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    // Inicializa o logger.
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new().expect("Falha ao inicializar o estado da aplicação.");

    let addr = format!("{}:{}", app_state.settings.host, app_state.settings.port);
    let app = build_router(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.expect("Erro no servidor Axum");
}
