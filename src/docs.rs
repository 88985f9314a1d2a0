// src/docs.rs

use utoipa::OpenApi;

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Followups ---
        handlers::followups::customer_followups,
        handlers::followups::save_followup,

        // --- Members ---
        handlers::members::member_profile,

        // --- Token ---
        handlers::token::get_token,
    ),
    components(
        schemas(
            // --- Followups ---
            models::followup::ServiceRecord,
            models::files::AttachmentFile,
            models::identity::SearchMode,
            models::identity::MatchStrategy,
            models::identity::FilterInfo,
            models::schedule::MaintenanceSummary,

            // --- Members ---
            models::profile::MemberProfile,
            models::profile::ContactInfo,

            // --- Payloads ---
            handlers::members::MemberProfilePayload,
        )
    ),
    tags(
        (name = "Followups", description = "Registros de manutenção e cronograma"),
        (name = "Members", description = "Perfil de membro (área do cliente)"),
        (name = "Token", description = "Diagnóstico do token de acesso ao CRM")
    )
)]
pub struct ApiDoc;
