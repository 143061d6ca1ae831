use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Courtside Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::matches::start_match,
        crate::routes::matches::current_match,
        crate::routes::matches::reset_match,
        crate::routes::matches::set_period,
        crate::routes::matches::record_counter,
        crate::routes::matches::record_shot,
        crate::routes::matches::undo,
        crate::routes::matches::redo,
        crate::routes::matches::stats,
        crate::routes::matches::feed,
        crate::routes::sync::save_match,
        crate::routes::sync::list_matches,
        crate::routes::sync::load_match,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::matches::SetupRequest,
            crate::dto::matches::RosterEntryInput,
            crate::dto::matches::ConfigurationInput,
            crate::dto::matches::CounterRequest,
            crate::dto::matches::ShotRequest,
            crate::dto::matches::PeriodRequest,
            crate::dto::matches::SaveRequest,
            crate::dto::matches::MatchSummary,
            crate::dto::matches::ActionResponse,
            crate::dto::matches::SaveResponse,
            crate::dto::matches::SavedMatchItem,
            crate::dto::stats::StatsResponse,
            crate::dto::stats::FeedResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::AutosaveFailedEvent,
            crate::dto::sse::SyncSavedEvent,
            crate::state::streak::StreakNotification,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "match", description = "Recording the live match"),
        (name = "sync", description = "Saving and loading matches"),
    )
)]
pub struct ApiDoc;
