use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use agora_api::auth::{self, AppState, AppStateInner};
use agora_api::middleware::require_auth;
use agora_api::{conversations, groups, keys, messages, reactions};
use agora_core::{ConversationRegistry, DbKeyStore, GroupAdministration, MessagingService};
use agora_crypto::OaepEngine;
use agora_gateway::{DeliveryChannel, connection};

#[derive(Clone)]
struct GatewayState {
    channel: DeliveryChannel,
    db: Arc<agora_db::Database>,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("AGORA_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("AGORA_DB_PATH").unwrap_or_else(|_| "agora.db".into());
    let host = std::env::var("AGORA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("AGORA_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(agora_db::Database::open(&PathBuf::from(&db_path))?);

    // Core wiring: injected engine + key store behind their trait seams
    let channel = DeliveryChannel::new();
    let key_store = Arc::new(DbKeyStore::new(db.clone()));
    let service = MessagingService::new(
        db.clone(),
        Arc::new(OaepEngine::new()),
        key_store.clone(),
        channel.clone(),
    );

    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
        service,
        registry: ConversationRegistry::new(db.clone()),
        groups: GroupAdministration::new(db.clone()),
        keys: key_store,
        channel: channel.clone(),
    });

    let gateway_state = GatewayState {
        channel,
        db,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/keys", post(keys::generate_keys))
        .route("/keys/{user_id}", get(keys::get_public_key))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/direct", post(conversations::create_direct))
        .route("/conversations/group", post(conversations::create_group))
        .route("/conversations/requests", get(conversations::list_requests))
        .route(
            "/conversations/{conversation_id}/requests/accept",
            post(conversations::accept_request),
        )
        .route(
            "/conversations/{conversation_id}/requests/decline",
            post(conversations::decline_request),
        )
        .route(
            "/conversations/{conversation_id}/requests",
            delete(conversations::delete_request),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/conversations/{conversation_id}/read",
            post(messages::mark_read),
        )
        .route(
            "/conversations/{conversation_id}/unread",
            get(messages::unread_count),
        )
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route(
            "/messages/{message_id}/reactions",
            post(reactions::toggle_reaction),
        )
        .route(
            "/conversations/{conversation_id}/members",
            post(groups::add_member),
        )
        .route(
            "/conversations/{conversation_id}/members/{user_id}",
            delete(groups::remove_member),
        )
        .route(
            "/conversations/{conversation_id}/leave",
            post(groups::leave_group),
        )
        .route(
            "/conversations/{conversation_id}/admins",
            post(groups::promote_admin),
        )
        .route(
            "/conversations/{conversation_id}/admins/{user_id}",
            delete(groups::demote_admin),
        )
        .route(
            "/conversations/{conversation_id}/metadata",
            patch(groups::update_metadata),
        )
        .route("/profiles/{user_id}", get(conversations::get_profile))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Agora messaging server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.channel, state.db, state.jwt_secret)
    })
}
