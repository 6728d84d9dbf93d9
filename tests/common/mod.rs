use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use loyaltyhub_api::{
    config::AppConfig,
    db::{self, DbPool},
    entities::product,
    events::{self, EventSender},
    services::{requests::RequestQueryService, transfer::TransferEngine},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Test harness backed by a throwaway file-based SQLite database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub state: AppState,
    pub transfer: Arc<TransferEngine>,
    pub queries: Arc<RequestQueryService>,
    _dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new application with fresh database state.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("loyaltyhub_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("db connect");
        db::run_migrations(&pool).await.expect("migrations");
        let db_arc = Arc::new(pool);

        let (tx, rx) = mpsc::channel(100);
        let sender = EventSender::new(tx);
        let event_task = tokio::spawn(events::process_events(rx));

        let state = AppState::new(db_arc.clone(), cfg, sender);
        let transfer = state.services.transfer.clone();
        let queries = state.services.request_queries.clone();

        Self {
            db: db_arc,
            state,
            transfer,
            queries,
            _dir: dir,
            _event_task: event_task,
        }
    }

    /// Seed a manufacturer product with the given stock level.
    pub async fn seed_product(
        &self,
        organization_id: Uuid,
        stock: i32,
        price: Decimal,
    ) -> product::Model {
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Loyalty Widget".to_string()),
            sku: Set(format!("WID-{}", &Uuid::new_v4().simple().to_string()[..6])),
            description: Set(None),
            price: Set(price),
            currency: Set("USD".to_string()),
            category: Set(Some("widgets".to_string())),
            loyalty_points: Set(5),
            organization_id: Set(organization_id),
            stock: Set(stock),
            min_order_quantity: Set(None),
            max_order_quantity: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        model.insert(&*self.db).await.expect("seed product")
    }

    /// The full v1 router with this app's state applied.
    #[allow(dead_code)]
    pub fn router(&self) -> Router {
        Router::new()
            .nest("/api/v1", loyaltyhub_api::api_v1_routes())
            .with_state(self.state.clone())
    }

    /// Fire a request at the router with actor headers attached.
    #[allow(dead_code)]
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Actor,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-actor-id", actor.id.to_string())
            .header("x-actor-role", actor.role);
        if let Some(org) = actor.organization_id {
            builder = builder.header("x-organization-id", org.to_string());
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request build");

        self.router().oneshot(request).await.expect("router call")
    }
}

/// Identity headers attached to test requests.
#[allow(dead_code)]
#[derive(Clone, Copy)]
pub struct Actor {
    pub id: Uuid,
    pub role: &'static str,
    pub organization_id: Option<Uuid>,
}

#[allow(dead_code)]
impl Actor {
    pub fn client(org: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: "client",
            organization_id: Some(org),
        }
    }

    pub fn admin(org: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: "admin",
            organization_id: Some(org),
        }
    }
}
