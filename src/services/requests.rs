use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity},
    entities::purchase_request::{self, Entity as PurchaseRequestEntity, RequestStatus},
    errors::ServiceError,
    services::transfer::PurchaseRequestResponse,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How a listing ended up being scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListScope {
    Organization,
    AdminClients,
}

#[derive(Debug, Serialize)]
pub struct RequestListPage {
    pub requests: Vec<PurchaseRequestResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub scope: ListScope,
}

/// Read-only listing surface over purchase requests.
///
/// Admins and clients list requests filtered by organization and/or
/// status. A malformed or absent organization id falls back to scoping by
/// the admin's own derived client set instead of failing the request.
#[derive(Clone)]
pub struct RequestQueryService {
    db_pool: Arc<DbPool>,
}

impl RequestQueryService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self), fields(actor_org = %actor_organization_id))]
    pub async fn list_requests(
        &self,
        organization_id: Option<&str>,
        status: Option<RequestStatus>,
        actor_organization_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<RequestListPage, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let (mut query, scope) = match organization_id.map(str::parse::<Uuid>) {
            Some(Ok(org_id)) => (
                PurchaseRequestEntity::find()
                    .filter(purchase_request::Column::OrganizationId.eq(org_id)),
                ListScope::Organization,
            ),
            other => {
                if let Some(Err(e)) = other {
                    warn!(error = %e, "Malformed organization id; falling back to admin client scope");
                }
                let client_ids = self.derived_client_ids(actor_organization_id).await?;
                (
                    PurchaseRequestEntity::find()
                        .filter(purchase_request::Column::ClientId.is_in(client_ids)),
                    ListScope::AdminClients,
                )
            }
        };

        if let Some(status) = status {
            query = query.filter(purchase_request::Column::Status.eq(status.to_string()));
        }

        let paginator = query
            .order_by_desc(purchase_request::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let requests = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(Into::into)
            .collect::<Vec<PurchaseRequestResponse>>();

        info!(
            total = total,
            page = page,
            returned = requests.len(),
            scope = ?scope,
            "Purchase requests listed"
        );

        Ok(RequestListPage {
            requests,
            total,
            page,
            per_page,
            scope,
        })
    }

    /// Clients that have requested products in the actor's organization.
    /// This is the fallback scope when no usable organization filter exists.
    async fn derived_client_ids(
        &self,
        actor_organization_id: Uuid,
    ) -> Result<Vec<Uuid>, ServiceError> {
        let db = &*self.db_pool;

        let product_ids: Vec<Uuid> = ProductEntity::find()
            .filter(product::Column::OrganizationId.eq(actor_organization_id))
            .select_only()
            .column(product::Column::Id)
            .into_tuple()
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let client_ids: Vec<Uuid> = PurchaseRequestEntity::find()
            .filter(purchase_request::Column::ProductId.is_in(product_ids))
            .select_only()
            .column(purchase_request::Column::ClientId)
            .distinct()
            .into_tuple()
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(client_ids)
    }
}
