use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle states of a purchase request.
///
/// `Approved` and `Rejected` are terminal; the transfer engine guards the
/// transition out of `Pending` with a compare-and-swap on the stored value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// A client's ask to transfer units from manufacturer stock into its own
/// inventory ledger, subject to admin approval.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Manufacturer product being requested
    pub product_id: Uuid,

    /// Requesting client
    pub client_id: Uuid,

    /// Organization that owns the manufacturer product
    pub organization_id: Uuid,

    pub quantity: i32,
    pub unit_price: Decimal,

    /// Stored as the lowercase string form of `RequestStatus`
    pub status: String,

    /// Set iff status is rejected
    pub rejection_reason: Option<String>,

    /// Set iff status is approved
    pub order_id: Option<Uuid>,

    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(Some(now));

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if model.quantity <= 0 {
            return Err(DbErr::Custom("Quantity must be positive".to_string()));
        }
        model
            .status
            .parse::<RequestStatus>()
            .map_err(|_| DbErr::Custom(format!("Unknown request status '{}'", model.status)))?;

        Ok(active_model)
    }
}

impl Model {
    /// Parses the stored status string.
    pub fn request_status(&self) -> RequestStatus {
        self.status
            .parse()
            .unwrap_or(RequestStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
        ] {
            let stored = status.to_string();
            assert_eq!(stored.parse::<RequestStatus>().unwrap(), status);
        }
        assert_eq!(RequestStatus::Approved.to_string(), "approved");
    }

    #[test]
    fn only_approved_and_rejected_are_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }
}
