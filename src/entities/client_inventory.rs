use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-owned inventory ledger.
///
/// One row per (client, source product). Created lazily by the transfer
/// engine on the first approved request and incremented on every approval
/// after that. `source_product_id` links back to the manufacturer product
/// explicitly; matching by product name is not supported.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "client_inventory")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Manufacturer product this ledger entry was created from
    pub source_product_id: Uuid,

    /// Client that owns this stock
    pub client_id: Uuid,

    /// Client-scoped SKU, derived from the manufacturer SKU
    pub sku: String,

    /// Catalog attributes copied from the manufacturer product at first approval
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
    pub loyalty_points: i32,

    /// Units currently held by the client
    pub current_stock: i32,

    /// Units received with the first approval
    pub initial_stock: i32,

    /// Threshold below which the ledger is considered low on stock
    pub reorder_level: i32,

    pub created_at: DateTime<Utc>,

    /// Set on every transfer into this ledger
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::SourceProductId",
        to = "super::product::Column::Id"
    )]
    SourceProduct,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SourceProduct.def()
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
        active_model.last_updated = Set(Some(now));

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if model.current_stock < 0 {
            return Err(DbErr::Custom(
                "Client inventory cannot go negative".to_string(),
            ));
        }

        Ok(active_model)
    }
}

impl Model {
    /// Whether the ledger has fallen to or below its reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.reorder_level
    }
}
