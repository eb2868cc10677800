use sea_orm::entity::prelude::*;

/// One peer's cumulative counters as of a given instant.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "usage_samples")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub public_key: String,
    /// Unix milliseconds, UTC
    #[sea_orm(primary_key, auto_increment = false)]
    pub as_of_ms: i64,
    pub upload: i64,
    pub download: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
