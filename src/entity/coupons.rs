use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub code: String,
    pub kind: String,
    pub value: i64,
    pub min_amount: i64,
    pub max_discount: Option<i64>,
    pub expires_at: Option<DateTimeWithTimeZone>,
    pub is_active: bool,
    pub usage_limit: Option<i32>,
    pub created_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CreatedBy",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(has_many = "super::user_coupons::Entity")]
    UserCoupons,
    #[sea_orm(has_many = "super::order_coupons::Entity")]
    OrderCoupons,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::user_coupons::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserCoupons.def()
    }
}

impl Related<super::order_coupons::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderCoupons.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
