use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_products_table::Migration),
            Box::new(m20240101_000003_create_coupons_table::Migration),
            Box::new(m20240101_000004_create_cart_tables::Migration),
            Box::new(m20240101_000005_create_order_tables::Migration),
            Box::new(m20240101_000006_create_coupon_usages_table::Migration),
            Box::new(m20240101_000007_create_review_tables::Migration),
            Box::new(m20240101_000008_create_wishlist_tables::Migration),
            Box::new(m20240101_000009_create_support_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Users::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Users::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_role")
                        .table(Users::Table)
                        .col(Users::Role)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Users {
        Table,
        Id,
        Email,
        PasswordHash,
        Name,
        Role,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Slug).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(ColumnDef::new(Products::Sku).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Category).string().not_null())
                        .col(ColumnDef::new(Products::Price).decimal().not_null())
                        .col(ColumnDef::new(Products::Currency).string().not_null())
                        .col(
                            ColumnDef::new(Products::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::Rating)
                                .double()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::ReviewCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_category")
                        .table(Products::Table)
                        .col(Products::Category)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_is_active")
                        .table(Products::Table)
                        .col(Products::IsActive)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Slug,
        Description,
        Sku,
        Category,
        Price,
        Currency,
        StockQuantity,
        IsActive,
        Rating,
        ReviewCount,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_coupons_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_coupons_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Coupons::Code).string().not_null().unique_key())
                        .col(ColumnDef::new(Coupons::Description).text().null())
                        .col(ColumnDef::new(Coupons::DiscountType).string().not_null())
                        .col(ColumnDef::new(Coupons::Value).decimal().not_null())
                        .col(
                            ColumnDef::new(Coupons::MinPurchaseAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::MaxDiscountAmount).decimal().null())
                        .col(ColumnDef::new(Coupons::UsageLimit).integer().null())
                        .col(
                            ColumnDef::new(Coupons::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::PerUserLimit).integer().null())
                        .col(ColumnDef::new(Coupons::ValidFrom).timestamp().not_null())
                        .col(ColumnDef::new(Coupons::ValidUntil).timestamp().null())
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Coupons::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Coupons::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupons_is_active")
                        .table(Coupons::Table)
                        .col(Coupons::IsActive)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Coupons {
        Table,
        Id,
        Code,
        Description,
        DiscountType,
        Value,
        MinPurchaseAmount,
        MaxDiscountAmount,
        UsageLimit,
        UsageCount,
        PerUserLimit,
        ValidFrom,
        ValidUntil,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Carts::UserId).uuid().not_null())
                        .col(ColumnDef::new(Carts::Status).string().not_null())
                        .col(ColumnDef::new(Carts::Subtotal).decimal().not_null().default(0))
                        .col(
                            ColumnDef::new(Carts::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::ShippingFee)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Carts::Total).decimal().not_null().default(0))
                        .col(ColumnDef::new(Carts::Currency).string().not_null())
                        .col(ColumnDef::new(Carts::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Carts::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_carts_user_id")
                                .from(Carts::Table, Carts::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_carts_user_id")
                        .table(Carts::Table)
                        .col(Carts::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_carts_status")
                        .table(Carts::Table)
                        .col(Carts::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(CartItems::UnitPrice).decimal().not_null())
                        .col(ColumnDef::new(CartItems::LineTotal).decimal().not_null())
                        .col(ColumnDef::new(CartItems::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(CartItems::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart_id")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_product_id")
                                .from(CartItems::Table, CartItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One row per product per cart; adding the same product again
            // bumps the quantity instead.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_cart_product")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .col(CartItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartCoupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartCoupons::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(CartCoupons::CartId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(CartCoupons::CouponId).uuid().not_null())
                        .col(ColumnDef::new(CartCoupons::Code).string().not_null())
                        .col(
                            ColumnDef::new(CartCoupons::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(CartCoupons::AppliedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_coupons_cart_id")
                                .from(CartCoupons::Table, CartCoupons::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_coupons_coupon_id")
                                .from(CartCoupons::Table, CartCoupons::CouponId)
                                .to(Coupons::Table, Coupons::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartCoupons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Carts {
        Table,
        Id,
        UserId,
        Status,
        Subtotal,
        DiscountAmount,
        ShippingFee,
        Total,
        Currency,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum CartItems {
        Table,
        Id,
        CartId,
        ProductId,
        Quantity,
        UnitPrice,
        LineTotal,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum CartCoupons {
        Table,
        Id,
        CartId,
        CouponId,
        Code,
        DiscountAmount,
        AppliedAt,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
    }
}

mod m20240101_000005_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal().not_null().default(0))
                        .col(
                            ColumnDef::new(Orders::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::ShippingFee)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Total).decimal().not_null().default(0))
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::CouponCode).string().null())
                        .col(ColumnDef::new(Orders::ShippingAddress).string().null())
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_user_id")
                                .from(Orders::Table, Orders::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::UnitPrice).decimal().not_null())
                        .col(ColumnDef::new(OrderItems::LineTotal).decimal().not_null())
                        .col(ColumnDef::new(OrderItems::CreatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_product_id")
                                .from(OrderItems::Table, OrderItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        UserId,
        OrderNumber,
        Status,
        Subtotal,
        DiscountAmount,
        ShippingFee,
        Total,
        Currency,
        CouponCode,
        ShippingAddress,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        ProductName,
        Quantity,
        UnitPrice,
        LineTotal,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
    }
}

mod m20240101_000006_create_coupon_usages_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_coupon_usages_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CouponUsages::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CouponUsages::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CouponUsages::CouponId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::UserId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(CouponUsages::DiscountAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CouponUsages::UsedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_usages_coupon_id")
                                .from(CouponUsages::Table, CouponUsages::CouponId)
                                .to(Coupons::Table, Coupons::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_usages_user_id")
                                .from(CouponUsages::Table, CouponUsages::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_usages_order_id")
                                .from(CouponUsages::Table, CouponUsages::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // Per-user redemption limits count rows through this index.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_usages_coupon_user")
                        .table(CouponUsages::Table)
                        .col(CouponUsages::CouponId)
                        .col(CouponUsages::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_usages_order_id")
                        .table(CouponUsages::Table)
                        .col(CouponUsages::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CouponUsages::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CouponUsages {
        Table,
        Id,
        CouponId,
        UserId,
        OrderId,
        DiscountAmount,
        UsedAt,
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
    }
}

mod m20240101_000007_create_review_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_review_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Reviews::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Reviews::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Reviews::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Reviews::UserId).uuid().not_null())
                        .col(ColumnDef::new(Reviews::Rating).small_integer().not_null())
                        .col(ColumnDef::new(Reviews::Title).string().null())
                        .col(ColumnDef::new(Reviews::Body).text().not_null())
                        .col(ColumnDef::new(Reviews::Status).string().not_null())
                        .col(ColumnDef::new(Reviews::Upvotes).integer().not_null().default(0))
                        .col(
                            ColumnDef::new(Reviews::Downvotes)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Reviews::ReportCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Reviews::VerifiedPurchase)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Reviews::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Reviews::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_reviews_product_id")
                                .from(Reviews::Table, Reviews::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_reviews_user_id")
                                .from(Reviews::Table, Reviews::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One review per user per product.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reviews_product_user")
                        .table(Reviews::Table)
                        .col(Reviews::ProductId)
                        .col(Reviews::UserId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reviews_product_status")
                        .table(Reviews::Table)
                        .col(Reviews::ProductId)
                        .col(Reviews::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReviewVotes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ReviewVotes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(ReviewVotes::ReviewId).uuid().not_null())
                        .col(ColumnDef::new(ReviewVotes::UserId).uuid().not_null())
                        .col(ColumnDef::new(ReviewVotes::Vote).string().not_null())
                        .col(ColumnDef::new(ReviewVotes::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(ReviewVotes::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_review_votes_review_id")
                                .from(ReviewVotes::Table, ReviewVotes::ReviewId)
                                .to(Reviews::Table, Reviews::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_review_votes_user_id")
                                .from(ReviewVotes::Table, ReviewVotes::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One vote per user per review; revoting updates in place.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_review_votes_review_user")
                        .table(ReviewVotes::Table)
                        .col(ReviewVotes::ReviewId)
                        .col(ReviewVotes::UserId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReviewVotes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Reviews::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Reviews {
        Table,
        Id,
        ProductId,
        UserId,
        Rating,
        Title,
        Body,
        Status,
        Upvotes,
        Downvotes,
        ReportCount,
        VerifiedPurchase,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ReviewVotes {
        Table,
        Id,
        ReviewId,
        UserId,
        Vote,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }
}

mod m20240101_000008_create_wishlist_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000008_create_wishlist_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Wishlists::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Wishlists::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Wishlists::UserId).uuid().not_null())
                        .col(ColumnDef::new(Wishlists::Name).string().not_null())
                        .col(
                            ColumnDef::new(Wishlists::IsPublic)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Wishlists::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Wishlists::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_wishlists_user_id")
                                .from(Wishlists::Table, Wishlists::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_wishlists_user_id")
                        .table(Wishlists::Table)
                        .col(Wishlists::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WishlistItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WishlistItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WishlistItems::WishlistId).uuid().not_null())
                        .col(ColumnDef::new(WishlistItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(WishlistItems::AddedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_wishlist_items_wishlist_id")
                                .from(WishlistItems::Table, WishlistItems::WishlistId)
                                .to(Wishlists::Table, Wishlists::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_wishlist_items_product_id")
                                .from(WishlistItems::Table, WishlistItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_wishlist_items_wishlist_product")
                        .table(WishlistItems::Table)
                        .col(WishlistItems::WishlistId)
                        .col(WishlistItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WishlistItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Wishlists::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Wishlists {
        Table,
        Id,
        UserId,
        Name,
        IsPublic,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum WishlistItems {
        Table,
        Id,
        WishlistId,
        ProductId,
        AddedAt,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
    }
}

mod m20240101_000009_create_support_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000009_create_support_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SupportTickets::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupportTickets::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupportTickets::TicketNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SupportTickets::UserId).uuid().not_null())
                        .col(ColumnDef::new(SupportTickets::Subject).string().not_null())
                        .col(ColumnDef::new(SupportTickets::Category).string().not_null())
                        .col(ColumnDef::new(SupportTickets::Priority).string().not_null())
                        .col(ColumnDef::new(SupportTickets::Status).string().not_null())
                        .col(ColumnDef::new(SupportTickets::AssignedAgentId).uuid().null())
                        .col(ColumnDef::new(SupportTickets::OrderId).uuid().null())
                        .col(
                            ColumnDef::new(SupportTickets::Escalated)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(SupportTickets::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(SupportTickets::UpdatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_support_tickets_user_id")
                                .from(SupportTickets::Table, SupportTickets::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_support_tickets_user_id")
                        .table(SupportTickets::Table)
                        .col(SupportTickets::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_support_tickets_status")
                        .table(SupportTickets::Table)
                        .col(SupportTickets::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_support_tickets_assigned_agent")
                        .table(SupportTickets::Table)
                        .col(SupportTickets::AssignedAgentId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TicketMessages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TicketMessages::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TicketMessages::TicketId).uuid().not_null())
                        .col(ColumnDef::new(TicketMessages::SenderId).uuid().not_null())
                        .col(ColumnDef::new(TicketMessages::SenderRole).string().not_null())
                        .col(ColumnDef::new(TicketMessages::Body).text().not_null())
                        .col(ColumnDef::new(TicketMessages::CreatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_ticket_messages_ticket_id")
                                .from(TicketMessages::Table, TicketMessages::TicketId)
                                .to(SupportTickets::Table, SupportTickets::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_ticket_messages_sender_id")
                                .from(TicketMessages::Table, TicketMessages::SenderId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ticket_messages_ticket_id")
                        .table(TicketMessages::Table)
                        .col(TicketMessages::TicketId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TicketMessages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SupportTickets::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum SupportTickets {
        Table,
        Id,
        TicketNumber,
        UserId,
        Subject,
        Category,
        Priority,
        Status,
        AssignedAgentId,
        OrderId,
        Escalated,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum TicketMessages {
        Table,
        Id,
        TicketId,
        SenderId,
        SenderRole,
        Body,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }
}
