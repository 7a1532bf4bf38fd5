use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_stock_table::Migration),
            Box::new(m20240101_000002_create_stock_movements_table::Migration),
            Box::new(m20240101_000003_create_sales_transactions_table::Migration),
            Box::new(m20240101_000004_create_sales_transaction_items_table::Migration),
            Box::new(m20240101_000005_create_commissions_table::Migration),
            Box::new(m20240101_000006_create_visits_table::Migration),
            Box::new(m20240101_000007_create_reference_counters_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_stock_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_stock_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Stock::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Stock::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Stock::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Stock::BranchId).uuid().not_null())
                        .col(
                            ColumnDef::new(Stock::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Stock::MinimumStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Stock::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Stock::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            // One counter row per (product, branch) pair
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_product_branch")
                        .table(Stock::Table)
                        .col(Stock::ProductId)
                        .col(Stock::BranchId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_branch_id")
                        .table(Stock::Table)
                        .col(Stock::BranchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Stock::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Stock {
        Table,
        Id,
        ProductId,
        BranchId,
        Quantity,
        MinimumStock,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_stock_movements_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ReferenceNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::FromBranchId).uuid().null())
                        .col(ColumnDef::new(StockMovements::ToBranchId).uuid().null())
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Quantity).integer().not_null())
                        .col(ColumnDef::new(StockMovements::Notes).string().null())
                        .col(ColumnDef::new(StockMovements::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_reference_number")
                        .table(StockMovements::Table)
                        .col(StockMovements::ReferenceNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_product_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_created_at")
                        .table(StockMovements::Table)
                        .col(StockMovements::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockMovements {
        Table,
        Id,
        ReferenceNumber,
        ProductId,
        FromBranchId,
        ToBranchId,
        MovementType,
        Quantity,
        Notes,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240101_000003_create_sales_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_sales_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesTransactions::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::TransactionNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::TransactionDate)
                                .date()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesTransactions::BranchId).uuid().not_null())
                        .col(ColumnDef::new(SalesTransactions::SalesId).uuid().not_null())
                        .col(ColumnDef::new(SalesTransactions::AreaId).uuid().null())
                        .col(
                            ColumnDef::new(SalesTransactions::CustomerName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::CustomerPhone)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::Discount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::Tax)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::Total)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::PaymentMethod)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesTransactions::Status).string().not_null())
                        .col(ColumnDef::new(SalesTransactions::Notes).string().null())
                        .col(
                            ColumnDef::new(SalesTransactions::ApprovedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(ColumnDef::new(SalesTransactions::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(SalesTransactions::DeletedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_transactions_number")
                        .table(SalesTransactions::Table)
                        .col(SalesTransactions::TransactionNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_transactions_sales_id")
                        .table(SalesTransactions::Table)
                        .col(SalesTransactions::SalesId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_transactions_status")
                        .table(SalesTransactions::Table)
                        .col(SalesTransactions::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_transactions_date")
                        .table(SalesTransactions::Table)
                        .col(SalesTransactions::TransactionDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum SalesTransactions {
        Table,
        Id,
        TransactionNumber,
        TransactionDate,
        BranchId,
        SalesId,
        AreaId,
        CustomerName,
        CustomerPhone,
        Subtotal,
        Discount,
        Tax,
        Total,
        PaymentMethod,
        Status,
        Notes,
        ApprovedAt,
        ApprovedBy,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_sales_transaction_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_sales_transaction_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesTransactionItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesTransactionItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactionItems::TransactionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactionItems::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactionItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactionItems::Price)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactionItems::Discount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesTransactionItems::Subtotal)
                                .decimal()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_transaction_items_transaction_id")
                        .table(SalesTransactionItems::Table)
                        .col(SalesTransactionItems::TransactionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesTransactionItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum SalesTransactionItems {
        Table,
        Id,
        TransactionId,
        ProductId,
        Quantity,
        Price,
        Discount,
        Subtotal,
    }
}

mod m20240101_000005_create_commissions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_commissions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Commissions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Commissions::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Commissions::TransactionId).uuid().not_null())
                        .col(ColumnDef::new(Commissions::SalesId).uuid().not_null())
                        .col(
                            ColumnDef::new(Commissions::TransactionAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Commissions::CommissionPercentage)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Commissions::CommissionAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Commissions::Status).string().not_null())
                        .col(ColumnDef::new(Commissions::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_commissions_transaction_id")
                        .table(Commissions::Table)
                        .col(Commissions::TransactionId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_commissions_sales_id")
                        .table(Commissions::Table)
                        .col(Commissions::SalesId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Commissions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Commissions {
        Table,
        Id,
        TransactionId,
        SalesId,
        TransactionAmount,
        CommissionPercentage,
        CommissionAmount,
        Status,
        CreatedAt,
    }
}

mod m20240101_000006_create_visits_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_visits_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Visits::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Visits::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Visits::VisitNumber).string().not_null())
                        .col(ColumnDef::new(Visits::VisitDate).date().not_null())
                        .col(ColumnDef::new(Visits::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Visits::SalesId).uuid().not_null())
                        .col(ColumnDef::new(Visits::AreaId).uuid().null())
                        .col(ColumnDef::new(Visits::CustomerName).string().not_null())
                        .col(ColumnDef::new(Visits::VisitType).string().not_null())
                        .col(ColumnDef::new(Visits::Status).string().not_null())
                        .col(ColumnDef::new(Visits::Purpose).string().null())
                        .col(ColumnDef::new(Visits::Result).string().null())
                        .col(ColumnDef::new(Visits::Notes).string().null())
                        .col(ColumnDef::new(Visits::RejectionReason).string().null())
                        .col(ColumnDef::new(Visits::Latitude).decimal().null())
                        .col(ColumnDef::new(Visits::Longitude).decimal().null())
                        .col(ColumnDef::new(Visits::Photo).string().null())
                        .col(ColumnDef::new(Visits::ApprovedAt).timestamp().null())
                        .col(ColumnDef::new(Visits::ApprovedBy).uuid().null())
                        .col(ColumnDef::new(Visits::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Visits::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_visits_visit_number")
                        .table(Visits::Table)
                        .col(Visits::VisitNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_visits_sales_id")
                        .table(Visits::Table)
                        .col(Visits::SalesId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_visits_status")
                        .table(Visits::Table)
                        .col(Visits::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_visits_visit_date")
                        .table(Visits::Table)
                        .col(Visits::VisitDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Visits::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Visits {
        Table,
        Id,
        VisitNumber,
        VisitDate,
        BranchId,
        SalesId,
        AreaId,
        CustomerName,
        VisitType,
        Status,
        Purpose,
        Result,
        Notes,
        RejectionReason,
        Latitude,
        Longitude,
        Photo,
        ApprovedAt,
        ApprovedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000007_create_reference_counters_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_reference_counters_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReferenceCounters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReferenceCounters::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ReferenceCounters::Prefix).string().not_null())
                        .col(
                            ColumnDef::new(ReferenceCounters::PeriodDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReferenceCounters::LastValue)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            // The atomic per-day increment relies on this pair being unique
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reference_counters_prefix_date")
                        .table(ReferenceCounters::Table)
                        .col(ReferenceCounters::Prefix)
                        .col(ReferenceCounters::PeriodDate)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReferenceCounters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ReferenceCounters {
        Table,
        Id,
        Prefix,
        PeriodDate,
        LastValue,
    }
}
