use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(
            m20250101_000001_create_predictions_table::Migration,
        )]
    }
}

// Migration implementations

mod m20250101_000001_create_predictions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_predictions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create predictions table aligned with entities::prediction Model
            manager
                .create_table(
                    Table::create()
                        .table(Predictions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Predictions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Predictions::StoreId).string().not_null())
                        .col(ColumnDef::new(Predictions::ProductId).string().not_null())
                        .col(
                            ColumnDef::new(Predictions::ForecastMonth)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Predictions::PredictedQuantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Predictions::ConfidenceScore)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Predictions::ModelVersion)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Predictions::FeaturesUsed)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Predictions::ActualQuantity)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(Predictions::Accuracy).double().null())
                        .col(
                            ColumnDef::new(Predictions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Predictions::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            // Useful indexes
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_predictions_store_id")
                        .table(Predictions::Table)
                        .col(Predictions::StoreId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_predictions_product_id")
                        .table(Predictions::Table)
                        .col(Predictions::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_predictions_created_at")
                        .table(Predictions::Table)
                        .col(Predictions::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Predictions::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Predictions {
        Table,
        Id,
        StoreId,
        ProductId,
        ForecastMonth,
        PredictedQuantity,
        ConfidenceScore,
        ModelVersion,
        FeaturesUsed,
        ActualQuantity,
        Accuracy,
        CreatedAt,
        UpdatedAt,
    }
}
