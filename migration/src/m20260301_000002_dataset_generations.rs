//! 数据集代际提交标记表
//!
//! 每个 (dataset, ip_version) 一行，记录最近一次完整加载并提交的 generation。
//! 查询只读取已提交的 generation，加载中的新行对查询不可见。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DatasetGenerations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatasetGenerations::Dataset)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DatasetGenerations::IpVersion)
                            .small_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DatasetGenerations::Generation)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DatasetGenerations::CommittedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(DatasetGenerations::Dataset)
                            .col(DatasetGenerations::IpVersion),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(DatasetGenerations::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum DatasetGenerations {
    Table,
    Dataset,
    IpVersion,
    Generation,
    CommittedAt,
}
