//! IP 段数据表迁移
//!
//! 每个 (数据集类型, IP 版本) 一张表：
//! - ipv4_country / ipv6_country
//! - ipv4_city / ipv6_city
//! - ipv4_asn / ipv6_asn
//!
//! `ip_number_start` / `ip_number_end` 以定长大端字节存储（v4 4 字节，v6 16 字节），
//! 使字节序比较与数值比较一致，三种数据库都适用。

use sea_orm_migration::prelude::*;

/// 数据表携带的属性列种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeTableKind {
    Country,
    City,
    Asn,
}

/// 所有 IP 段数据表
pub const RANGE_TABLES: [(&str, RangeTableKind); 6] = [
    ("ipv4_country", RangeTableKind::Country),
    ("ipv6_country", RangeTableKind::Country),
    ("ipv4_city", RangeTableKind::City),
    ("ipv6_city", RangeTableKind::City),
    ("ipv4_asn", RangeTableKind::Asn),
    ("ipv6_asn", RangeTableKind::Asn),
];

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, kind) in RANGE_TABLES {
            manager.create_table(range_table(name, kind)).await?;

            // 查询路径：generation = ? AND ip_number_start <= ? ORDER BY ip_number_start DESC
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(format!("idx_{}_generation_start", name))
                        .table(Alias::new(name))
                        .col(IpRange::Generation)
                        .col(IpRange::IpNumberStart)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, _) in RANGE_TABLES {
            manager
                .drop_table(Table::drop().table(Alias::new(name)).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

fn range_table(name: &str, kind: RangeTableKind) -> TableCreateStatement {
    let mut table = Table::create();
    table
        .table(Alias::new(name))
        .if_not_exists()
        .col(
            ColumnDef::new(IpRange::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(IpRange::IpRangeStart).string_len(64).not_null())
        .col(ColumnDef::new(IpRange::IpRangeEnd).string_len(64).not_null())
        .col(ColumnDef::new(IpRange::IpNumberStart).var_binary(16).not_null())
        .col(ColumnDef::new(IpRange::IpNumberEnd).var_binary(16).not_null())
        .col(ColumnDef::new(IpRange::IpVersion).small_integer().not_null())
        .col(ColumnDef::new(IpRange::Generation).big_integer().not_null());

    match kind {
        RangeTableKind::Country => {
            table.col(
                ColumnDef::new(IpRange::CountryCode)
                    .string_len(8)
                    .not_null()
                    .default(""),
            );
        }
        RangeTableKind::City => {
            table
                .col(
                    ColumnDef::new(IpRange::CountryCode)
                        .string_len(8)
                        .not_null()
                        .default(""),
                )
                .col(
                    ColumnDef::new(IpRange::Region1)
                        .string_len(255)
                        .not_null()
                        .default(""),
                )
                .col(
                    ColumnDef::new(IpRange::Region2)
                        .string_len(255)
                        .not_null()
                        .default(""),
                )
                .col(
                    ColumnDef::new(IpRange::City)
                        .string_len(255)
                        .not_null()
                        .default(""),
                )
                .col(
                    ColumnDef::new(IpRange::Postcode)
                        .string_len(64)
                        .not_null()
                        .default(""),
                )
                .col(
                    ColumnDef::new(IpRange::Latitude)
                        .double()
                        .not_null()
                        .default(0.0),
                )
                .col(
                    ColumnDef::new(IpRange::Longitude)
                        .double()
                        .not_null()
                        .default(0.0),
                )
                .col(
                    ColumnDef::new(IpRange::Timezone)
                        .string_len(64)
                        .not_null()
                        .default(""),
                );
        }
        RangeTableKind::Asn => {
            table
                .col(
                    ColumnDef::new(IpRange::AsNumber)
                        .big_integer()
                        .not_null()
                        .default(0),
                )
                .col(
                    ColumnDef::new(IpRange::AsOrganisation)
                        .string_len(255)
                        .not_null()
                        .default(""),
                );
        }
    }

    table.to_owned()
}

#[derive(DeriveIden)]
enum IpRange {
    Id,
    IpRangeStart,
    IpRangeEnd,
    IpNumberStart,
    IpNumberEnd,
    IpVersion,
    Generation,
    CountryCode,
    #[sea_orm(iden = "region1")]
    Region1,
    #[sea_orm(iden = "region2")]
    Region2,
    City,
    Postcode,
    Latitude,
    Longitude,
    Timezone,
    AsNumber,
    AsOrganisation,
}
