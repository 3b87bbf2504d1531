pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20260301_000001_range_tables;
mod m20260301_000002_dataset_generations;

pub use m20260301_000001_range_tables::{RANGE_TABLES, RangeTableKind};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_range_tables::Migration),
            Box::new(m20260301_000002_dataset_generations::Migration),
        ]
    }
}
