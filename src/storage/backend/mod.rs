//! SeaORM range store
//!
//! Ordered-range tables on SQLite, MySQL/MariaDB or PostgreSQL. Generations
//! are a row-level tag; the committed generation of each table lives in
//! `dataset_generations` and is mirrored in memory so every lookup reads
//! exactly one generation.

mod connection;
mod converters;
pub mod retry;

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Alias, Expr, OnConflict, Order, Query};
use sea_orm::{
    ActiveValue::Set, ConnectionTrait, DatabaseConnection, EntityTrait, ExprTrait,
    FromQueryResult,
};
use tracing::{debug, info, trace};

use crate::errors::{IpLocateError, Result};
use crate::storage::models::{DatasetType, RangeRecord, StoreKey};
use crate::storage::traits::RangeStore;
use crate::utils::ip::number_to_be_bytes;
use migration::entities::dataset_generation;

pub use connection::{connect_generic, connect_sqlite, run_migrations};
use converters::{AsnRow, CityRow, CountryRow, COL_GENERATION, COL_IP_NUMBER_START};

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<&'static str> {
    if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite")
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql")
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres")
    } else {
        Err(IpLocateError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// 建立连接并执行迁移，返回连接与数据库类型
pub async fn connect(database_url: &str, pool_size: u32) -> Result<(DatabaseConnection, &'static str)> {
    if database_url.is_empty() {
        return Err(IpLocateError::database_config("database_url 未设置"));
    }

    let backend_name = infer_backend_from_url(database_url)?;
    let db = if backend_name == "sqlite" {
        connect_sqlite(database_url).await?
    } else {
        connect_generic(database_url, backend_name, pool_size).await?
    };

    run_migrations(&db).await?;
    info!("{} range storage initialized", backend_name.to_uppercase());
    Ok((db, backend_name))
}

/// 单张 IP 段表上的 RangeStore
pub struct SeaOrmRangeStore {
    db: DatabaseConnection,
    key: StoreKey,
    table: String,
    backend_name: &'static str,
    /// 已发布的代际，0 表示尚无可查询数据
    published: AtomicI64,
    retry_config: retry::RetryConfig,
}

impl SeaOrmRangeStore {
    /// 打开指定表，并从提交标记表读取当前代际
    pub async fn open(
        db: DatabaseConnection,
        key: StoreKey,
        backend_name: &'static str,
        retry_config: retry::RetryConfig,
    ) -> Result<Self> {
        let marker = dataset_generation::Entity::find_by_id((
            key.dataset.to_string(),
            key.version.number() as i16,
        ))
        .one(&db)
        .await?;
        let generation = marker.map(|m| m.generation).unwrap_or(0);

        debug!("Opened {} at generation {}", key.table_name(), generation);

        Ok(Self {
            table: key.table_name(),
            db,
            key,
            backend_name,
            published: AtomicI64::new(generation),
            retry_config,
        })
    }

    fn table_ref(&self) -> Alias {
        Alias::new(self.table.as_str())
    }

    async fn commit_marker(&self, generation: i64) -> Result<()> {
        let model = dataset_generation::ActiveModel {
            dataset: Set(self.key.dataset.to_string()),
            ip_version: Set(self.key.version.number() as i16),
            generation: Set(generation),
            committed_at: Set(Utc::now()),
        };

        retry::with_retry("commit_generation", self.retry_config, || async {
            dataset_generation::Entity::insert(model.clone())
                .on_conflict(
                    OnConflict::columns([
                        dataset_generation::Column::Dataset,
                        dataset_generation::Column::IpVersion,
                    ])
                    .update_columns([
                        dataset_generation::Column::Generation,
                        dataset_generation::Column::CommittedAt,
                    ])
                    .to_owned(),
                )
                .exec(&self.db)
                .await
                .map(|_| ())
        })
        .await
        .map_err(|e| {
            IpLocateError::database_operation(format!(
                "提交 {} 第 {} 代失败: {}",
                self.table, generation, e
            ))
        })
    }

    /// 在指定代际中查找覆盖 `ip` 的记录
    async fn find_in_generation(&self, generation: i64, ip: u128) -> Result<Option<RangeRecord>> {
        let mut select = Query::select();
        select
            .columns(converters::columns(self.key.dataset))
            .from(self.table_ref())
            .and_where(Expr::col(Alias::new(COL_GENERATION)).eq(generation))
            .and_where(
                Expr::col(Alias::new(COL_IP_NUMBER_START))
                    .lte(number_to_be_bytes(ip, self.key.version)),
            )
            .order_by(Alias::new(COL_IP_NUMBER_START), Order::Desc)
            .limit(1);

        let stmt = self.db.get_database_backend().build(&select);
        let version = self.key.version;

        let record = match self.key.dataset {
            DatasetType::Country => CountryRow::find_by_statement(stmt)
                .one(&self.db)
                .await?
                .map(|row| row.into_record(version))
                .transpose()?,
            DatasetType::City => CityRow::find_by_statement(stmt)
                .one(&self.db)
                .await?
                .map(|row| row.into_record(version))
                .transpose()?,
            DatasetType::Asn => AsnRow::find_by_statement(stmt)
                .one(&self.db)
                .await?
                .map(|row| row.into_record(version))
                .transpose()?,
        };

        // 同代区间互不重叠，起始地址最大的候选若不覆盖则无覆盖行
        Ok(record.filter(|r| r.range.contains(ip)))
    }

    async fn delete_where(&self, op_name: &str, condition: sea_orm::sea_query::SimpleExpr) -> Result<u64> {
        let stmt = Query::delete()
            .from_table(self.table_ref())
            .and_where(condition)
            .to_owned();

        let result = retry::with_retry(op_name, self.retry_config, || async {
            self.db.execute(&stmt).await
        })
        .await
        .map_err(|e| {
            IpLocateError::database_operation(format!("{} on {} failed: {}", op_name, self.table, e))
        })?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RangeStore for SeaOrmRangeStore {
    fn key(&self) -> StoreKey {
        self.key
    }

    async fn current_generation(&self) -> Result<i64> {
        Ok(self.published.load(Ordering::Acquire))
    }

    async fn begin_generation(&self, generation: i64) -> Result<()> {
        let stale = self
            .delete_where(
                "purge_unfinished_generation",
                Expr::col(Alias::new(COL_GENERATION)).gte(generation),
            )
            .await?;
        if stale > 0 {
            info!(
                "{}: removed {} rows left by an interrupted load",
                self.table, stale
            );
        }
        Ok(())
    }

    async fn append_batch(&self, records: &[RangeRecord], generation: i64) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut insert = Query::insert();
        insert
            .into_table(self.table_ref())
            .columns(converters::columns(self.key.dataset));

        for record in records {
            if record.key() != self.key {
                return Err(IpLocateError::invalid_input(format!(
                    "record for {} cannot be stored in {}",
                    record.key(),
                    self.key
                )));
            }
            insert
                .values(converters::row_values(record, generation))
                .map_err(|e| IpLocateError::database_operation(e.to_string()))?;
        }

        retry::with_retry("append_batch", self.retry_config, || async {
            self.db.execute(&insert).await
        })
        .await
        .map_err(|e| {
            IpLocateError::database_operation(format!(
                "写入 {} 第 {} 代失败: {}",
                self.table, generation, e
            ))
        })?;

        Ok(())
    }

    async fn retire_older_than(&self, generation: i64) -> Result<()> {
        if generation <= 0 {
            return Err(IpLocateError::invalid_input(format!(
                "cannot retire below generation {}",
                generation
            )));
        }

        // 先提交标记，再切换查询代际，最后删除旧数据
        self.commit_marker(generation).await?;
        self.published.store(generation, Ordering::Release);

        let removed = self
            .delete_where(
                "retire_old_generations",
                Expr::col(Alias::new(COL_GENERATION)).lt(generation),
            )
            .await?;

        info!(
            "{}: generation {} committed, {} superseded rows removed",
            self.table, generation, removed
        );
        Ok(())
    }

    async fn lookup(&self, ip: u128) -> Result<Option<RangeRecord>> {
        if ip > self.key.version.max_number() {
            return Ok(None);
        }

        let mut generation = self.published.load(Ordering::Acquire);
        loop {
            if generation == 0 {
                return Ok(None);
            }
            let record = self.find_in_generation(generation, ip).await?;
            if record.is_some() {
                return Ok(record);
            }

            // 旧代只会在新代发布之后删除：代际未变说明确实未命中
            let current = self.published.load(Ordering::Acquire);
            if current == generation {
                return Ok(None);
            }
            trace!(
                "{}: generation switched {} -> {} during lookup, retrying",
                self.table, generation, current
            );
            generation = current;
        }
    }

    fn backend_name(&self) -> &'static str {
        self.backend_name
    }
}
