use async_trait::async_trait;

use crate::errors::Result;
use crate::storage::models::{RangeRecord, StoreKey};

/// 按 (数据集类型, IP 版本) 划分的 IP 段存储
///
/// 代际生命周期：
/// 1. `begin_generation(g)`：准备接收第 g 代数据（g = current_generation() + 1）
/// 2. `append_batch(records, g)`：分批写入，可多次调用
/// 3. `retire_older_than(g)`：第 g 代全部写入后调用，提交并淘汰旧代
///
/// 在第 3 步之前，查询只会看到上一代的完整数据。
#[async_trait]
pub trait RangeStore: Send + Sync {
    fn key(&self) -> StoreKey;

    /// 已提交（可查询）的代际，从未加载过时为 0
    async fn current_generation(&self) -> Result<i64>;

    /// 丢弃上次中断加载残留的 >= generation 的数据
    async fn begin_generation(&self, generation: i64) -> Result<()>;

    async fn append_batch(&self, records: &[RangeRecord], generation: i64) -> Result<()>;

    /// 提交 generation 并删除更旧的数据
    async fn retire_older_than(&self, generation: i64) -> Result<()>;

    /// 返回覆盖 `ip` 的记录；多条候选时取起始地址最大者
    async fn lookup(&self, ip: u128) -> Result<Option<RangeRecord>>;

    fn backend_name(&self) -> &'static str;
}
