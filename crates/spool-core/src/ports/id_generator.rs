//! DataKeyGenerator port - fresh payload keys for non-singleton tasks
//!
//! Every non-singleton schedule call that carries a payload gets its own
//! key, so two pending instances of the same type never share state.
//!
//! # 実装
//! - **UlidKeyGenerator**: ULID ベース（本番用）
//! - **SequentialKeyGenerator**: 決定的（テスト用）

use std::sync::atomic::{AtomicU64, Ordering};

use crate::ports::Clock;
use ulid::Ulid;

/// Thread Safety: `Send + Sync` を要求（複数スレッドから使える）
pub trait DataKeyGenerator: Send + Sync {
    /// A token never handed out before by this generator. Must not contain
    /// anything the payload store cannot use as a key.
    fn generate(&self) -> String;
}

/// ULID-based keys: time-sortable, no coordination needed.
pub struct UlidKeyGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidKeyGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> DataKeyGenerator for UlidKeyGenerator<C> {
    fn generate(&self) -> String {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        Ulid::from_parts(timestamp_ms, rand::random()).to_string()
    }
}

/// `prefix-1`, `prefix-2`, ...
#[derive(Debug)]
pub struct SequentialKeyGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialKeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl DataKeyGenerator for SequentialKeyGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}
