// Read-only facade for the dashboard. Gap transparency is inherited from
// the store: missing samples are missing points, never zero-filled.

use crate::models::{AggregatedValue, MetricName, Tier};
use crate::store::{MetricStore, StoreError};
use std::sync::Arc;

/// Tier-selection policy: step to a coarser tier when a span would yield
/// more points than the ceiling. Pure function of span and ceiling; exists
/// only to bound rendering cost.
#[derive(Debug, Clone, Copy)]
pub struct QueryPolicy {
    pub sampling_interval_ms: i64,
    pub point_ceiling: u32,
}

impl QueryPolicy {
    pub fn select_tier(&self, from_ms: i64, to_ms: i64) -> Tier {
        let span = (to_ms - from_ms).max(0);
        let ceiling = self.point_ceiling as i64;
        if span / self.sampling_interval_ms.max(1) <= ceiling {
            Tier::Raw
        } else if span / 60_000 <= ceiling {
            Tier::Minute
        } else {
            Tier::Hour
        }
    }
}

pub struct HistoryQuery {
    store: Arc<MetricStore>,
    policy: QueryPolicy,
}

impl HistoryQuery {
    pub fn new(store: Arc<MetricStore>, policy: QueryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> QueryPolicy {
        self.policy
    }

    /// Points for one metric in [from_ms, to_ms) at an explicit tier,
    /// ascending. Stateless and repeatable.
    pub async fn range_for(
        &self,
        metric: MetricName,
        tier: Tier,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<(i64, AggregatedValue)>, StoreError> {
        self.store.query_range(tier, metric, from_ms, to_ms).await
    }

    /// Best available resolution for the span: picks the tier per the
    /// point-ceiling policy, then queries it.
    pub async fn range_auto(
        &self,
        metric: MetricName,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<(Tier, Vec<(i64, AggregatedValue)>), StoreError> {
        let tier = self.policy.select_tier(from_ms, to_ms);
        let points = self.range_for(metric, tier, from_ms, to_ms).await?;
        Ok((tier, points))
    }
}
