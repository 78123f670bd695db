//! Materialized holdings and portfolio snapshot ports.

use crate::domain::error::QuantvaultError;
use crate::domain::holdings::MaterializedHolding;
use crate::domain::portfolio::PortfolioSnapshot;
use chrono::{NaiveDate, NaiveDateTime};

pub trait HoldingsPort {
    /// Delete every materialized row and insert `rows`, atomically, and stamp
    /// the recompute time.
    fn replace_materialized(
        &self,
        rows: &[MaterializedHolding],
        computed_at: NaiveDateTime,
    ) -> Result<(), QuantvaultError>;

    /// `None` when holdings have never been materialized; `Some` (possibly
    /// empty) after the first recompute.
    fn load_materialized(&self) -> Result<Option<Vec<MaterializedHolding>>, QuantvaultError>;
}

pub trait SnapshotPort {
    /// All snapshots ordered by date ascending.
    fn snapshots(&self) -> Result<Vec<PortfolioSnapshot>, QuantvaultError>;

    fn find_snapshot(&self, date: NaiveDate) -> Result<Option<PortfolioSnapshot>, QuantvaultError>;

    /// Insert or overwrite the snapshot for its date.
    fn upsert_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), QuantvaultError>;
}
