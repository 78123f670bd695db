//! Strategy and signal store ports.

use crate::domain::error::QuantvaultError;
use crate::domain::strategy::{NewStrategy, Signal, SignalFilter, Strategy, StrategyUpdate};

pub trait StrategyPort {
    /// Fails with `Duplicate` when the name is taken.
    fn create_strategy(&self, strategy: &NewStrategy) -> Result<Strategy, QuantvaultError>;

    fn update_strategy(&self, id: i64, update: &StrategyUpdate) -> Result<Strategy, QuantvaultError>;

    fn delete_strategy(&self, id: i64) -> Result<(), QuantvaultError>;

    /// Ordered by name.
    fn list_strategies(&self) -> Result<Vec<Strategy>, QuantvaultError>;

    fn active_strategies(&self) -> Result<Vec<Strategy>, QuantvaultError> {
        Ok(self
            .list_strategies()?
            .into_iter()
            .filter(|s| s.is_active)
            .collect())
    }
}

pub trait SignalPort {
    /// Insert unless a signal with the same strategy, ticker, type and calendar
    /// day (of `signal.timestamp`) exists. Returns `true` when inserted.
    fn insert_signal_if_absent(&self, signal: &Signal) -> Result<bool, QuantvaultError>;

    /// Most recent first.
    fn list_signals(&self, filter: &SignalFilter) -> Result<Vec<Signal>, QuantvaultError>;
}
