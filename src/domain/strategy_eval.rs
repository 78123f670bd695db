//! Strategy evaluation engine.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::error::QuantvaultError;
use super::ohlcv::normalize_ticker;
use super::strategy::{
    NewStrategy, Signal, SignalCandidate, SignalFilter, Strategy, StrategyRule, StrategyUpdate,
};
use crate::ports::indicator_port::IndicatorPort;
use crate::ports::signal_port::{SignalPort, StrategyPort};

pub struct StrategyEngine<'a> {
    pub strategies: &'a dyn StrategyPort,
    pub signals: &'a dyn SignalPort,
    pub indicators: &'a dyn IndicatorPort,
}

impl StrategyEngine<'_> {
    pub fn create_strategy(&self, new: NewStrategy) -> Result<Strategy, QuantvaultError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(QuantvaultError::invalid_input("strategy name must not be empty"));
        }
        let strategy = self.strategies.create_strategy(&NewStrategy { name, ..new })?;
        info!(id = strategy.id, name = %strategy.name, "strategy created");
        Ok(strategy)
    }

    pub fn update_strategy(
        &self,
        id: i64,
        update: StrategyUpdate,
    ) -> Result<Strategy, QuantvaultError> {
        if matches!(&update.name, Some(n) if n.trim().is_empty()) {
            return Err(QuantvaultError::invalid_input("strategy name must not be empty"));
        }
        let strategy = self.strategies.update_strategy(id, &update)?;
        info!(id, active = strategy.is_active, "strategy updated");
        Ok(strategy)
    }

    pub fn set_active(&self, id: i64, is_active: bool) -> Result<Strategy, QuantvaultError> {
        self.update_strategy(id, StrategyUpdate::set_active(is_active))
    }

    pub fn delete_strategy(&self, id: i64) -> Result<(), QuantvaultError> {
        self.strategies.delete_strategy(id)?;
        info!(id, "strategy deleted");
        Ok(())
    }

    pub fn list_strategies(&self) -> Result<Vec<Strategy>, QuantvaultError> {
        self.strategies.list_strategies()
    }

    pub fn list_signals(&self, filter: &SignalFilter) -> Result<Vec<Signal>, QuantvaultError> {
        let filter = SignalFilter {
            ticker: filter.ticker.as_deref().map(normalize_ticker),
            ..filter.clone()
        };
        self.signals.list_signals(&filter)
    }

    /// Candidate signals from every active strategy for `ticker`, from the
    /// latest cached indicator value each rule reads.
    pub fn evaluate_active_strategies(
        &self,
        ticker: &str,
    ) -> Result<Vec<SignalCandidate>, QuantvaultError> {
        let ticker = normalize_ticker(ticker);
        let mut candidates = Vec::new();

        for strategy in self.strategies.active_strategies()? {
            let Some(rule) = StrategyRule::for_strategy(&strategy) else {
                debug!(name = %strategy.name, "no rule for strategy");
                continue;
            };
            let latest = self
                .indicators
                .latest_indicator_value(&ticker, &rule.indicator().key())?;
            let Some(value) = latest.and_then(|r| r.value) else {
                continue;
            };
            if let Some((signal_type, strength, metadata)) = rule.evaluate(value) {
                candidates.push(SignalCandidate {
                    strategy_id: strategy.id,
                    ticker: ticker.clone(),
                    signal_type,
                    strength,
                    value: Some(value),
                    metadata,
                });
            }
        }

        Ok(candidates)
    }

    /// Evaluate and store, at most one signal per strategy, ticker, type and
    /// day. Returns how many were newly inserted.
    pub fn generate_and_store_signals(
        &self,
        ticker: &str,
        now: NaiveDateTime,
    ) -> Result<usize, QuantvaultError> {
        let mut inserted = 0;
        for candidate in self.evaluate_active_strategies(ticker)? {
            let signal = Signal::from_candidate(candidate, now);
            if self.signals.insert_signal_if_absent(&signal)? {
                info!(
                    ticker = %signal.ticker,
                    strategy_id = signal.strategy_id,
                    signal_type = %signal.signal_type,
                    strength = signal.strength,
                    "signal generated"
                );
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
