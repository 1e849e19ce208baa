//! Magic-state factories and their per-run production state

use crate::dag::Symbol;
use serde::{Deserialize, Serialize};

/// A production line for one magic-state type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factory {
    /// Magic state produced
    pub symbol: Symbol,
    /// Cycles needed to produce one unit
    pub period: usize,
}

impl Factory {
    /// Create a new factory
    pub fn new(symbol: impl Into<Symbol>, period: usize) -> Self {
        Self {
            symbol: symbol.into(),
            period,
        }
    }
}

/// The factory instance that served one magic-state consumption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryBinding {
    /// Magic state consumed
    pub symbol: Symbol,
    /// Index among the factories producing `symbol`, in period order
    pub instance: usize,
    /// Production period of that instance
    pub period: usize,
}

impl FactoryBinding {
    /// Symbol naming this concrete instance
    pub fn instance_symbol(&self) -> Symbol {
        Symbol::new(format!("{}#{}", self.symbol, self.instance))
    }
}

#[derive(Debug, Clone)]
struct Slot {
    factory: Factory,
    instance: usize,
    progress: usize,
}

impl Slot {
    fn ready(&self) -> bool {
        self.progress >= self.factory.period
    }
}

/// Production counters for one scheduling pass.
///
/// Instances are ordered by period, fastest first. Each instance holds at
/// most one unit; consuming it restarts production from zero.
#[derive(Debug, Clone)]
pub struct FactoryPool {
    slots: Vec<Slot>,
}

impl FactoryPool {
    /// Create a pool with every counter at zero
    pub fn new(factories: &[Factory]) -> Self {
        let mut sorted: Vec<Factory> = factories.to_vec();
        sorted.sort_by_key(|factory| factory.period);

        let mut slots: Vec<Slot> = Vec::with_capacity(sorted.len());
        for factory in sorted {
            let instance = slots
                .iter()
                .filter(|slot| slot.factory.symbol == factory.symbol)
                .count();
            slots.push(Slot {
                factory,
                instance,
                progress: 0,
            });
        }
        Self { slots }
    }

    /// Whether any factory produces `symbol`
    pub fn produces(&self, symbol: &Symbol) -> bool {
        self.slots.iter().any(|slot| slot.factory.symbol == *symbol)
    }

    /// Units of `symbol` available right now
    pub fn inventory(&self, symbol: &Symbol) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.factory.symbol == *symbol && slot.ready())
            .count()
    }

    /// Take one unit from the first ready instance of `symbol`
    pub fn consume(&mut self, symbol: &Symbol) -> Option<FactoryBinding> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.factory.symbol == *symbol && slot.ready())?;
        slot.progress = 0;
        Some(FactoryBinding {
            symbol: symbol.clone(),
            instance: slot.instance,
            period: slot.factory.period,
        })
    }

    /// Advance every instance by one cycle, capped at its period
    pub fn advance(&mut self) {
        for slot in &mut self.slots {
            slot.progress = (slot.progress + 1).min(slot.factory.period);
        }
    }

    /// Whether every instance already holds a unit
    pub fn saturated(&self) -> bool {
        self.slots.iter().all(Slot::ready)
    }
}
