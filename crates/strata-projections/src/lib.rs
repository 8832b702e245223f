//! Marketplace projections
//!
//! Each projection turns one kind of per-entity event log into fields on the
//! entity's document:
//!
//! | id | processor | events | derived fields |
//! |---|---|---|---|
//! | `ownership` | ordered | `collections/{collectionId}/items/{itemId}/transfers` | `owner`, `ownershipBlock`, `ownershipUpdatedAt` |
//! | `referrals` | batch | `referrals/{referralCode}/events` | `totalReferrals` |
//! | `best-order` | batch | `collections/{collectionId}/items/{itemId}/orderEvents` | `bestListing`, `bestOffer` |
//! | `flags` | ordered | `collections/{collectionId}/items/{itemId}/flagEvents` | `flagged`, `flagReason` |
//!
//! [`build_registry`] wires configured projections onto a store.

pub mod best_order;
pub mod flags;
pub mod ownership;
pub mod referrals;

pub use best_order::{BestOrder, OrderEvent, OrderSide, OrderStatus};
pub use flags::{FlagEvent, FlagStatus};
pub use ownership::{Ownership, TransferLog};
pub use referrals::{ReferralEvent, ReferralTally};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use strata_core::{
    Clock, DocPath, DocumentStore, ProcessorConfig, Result, ShardKey, StrataError, SweepConfig,
};
use strata_engine::{
    BatchEventProcessor, Engine, OrderedEventProcessor, ProcessorRegistry, ShardWorkflow,
};

pub const OWNERSHIP_TEMPLATE: &str = "collections/{collectionId}/items/{itemId}/transfers";
pub const REFERRALS_TEMPLATE: &str = "referrals/{referralCode}/events";
pub const BEST_ORDER_TEMPLATE: &str = "collections/{collectionId}/items/{itemId}/orderEvents";
pub const FLAGS_TEMPLATE: &str = "collections/{collectionId}/items/{itemId}/flagEvents";

/// The projections this crate ships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectionKind {
    Ownership,
    Referrals,
    BestOrder,
    Flags,
}

impl ProjectionKind {
    pub const ALL: [ProjectionKind; 4] = [
        ProjectionKind::Ownership,
        ProjectionKind::Referrals,
        ProjectionKind::BestOrder,
        ProjectionKind::Flags,
    ];

    /// Processor id, also the trigger-state namespace.
    pub fn id(&self) -> &'static str {
        match self {
            ProjectionKind::Ownership => "ownership",
            ProjectionKind::Referrals => "referrals",
            ProjectionKind::BestOrder => "best-order",
            ProjectionKind::Flags => "flags",
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            ProjectionKind::Ownership => OWNERSHIP_TEMPLATE,
            ProjectionKind::Referrals => REFERRALS_TEMPLATE,
            ProjectionKind::BestOrder => BEST_ORDER_TEMPLATE,
            ProjectionKind::Flags => FLAGS_TEMPLATE,
        }
    }

    pub fn default_config(&self) -> ProcessorConfig {
        ProcessorConfig::new(self.id(), self.template())
    }

    /// Build the engine for this projection as a type-erased workflow.
    pub fn build<S>(
        &self,
        config: ProcessorConfig,
        store: Arc<S>,
        sweep: SweepConfig,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Arc<dyn ShardWorkflow>>
    where
        S: DocumentStore + 'static,
    {
        fn finish<S, P>(
            engine: Engine<S, P>,
            sweep: SweepConfig,
            clock: Option<Arc<dyn Clock>>,
        ) -> Arc<dyn ShardWorkflow>
        where
            S: DocumentStore + 'static,
            P: strata_engine::ShardProcessor + 'static,
        {
            let engine = engine.with_sweep_config(sweep);
            match clock {
                Some(clock) => Arc::new(engine.with_clock(clock)),
                None => Arc::new(engine),
            }
        }

        let workflow = match self {
            ProjectionKind::Ownership => finish(
                Engine::new(config, store, OrderedEventProcessor::new(Ownership))?,
                sweep,
                clock,
            ),
            ProjectionKind::Referrals => finish(
                Engine::new(config, store, BatchEventProcessor::new(ReferralTally))?,
                sweep,
                clock,
            ),
            ProjectionKind::BestOrder => finish(
                Engine::new(config, store, BatchEventProcessor::new(BestOrder))?,
                sweep,
                clock,
            ),
            ProjectionKind::Flags => finish(
                Engine::new(config, store, OrderedEventProcessor::new(FlagStatus))?,
                sweep,
                clock,
            ),
        };
        Ok(workflow)
    }
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProjectionKind {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| StrataError::Config(format!("unknown projection '{}'", s)))
    }
}

/// The document a shard's derived fields are written to.
pub(crate) fn target_document(shard: &ShardKey) -> Result<DocPath> {
    shard.target_path().ok_or_else(|| {
        StrataError::InvalidPath(format!(
            "events collection '{}' has no parent document",
            shard
        ))
    })
}

/// Default configuration of every shipped projection.
pub fn default_configs() -> Vec<ProcessorConfig> {
    ProjectionKind::ALL
        .iter()
        .map(ProjectionKind::default_config)
        .collect()
}

/// Register one engine per config. The config id selects the projection.
pub fn build_registry<S>(
    store: Arc<S>,
    configs: &[ProcessorConfig],
    sweep: &SweepConfig,
    clock: Option<Arc<dyn Clock>>,
) -> Result<ProcessorRegistry>
where
    S: DocumentStore + 'static,
{
    let mut registry = ProcessorRegistry::new();
    for config in configs {
        let kind: ProjectionKind = config.id.parse()?;
        let workflow = kind.build(config.clone(), store.clone(), sweep.clone(), clock.clone())?;
        registry.register(workflow)?;
    }
    tracing::info!(processors = registry.len(), "Projections registered");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ids_round_trip() {
        for kind in ProjectionKind::ALL {
            assert_eq!(kind.id().parse::<ProjectionKind>().unwrap(), kind);
            assert!(kind.default_config().validate().is_ok());
        }
        assert!("owner".parse::<ProjectionKind>().is_err());
    }
}
