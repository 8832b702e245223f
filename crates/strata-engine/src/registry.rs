//! Routing of write notifications to processors

use crate::engine::{Engine, EngineStatus, TriggerOutcome};
use crate::processor::{ProcessReport, ShardProcessor};
use crate::sweeper::SweepReport;
use std::sync::Arc;
use strata_core::{DocPath, DocumentStore, Result, StrataError, SweepConfig};

/// Object-safe view of one [`Engine`]
pub trait ShardWorkflow: Send + Sync {
    fn id(&self) -> &str;

    /// Whether `path` is an event this workflow owns.
    fn matches(&self, path: &DocPath) -> bool;

    fn on_event_written(&self, path: &DocPath) -> Result<TriggerOutcome>;

    /// Force a run of the shard whose events collection is `shard_path`.
    fn process(&self, shard_path: &str) -> Result<ProcessReport>;

    fn sweep_stale_events(&self) -> Result<SweepReport>;

    fn sweep_stale_triggers(&self) -> Result<SweepReport>;

    fn sweep_config(&self) -> &SweepConfig;

    fn status(&self) -> Result<EngineStatus>;
}

impl<S, P> ShardWorkflow for Engine<S, P>
where
    S: DocumentStore,
    P: ShardProcessor,
{
    fn id(&self) -> &str {
        Engine::id(self)
    }

    fn matches(&self, path: &DocPath) -> bool {
        self.template.matches_collection(path.collection())
    }

    fn on_event_written(&self, path: &DocPath) -> Result<TriggerOutcome> {
        Engine::on_event_written(self, path)
    }

    fn process(&self, shard_path: &str) -> Result<ProcessReport> {
        let shard = self.template.resolve_collection(shard_path.trim_matches('/'))?;
        self.process_shard(&shard)
    }

    fn sweep_stale_events(&self) -> Result<SweepReport> {
        Engine::sweep_stale_events(self)
    }

    fn sweep_stale_triggers(&self) -> Result<SweepReport> {
        Engine::sweep_stale_triggers(self)
    }

    fn sweep_config(&self) -> &SweepConfig {
        Engine::sweep_config(self)
    }

    fn status(&self) -> Result<EngineStatus> {
        Engine::status(self)
    }
}

/// Set of workflows keyed by processor id
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    workflows: Vec<Arc<dyn ShardWorkflow>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workflow. Ids must be unique.
    pub fn register(&mut self, workflow: Arc<dyn ShardWorkflow>) -> Result<()> {
        if self.get(workflow.id()).is_some() {
            return Err(StrataError::Config(format!(
                "processor '{}' is already registered",
                workflow.id()
            )));
        }
        tracing::debug!(processor = workflow.id(), "Registered processor");
        self.workflows.push(workflow);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn ShardWorkflow>> {
        self.workflows.iter().find(|w| w.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ShardWorkflow>> {
        self.workflows.iter()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Workflows owning the event at `path`.
    pub fn route<'a>(
        &'a self,
        path: &'a DocPath,
    ) -> impl Iterator<Item = &'a Arc<dyn ShardWorkflow>> + 'a {
        self.workflows.iter().filter(move |w| w.matches(path))
    }

    /// Deliver a write notification to every owning workflow.
    ///
    /// Failures are logged per workflow and returned alongside successes.
    pub fn notify(&self, path: &DocPath) -> Vec<(String, Result<TriggerOutcome>)> {
        let outcomes: Vec<_> = self
            .route(path)
            .map(|w| (w.id().to_string(), w.on_event_written(path)))
            .collect();
        if outcomes.is_empty() {
            tracing::debug!(event = %path, "No processor owns event");
        }
        outcomes
    }

    /// Run the selected sweeps of every workflow once.
    pub fn sweep_all(&self, events: bool, triggers: bool) -> Vec<(String, Result<SweepReport>)> {
        let mut reports = Vec::new();
        for workflow in &self.workflows {
            if events {
                reports.push((workflow.id().to_string(), workflow.sweep_stale_events()));
            }
            if triggers {
                reports.push((workflow.id().to_string(), workflow.sweep_stale_triggers()));
            }
        }
        reports
    }
}
