//! Test fixture builders

use super::mock_helpers::{EventLog, RecordingDestination, RecordingSource, RecordingStage};
use pipewright::{Pipeline, PipelineConfig};
use std::sync::Arc;

/// Builder for a pipeline of recording stages.
pub struct FixtureBuilder {
    items: Vec<i32>,
    stages: usize,
    source: bool,
    destination: bool,
    config: PipelineConfig,
}

/// A built pipeline plus handles to inspect its stages.
pub struct Fixture {
    pub pipeline: Arc<Pipeline<i32>>,
    pub destination: Arc<RecordingDestination>,
    pub log: EventLog,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            items: vec![1, 2, 3],
            stages: 0,
            source: true,
            destination: true,
            config: PipelineConfig::default(),
        }
    }

    pub fn items(mut self, items: Vec<i32>) -> Self {
        self.items = items;
        self
    }

    pub fn stages(mut self, stages: usize) -> Self {
        self.stages = stages;
        self
    }

    pub fn without_source(mut self) -> Self {
        self.source = false;
        self
    }

    pub fn without_destination(mut self) -> Self {
        self.destination = false;
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Fixture {
        let log = EventLog::default();
        let pipeline = Arc::new(Pipeline::<i32>::with_config(self.config));
        let destination = Arc::new(RecordingDestination::new(log.clone()));

        if self.source {
            pipeline.set_source(Arc::new(RecordingSource::new(log.clone(), self.items)));
        }
        for i in 0..self.stages {
            pipeline.add(Arc::new(RecordingStage::new(format!("stage{}", i), log.clone())));
        }
        if self.destination {
            pipeline.set_destination(destination.clone());
        }

        Fixture {
            pipeline,
            destination,
            log,
        }
    }
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_builder() {
        let fixture = FixtureBuilder::new().stages(2).build();
        assert_eq!(fixture.pipeline.stage_count(), 2);
        assert!(fixture.log.events().is_empty());
    }
}
