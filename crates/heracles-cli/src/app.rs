use std::{path::Path, sync::Arc};

use heracles_core::{
    CheckReport, ComposeExporter, ComposeStack, ContainerScriptFixture, Exporter, ExternalExporter,
    Fixture, HeraclesError, Result, ScriptFixture,
};

use crate::config::GroupConfig;

/// Exporter and fixtures for one check run, in setup order.
pub struct Components {
    pub exporter: Arc<dyn Exporter>,
    pub fixtures: Vec<Arc<dyn Fixture>>,
}

/// Builds the fixture list and exporter for a group.
///
/// A compose stack is part of the run when the exporter lives in it or when a
/// hook targets one of its containers; it is always the first fixture.
pub fn assemble(config: &GroupConfig, remove_images: bool) -> Components {
    let needs_stack = config.base_url.is_empty()
        || config.hooks.iter().any(|hook| hook.container.is_some());
    let stack =
        needs_stack.then(|| Arc::new(ComposeStack::new(config.compose_file.clone(), remove_images)));

    let mut fixtures: Vec<Arc<dyn Fixture>> = Vec::new();
    if let Some(stack) = &stack {
        fixtures.push(Arc::clone(stack) as Arc<dyn Fixture>);
    }

    for hook in &config.hooks {
        let fixture: Arc<dyn Fixture> = match (&hook.container, &stack) {
            (Some(container), Some(stack)) => Arc::new(ContainerScriptFixture::new(
                Arc::clone(stack),
                &hook.name,
                container,
                hook.setup.clone(),
                hook.teardown.clone(),
            )),
            _ => Arc::new(ScriptFixture::new(
                &hook.name,
                hook.setup.clone(),
                hook.teardown.clone(),
            )),
        };
        fixtures.push(fixture);
    }

    let exporter: Arc<dyn Exporter> = match &stack {
        Some(stack) if config.base_url.is_empty() => Arc::new(ComposeExporter::new(
            Arc::clone(stack),
            &config.container,
            config.port,
            config.startup_timeout,
        )),
        _ => Arc::new(ExternalExporter::new(&config.base_url)),
    };

    Components { exporter, fixtures }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
    Crashed,
}

impl Verdict {
    pub fn of(result: &Result<CheckReport>) -> Self {
        match result {
            Ok(_) => Self::Passed,
            Err(err) if err.is_check_failure() => Self::Failed,
            Err(_) => Self::Crashed,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Passed => 0,
            Self::Failed => 1,
            Self::Crashed => 2,
        }
    }
}

pub fn write_report(path: &Path, report: &CheckReport) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(report).map_err(std::io::Error::from)?;
    std::fs::write(path, bytes).map_err(HeraclesError::Io)
}
