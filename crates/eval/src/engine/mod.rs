//! Processing engines: template, response and outcome processing.
//!
//! An [`Engine`] owns everything that is fixed for a deployment: the
//! [`EngineConfig`], the custom operator registry and the template
//! resolver. Each call to `response_processing` and friends hands out a
//! one-shot [`Processor`] that runs a processing block against a caller
//! owned [`State`].
//!
//! ```text
//! Idle ── run() ──▶ Running ──▶ Completed
//!                          └──▶ Failed
//! ```

mod outcome;
mod response;
mod template;

use std::fmt;
use std::sync::Arc;

use qti_core::{Processing, State};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::custom::OperatorRegistry;
use crate::error::ProcessingError;
use crate::rules::Executor;
use crate::template::{TemplateLoader, TemplateResolver};
use crate::trace::Trace;

// ──────────────────────────────────────────────
// Status and reports
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineStatus::Idle => "idle",
            EngineStatus::Running => "running",
            EngineStatus::Completed => "completed",
            EngineStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingKind {
    Template,
    Response,
    Outcome,
}

impl ProcessingKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingKind::Template => "template processing",
            ProcessingKind::Response => "response processing",
            ProcessingKind::Outcome => "outcome processing",
        }
    }
}

impl fmt::Display for ProcessingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingReport {
    /// Stopped early by the engine's exit rule.
    pub exited: bool,
    /// Passes over the rules; more than one only when template
    /// constraints forced a restart.
    pub attempts: usize,
    /// False when template processing gave up on its constraints.
    pub constraint_satisfied: bool,
}

impl ProcessingReport {
    fn completed(exited: bool) -> Self {
        ProcessingReport {
            exited,
            attempts: 1,
            constraint_satisfied: true,
        }
    }
}

// ──────────────────────────────────────────────
// Engine
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    operators: Arc<OperatorRegistry>,
    templates: TemplateResolver,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

impl Engine {
    /// An engine with the standard custom operators and templates; the
    /// config's template mapping takes precedence over the standard one.
    pub fn new(config: EngineConfig) -> Self {
        let templates = TemplateResolver::standard(&config.templates);
        Engine {
            config,
            operators: Arc::new(OperatorRegistry::standard()),
            templates,
        }
    }

    pub fn with_operators(mut self, operators: impl Into<Arc<OperatorRegistry>>) -> Self {
        self.operators = operators.into();
        self
    }

    pub fn with_template_loader(mut self, loader: Arc<dyn TemplateLoader>) -> Self {
        self.templates = self.templates.with_loader(loader);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    pub fn templates(&self) -> &TemplateResolver {
        &self.templates
    }

    pub fn template_processing<'a>(&'a self, processing: &'a Processing) -> Processor<'a> {
        Processor::new(self, ProcessingKind::Template, processing)
    }

    pub fn response_processing<'a>(&'a self, processing: &'a Processing) -> Processor<'a> {
        Processor::new(self, ProcessingKind::Response, processing)
    }

    pub fn outcome_processing<'a>(&'a self, processing: &'a Processing) -> Processor<'a> {
        Processor::new(self, ProcessingKind::Outcome, processing)
    }
}

// ──────────────────────────────────────────────
// Processor
// ──────────────────────────────────────────────

/// A single run of one processing block.
#[derive(Debug)]
pub struct Processor<'a> {
    engine: &'a Engine,
    kind: ProcessingKind,
    processing: &'a Processing,
    status: EngineStatus,
    trace: Trace,
}

impl<'a> Processor<'a> {
    fn new(engine: &'a Engine, kind: ProcessingKind, processing: &'a Processing) -> Self {
        Processor {
            engine,
            kind,
            processing,
            status: EngineStatus::Idle,
            trace: Trace::new(),
        }
    }

    pub fn kind(&self) -> ProcessingKind {
        self.kind
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// `"<rule> executed"` for every rule run, nested rules included.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Run the block against `state`. A processor runs once; later calls
    /// fail with [`ProcessingError::NotIdle`].
    pub fn run(&mut self, state: &mut State) -> Result<ProcessingReport, ProcessingError> {
        if self.status != EngineStatus::Idle {
            return Err(ProcessingError::NotIdle {
                status: self.status,
            });
        }
        self.status = EngineStatus::Running;

        let engine = self.engine;
        let mut executor = Executor::new(&engine.config, &engine.operators);
        let result = self.run_rules(&mut executor, state);
        self.trace = executor.take_trace();

        match &result {
            Ok(report) => {
                self.status = EngineStatus::Completed;
                info!(
                    kind = %self.kind,
                    exited = report.exited,
                    attempts = report.attempts,
                    rules = self.trace.len(),
                    "processing completed"
                );
            }
            Err(e) => {
                self.status = EngineStatus::Failed;
                warn!(kind = %self.kind, error = %e, "processing failed");
            }
        }
        result
    }

    fn run_rules(&self, executor: &mut Executor<'_>, state: &mut State) -> Result<ProcessingReport, ProcessingError> {
        let rules = self.engine.templates.resolve(self.processing)?;
        match self.kind {
            ProcessingKind::Template => {
                template::run(executor, &rules, state, self.engine.config.max_template_attempts)
            }
            ProcessingKind::Response => response::run(executor, &rules, state),
            ProcessingKind::Outcome => outcome::run(executor, &rules, state),
        }
    }
}
