//! The multi-pass driver.
//!
//! A driver owns a parser, an ordered list of named stages (pass plus
//! optional schema) and the parser's own schema. Running it parses the
//! source, then runs each stage in order, validating the tree against
//! the stage's schema and gathering in-tree `Error` nodes between
//! stages. Accumulated error nodes short-circuit the remaining stages;
//! a schema violation is fatal to the driver itself and is reported
//! separately from in-tree errors.

use std::fmt;

use crate::graft::error::PassError;
use crate::graft::location::{Location, SourceRef};
use crate::graft::node::Node;
use crate::graft::pass::Pass;

/// One structural complaint from the well-formedness oracle.
#[derive(Debug, Clone)]
pub struct SchemaViolation {
    /// What shape was expected and what was found.
    pub message: String,
    /// Where in the source the offending node sits.
    pub location: Location,
}

/// The well-formedness oracle, opaque to the engine.
///
/// A schema is attached per stage; the driver calls it on the whole
/// tree after the stage runs.
pub trait Schema {
    fn check(&self, root: &Node) -> Vec<SchemaViolation>;
}

/// Adapt a closure into a [`Schema`].
pub struct FnSchema<F>(F);

impl<F> FnSchema<F>
where
    F: Fn(&Node) -> Vec<SchemaViolation>,
{
    pub fn new(check: F) -> FnSchema<F> {
        FnSchema(check)
    }
}

impl<F> Schema for FnSchema<F>
where
    F: Fn(&Node) -> Vec<SchemaViolation>,
{
    fn check(&self, root: &Node) -> Vec<SchemaViolation> {
        (self.0)(root)
    }
}

/// Why a pipeline run stopped without producing a tree.
#[derive(Debug)]
pub enum DriverError {
    /// The initial parse failed.
    Parse(String),
    /// A pass failed (unresolved lift, structural misuse, effect error).
    Pass { stage: String, source: PassError },
    /// A stage produced a tree its schema rejects.
    Malformed {
        stage: String,
        violations: Vec<SchemaViolation>,
    },
    /// `run_until` named a stage the driver does not have.
    UnknownStage(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Parse(message) => write!(f, "parse failed: {}", message),
            DriverError::Pass { stage, source } => {
                write!(f, "pass '{}' failed: {}", stage, source)
            }
            DriverError::Malformed { stage, violations } => {
                write!(f, "malformed tree after '{}':", stage)?;
                for violation in violations {
                    write!(f, "\n  {}", violation.message)?;
                }
                Ok(())
            }
            DriverError::UnknownStage(name) => write!(f, "unknown stage: {}", name),
        }
    }
}

impl std::error::Error for DriverError {}

/// Per-stage execution counters.
#[derive(Debug, Clone)]
pub struct PassMetrics {
    pub name: String,
    pub iterations: usize,
    pub changes: usize,
}

/// The pipeline's result: the final tree, the error nodes gathered
/// along the way and the per-stage metrics.
pub struct DriverOutput {
    pub root: Node,
    pub errors: Vec<Node>,
    pub metrics: Vec<PassMetrics>,
}

type ParseFn = dyn Fn(&SourceRef) -> Result<Node, String>;

struct Stage {
    name: String,
    pass: Pass,
    schema: Option<Box<dyn Schema>>,
}

/// An ordered sequence of passes behind one parser.
pub struct Driver {
    name: String,
    parse: Box<ParseFn>,
    parse_schema: Option<Box<dyn Schema>>,
    stages: Vec<Stage>,
}

impl Driver {
    pub fn new<F>(name: impl Into<String>, parse: F) -> Driver
    where
        F: Fn(&SourceRef) -> Result<Node, String> + 'static,
    {
        Driver {
            name: name.into(),
            parse: Box::new(parse),
            parse_schema: None,
            stages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema the freshly parsed tree must satisfy.
    pub fn parse_schema(mut self, schema: impl Schema + 'static) -> Driver {
        self.parse_schema = Some(Box::new(schema));
        self
    }

    /// Append a stage, optionally guarded by a schema.
    pub fn stage(
        mut self,
        name: impl Into<String>,
        pass: Pass,
        schema: Option<Box<dyn Schema>>,
    ) -> Driver {
        self.stages.push(Stage {
            name: name.into(),
            pass,
            schema,
        });
        self
    }

    /// Run the whole pipeline over `source`.
    pub fn run(&self, source: &SourceRef) -> Result<DriverOutput, DriverError> {
        self.run_stages(source, self.stages.len())
    }

    /// Run the pipeline up to and including the stage named `limit`.
    pub fn run_until(&self, source: &SourceRef, limit: &str) -> Result<DriverOutput, DriverError> {
        let index = self
            .stages
            .iter()
            .position(|stage| stage.name == limit)
            .ok_or_else(|| DriverError::UnknownStage(limit.to_string()))?;
        self.run_stages(source, index + 1)
    }

    fn run_stages(&self, source: &SourceRef, count: usize) -> Result<DriverOutput, DriverError> {
        let root = (self.parse)(source).map_err(DriverError::Parse)?;
        self.validate("parse", &self.parse_schema, &root)?;

        let mut errors = Vec::new();
        let mut metrics = Vec::new();
        for stage in self.stages.iter().take(count) {
            let report = stage.pass.run(&root).map_err(|source| DriverError::Pass {
                stage: stage.name.clone(),
                source,
            })?;
            tracing::debug!(
                driver = %self.name,
                stage = %stage.name,
                iterations = report.iterations,
                changes = report.changes,
                "stage finished"
            );
            metrics.push(PassMetrics {
                name: stage.name.clone(),
                iterations: report.iterations,
                changes: report.changes,
            });
            self.validate(&stage.name, &stage.schema, &root)?;
            errors.extend(root.get_errors());
            if !errors.is_empty() {
                break;
            }
        }
        Ok(DriverOutput {
            root,
            errors,
            metrics,
        })
    }

    fn validate(
        &self,
        stage: &str,
        schema: &Option<Box<dyn Schema>>,
        root: &Node,
    ) -> Result<(), DriverError> {
        if let Some(schema) = schema {
            let violations = schema.check(root);
            if !violations.is_empty() {
                return Err(DriverError::Malformed {
                    stage: stage.to_string(),
                    violations,
                });
            }
        }
        Ok(())
    }
}
