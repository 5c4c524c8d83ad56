//! Symmetric text patches applied around the tree-rewrite step.
//!
//! Each patch sees the document before parsing (`before`, in declared order)
//! and after serialization (`after`, in reverse order, stack discipline), and
//! releases per-run state in `cleanup`, which runs even when a stage fails.

mod script_guard;
mod vault;

pub use crate::script_guard::ScriptGuardPatch;
pub use crate::vault::PlaceholderVault;

use std::error::Error;
use std::fmt;

#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// `type` attribute value marking scripts the user wants deferred.
    pub deferjs_type_attribute: String,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            deferjs_type_attribute: "deferjs".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct PatchError {
    pub message: String,
}

impl PatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for PatchError {}

pub trait Patch {
    fn name(&self) -> &'static str;
    fn before(&mut self, html: String, options: &PatchOptions) -> Result<String, PatchError>;
    fn after(&mut self, html: String, options: &PatchOptions) -> Result<String, PatchError>;
    fn cleanup(&mut self);
}

#[derive(Debug)]
pub enum PipelineError {
    /// A patch stage failed; names the first failing patch and stage.
    Patch {
        patch: &'static str,
        stage: &'static str,
        message: String,
    },
    Rewrite {
        message: String,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Patch {
                patch,
                stage,
                message,
            } => write!(f, "patch {patch} failed in {stage}: {message}"),
            PipelineError::Rewrite { message } => write!(f, "rewrite step failed: {message}"),
        }
    }
}

impl Error for PipelineError {}

/// Ordered list of patches applied symmetrically around a rewrite step.
#[derive(Default)]
pub struct PatchPipeline {
    patches: Vec<Box<dyn Patch>>,
}

impl PatchPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, patch: Box<dyn Patch>) {
        self.patches.push(patch);
    }

    /// `before` in declared order, `rewrite`, `after` in reverse order.
    /// `cleanup` runs for every patch regardless of failures; the first
    /// error is surfaced and no partial recovery is attempted.
    pub fn run<F>(
        &mut self,
        html: String,
        options: &PatchOptions,
        rewrite: F,
    ) -> Result<String, PipelineError>
    where
        F: FnOnce(String) -> Result<String, String>,
    {
        let result = self.run_stages(html, options, rewrite);
        for patch in &mut self.patches {
            patch.cleanup();
        }
        result
    }

    fn run_stages<F>(
        &mut self,
        mut html: String,
        options: &PatchOptions,
        rewrite: F,
    ) -> Result<String, PipelineError>
    where
        F: FnOnce(String) -> Result<String, String>,
    {
        for patch in self.patches.iter_mut() {
            html = patch
                .before(html, options)
                .map_err(|e| PipelineError::Patch {
                    patch: patch.name(),
                    stage: "before",
                    message: e.message,
                })?;
        }

        html = rewrite(html).map_err(|message| PipelineError::Rewrite { message })?;

        for patch in self.patches.iter_mut().rev() {
            html = patch
                .after(html, options)
                .map_err(|e| PipelineError::Patch {
                    patch: patch.name(),
                    stage: "after",
                    message: e.message,
                })?;
        }

        Ok(html)
    }
}
