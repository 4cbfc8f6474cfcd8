//! Engine: plan, collide, inject, assemble, write, verify.

use std::path::Path;
use std::sync::Arc;

use crate::assemble::{write_pair, ArtifactPair};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::inject::Injector;
use crate::oracle::{HashClash, OracleAdapter};
use crate::verify::{verify, VerificationReport};

/// Drives one injector through a full collision run.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Adapter around the configured HashClash checkout.
    pub fn hashclash(&self) -> OracleAdapter {
        let oracle = HashClash::from_config(&self.config.oracle);
        OracleAdapter::new(Arc::new(oracle), self.config.oracle.timeout)
    }

    /// Build both artifacts in memory.
    ///
    /// Any stage failing aborts the run; nothing is retried.
    pub fn produce(&self, injector: &dyn Injector, oracle: &OracleAdapter) -> Result<ArtifactPair> {
        let format = injector.format();
        let plan = injector.plan()?;
        log::info!(
            "{}: {} collision after a {} byte prefix",
            format,
            plan.kind,
            plan.prefix_a.len().max(plan.prefix_b.len())
        );

        let pair = oracle.generate(&plan.request(&self.config.oracle))?;
        let injected = injector.inject(&plan, &pair)?;
        let artifacts = injected.assemble();
        log::info!(
            "{}: assembled {} and {} byte files",
            format,
            artifacts.a.len(),
            artifacts.b.len()
        );
        Ok(artifacts)
    }

    /// Produce, write and verify a pair of artifacts.
    ///
    /// A pair that fails verification still comes back as a report; only
    /// stage failures are errors.
    pub fn run(
        &self,
        injector: &dyn Injector,
        oracle: &OracleAdapter,
        path_a: &Path,
        path_b: &Path,
    ) -> Result<VerificationReport> {
        let artifacts = self.produce(injector, oracle)?;
        write_pair(&artifacts, path_a, path_b, self.config.overwrite)?;
        log::info!("Wrote {} and {}", path_a.display(), path_b.display());
        Ok(verify(&artifacts, injector.format()))
    }
}
