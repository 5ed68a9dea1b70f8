//! Trial lifecycle: setup → dispatch → measure → validate → report.
//!
//! A [`DlrmTrial`] carries one [`ProblemConfig`] through the pipeline and
//! accumulates a [`TrialState`]. When the compatibility gate rejects the
//! configuration every later stage is a no-op and the trial reports
//! `SKIPPED`. Accelerator failures abort the trial with `Err`; validation
//! mismatches do not.

use crate::config::{HarnessConfig, ProblemConfig, ProblemParams};
use crate::device::{Accelerator, DeviceCapabilities};
use crate::dispatch::DispatchPlan;
use crate::error::Result;
use crate::gate::{self, GateReport};
use crate::metrics::{self, Metrics};
use crate::registry::{KernelRegistry, KernelSet, DEFAULT_REGISTRY};
use crate::report::{ReportSession, TrialOutcome, TrialRecord, ValidationFields};
use crate::storage::DlrmStorage;
use crate::types::Direction;
use crate::validation::{self, ValidationOutcome};
use std::io::Write;
use tracing::{debug, info, warn};

/// Mutable per-trial results.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialState {
    /// Gate verdict, set during setup.
    pub gate: Option<GateReport>,
    /// Whether the trial executes kernels at all.
    pub run_flag: bool,
    pub repeats: u32,
    /// Timed window and the figures derived from it.
    pub metrics: Metrics,
    pub validation: Option<ValidationOutcome>,
}

impl TrialState {
    fn new(repeats: u32) -> Self {
        Self {
            gate: None,
            run_flag: false,
            repeats,
            metrics: Metrics::default(),
            validation: None,
        }
    }
}

/// One configuration carried through the trial pipeline.
pub struct DlrmTrial<'r> {
    config: ProblemConfig,
    harness: HarnessConfig,
    kernels: &'r KernelSet,
    state: TrialState,
}

impl DlrmTrial<'static> {
    /// Trial against the default kernel registry.
    pub fn new(params: &ProblemParams, harness: &HarnessConfig) -> Result<Self> {
        Self::with_registry(params, harness, &DEFAULT_REGISTRY)
    }
}

impl<'r> DlrmTrial<'r> {
    /// Resolve the configuration and its kernel set. A missing registry
    /// entry fails here, before any device work.
    pub fn with_registry(
        params: &ProblemParams,
        harness: &HarnessConfig,
        registry: &'r KernelRegistry,
    ) -> Result<Self> {
        let config = ProblemConfig::new(params)?;
        let kernels = registry.lookup(config.tile_size(), config.data_type())?;
        Ok(Self {
            config,
            harness: harness.clone(),
            kernels,
            state: TrialState::new(harness.repeats()),
        })
    }

    pub fn config(&self) -> &ProblemConfig {
        &self.config
    }

    pub fn state(&self) -> &TrialState {
        &self.state
    }

    /// Return the state to its sentinels so the trial can run again.
    pub fn reset(&mut self) {
        self.state = TrialState::new(self.harness.repeats());
    }

    /// Evaluate the gate and, if it passes, provision and seed buffers.
    pub fn setup<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
        storage: &mut DlrmStorage,
    ) -> Result<()> {
        let report = gate::evaluate(&self.config, &*device);
        self.state.gate = Some(report);
        self.state.run_flag = report.passed();

        if !self.state.run_flag {
            warn!(
                failed = ?report.failures(),
                arch = %device.architecture(),
                data_type = %self.config.data_type(),
                tile_size = self.config.tile_size(),
                m = self.config.m(),
                k = self.config.k(),
                "configuration skipped"
            );
            return Ok(());
        }

        let seed = self.harness.seed;
        match self.config.direction() {
            Direction::Forward => {
                storage.resize_forward(device, &self.config)?;
                storage.fill_forward(device, &self.config, seed)?;
                if self.harness.validate {
                    storage.copy_device_to_host_fwd_input(device)?;
                }
            }
            Direction::Backward => {
                storage.resize_backward(device, &self.config)?;
                storage.fill_backward(device, &self.config, seed)?;
                if self.harness.validate {
                    storage.copy_device_to_host_bwd_input(device)?;
                }
            }
        }
        debug!(validate = self.harness.validate, seed, "trial storage ready");
        Ok(())
    }

    /// Run the timed launch sequence.
    pub fn dispatch<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
        storage: &DlrmStorage,
    ) -> Result<()> {
        if !self.state.run_flag {
            return Ok(());
        }
        let plan = DispatchPlan::build(&self.config, self.kernels, storage, device.warp_size())?;
        self.state.metrics.elapsed_ms = plan.run_timed(device, self.state.repeats)?;
        debug!(
            elapsed_ms = self.state.metrics.elapsed_ms,
            repeats = self.state.repeats,
            launches = plan.launches_per_repeat() * self.state.repeats as usize,
            "dispatch complete"
        );
        Ok(())
    }

    /// Derive throughput and efficiency from the timed window.
    pub fn measure<D: DeviceCapabilities + ?Sized>(&mut self, device: &D) {
        if !self.state.run_flag {
            return;
        }
        self.state.metrics = metrics::measure(
            self.state.metrics.elapsed_ms,
            self.config.output_size(),
            self.config.batch(),
            self.config.k(),
            self.state.repeats,
            device.peak_gflops_per_sec(self.config.data_type()),
        );
    }

    /// Compare device outputs with the host reference when validating.
    pub fn validate<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
        storage: &mut DlrmStorage,
    ) -> Result<()> {
        if !self.state.run_flag || !self.harness.validate {
            return Ok(());
        }
        let tolerance = self.harness.tolerance;
        let outcome = match self.config.direction() {
            Direction::Forward => {
                validation::validate_forward(device, storage, &self.config, tolerance)?
            }
            Direction::Backward => {
                validation::validate_backward(device, storage, &self.config, tolerance)?
            }
        };
        self.state.validation = Some(outcome);
        Ok(())
    }

    pub fn outcome(&self) -> TrialOutcome {
        if !self.state.run_flag {
            TrialOutcome::Skipped
        } else if !self.harness.validate {
            TrialOutcome::Bench
        } else if self.state.validation.as_ref().is_some_and(|v| v.passed) {
            TrialOutcome::Passed
        } else {
            TrialOutcome::Failed
        }
    }

    /// Snapshot of the state as a report row.
    pub fn record(&self) -> TrialRecord {
        let ran = self.state.run_flag;
        TrialRecord {
            tile_size: self.config.tile_size(),
            data_type: self.config.data_type(),
            direction: self.config.direction(),
            m: self.config.m(),
            k: self.config.k(),
            batch: self.config.batch(),
            outcome: self.outcome(),
            metrics: ran.then_some(self.state.metrics),
            validation: self
                .state
                .validation
                .as_ref()
                .filter(|_| ran && self.harness.validate)
                .map(|v| ValidationFields {
                    max_relative_error: v.max_relative_error,
                    tolerance: self.harness.tolerance,
                }),
        }
    }

    pub fn report<W: Write>(&self, session: &mut ReportSession<W>) -> Result<TrialRecord> {
        let record = self.record();
        session.report(&record)?;
        Ok(record)
    }

    /// Full pipeline.
    pub fn run<A, W>(
        &mut self,
        device: &mut A,
        storage: &mut DlrmStorage,
        session: &mut ReportSession<W>,
    ) -> Result<TrialRecord>
    where
        A: Accelerator + ?Sized,
        W: Write,
    {
        info!(
            direction = %self.config.direction(),
            data_type = %self.config.data_type(),
            tile_size = self.config.tile_size(),
            m = self.config.m(),
            k = self.config.k(),
            b = self.config.batch(),
            "trial start"
        );
        self.setup(device, storage)?;
        self.dispatch(device, storage)?;
        self.measure(&*device);
        self.validate(device, storage)?;
        let record = self.report(session)?;
        info!(outcome = record.outcome.token(), "trial finished");
        Ok(record)
    }
}

/// Build and run a single trial against the default registry.
pub fn run_trial<A, W>(
    device: &mut A,
    storage: &mut DlrmStorage,
    session: &mut ReportSession<W>,
    params: &ProblemParams,
    harness: &HarnessConfig,
) -> Result<TrialRecord>
where
    A: Accelerator + ?Sized,
    W: Write,
{
    DlrmTrial::new(params, harness)?.run(device, storage, session)
}
