//! Seams the host plugs into the pipeline.

use crate::events::Event;

/// The sink that finally mutates application state.
///
/// Called synchronously on the pipeline task and never awaited. An `Err`
/// is contained like any other pipeline failure.
pub trait StoreApply: Send + 'static {
    fn apply(&mut self, event: Event) -> anyhow::Result<()>;
}

impl<F> StoreApply for F
where
    F: FnMut(Event) -> anyhow::Result<()> + Send + 'static,
{
    fn apply(&mut self, event: Event) -> anyhow::Result<()> {
        self(event)
    }
}

/// Source of uniform samples in `0.0..1.0` deciding when caches are swept.
pub trait SweepSampler: Send + 'static {
    fn sample(&mut self) -> f64;
}

impl<F> SweepSampler for F
where
    F: FnMut() -> f64 + Send + 'static,
{
    fn sample(&mut self) -> f64 {
        self()
    }
}

/// Default sampler backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSampler;

impl SweepSampler for RandomSampler {
    fn sample(&mut self) -> f64 {
        rand::random::<f64>()
    }
}
