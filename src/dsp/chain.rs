//! Filter chain
//!
//! Filters are applied in chain order (index 0 first), in place, before the
//! collection reaches the wrapped consumer. Each filter sees the engine's
//! pool and may resize the collection through it.

use crate::engine::{SampleCollection, SampleConsumer, SamplePool};
use crate::error::Result;
use crate::extensions::SampleFilter;

/// A consumer preceded by zero or more filters
pub struct FilterChain<'a, C: ?Sized> {
    pool: &'a SamplePool,
    filters: &'a mut [Box<dyn SampleFilter>],
    inner: &'a mut C,
}

impl<'a, C> FilterChain<'a, C>
where
    C: SampleConsumer + ?Sized,
{
    pub fn new(
        pool: &'a SamplePool,
        filters: &'a mut [Box<dyn SampleFilter>],
        inner: &'a mut C,
    ) -> Self {
        Self {
            pool,
            filters,
            inner,
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    fn apply(&mut self, samples: &mut SampleCollection) -> Result<()> {
        for filter in self.filters.iter_mut() {
            filter.process(samples, self.pool)?;
        }
        Ok(())
    }
}

impl<C> SampleConsumer for FilterChain<'_, C>
where
    C: SampleConsumer + ?Sized,
{
    fn manually_frees_samples(&self) -> bool {
        self.inner.manually_frees_samples()
    }

    fn submit(&mut self, samples: &mut SampleCollection) -> Result<()> {
        self.apply(samples)?;
        self.inner.submit(samples)
    }

    fn submit_owned(&mut self, samples: SampleCollection) -> Result<()> {
        let mut samples = samples;
        self.apply(&mut samples)?;
        self.inner.submit_owned(samples)
    }
}
