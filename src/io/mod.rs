//! Traits for index-addressable sequences of spectra and the caching
//! wrapper the demultiplexer puts in front of them.
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use thiserror::Error;

use crate::spectrum::Spectrum;

/// A lightweight record identifying a spectrum without loading its signal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpectrumIdentity {
    /// The position of the spectrum in its list
    pub index: usize,
    /// The native ID string of the spectrum
    pub id: String,
}

impl SpectrumIdentity {
    pub fn new(index: usize, id: String) -> Self {
        Self { index, id }
    }
}

/// Errors that may occur when reading a spectrum from a [`SpectrumSource`]
#[derive(Debug, Error)]
pub enum SpectrumAccessError {
    /// The requested index is past the end of the list
    #[error("The requested spectrum index {0} was not found")]
    SpectrumIndexNotFound(usize),
    /// An I/O error prevented reading the spectrum, even if it could be found
    #[error("I/O error occurred while reading: {0}")]
    IOError(
        #[from]
        #[source]
        std::io::Error,
    ),
    /// The underlying source failed for a reason of its own
    #[error("Failed to read spectrum: {0}")]
    SourceFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A read-only, index-addressable sequence of mass spectra.
///
/// Spectra are handed out as [`Arc`]s so that caching layers and consumers
/// that revisit the same spectrum repeatedly can share one copy.
pub trait SpectrumSource {
    /// The number of spectra in the sequence
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The identity of the spectrum at `index`, without loading signal data
    fn spectrum_identity(&self, index: usize) -> Option<SpectrumIdentity>;

    /// Retrieve the spectrum at `index`, with metadata and signal arrays
    fn spectrum(&self, index: usize) -> Result<Arc<Spectrum>, SpectrumAccessError>;
}

impl<T: SpectrumSource + ?Sized> SpectrumSource for Arc<T> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn spectrum_identity(&self, index: usize) -> Option<SpectrumIdentity> {
        (**self).spectrum_identity(index)
    }

    fn spectrum(&self, index: usize) -> Result<Arc<Spectrum>, SpectrumAccessError> {
        (**self).spectrum(index)
    }
}

/// An in-memory [`SpectrumSource`] over a list of already-built spectra
#[derive(Debug, Default, Clone)]
pub struct MemorySpectrumList {
    spectra: Vec<Arc<Spectrum>>,
}

impl MemorySpectrumList {
    pub fn new(spectra: Vec<Spectrum>) -> Self {
        let spectra = spectra
            .into_iter()
            .enumerate()
            .map(|(i, mut s)| {
                s.description.index = i;
                Arc::new(s)
            })
            .collect();
        Self { spectra }
    }

    pub fn push(&mut self, mut spectrum: Spectrum) {
        spectrum.description.index = self.spectra.len();
        self.spectra.push(Arc::new(spectrum));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Spectrum>> {
        self.spectra.iter()
    }
}

impl SpectrumSource for MemorySpectrumList {
    fn len(&self) -> usize {
        self.spectra.len()
    }

    fn spectrum_identity(&self, index: usize) -> Option<SpectrumIdentity> {
        self.spectra
            .get(index)
            .map(|s| SpectrumIdentity::new(index, s.id().to_string()))
    }

    fn spectrum(&self, index: usize) -> Result<Arc<Spectrum>, SpectrumAccessError> {
        self.spectra
            .get(index)
            .cloned()
            .ok_or(SpectrumAccessError::SpectrumIndexNotFound(index))
    }
}

/// A bounded most-recently-used cache over another [`SpectrumSource`].
///
/// Demultiplexing consults each multiplexed spectrum many times, once per
/// derived output spectrum and once per neighborhood it participates in, so
/// the wrapped source is shielded by an [`IndexMap`] in insertion order:
/// hits are moved to the back, evictions pop the front.
pub struct CachingSpectrumList<S: SpectrumSource> {
    inner: S,
    cache: Mutex<IndexMap<usize, Arc<Spectrum>>>,
    capacity: usize,
}

impl<S: SpectrumSource> CachingSpectrumList<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(IndexMap::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
        }
    }

    /// The wrapped source
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn poisoned() -> SpectrumAccessError {
        SpectrumAccessError::SourceFailure("spectrum cache lock poisoned".into())
    }
}

impl<S: SpectrumSource> SpectrumSource for CachingSpectrumList<S> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn spectrum_identity(&self, index: usize) -> Option<SpectrumIdentity> {
        self.inner.spectrum_identity(index)
    }

    fn spectrum(&self, index: usize) -> Result<Arc<Spectrum>, SpectrumAccessError> {
        let mut cache = self.cache.lock().map_err(|_| Self::poisoned())?;
        if let Some(hit) = cache.shift_remove(&index) {
            cache.insert(index, hit.clone());
            return Ok(hit);
        }
        drop(cache);

        let spectrum = self.inner.spectrum(index)?;
        let mut cache = self.cache.lock().map_err(|_| Self::poisoned())?;
        while cache.len() >= self.capacity {
            cache.shift_remove_index(0);
        }
        cache.insert(index, spectrum.clone());
        Ok(spectrum)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::SpectrumDescription;

    fn make_list(n: usize) -> MemorySpectrumList {
        let mut list = MemorySpectrumList::default();
        for i in 0..n {
            let spectrum = Spectrum::new(
                SpectrumDescription {
                    id: format!("scan={}", i + 1),
                    ms_level: 1,
                    ..Default::default()
                },
                vec![100.0, 200.0],
                vec![1.0, 2.0],
            );
            list.push(spectrum);
        }
        list
    }

    #[test]
    fn test_memory_list() {
        let list = make_list(3);
        assert_eq!(list.len(), 3);
        let identity = list.spectrum_identity(2).unwrap();
        assert_eq!(identity.id, "scan=3");
        assert_eq!(identity.index, 2);
        assert_eq!(list.spectrum(1).unwrap().index(), 1);
        assert!(matches!(
            list.spectrum(3),
            Err(SpectrumAccessError::SpectrumIndexNotFound(3))
        ));
    }

    #[test]
    fn test_cache_eviction() {
        let cached = CachingSpectrumList::new(make_list(5), 2);
        for i in 0..5 {
            cached.spectrum(i).unwrap();
        }
        // only the two most recent entries stay resident
        let guard = cached.cache.lock().unwrap();
        let resident: Vec<usize> = guard.keys().copied().collect();
        assert_eq!(resident, vec![3, 4]);
        drop(guard);

        // a hit refreshes recency
        cached.spectrum(3).unwrap();
        cached.spectrum(0).unwrap();
        let guard = cached.cache.lock().unwrap();
        let resident: Vec<usize> = guard.keys().copied().collect();
        assert_eq!(resident, vec![3, 0]);
    }
}
