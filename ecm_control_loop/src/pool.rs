//! Fixed-size device pools.
//!
//! One contiguous container per device kind, sized once at construction.
//! Every index access is bounds-checked and reports `NoSuchDevice`
//! instead of panicking.

use thiserror::Error;

/// Error types for pool access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("no such device: index {index}, pool size {len}")]
    NoSuchDevice { index: usize, len: usize },
}

/// Owned, fixed-size collection of devices of one kind.
#[derive(Debug)]
pub struct DevicePool<D> {
    devices: Box<[D]>,
}

impl<D> DevicePool<D> {
    /// Build a pool of exactly `count` devices, `make(i)` creating device `i`.
    pub fn from_fn(count: usize, make: impl FnMut(usize) -> D) -> Self {
        Self {
            devices: (0..count).map(make).collect(),
        }
    }

    /// Fallible variant of [`from_fn`](Self::from_fn); stops at the first error.
    pub fn try_from_fn<E>(
        count: usize,
        make: impl FnMut(usize) -> Result<D, E>,
    ) -> Result<Self, E> {
        Ok(Self {
            devices: (0..count).map(make).collect::<Result<_, E>>()?,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device at `index`.
    #[inline]
    pub fn at(&self, index: usize) -> Result<&D, PoolError> {
        let len = self.devices.len();
        self.devices
            .get(index)
            .ok_or(PoolError::NoSuchDevice { index, len })
    }

    /// Mutable device at `index`.
    #[inline]
    pub fn at_mut(&mut self, index: usize) -> Result<&mut D, PoolError> {
        let len = self.devices.len();
        self.devices
            .get_mut(index)
            .ok_or(PoolError::NoSuchDevice { index, len })
    }

    /// Devices in pool order.
    pub fn iter(&self) -> core::slice::Iter<'_, D> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, D> {
        self.devices.iter_mut()
    }

    /// Visit every device in pool order, stopping at the first failure.
    ///
    /// Returns the failing index with its error; devices after it are
    /// not visited.
    pub fn try_for_each<E>(
        &mut self,
        mut f: impl FnMut(usize, &mut D) -> Result<(), E>,
    ) -> Result<(), (usize, E)> {
        for (i, device) in self.devices.iter_mut().enumerate() {
            f(i, device).map_err(|e| (i, e))?;
        }
        Ok(())
    }
}

impl<'a, D> IntoIterator for &'a DevicePool<D> {
    type Item = &'a D;
    type IntoIter = core::slice::Iter<'a, D>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, D> IntoIterator for &'a mut DevicePool<D> {
    type Item = &'a mut D;
    type IntoIter = core::slice::IterMut<'a, D>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
