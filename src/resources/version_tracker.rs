/// Monotonic change counter.
///
/// Consumers remember the last version they synchronised against and compare;
/// a mismatch means the tracked data changed in between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    version: u64,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self { version: 0 }
    }

    pub fn changed(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// `true` if the tracker moved past `seen`. `None` means never synced.
    #[inline]
    #[must_use]
    pub fn is_newer_than(&self, seen: Option<u64>) -> bool {
        seen != Some(self.version)
    }
}

/// Mutable access that bumps a [`ChangeTracker`] when the borrow ends.
pub struct MutGuard<'a, T> {
    data: &'a mut T,
    tracker: &'a mut ChangeTracker,
}

impl<'a, T> MutGuard<'a, T> {
    pub fn new(data: &'a mut T, tracker: &'a mut ChangeTracker) -> Self {
        Self { data, tracker }
    }
}

impl<T> std::ops::Deref for MutGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<T> std::ops::DerefMut for MutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

impl<T> Drop for MutGuard<'_, T> {
    fn drop(&mut self) {
        self.tracker.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_bumps_on_drop() {
        let mut value = 1.0_f32;
        let mut tracker = ChangeTracker::new();
        {
            let mut guard = MutGuard::new(&mut value, &mut tracker);
            *guard = 2.0;
        }
        assert_eq!(value, 2.0);
        assert_eq!(tracker.version(), 1);
        assert!(tracker.is_newer_than(None));
        assert!(tracker.is_newer_than(Some(0)));
        assert!(!tracker.is_newer_than(Some(1)));
    }
}
