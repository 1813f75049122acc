//! Construction-time snapshot plus a replaceable current value

/// Keeps the initial value apart from the current one
///
/// The initial value is never handed out mutably, so `reset` always restores
/// exactly what was passed to `new`.
#[derive(Debug, Clone)]
pub struct Resettable<T> {
    initial: T,
    current: T,
}

impl<T: Clone> Resettable<T> {
    /// Start from `initial`
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            current: initial.clone(),
            initial,
        }
    }

    /// Current value
    #[must_use]
    pub fn current(&self) -> &T {
        &self.current
    }

    /// Value given at construction
    #[must_use]
    pub fn initial(&self) -> &T {
        &self.initial
    }

    /// Replace the current value with one derived from it
    pub fn modify(&mut self, f: impl FnOnce(&T) -> T) {
        self.current = f(&self.current);
    }

    /// Restore a copy of the construction-time value
    pub fn reset(&mut self) {
        self.current = self.initial.clone();
    }
}
