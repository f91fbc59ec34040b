use std::time::{
    Duration,
    Instant,
};

/// Point in time after which a job's result is no longer wanted. Blocking
/// jobs cannot be aborted from outside, so they check it themselves before
/// any side effect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(limit: Duration) -> Self {
        Self(Some(Instant::now() + limit))
    }

    pub fn from_limit(limit: Option<Duration>) -> Self {
        limit.map_or_else(Self::none, Self::after)
    }

    pub fn is_bounded(&self) -> bool {
        self.0.is_some()
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_expires() {
        assert!(!Deadline::none().expired());
        assert!(!Deadline::from_limit(None).is_bounded());
    }

    #[test]
    fn bounded_expires_after_limit() {
        let deadline = Deadline::after(Duration::from_millis(5));
        assert!(deadline.is_bounded());
        std::thread::sleep(Duration::from_millis(10));
        assert!(deadline.expired());
    }
}
