use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// A flag shared between the caller and a running match.
///
/// Clones observe the same flag; cancelling any of them cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// When a match has to give up: an optional point in time and a [`CancelToken`].
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires: Option<Instant>,
    token: CancelToken,
}

impl Deadline {
    /// Never expires unless cancelled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn at(instant: Instant) -> Self {
        Self {
            expires: Some(instant),
            token: CancelToken::new(),
        }
    }

    pub fn after(duration: Duration) -> Self {
        Self::at(Instant::now() + duration)
    }

    /// Replaces the cancel token, typically with one the caller keeps a clone of.
    pub fn with_token(self, token: CancelToken) -> Self {
        Self { token, ..self }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn expires(&self) -> Option<Instant> {
        self.expires
    }

    /// Time left before expiry, `None` if there is no expiry.
    ///
    /// Providers use this to bound blocking requests.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || self.expires.map_or(false, |e| Instant::now() >= e)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let deadline = Deadline::none().with_token(token.clone());
        assert!(!deadline.is_expired());
        token.cancel();
        assert!(deadline.is_expired());
        assert!(deadline.clone().token().is_cancelled());
    }

    #[test]
    fn expiry() {
        assert!(!Deadline::none().is_expired());
        assert_eq!(Deadline::none().remaining(), None);
        assert!(!Deadline::after(Duration::from_secs(3600)).is_expired());
        let past = Deadline::at(Instant::now());
        assert!(past.is_expired());
        assert_eq!(past.remaining(), Some(Duration::ZERO));
    }
}
