use std::time::{Duration, Instant};

/// Where an entry is in its asynchronous population lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// Nothing known yet, or the data expired.
    NotAsked,
    /// A query is outstanding.
    InProgress,
    /// Data is available.
    Ready,
    /// The last fetch failed; retried once the entry expires.
    Unreachable,
}

impl FetchState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, FetchState::Ready | FetchState::Unreachable)
    }
}

/// Lazy expiry shared by the nameserver and zone entries.
///
/// Implemented by the lock-protected part of an entry; callers must hold
/// that lock while calling any of these.
pub trait Fetchable {
    fn fetch_state(&self) -> FetchState;

    fn set_fetch_state(&mut self, state: FetchState);

    /// Summary expiration of the cached data, if any was ever stored.
    fn expiration(&self) -> Option<Instant>;

    /// Returns the state as seen at `now`, reverting an expired terminal
    /// state to [`FetchState::NotAsked`] first.
    fn current_state(&mut self, now: Instant) -> FetchState {
        let state = self.fetch_state();
        if state.is_terminal() && self.expiration().is_some_and(|expires| now > expires) {
            self.set_fetch_state(FetchState::NotAsked);
            return FetchState::NotAsked;
        }
        state
    }
}

/// How long fetched data and fetch failures stay cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// How long a failed fetch is remembered before it is retried.
    pub unreachable_ttl: Duration,
    /// Upper bound applied to record TTLs.
    pub max_ttl: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            unreachable_ttl: Duration::from_secs(60),
            max_ttl: Duration::from_secs(86_400),
        }
    }
}

impl TtlPolicy {
    /// `now + ttl` with the TTL clamped to `max_ttl`.
    #[inline]
    pub fn expires_at(&self, now: Instant, ttl_secs: u32) -> Instant {
        now + Duration::from_secs(u64::from(ttl_secs)).min(self.max_ttl)
    }

    #[inline]
    pub fn unreachable_until(&self, now: Instant) -> Instant {
        now + self.unreachable_ttl
    }
}
