/// Token issuing and time source
///
/// Every confirmation, reset and session token comes from here. The random
/// generator and the clock are injected so tests can replay a seeded stream
/// and move time forward without sleeping.
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, rngs::OsRng, CryptoRng, Rng, RngCore};
use std::sync::{Arc, Mutex};

/// Default length of issued tokens
pub const DEFAULT_TOKEN_LENGTH: usize = 50;

/// Bytes of entropy in an OAuth state value
const STATE_BYTES: usize = 16;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Issues random tokens and expiry timestamps
pub struct TokenIssuer {
    rng: Mutex<Box<dyn RngCore + Send>>,
    clock: Arc<dyn Clock>,
    token_length: usize,
}

impl TokenIssuer {
    /// Create an issuer over a cryptographically secure generator
    pub fn new<R>(rng: R, clock: Arc<dyn Clock>) -> Self
    where
        R: RngCore + CryptoRng + Send + 'static,
    {
        Self {
            rng: Mutex::new(Box::new(rng)),
            clock,
            token_length: DEFAULT_TOKEN_LENGTH,
        }
    }

    /// Production issuer backed by the operating system generator
    pub fn from_os_rng(clock: Arc<dyn Clock>) -> Self {
        Self::new(OsRng, clock)
    }

    /// Override the token length (callers validate the minimum)
    pub fn with_token_length(mut self, token_length: usize) -> Self {
        self.token_length = token_length;
        self
    }

    /// Issue a fresh URL-safe token
    pub fn issue(&self) -> String {
        self.alphanumeric(self.token_length)
    }

    /// Random alphanumeric suffix for handles and slugs
    pub fn suffix(&self, len: usize) -> String {
        self.alphanumeric(len)
    }

    /// Random anti-forgery value for the OAuth round trip
    pub fn issue_state(&self) -> String {
        let mut bytes = [0u8; STATE_BYTES];
        self.with_rng(|rng| rng.fill_bytes(&mut bytes));
        URL_SAFE.encode(bytes)
    }

    /// Current time plus the given window
    pub fn expiry_from_now(&self, window: Duration) -> DateTime<Utc> {
        self.clock.now() + window
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn alphanumeric(&self, len: usize) -> String {
        self.with_rng(|rng| {
            (0..len)
                .map(|_| rng.sample(Alphanumeric) as char)
                .collect()
        })
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        // A poisoned lock only means another caller panicked mid-draw;
        // the generator itself is still usable.
        let mut guard = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(guard.as_mut())
    }
}

/// Manually driven clock for tests
#[cfg(test)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        // Whole seconds so values survive the TEXT timestamp round trip
        let start = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn seeded(seed: u64) -> TokenIssuer {
        TokenIssuer::new(StdRng::seed_from_u64(seed), Arc::new(SystemClock))
    }

    #[test]
    fn test_issue_is_fixed_length_and_url_safe() {
        let issuer = seeded(7);
        let token = issuer.issue();
        assert_eq!(token.len(), DEFAULT_TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_seeded_generator_is_reproducible() {
        assert_eq!(seeded(42).issue(), seeded(42).issue());
        assert_ne!(seeded(42).issue(), seeded(43).issue());
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let issuer = TokenIssuer::from_os_rng(Arc::new(SystemClock));
        let tokens: HashSet<String> = (0..1000).map(|_| issuer.issue()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_state_is_base64url_of_sixteen_bytes() {
        let state = seeded(1).issue_state();
        let decoded = URL_SAFE.decode(&state).unwrap();
        assert_eq!(decoded.len(), STATE_BYTES);
        assert!(!state.contains('+') && !state.contains('/'));
    }

    #[test]
    fn test_expiry_uses_injected_clock() {
        let clock = Arc::new(ManualClock::new());
        let issuer = TokenIssuer::new(StdRng::seed_from_u64(3), clock.clone());
        let start = clock.now();

        assert_eq!(issuer.expiry_from_now(Duration::hours(6)), start + Duration::hours(6));

        clock.advance(Duration::minutes(30));
        assert_eq!(
            issuer.expiry_from_now(Duration::hours(6)),
            start + Duration::minutes(390)
        );
    }

    #[test]
    fn test_custom_length() {
        let issuer = seeded(9).with_token_length(64);
        assert_eq!(issuer.issue().len(), 64);
        assert_eq!(issuer.suffix(6).len(), 6);
    }
}
