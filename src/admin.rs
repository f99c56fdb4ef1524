use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AdminSettings;
use crate::error::{Error, Result};
use crate::session::FlagStore;

pub const AUTHENTICATED_FLAG: &str = "admin-authenticated";
pub const AUTH_TIMESTAMP_FLAG: &str = "admin-auth-timestamp";
pub const FAILED_ATTEMPTS_FLAG: &str = "admin-failed-attempts";
pub const LOCKED_UNTIL_FLAG: &str = "admin-locked-until";

/// Opaque credential check used by the gate.
pub trait CredentialCheck: Send + Sync {
    fn check_credentials(&self, username: Option<&str>, password: &str) -> bool;
}

/// Password (and optional username) from configuration.
#[derive(Clone)]
pub struct AdminCredentials {
    username: Option<String>,
    password: Option<String>,
}

impl AdminCredentials {
    pub fn new(username: Option<String>, password: impl Into<String>) -> Self {
        Self {
            username,
            password: Some(password.into()),
        }
    }

    pub fn from_settings(settings: &AdminSettings) -> Self {
        if settings.password.is_none() {
            warn!("No admin password configured, admin login is disabled");
        }
        Self {
            username: settings.username.clone(),
            password: settings.password.clone(),
        }
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl CredentialCheck for AdminCredentials {
    fn check_credentials(&self, username: Option<&str>, password: &str) -> bool {
        let Some(expected) = &self.password else {
            return false;
        };
        if let Some(expected_user) = &self.username {
            if username != Some(expected_user.as_str()) {
                return false;
            }
        }
        constant_time_eq(expected.as_bytes(), password.as_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminState {
    LoggedOut,
    LoggedIn,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    /// Wrong credentials; `remaining` attempts before the panel locks.
    Invalid { remaining: u32 },
    /// This failure exhausted the attempts and started a lock.
    LockedOut { remaining_secs: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
    pub session_ttl: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lockout: Duration::from_secs(30),
            session_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl From<&AdminSettings> for LockoutPolicy {
    fn from(settings: &AdminSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            lockout: Duration::from_secs(settings.lockout_secs),
            session_ttl: Duration::from_secs(settings.session_ttl_secs),
        }
    }
}

#[derive(Default)]
struct GateState {
    attempts: u32,
    authenticated_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    episode: u64,
    unlock_timer: Option<JoinHandle<()>>,
}

/// Admin login state machine: `LoggedOut`, `LoggedIn` and `Locked`.
///
/// The attempt count and lock deadline are written to the durable flag
/// store, so a restart during a lock keeps the panel locked.
#[derive(Clone)]
pub struct AdminGate {
    state: Arc<Mutex<GateState>>,
    credentials: Arc<dyn CredentialCheck>,
    flags: Arc<dyn FlagStore>,
    policy: LockoutPolicy,
}

impl AdminGate {
    pub fn new(
        credentials: Arc<dyn CredentialCheck>,
        flags: Arc<dyn FlagStore>,
        policy: LockoutPolicy,
    ) -> Self {
        let gate = Self {
            state: Arc::new(Mutex::new(GateState::default())),
            credentials,
            flags,
            policy,
        };
        gate.restore();
        gate
    }

    pub fn from_settings(settings: &AdminSettings, flags: Arc<dyn FlagStore>) -> Self {
        Self::new(
            Arc::new(AdminCredentials::from_settings(settings)),
            flags,
            LockoutPolicy::from(settings),
        )
    }

    fn restore(&self) {
        let now = Utc::now();
        let mut state = self.state.lock();

        if self.flags.get(AUTHENTICATED_FLAG).as_deref() == Some("true") {
            let authenticated_at = self
                .flags
                .get(AUTH_TIMESTAMP_FLAG)
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(DateTime::<Utc>::from_timestamp_millis);
            match authenticated_at {
                Some(at) if !self.session_expired(at, now) => state.authenticated_at = Some(at),
                _ => {
                    debug!("Discarding expired admin session");
                    self.clear_auth_flags();
                }
            }
        }

        state.attempts = self
            .flags
            .get(FAILED_ATTEMPTS_FLAG)
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);

        let locked_until = self
            .flags
            .get(LOCKED_UNTIL_FLAG)
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc));
        match locked_until {
            Some(until) if until > now => {
                info!("Admin panel still locked until {}", until);
                state.locked_until = Some(until);
                let remaining = (until - now).to_std().unwrap_or_default();
                self.schedule_unlock(&mut state, remaining);
            }
            Some(_) => self.clear_lock(&mut state),
            None => {}
        }
    }

    fn session_expired(&self, authenticated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.policy.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        now - authenticated_at >= ttl
    }

    /// Expires a lock or session whose deadline has passed.
    fn settle(&self, state: &mut GateState) {
        let now = Utc::now();
        if state.locked_until.is_some_and(|until| until <= now) {
            self.clear_lock(state);
        }
        if let Some(at) = state.authenticated_at {
            if self.session_expired(at, now) {
                info!("Admin session expired");
                state.authenticated_at = None;
                self.clear_auth_flags();
            }
        }
    }

    pub fn state(&self) -> AdminState {
        let mut state = self.state.lock();
        self.settle(&mut state);
        if state.locked_until.is_some() {
            AdminState::Locked
        } else if state.authenticated_at.is_some() {
            AdminState::LoggedIn
        } else {
            AdminState::LoggedOut
        }
    }

    pub fn attempts(&self) -> u32 {
        let mut state = self.state.lock();
        self.settle(&mut state);
        state.attempts
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == AdminState::LoggedIn
    }

    pub fn lock_remaining(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        self.settle(&mut state);
        state
            .locked_until
            .map(|until| (until - Utc::now()).to_std().unwrap_or_default())
    }

    pub fn require_admin(&self) -> Result<()> {
        match self.state() {
            AdminState::LoggedIn => Ok(()),
            _ => Err(Error::Unauthorized("admin login required".to_string())),
        }
    }

    /// Checks credentials. While locked the attempt is refused and not counted.
    pub fn login(&self, username: Option<&str>, password: &str) -> Result<LoginOutcome> {
        let mut state = self.state.lock();
        self.settle(&mut state);

        if let Some(until) = state.locked_until {
            let remaining_secs = remaining_secs(until);
            debug!("Login refused, locked for another {}s", remaining_secs);
            return Err(Error::Locked { remaining_secs });
        }

        if self.credentials.check_credentials(username, password) {
            let now = Utc::now();
            state.authenticated_at = Some(now);
            state.attempts = 0;
            self.flags.set(AUTHENTICATED_FLAG, "true")?;
            self.flags
                .set(AUTH_TIMESTAMP_FLAG, &now.timestamp_millis().to_string())?;
            self.flags.remove(FAILED_ATTEMPTS_FLAG)?;
            info!("Admin logged in");
            return Ok(LoginOutcome::Success);
        }

        state.attempts += 1;
        warn!(
            "Invalid admin credentials ({}/{})",
            state.attempts, self.policy.max_attempts
        );

        if state.attempts >= self.policy.max_attempts {
            let until = Utc::now()
                + chrono::Duration::from_std(self.policy.lockout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));
            state.locked_until = Some(until);
            self.flags.set(FAILED_ATTEMPTS_FLAG, &state.attempts.to_string())?;
            self.flags.set(LOCKED_UNTIL_FLAG, &until.to_rfc3339())?;
            self.schedule_unlock(&mut state, self.policy.lockout);
            warn!("Too many failed attempts, admin panel locked until {}", until);
            return Ok(LoginOutcome::LockedOut {
                remaining_secs: self.policy.lockout.as_secs(),
            });
        }

        self.flags.set(FAILED_ATTEMPTS_FLAG, &state.attempts.to_string())?;
        Ok(LoginOutcome::Invalid {
            remaining: self.policy.max_attempts - state.attempts,
        })
    }

    pub fn logout(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.authenticated_at = None;
        self.flags.remove(AUTHENTICATED_FLAG)?;
        self.flags.remove(AUTH_TIMESTAMP_FLAG)?;
        info!("Admin logged out");
        Ok(())
    }

    /// Clears attempts and any lock, cancelling a pending unlock timer.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        self.clear_lock(&mut state);
    }

    fn clear_lock(&self, state: &mut GateState) {
        if let Some(timer) = state.unlock_timer.take() {
            timer.abort();
        }
        state.episode += 1;
        state.attempts = 0;
        state.locked_until = None;
        let _ = self.flags.remove(LOCKED_UNTIL_FLAG);
        let _ = self.flags.remove(FAILED_ATTEMPTS_FLAG);
    }

    fn clear_auth_flags(&self) {
        let _ = self.flags.remove(AUTHENTICATED_FLAG);
        let _ = self.flags.remove(AUTH_TIMESTAMP_FLAG);
    }

    /// Spawns the one-shot unlock for the current lock episode, if a runtime is available.
    fn schedule_unlock(&self, state: &mut GateState, after: Duration) {
        if let Some(timer) = state.unlock_timer.take() {
            timer.abort();
        }
        state.episode += 1;
        let episode = state.episode;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime for unlock timer, lock expires on next check");
            return;
        };

        let shared = Arc::clone(&self.state);
        let flags = Arc::clone(&self.flags);
        state.unlock_timer = Some(handle.spawn(async move {
            tokio::time::sleep(after).await;
            let mut state = shared.lock();
            if state.episode != episode {
                return;
            }
            state.attempts = 0;
            state.locked_until = None;
            state.unlock_timer = None;
            let _ = flags.remove(LOCKED_UNTIL_FLAG);
            let _ = flags.remove(FAILED_ATTEMPTS_FLAG);
            info!("Admin panel unlocked");
        }));
    }
}

fn remaining_secs(until: DateTime<Utc>) -> u64 {
    let millis = (until - Utc::now()).num_milliseconds().max(0) as u64;
    (millis + 999) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryFlagStore;

    fn gate_with(flags: Arc<MemoryFlagStore>) -> AdminGate {
        AdminGate::new(
            Arc::new(AdminCredentials::new(None, "tea-time")),
            flags,
            LockoutPolicy::default(),
        )
    }

    fn gate() -> AdminGate {
        gate_with(Arc::new(MemoryFlagStore::new()))
    }

    #[test]
    fn test_credentials() {
        let creds = AdminCredentials::new(Some("admin".into()), "pw");
        assert!(creds.check_credentials(Some("admin"), "pw"));
        assert!(!creds.check_credentials(None, "pw"));
        assert!(!creds.check_credentials(Some("admin"), "pw2"));

        let no_user = AdminCredentials::new(None, "pw");
        assert!(no_user.check_credentials(Some("anyone"), "pw"));

        let disabled = AdminCredentials::from_settings(&AdminSettings::default());
        assert!(!disabled.check_credentials(None, ""));
        assert!(!format!("{:?}", creds).contains("pw\""));
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let flags = Arc::new(MemoryFlagStore::new());
        let gate = gate_with(flags.clone());
        assert_eq!(gate.state(), AdminState::LoggedOut);
        assert!(gate.require_admin().is_err());

        assert_eq!(gate.login(None, "tea-time").unwrap(), LoginOutcome::Success);
        assert_eq!(gate.state(), AdminState::LoggedIn);
        assert_eq!(flags.get(AUTHENTICATED_FLAG).as_deref(), Some("true"));
        gate.require_admin().unwrap();

        gate.logout().unwrap();
        assert_eq!(gate.state(), AdminState::LoggedOut);
        assert!(flags.get(AUTHENTICATED_FLAG).is_none());
    }

    #[tokio::test]
    async fn test_failed_attempts_count_down() {
        let gate = gate();
        assert_eq!(gate.login(None, "nope").unwrap(), LoginOutcome::Invalid { remaining: 2 });
        assert_eq!(gate.login(None, "nope").unwrap(), LoginOutcome::Invalid { remaining: 1 });
        assert_eq!(gate.attempts(), 2);

        assert_eq!(gate.login(None, "tea-time").unwrap(), LoginOutcome::Success);
        assert_eq!(gate.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockout_and_automatic_unlock() {
        let gate = gate();
        gate.login(None, "a").unwrap();
        gate.login(None, "b").unwrap();
        assert_eq!(
            gate.login(None, "c").unwrap(),
            LoginOutcome::LockedOut { remaining_secs: 30 }
        );
        assert_eq!(gate.state(), AdminState::Locked);

        let err = gate.login(None, "tea-time").unwrap_err();
        assert!(matches!(err, Error::Locked { .. }));
        assert_eq!(gate.attempts(), 3);

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(gate.state(), AdminState::LoggedOut);
        assert_eq!(gate.attempts(), 0);
        assert_eq!(gate.login(None, "tea-time").unwrap(), LoginOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_unlock_timer() {
        let gate = gate();
        for _ in 0..3 {
            gate.login(None, "bad").unwrap();
        }
        assert_eq!(gate.state(), AdminState::Locked);

        gate.reset();
        assert_eq!(gate.state(), AdminState::LoggedOut);

        // A fresh lock must not be cleared by the cancelled timer of the old one
        tokio::time::sleep(Duration::from_secs(20)).await;
        for _ in 0..3 {
            gate.login(None, "bad").unwrap();
        }
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(gate.state(), AdminState::Locked);

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(gate.state(), AdminState::LoggedOut);
    }

    #[tokio::test]
    async fn test_lock_survives_restart() {
        let flags = Arc::new(MemoryFlagStore::new());
        let gate = gate_with(flags.clone());
        for _ in 0..3 {
            gate.login(None, "bad").unwrap();
        }
        drop(gate);

        let restarted = gate_with(flags.clone());
        assert_eq!(restarted.state(), AdminState::Locked);
        assert!(restarted.lock_remaining().unwrap() <= Duration::from_secs(30));
        assert!(matches!(restarted.login(None, "tea-time"), Err(Error::Locked { .. })));
    }

    #[test]
    fn test_expired_lock_is_cleared_on_restore() {
        let flags = Arc::new(MemoryFlagStore::new());
        flags.set(FAILED_ATTEMPTS_FLAG, "3").unwrap();
        flags
            .set(LOCKED_UNTIL_FLAG, &(Utc::now() - chrono::Duration::seconds(5)).to_rfc3339())
            .unwrap();

        let gate = gate_with(flags.clone());
        assert_eq!(gate.state(), AdminState::LoggedOut);
        assert_eq!(gate.attempts(), 0);
        assert!(flags.get(LOCKED_UNTIL_FLAG).is_none());
    }

    #[test]
    fn test_authentication_restored_within_ttl() {
        let flags = Arc::new(MemoryFlagStore::new());
        flags.set(AUTHENTICATED_FLAG, "true").unwrap();
        flags
            .set(AUTH_TIMESTAMP_FLAG, &Utc::now().timestamp_millis().to_string())
            .unwrap();
        assert!(gate_with(flags).is_authenticated());
    }

    #[test]
    fn test_stale_authentication_discarded() {
        let flags = Arc::new(MemoryFlagStore::new());
        flags.set(AUTHENTICATED_FLAG, "true").unwrap();
        let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
        flags
            .set(AUTH_TIMESTAMP_FLAG, &two_hours_ago.timestamp_millis().to_string())
            .unwrap();

        let gate = gate_with(flags.clone());
        assert_eq!(gate.state(), AdminState::LoggedOut);
        assert!(flags.get(AUTHENTICATED_FLAG).is_none());
    }
}
