//! Retry policy for transient disk I/O
//!
//! Reads, writes and directory creation on scanner shares fail intermittently
//! (network mounts, files still being written). Those operations go through
//! [`RetryPolicy::run`], which retries a fixed number of times with a fixed
//! delay and only then hands the last error back to the caller.
//!
//! Corrupt input is never retried: callers decide what is transient by
//! returning [`Attempt::Fatal`] from the closure.

use std::path::Path;
use std::time::Duration;
use tracing::warn;

// ============================================================
// Constants
// ============================================================

/// Default number of attempts before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

// ============================================================
// Policy
// ============================================================

/// Outcome of a single attempt that did not succeed
#[derive(Debug)]
pub enum Attempt<E> {
    /// Worth trying again
    Transient(E),
    /// Retrying cannot help
    Fatal(E),
}

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least one is always made)
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit limits
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Policy that tries exactly once
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `what` names the operation in log output.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Result<T, Attempt<E>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Transient(e)) => {
                    if attempt >= max {
                        warn!("{} failed after {} attempts: {}", what, attempt, e);
                        return Err(e);
                    }
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        what, attempt, max, self.delay, e
                    );
                    attempt += 1;
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                }
            }
        }
    }

    /// `create_dir_all` with retries
    pub fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        self.run(&format!("mkdir {}", path.display()), || {
            std::fs::create_dir_all(path).map_err(Attempt::Transient)
        })
    }

    /// Save an image with retries
    pub fn save_image(&self, image: &image::GrayImage, path: &Path) -> image::ImageResult<()> {
        self.run(&format!("write {}", path.display()), || {
            image.save(path).map_err(|e| match e {
                image::ImageError::IoError(_) => Attempt::Transient(e),
                other => Attempt::Fatal(other),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = Cell::new(0);
        let result: Result<u32, String> = policy.run("flaky", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Attempt::Transient("busy".to_string()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let calls = Cell::new(0);
        let result: Result<(), String> = policy.run("always", || {
            calls.set(calls.get() + 1);
            Err(Attempt::Transient(format!("fail {}", calls.get())))
        });
        assert_eq!(result, Err("fail 4".to_string()));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_fatal_is_not_retried() {
        let policy = RetryPolicy::new(10, Duration::ZERO);
        let calls = Cell::new(0);
        let result: Result<(), &str> = policy.run("corrupt", || {
            calls.set(calls.get() + 1);
            Err(Attempt::Fatal("corrupt"))
        });
        assert_eq!(result, Err("corrupt"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::ZERO,
        };
        let calls = Cell::new(0);
        let _: Result<(), &str> = policy.run("once", || {
            calls.set(calls.get() + 1);
            Err(Attempt::Transient("x"))
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_create_dir_all() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        RetryPolicy::no_retry().create_dir_all(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
