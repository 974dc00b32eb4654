use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, ErrorKind};

// Generation zero means that no command is running.
const IDLE: u64 = 0;

/// The execution window of a single command.
///
/// Every handle vended during a command carries the scope of that command
/// and is valid only while the scope is the current one.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl Scope {
    pub(crate) fn is_active(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }

    pub(crate) fn check(&self, what: &str) -> Result<(), Error> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::InvalidHandle,
                format!("The {what} handle is no longer valid: its command has completed"),
            ))
        }
    }
}

/// Opens and closes command scopes.
#[derive(Debug)]
pub(crate) struct Scopes {
    next: u64,
    current: Arc<AtomicU64>,
}

impl Scopes {
    pub(crate) fn new() -> Self {
        Self {
            next: IDLE,
            current: Arc::new(AtomicU64::new(IDLE)),
        }
    }

    pub(crate) fn open(&mut self) -> Scope {
        self.next = self.next.wrapping_add(1).max(1);
        self.current.store(self.next, Ordering::Release);
        Scope {
            generation: self.next,
            current: Arc::clone(&self.current),
        }
    }

    pub(crate) fn close(&self) {
        self.current.store(IDLE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::Scopes;

    #[test]
    fn scope_lifetime() {
        let mut scopes = Scopes::new();

        let first = scopes.open();
        assert!(first.is_active());
        assert!(first.check("twin").is_ok());

        scopes.close();
        assert!(!first.is_active());
        assert_eq!(
            first.check("twin").map_err(|e| e.kind()),
            Err(ErrorKind::InvalidHandle)
        );

        // A new scope does not revive the old one.
        let second = scopes.open();
        assert!(second.is_active());
        assert!(!first.is_active());
    }
}
