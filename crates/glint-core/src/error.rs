//! Error types shared across the workspace.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A bounded sequence would overflow its fixed capacity
    #[error("{what} capacity exceeded: requested {requested}, capacity {capacity}")]
    CapacityExceeded {
        /// What was being grown
        what: &'static str,
        /// The fixed capacity
        capacity: usize,
        /// The requested length
        requested: usize,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Check a requested length against a fixed capacity.
///
/// Bounded sequences fail loudly instead of silently truncating.
pub fn ensure_capacity(what: &'static str, capacity: usize, requested: usize) -> Result<()> {
    if requested > capacity {
        return Err(Error::CapacityExceeded {
            what,
            capacity,
            requested,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_within_bounds() {
        assert!(ensure_capacity("attachments", 8, 8).is_ok());
        assert!(ensure_capacity("attachments", 8, 0).is_ok());
    }

    #[test]
    fn capacity_exceeded() {
        let err = ensure_capacity("attachments", 8, 9).unwrap_err();
        assert_eq!(
            err,
            Error::CapacityExceeded {
                what: "attachments",
                capacity: 8,
                requested: 9
            }
        );
    }
}
