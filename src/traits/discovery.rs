#[cfg(test)]
use mockall::automock;

/// Enumerates the device ports currently attached to the machine.
///
/// Implementations may block; callers run them on the blocking pool.
#[cfg_attr(test, automock)]
pub trait PortDiscovery: Send + Sync {
    /// Return the identifiers of every available port, or a failure cause.
    fn discover(&self) -> Result<Vec<String>, String>;
}
