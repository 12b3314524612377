//! Driver identity metadata.

/// Static metadata describing a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    /// Short name of the driver (e.g. "e1000e").
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

impl DriverInfo {
    /// Creates driver metadata.
    #[must_use]
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }
}

impl core::fmt::Display for DriverInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name)
    }
}
