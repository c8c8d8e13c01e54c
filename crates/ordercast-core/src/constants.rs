//! Package-level constants.

/// Current version of the ordercast client (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "ordercast";

/// Platform tag sent with `authenticate` when none is configured.
pub const DEFAULT_PLATFORM: &str = "pos";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn name_is_lowercase() {
        assert_eq!(NAME, NAME.to_lowercase());
    }
}
