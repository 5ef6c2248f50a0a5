use std::fmt;

use serde::Serialize;

/// Compile-time build metadata, stamped by `build.rs`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    /// Name of the package that asked for the info
    pub package: &'static str,
    pub package_version: &'static str,
    pub build_profile: &'static str,
    pub build_features: &'static str,
    /// `git describe` output, or the crate version outside a checkout
    pub version: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
    pub target: Option<&'static str>,
}

impl BuildInfo {
    pub fn new(package: &'static str, package_version: &'static str) -> Self {
        Self {
            package,
            package_version,
            build_profile: env!("BUILD_PROFILE"),
            build_features: env!("BUILD_FEATURES"),
            version: env!("REPO_VERSION"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rust_version: env!("RUST_VERSION"),
            target: option_env!("BUILD_TARGET"),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, {} build, features: {}, built {} with {}",
            self.package,
            self.package_version,
            self.version,
            self.build_profile,
            self.build_features,
            self.build_timestamp,
            self.rust_version,
        )?;
        if let Some(target) = self.target {
            write!(f, " for {}", target)?;
        }
        write!(f, ")")
    }
}

/// Build info for this crate.
pub fn build_info() -> BuildInfo {
    BuildInfo::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Build info naming the invoking package.
#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    };
}
