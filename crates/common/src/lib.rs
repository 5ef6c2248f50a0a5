/**
 * Injectable wall-clock time, so lockout
 *  deadlines can be tested without sleeping.
 */
pub mod clock;
/**
 * Cryptographic types and operations.
 *  - AES-256-GCM blob codec
 *  - Passphrase-sealed key file and key providers
 */
pub mod crypto;
/**
 * Brute-force protection for the login path,
 *  tracking failures by origin and by account.
 */
pub mod limiter;
/**
 * Layered settings: environment, process
 *  overrides, then config file.
 */
pub mod settings;
/**
 * In-process collaborators for tests.
 */
pub mod testkit;
/**
 * Concurrent encrypted uploads: worker pool,
 *  identity sequence, rollback and read path.
 */
pub mod upload;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::crypto::{Codec, CodecError, DataKey, KeyError, KeyProvider, KeystoreProvider};
    pub use crate::limiter::{BruteForceLimiter, FailureOutcome, GuardOutcome, LimiterConfig};
    pub use crate::settings::Settings;
    pub use crate::upload::{
        FetchError, StorageId, UploadConfig, UploadCoordinator, UploadError, UploadHandle,
    };
    pub use crate::version::build_info;
}
