use std::path::PathBuf;

use anyhow::Error as GenericError;
use host_config::ConfigurationError;
use snafu::Snafu;
use tls_context::CertificateError;

use crate::config::CONFIG_KEY;

/// An error encountered while setting up extra TLS certificates.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
#[snafu(visibility(pub(crate)))]
pub enum SetupError {
    /// The configuration block is malformed.
    #[snafu(display("Invalid `{}` configuration: {}", CONFIG_KEY, source))]
    Configuration {
        /// Error source.
        source: ConfigurationError,
    },

    /// A configured path does not point to a readable file.
    #[snafu(display("Invalid value for '{}': {} ({}).", field, reason, path.display()))]
    InvalidFile {
        /// Period-separated path to the offending field, with list positions, such as
        /// `extra_tls_certificates.client[0].key`.
        field: String,

        /// The configured path.
        path: PathBuf,

        /// Why the path was rejected.
        reason: &'static str,
    },

    /// The shared TLS contexts could not be obtained.
    #[snafu(display("Failed to acquire shared TLS contexts: {}", source))]
    Context {
        /// Error source.
        source: GenericError,
    },

    /// A certificate or key could not be loaded.
    ///
    /// Entries installed before the failing one remain installed.
    #[snafu(display("Failed to install extra TLS certificates: {}", source))]
    Certificate {
        /// Error source.
        source: CertificateError,
    },
}
