//! Extra trusted CAs and client certificates for outbound TLS.
//!
//! Reads the `extra_tls_certificates` configuration block, checks that every referenced file exists, and then loads
//! the certificates into the process-wide TLS contexts used for outbound connections:
//!
//! - each `ca` entry is added as a trusted CA to the verifying context
//! - each `client` entry is loaded as the client certificate of both the verifying and the non-verifying context
//!
//! This is meant to run once during startup, before either context is used to build a client configuration, and
//! while nothing else is modifying them.
#![deny(warnings)]
#![deny(missing_docs)]

use anyhow::anyhow;
use host_config::GenericConfiguration;
use snafu::ResultExt as _;
use tls_context::{default_context, default_no_verify_context, TlsContext};
use tracing::debug;

mod config;
pub use self::config::{
    ClientCertificate, ClientCertificateConfiguration, ExtraTlsCertificates, ExtraTlsCertificatesConfiguration,
    Password, CONFIG_KEY,
};

mod error;
pub use self::error::SetupError;
use self::error::*;

mod installer;
pub use self::installer::install;

/// Loads and validates the extra TLS certificates block from the given configuration.
///
/// ## Errors
///
/// If the block is malformed, or any referenced file does not exist or is unreadable, an error will be returned.
pub fn load(config: &GenericConfiguration) -> Result<ExtraTlsCertificates, SetupError> {
    ExtraTlsCertificatesConfiguration::from_configuration(config)
        .context(Configuration)?
        .validate()
}

/// Sets up extra TLS certificates in the shared TLS contexts.
///
/// See [`default_context`] and [`default_no_verify_context`] for the contexts that are modified. When nothing is
/// configured, the contexts are not touched at all.
///
/// Returns `true` once every entry has been installed.
///
/// ## Errors
///
/// If the configuration is invalid, nothing is installed and an error is returned. If loading an entry fails, an error
/// is returned, and any entries installed before it remain installed.
pub fn setup(config: &GenericConfiguration) -> Result<bool, SetupError> {
    let certificates = load(config)?;
    if certificates.is_empty() {
        debug!("No extra TLS certificates configured.");
        return Ok(true);
    }

    let verifying = default_context().context(Context)?;
    let no_verify = default_no_verify_context();

    let mut verifying = verifying
        .lock()
        .map_err(|_| anyhow!("Verifying TLS context lock poisoned."))
        .context(Context)?;
    let mut no_verify = no_verify
        .lock()
        .map_err(|_| anyhow!("Non-verifying TLS context lock poisoned."))
        .context(Context)?;

    install(&certificates, &mut *verifying, &mut *no_verify).context(Certificate)?;

    Ok(true)
}

/// Sets up extra TLS certificates in the given TLS contexts.
///
/// Behaves like [`setup`], but with explicitly provided contexts instead of the shared ones.
///
/// ## Errors
///
/// If the configuration is invalid, nothing is installed and an error is returned. If loading an entry fails, an error
/// is returned, and any entries installed before it remain installed.
pub fn setup_with_contexts(
    config: &GenericConfiguration, verifying: &mut dyn TlsContext, no_verify: &mut dyn TlsContext,
) -> Result<bool, SetupError> {
    let certificates = load(config)?;
    install(&certificates, verifying, no_verify).context(Certificate)?;

    Ok(true)
}
