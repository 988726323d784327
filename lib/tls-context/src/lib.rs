//! Client-side TLS contexts that certificates can be loaded into at runtime.
//!
//! `rustls` configurations are immutable once built, so this crate keeps the inputs to a configuration (trusted roots
//! and the client identity) in a mutable [`ClientTlsContext`], exposes the loading operations through the
//! [`TlsContext`] trait, and builds a `rustls::ClientConfig` from the current state when asked.
#![deny(warnings)]
#![deny(missing_docs)]

use std::sync::OnceLock;

use anyhow::{anyhow, Error as GenericError};
use rustls::RootCertStore;
use tracing::{debug, warn};

mod context;
pub use self::context::{ClientTlsContext, TlsContext};

mod error;
pub use self::error::CertificateError;

pub mod pem;

mod shared;
pub use self::shared::{default_context, default_no_verify_context, SharedTlsContext};

#[cfg(test)]
mod test_util;

/// Tracks if the default cryptography provider for `rustls` has been set.
static DEFAULT_CRYPTO_PROVIDER_SET: OnceLock<()> = OnceLock::new();

/// Initializes the default TLS cryptography provider used by `rustls`.
///
/// This explicitly sets the [AWS-LC][aws_lc] provider as the default provider for all future TLS configurations, which
/// provides the ability to run in FIPS mode for FIPS-compliant builds. Contexts created after this call use it.
///
/// ## Errors
///
/// If the default cryptography provider has already been set, an error will be returned.
///
/// [aws_lc]: https://github.com/aws/aws-lc-rs
pub fn initialize_default_crypto_provider() -> Result<(), GenericError> {
    if DEFAULT_CRYPTO_PROVIDER_SET.get().is_some() {
        return Err(anyhow!("Default TLS cryptography provider already initialized."));
    }

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install AWS-LC as default cryptography provider. This is likely due to a conflicting provider already being installed."))?;

    DEFAULT_CRYPTO_PROVIDER_SET
        .set(())
        .expect("should be impossible for DEFAULT_CRYPTO_PROVIDER_SET to be initialized twice");

    Ok(())
}

/// Loads a root certificate store from the platform's native certificate store.
///
/// ## Environment Variables
///
/// | Environment Variable | Description                                                                           |
/// |----------------------|---------------------------------------------------------------------------------------|
/// | SSL_CERT_FILE        | File containing an arbitrary number of certificates in PEM format.                    |
/// | SSL_CERT_DIR         | Directory utilizing the hierarchy and naming convention used by OpenSSL's [c_rehash]. |
///
/// If **either** (or **both**) are set, certificates are only loaded from the locations specified via environment
/// variables and not the platform-native certificate store.
///
/// Invalid certificates are skipped. An empty platform store is not an error, since extra trusted CAs may be the only
/// trust anchors a deployment needs.
///
/// ## Errors
///
/// If any error occurs while locating or reading the platform's native certificate store, an error will be returned.
///
/// [c_rehash]: https://www.openssl.org/docs/manmaster/man1/c_rehash.html
pub fn load_platform_root_certificates() -> Result<RootCertStore, GenericError> {
    let mut root_cert_store = RootCertStore::empty();

    let result = rustls_native_certs::load_native_certs();
    if !result.errors.is_empty() {
        let joined_errors = result
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        return Err(anyhow!(
            "Failed to load certificates from platform's native certificate store: {}",
            joined_errors
        ));
    }

    let (added, failed) = root_cert_store.add_parsable_certificates(result.certs);
    match (added, failed) {
        (0, 0) => warn!("Platform's native certificate store is empty. Only explicitly added CAs will be trusted."),
        (added, 0) => debug!(
            "Added {} certificates from the platform to the default root certificate store.",
            added
        ),
        (added, failed) => debug!(
            "Added {} certificates from the platform to the default root certificate store, but failed to add {} certificates.",
            added, failed
        ),
    }

    Ok(root_cert_store)
}
