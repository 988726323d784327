use tls_context::{CertificateError, TlsContext};
use tracing::info;

use crate::config::{ExtraTlsCertificates, Password};

/// Installs the given certificates into the verifying and non-verifying TLS contexts.
///
/// Trusted CAs only go into the verifying context, as the non-verifying context has no trust store. Client certificates
/// go into both, verifying context first, so this process can present its identity whether or not it checks the peer.
///
/// Contexts are modified in place as entries are processed. The first failure stops the pass and entries loaded before
/// it stay loaded.
///
/// ## Errors
///
/// If a certificate or key cannot be loaded into a context, an error will be returned.
pub fn install(
    certificates: &ExtraTlsCertificates, verifying: &mut dyn TlsContext, no_verify: &mut dyn TlsContext,
) -> Result<(), CertificateError> {
    for ca_file in certificates.ca_files() {
        info!(ca_file = %ca_file.display(), "Adding trusted CA.");
        verifying.load_verify_locations(ca_file)?;
    }

    for client in certificates.client_certificates() {
        info!(
            cert_file = %client.cert_file().display(),
            key_file = ?client.key_file(),
            encrypted = client.password().is_some(),
            "Adding client certificate."
        );

        let password = client.password().map(Password::expose);
        let contexts: [&mut dyn TlsContext; 2] = [&mut *verifying, &mut *no_verify];
        for context in contexts {
            context.load_cert_chain(client.cert_file(), client.key_file(), password)?;
        }
    }

    Ok(())
}
