use std::{fmt, path::Path, sync::Arc};

use anyhow::{anyhow, Error as GenericError};
use rustls::{
    client::{
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        Resumption,
    },
    crypto::CryptoProvider,
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    sign::CertifiedKey,
    ClientConfig, DigitallySignedStruct, Error as RustlsError, InconsistentKeys, RootCertStore, SignatureScheme,
};
use snafu::ResultExt as _;

use crate::{error::*, pem};

const DEFAULT_MAX_TLS12_RESUMPTION_SESSIONS: usize = 8;

/// A mutable TLS context that trusted CAs and client certificates can be loaded into.
///
/// Implementations are expected to apply each load immediately: there is no staging, and a failed load leaves any
/// earlier loads in place.
pub trait TlsContext {
    /// Adds the certificates in the given PEM file as trusted CAs.
    ///
    /// ## Errors
    ///
    /// If the file cannot be read, contains no certificates, a certificate is rejected, or the context has no trust
    /// store, an error will be returned.
    fn load_verify_locations(&mut self, ca_file: &Path) -> Result<(), CertificateError>;

    /// Sets the client certificate chain presented to peers.
    ///
    /// The private key is read from `key_file` when given, otherwise from `cert_file`. `password` decrypts an
    /// encrypted private key.
    ///
    /// ## Errors
    ///
    /// If either file cannot be read, the key cannot be decrypted, or the certificate or key is rejected, an error
    /// will be returned.
    fn load_cert_chain(
        &mut self, cert_file: &Path, key_file: Option<&Path>, password: Option<&str>,
    ) -> Result<(), CertificateError>;
}

enum Verification {
    Roots(RootCertStore),
    Disabled,
}

struct ClientIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

/// A client-side TLS context backed by `rustls`.
///
/// Holds the mutable state a client configuration is derived from (trusted roots and client identity) and produces a
/// [`ClientConfig`] on demand via [`build`][Self::build].
///
/// A context either verifies peer certificates against its root store, or skips verification entirely. Both kinds can
/// carry a client certificate.
pub struct ClientTlsContext {
    provider: Arc<CryptoProvider>,
    verification: Verification,
    identity: Option<ClientIdentity>,
    max_tls12_resumption_sessions: usize,
}

impl ClientTlsContext {
    /// Creates a context that verifies peer certificates against the given root store.
    pub fn verifying(root_cert_store: RootCertStore) -> Self {
        Self::new(Verification::Roots(root_cert_store))
    }

    /// Creates a context that does not verify peer certificates.
    pub fn no_verify() -> Self {
        Self::new(Verification::Disabled)
    }

    fn new(verification: Verification) -> Self {
        Self {
            provider: default_crypto_provider(),
            verification,
            identity: None,
            max_tls12_resumption_sessions: DEFAULT_MAX_TLS12_RESUMPTION_SESSIONS,
        }
    }

    /// Sets the cryptography provider used to load keys and build configurations.
    ///
    /// Defaults to the process-wide default provider, if one is installed, and AWS-LC otherwise.
    pub fn with_crypto_provider(mut self, provider: Arc<CryptoProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Sets the maximum number of TLS 1.2 sessions to cache.
    ///
    /// Defaults to 8.
    pub fn with_max_tls12_resumption_sessions(mut self, max: usize) -> Self {
        self.max_tls12_resumption_sessions = max;
        self
    }

    /// Returns `true` if this context verifies peer certificates.
    pub fn verifies_peer(&self) -> bool {
        matches!(self.verification, Verification::Roots(_))
    }

    /// Returns the root store used to verify peers, if this context verifies them.
    pub fn root_cert_store(&self) -> Option<&RootCertStore> {
        match &self.verification {
            Verification::Roots(store) => Some(store),
            Verification::Disabled => None,
        }
    }

    /// Returns `true` if a client certificate has been loaded.
    pub fn has_client_certificate(&self) -> bool {
        self.identity.is_some()
    }

    /// Builds a client TLS configuration from the current state of this context.
    ///
    /// ## Errors
    ///
    /// If the provider does not support the default protocol versions, the client certificate cannot be used, or the
    /// resulting configuration is not FIPS compliant (with the `fips` feature), an error will be returned.
    pub fn build(&self) -> Result<ClientConfig, GenericError> {
        let builder = ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| anyhow!("Unsupported TLS protocol versions for cryptography provider: {}", e))?;

        let builder = match &self.verification {
            Verification::Roots(store) => builder.with_root_certificates(store.clone()),
            Verification::Disabled => builder
                .dangerous()
                .with_custom_certificate_verifier(NoopServerCertificateVerifier::new(&self.provider)),
        };

        let mut config = match &self.identity {
            Some(identity) => builder
                .with_client_auth_cert(identity.cert_chain.clone(), identity.key.clone_key())
                .map_err(|e| anyhow!("Failed to configure client certificate: {}", e))?,
            None => builder.with_no_client_auth(),
        };

        config.resumption = Resumption::in_memory_sessions(self.max_tls12_resumption_sessions);

        #[cfg(feature = "fips")]
        if !config.fips() {
            return Err(anyhow!("Client TLS configuration is not FIPS compliant."));
        }

        Ok(config)
    }
}

impl fmt::Debug for ClientTlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTlsContext")
            .field("verifies_peer", &self.verifies_peer())
            .field("root_certificates", &self.root_cert_store().map(RootCertStore::len))
            .field("has_client_certificate", &self.has_client_certificate())
            .field("max_tls12_resumption_sessions", &self.max_tls12_resumption_sessions)
            .finish_non_exhaustive()
    }
}

impl TlsContext for ClientTlsContext {
    fn load_verify_locations(&mut self, ca_file: &Path) -> Result<(), CertificateError> {
        let Verification::Roots(store) = &mut self.verification else {
            return NoTrustStore { path: ca_file }.fail();
        };

        for cert in pem::load_certificates(ca_file)? {
            store.add(cert).context(Rejected { path: ca_file })?;
        }

        Ok(())
    }

    fn load_cert_chain(
        &mut self, cert_file: &Path, key_file: Option<&Path>, password: Option<&str>,
    ) -> Result<(), CertificateError> {
        let key_path = key_file.unwrap_or(cert_file);

        let cert_chain = pem::load_certificates(cert_file)?;
        let key = pem::load_private_key(key_path, password)?;

        // Make sure the provider can sign with the key, and that the key belongs to the certificate, before it replaces
        // the current identity.
        let signing_key = self
            .provider
            .key_provider
            .load_private_key(key.clone_key())
            .context(Rejected { path: key_path })?;
        match CertifiedKey::new(cert_chain.clone(), signing_key).keys_match() {
            // Some key types can't report their public key, in which case there is nothing to compare.
            Ok(()) | Err(RustlsError::InconsistentKeys(InconsistentKeys::Unknown)) => {}
            Err(e) => return Err(e).context(Rejected { path: key_path }),
        }

        self.identity = Some(ClientIdentity { cert_chain, key });
        Ok(())
    }
}

fn default_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

#[derive(Debug)]
struct NoopServerCertificateVerifier {
    supported_schemes: Vec<SignatureScheme>,
}

impl NoopServerCertificateVerifier {
    fn new(provider: &CryptoProvider) -> Arc<Self> {
        Arc::new(Self {
            supported_schemes: provider.signature_verification_algorithms.supported_schemes(),
        })
    }
}

impl ServerCertVerifier for NoopServerCertificateVerifier {
    fn verify_server_cert(
        &self, _: &CertificateDer<'_>, _: &[CertificateDer<'_>], _: &ServerName<'_>, _: &[u8], _: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self, _: &[u8], _: &CertificateDer<'_>, _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self, _: &[u8], _: &CertificateDer<'_>, _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.supported_schemes.clone()
    }
}
