use std::path::PathBuf;

use snafu::Snafu;

/// An error encountered while loading certificates or keys into a TLS context.
///
/// Every variant carries the path of the file that caused it.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
#[snafu(visibility(pub(crate)))]
pub enum CertificateError {
    /// The file could not be read.
    #[snafu(display("Failed to read '{}': {}", path.display(), source))]
    Io {
        /// Path to the file.
        path: PathBuf,

        /// Error source.
        source: std::io::Error,
    },

    /// The file could not be parsed as PEM.
    #[snafu(display("Failed to parse PEM data in '{}': {}", path.display(), source))]
    Parse {
        /// Path to the file.
        path: PathBuf,

        /// Error source.
        source: std::io::Error,
    },

    /// The file contained no certificates.
    #[snafu(display("No certificates found in '{}'.", path.display()))]
    NoCertificates {
        /// Path to the file.
        path: PathBuf,
    },

    /// The file contained no private key.
    #[snafu(display("No private key found in '{}'.", path.display()))]
    NoPrivateKey {
        /// Path to the file.
        path: PathBuf,
    },

    /// The private key is encrypted, but no password was given.
    #[snafu(display("Private key in '{}' is encrypted, but no password was provided.", path.display()))]
    MissingPassword {
        /// Path to the file.
        path: PathBuf,
    },

    /// The private key uses legacy OpenSSL PEM encryption.
    #[snafu(display(
        "Private key in '{}' uses legacy PEM encryption, which is not supported. Convert it to an encrypted PKCS#8 key.",
        path.display()
    ))]
    UnsupportedKeyEncryption {
        /// Path to the file.
        path: PathBuf,
    },

    /// The encrypted private key is not a valid encrypted PKCS#8 structure.
    #[snafu(display("Malformed encrypted private key in '{}': {}", path.display(), source))]
    InvalidEncryptedKey {
        /// Path to the file.
        path: PathBuf,

        /// Error source.
        source: pkcs8::Error,
    },

    /// The encrypted private key could not be decrypted.
    #[snafu(display("Failed to decrypt private key in '{}'. Is the password correct? ({})", path.display(), source))]
    Decrypt {
        /// Path to the file.
        path: PathBuf,

        /// Error source.
        source: pkcs8::Error,
    },

    /// The TLS library rejected a certificate or key.
    #[snafu(display("Certificate or key from '{}' was rejected: {}", path.display(), source))]
    Rejected {
        /// Path to the file.
        path: PathBuf,

        /// Error source.
        source: rustls::Error,
    },

    /// A trusted CA was loaded into a context that does not verify peers.
    #[snafu(display(
        "Cannot add trusted CA from '{}': context does not verify peer certificates.",
        path.display()
    ))]
    NoTrustStore {
        /// Path to the file.
        path: PathBuf,
    },
}
