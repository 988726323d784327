//! Configuration for extra TLS certificates.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use host_config::{ConfigurationError, GenericConfiguration};
use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull, FromInto, OneOrMany, PickFirst};

use crate::error::*;

/// Top-level configuration key the extra TLS certificates block is read from.
pub const CONFIG_KEY: &str = "extra_tls_certificates";

/// A passphrase for an encrypted private key.
///
/// The value never appears in `Debug` output.
#[derive(Clone, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    /// Creates a new `Password`.
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// Returns the passphrase.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// Numeric passphrases, such as `password: 123456` in YAML or `..._PASSWORD=123456` in the environment, arrive as
// numbers and are taken as their decimal representation.
impl From<u64> for Password {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for Password {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<f64> for Password {
    fn from(value: f64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Extra TLS certificates configuration, as read from the configuration.
///
/// Paths have not been checked yet. [`validate`][Self::validate] turns this into [`ExtraTlsCertificates`], which is what
/// the installer accepts.
///
/// ```yaml
/// extra_tls_certificates:
///   ca: /etc/ssl/extra-ca.pem
///   client:
///     - cert: /certs/a.crt
///       key: /certs/a.key
///     - cert: /certs/b.pem
///       password: secret
/// ```
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExtraTlsCertificatesConfiguration {
    /// CA certificate files to trust, in addition to the platform's.
    ///
    /// Accepts a single path or a list of paths. A leading `~` refers to the home directory.
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<OneOrMany<_>>")]
    pub ca: Vec<PathBuf>,

    /// Client certificates to present to peers.
    ///
    /// Accepts a single entry or a list of entries.
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<OneOrMany<_>>")]
    pub client: Vec<ClientCertificateConfiguration>,
}

/// A client certificate entry, as read from the configuration.
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClientCertificateConfiguration {
    /// Certificate (chain) file.
    pub cert: PathBuf,

    /// Private key file.
    ///
    /// When absent, the private key is read from the certificate file.
    #[serde(default)]
    pub key: Option<PathBuf>,

    /// Passphrase for an encrypted private key.
    #[serde_as(as = "Option<PickFirst<(_, FromInto<u64>, FromInto<i64>, FromInto<f64>)>>")]
    pub password: Option<Password>,
}

impl ExtraTlsCertificatesConfiguration {
    /// Reads the extra TLS certificates block from the given configuration.
    ///
    /// An absent or empty block yields an empty configuration. Other top-level keys are ignored.
    ///
    /// ## Errors
    ///
    /// If the block is malformed, such as a client entry missing `cert`, an unknown key, or a value of the wrong type, an
    /// error will be returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, ConfigurationError> {
        Ok(config
            .try_get_typed::<Option<Self>>(CONFIG_KEY)?
            .flatten()
            .unwrap_or_default())
    }

    /// Checks that every referenced file exists and is readable.
    ///
    /// Nothing is loaded here. A leading `~` in a path is expanded using `HOME`, and the expanded path is the one that
    /// gets installed.
    ///
    /// ## Errors
    ///
    /// If any path does not point to a readable regular file, an error naming the offending field is returned.
    pub fn validate(self) -> Result<ExtraTlsCertificates, SetupError> {
        let home = std::env::var_os("HOME").map(PathBuf::from);

        let ca = self
            .ca
            .into_iter()
            .enumerate()
            .map(|(i, path)| readable_file(format!("{}.ca[{}]", CONFIG_KEY, i), &path, home.as_deref()))
            .collect::<Result<Vec<_>, SetupError>>()?;

        let client = self
            .client
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let cert = readable_file(format!("{}.client[{}].cert", CONFIG_KEY, i), &entry.cert, home.as_deref())?;
                let key = entry
                    .key
                    .map(|key| readable_file(format!("{}.client[{}].key", CONFIG_KEY, i), &key, home.as_deref()))
                    .transpose()?;

                Ok(ClientCertificate {
                    cert,
                    key,
                    password: entry.password,
                })
            })
            .collect::<Result<Vec<_>, SetupError>>()?;

        Ok(ExtraTlsCertificates { ca, client })
    }
}

/// Expands a leading `~` to the given home directory.
///
/// `~user` forms are left alone, as is everything when there is no home directory.
fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Returns the path to use for a configured file, after checking that it is a readable regular file.
fn readable_file(field: String, path: &Path, home: Option<&Path>) -> Result<PathBuf, SetupError> {
    let path = expand_home(path, home);
    let reason = match std::fs::metadata(&path) {
        Ok(metadata) if !metadata.is_file() => "not a file",
        Ok(_) => match std::fs::File::open(&path) {
            Ok(_) => return Ok(path),
            Err(_) => "file not readable",
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => "file does not exist",
        Err(_) => "file not accessible",
    };

    InvalidFile { field, path, reason }.fail()
}

/// Validated extra TLS certificates.
///
/// Only obtainable through [`ExtraTlsCertificatesConfiguration::validate`].
#[derive(Clone, Debug, Default)]
pub struct ExtraTlsCertificates {
    ca: Vec<PathBuf>,
    client: Vec<ClientCertificate>,
}

impl ExtraTlsCertificates {
    /// Returns the CA certificate files to trust.
    pub fn ca_files(&self) -> &[PathBuf] {
        &self.ca
    }

    /// Returns the client certificates to present, in configuration order.
    pub fn client_certificates(&self) -> &[ClientCertificate] {
        &self.client
    }

    /// Returns `true` if there is nothing to install.
    pub fn is_empty(&self) -> bool {
        self.ca.is_empty() && self.client.is_empty()
    }
}

/// A validated client certificate entry.
#[derive(Clone, Debug)]
pub struct ClientCertificate {
    cert: PathBuf,
    key: Option<PathBuf>,
    password: Option<Password>,
}

impl ClientCertificate {
    /// Returns the certificate file.
    pub fn cert_file(&self) -> &Path {
        &self.cert
    }

    /// Returns the private key file, if separate from the certificate file.
    pub fn key_file(&self) -> Option<&Path> {
        self.key.as_deref()
    }

    /// Returns the private key passphrase, if any.
    pub fn password(&self) -> Option<&Password> {
        self.password.as_ref()
    }
}
