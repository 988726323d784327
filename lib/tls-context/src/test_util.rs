use std::io::Write as _;

use pkcs8::{pkcs5::pbes2, LineEnding, PrivateKeyInfo};
use tempfile::NamedTempFile;

pub struct Identity {
    pub cert_pem: String,
    pub key_pem: String,
    pub key_der: Vec<u8>,
}

pub fn generate_identity(name: &str) -> Identity {
    let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap();
    Identity {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        key_der: key_pair.serialize_der(),
    }
}

/// Encrypts a PKCS#8 key with PBKDF2-SHA256 and AES-256-CBC.
///
/// A low iteration count keeps debug-build tests fast.
pub fn encrypt_key_pem(key_der: &[u8], password: &str) -> String {
    let info = PrivateKeyInfo::try_from(key_der).unwrap();
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(1024, b"tls-context-salt", &[7u8; 16]).unwrap();
    let encrypted = info.encrypt_with_params(params, password).unwrap();
    encrypted.to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF).unwrap().to_string()
}

pub fn write_pem(sections: &[&str]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".pem").tempfile().unwrap();
    for section in sections {
        file.write_all(section.as_bytes()).unwrap();
        if !section.ends_with('\n') {
            file.write_all(b"\n").unwrap();
        }
    }
    file.flush().unwrap();
    file
}
