//! Process-wide shared TLS contexts.
//!
//! Outbound clients pick their configuration from one of two contexts: one that verifies peer certificates and one
//! that does not. Both are created lazily, once, and every call hands back the same instance, so anything loaded into
//! them during startup is seen by every client built afterwards.

use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{anyhow, Error as GenericError};

use crate::{load_platform_root_certificates, ClientTlsContext};

/// A TLS context shared across the process.
pub type SharedTlsContext = Arc<Mutex<ClientTlsContext>>;

static DEFAULT_CONTEXT_MUTEX: Mutex<()> = Mutex::new(());
static DEFAULT_CONTEXT: OnceLock<SharedTlsContext> = OnceLock::new();
static DEFAULT_NO_VERIFY_CONTEXT: OnceLock<SharedTlsContext> = OnceLock::new();

/// Returns the shared verifying TLS context.
///
/// On first use, the context is created with the platform's root certificates as its trust store. (See
/// [`load_platform_root_certificates`].)
///
/// ## Errors
///
/// If the platform's root certificates cannot be loaded on first use, an error will be returned, and the next call will
/// try again.
pub fn default_context() -> Result<SharedTlsContext, GenericError> {
    if let Some(context) = DEFAULT_CONTEXT.get() {
        return Ok(Arc::clone(context));
    }

    let _guard = DEFAULT_CONTEXT_MUTEX
        .lock()
        .map_err(|_| anyhow!("Default TLS context initialization lock poisoned."))?;
    if let Some(context) = DEFAULT_CONTEXT.get() {
        return Ok(Arc::clone(context));
    }

    let root_cert_store = load_platform_root_certificates()?;
    let context = Arc::new(Mutex::new(ClientTlsContext::verifying(root_cert_store)));

    // We only ever set it here, while holding the mutex, after checking that it is still unset.
    DEFAULT_CONTEXT
        .set(Arc::clone(&context))
        .expect("should be impossible for DEFAULT_CONTEXT to be initialized twice");

    Ok(context)
}

/// Returns the shared non-verifying TLS context.
pub fn default_no_verify_context() -> SharedTlsContext {
    Arc::clone(DEFAULT_NO_VERIFY_CONTEXT.get_or_init(|| Arc::new(Mutex::new(ClientTlsContext::no_verify()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{generate_identity, write_pem};

    #[test]
    fn verifying_context_is_memoized() {
        let platform_root = generate_identity("platform-root.example");
        let bundle = write_pem(&[&platform_root.cert_pem]);
        std::env::set_var("SSL_CERT_FILE", bundle.path());

        let first = default_context().unwrap();
        let second = default_context().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let context = first.lock().unwrap();
        assert!(context.verifies_peer());
        assert!(context.root_cert_store().map(|store| store.len()).unwrap_or_default() >= 1);
    }

    #[test]
    fn no_verify_context_is_memoized() {
        let first = default_no_verify_context();
        let second = default_no_verify_context();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.lock().unwrap().verifies_peer());
    }
}
