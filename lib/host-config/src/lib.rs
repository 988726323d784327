//! Primitives for loading and querying host configuration.
#![deny(warnings)]
#![deny(missing_docs)]

use std::{borrow::Cow, collections::HashSet, path::Path, sync::Arc};

use anyhow::Error as GenericError;
use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment, Provider,
};
use serde::Deserialize;
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

mod provider;
use self::provider::ResolvedProvider;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Help text describing how to set the missing field.
        ///
        /// This is meant to be displayed to the user, and includes environment variable-specific text if environment
        /// variables had been loaded originally.
        help_text: String,

        /// Name of the missing field.
        ///
        /// This is a period-separated path to the field.
        field: Cow<'static, str>,
    },

    /// Configuration contained a field that is not recognized.
    #[snafu(display("Unknown field '{}' in configuration. Expected one of: {}.", field, expected.join(", ")))]
    UnknownField {
        /// Name of the unknown field.
        ///
        /// This is a period-separated path to the field.
        field: String,

        /// Fields that are valid at that location.
        expected: &'static [&'static str],
    },

    /// Requested field's data type was not the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        ///
        /// This is a period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Requested field's value was rejected for a reason other than its type.
    #[snafu(display("Invalid value for field '{}': {}", field, reason))]
    InvalidField {
        /// Name of the invalid field.
        ///
        /// This is a period-separated path to the field.
        field: String,

        /// Why the value was rejected.
        reason: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to query configuration: {}", source))]
    Generic {
        /// Error source.
        source: GenericError,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        from_figment_error(&HashSet::new(), None, e)
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum LookupSource {
    /// The configuration key is looked up in a form suitable for environment variables.
    Environment { prefix: String },
}

impl LookupSource {
    fn transform_key(&self, key: &str) -> String {
        match self {
            // The prefix is already uppercased with a trailing underscore, and nesting is expressed with a double
            // underscore to match how the environment provider is split.
            LookupSource::Environment { prefix } => format!("{}{}", prefix, key.replace('.', "__").to_uppercase()),
        }
    }
}

struct BoxedProvider(Box<dyn Provider + Send + Sync>);

impl Provider for BoxedProvider {
    fn metadata(&self) -> figment::Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        self.0.data()
    }
}

/// A configuration loader that can pull from various sources.
///
/// This loader wraps `figment` to expose a small API for loading configuration data from various sources, and then
/// querying it. Sources added later take precedence over sources added earlier.
///
/// # Supported sources
///
/// - YAML file, or YAML string
/// - JSON file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
#[derive(Default)]
pub struct ConfigurationLoader {
    lookup_sources: HashSet<LookupSource>,
    providers: Vec<BoxedProvider>,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let resolved_provider = ResolvedProvider::from_yaml(&path).map_err(GenericError::from).context(Generic)?;
        self.providers.push(BoxedProvider(Box::new(resolved_provider)));
        Ok(self)
    }

    /// Attempts to load the given YAML configuration file, ignoring any errors.
    ///
    /// Errors include the file not existing, not being readable/accessible, and not being valid YAML.
    pub fn try_from_yaml<P>(mut self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        match ResolvedProvider::from_yaml(&path) {
            Ok(resolved_provider) => {
                self.providers.push(BoxedProvider(Box::new(resolved_provider)));
            }
            Err(e) => {
                debug!(error = %e, file_path = %path.as_ref().to_string_lossy(), "Unable to read YAML configuration file. Ignoring.");
            }
        }
        self
    }

    /// Loads configuration from the given YAML document.
    ///
    /// # Errors
    ///
    /// If the document is not valid YAML, an error will be returned.
    pub fn from_yaml_str(mut self, contents: &str) -> Result<Self, ConfigurationError> {
        let resolved_provider = ResolvedProvider::from_yaml_str(contents)
            .map_err(GenericError::from)
            .context(Generic)?;
        self.providers.push(BoxedProvider(Box::new(resolved_provider)));
        Ok(self)
    }

    /// Loads the given JSON configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid JSON, an error will be returned.
    pub fn from_json<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let resolved_provider = ResolvedProvider::from_json(&path).map_err(GenericError::from).context(Generic)?;
        self.providers.push(BoxedProvider(Box::new(resolved_provider)));
        Ok(self)
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one. For example, with a
    /// prefix of `app`, any environment variable starting with `app_` would be matched. The prefix is
    /// case-insensitive.
    ///
    /// Nested keys are separated by a double underscore: `APP_OUTER__INNER=value` sets `outer.inner`.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, an error will be returned.
    pub fn from_environment(mut self, prefix: &'static str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_uppercase()
        } else {
            format!("{}_", prefix.to_uppercase())
        };

        // `Env` isn't `Send + Sync`, so we snapshot its data into a serialized provider instead.
        let env = Env::prefixed(&prefix).split("__");
        let values = env.data()?;
        if let Some(default_dict) = values.get(&figment::Profile::Default) {
            self.providers
                .push(BoxedProvider(Box::new(Serialized::defaults(default_dict.clone()))));
            self.lookup_sources.insert(LookupSource::Environment { prefix });
        }
        Ok(self)
    }

    /// Consumes the configuration loader and wraps it in a generic wrapper.
    pub fn into_generic(self) -> GenericConfiguration {
        GenericConfiguration {
            inner: Arc::new(Inner {
                figment: merge(self.providers.iter()),
                lookup_sources: self.lookup_sources,
            }),
        }
    }
}

fn merge<'a>(providers: impl Iterator<Item = &'a BoxedProvider>) -> Figment {
    providers.fold(Figment::new(), |figment, provider| figment.admerge(provider))
}

#[derive(Debug)]
struct Inner {
    figment: Figment,
    lookup_sources: HashSet<LookupSource>,
}

/// A generic configuration object.
///
/// This represents the merged configuration derived from [`ConfigurationLoader`] in its raw form. Values can be
/// queried by key, and extracted as typed values.
///
/// Keys must be in the form of `a.b.c`, where periods (`.`) are used to indicate a nested value.
#[derive(Clone, Debug)]
pub struct GenericConfiguration {
    inner: Arc<Inner>,
}

impl GenericConfiguration {
    fn get<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.inner
            .figment
            .extract_inner(key)
            .map_err(|e| from_figment_error(&self.inner.lookup_sources, Some(key), e))
    }

    /// Returns `true` if the given key is present in the configuration.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.figment.contains(key)
    }

    /// Gets a configuration value by key.
    ///
    /// ## Errors
    ///
    /// If the key does not exist in the configuration, or if the value could not be deserialized into `T`, an error
    /// variant will be returned.
    pub fn get_typed<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.get(key)
    }

    /// Gets a configuration value by key, if it exists.
    ///
    /// If the key does not exist, `Ok(None)` is returned. A key that exists but cannot be deserialized is an error,
    /// including when the value itself is missing one of its own required fields.
    ///
    /// ## Errors
    ///
    /// If the value could not be deserialized into `T`, an error will be returned.
    pub fn try_get_typed<'a, T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        if !self.contains(key) {
            return Ok(None);
        }

        self.get(key).map(Some)
    }
}

fn from_figment_error(
    lookup_sources: &HashSet<LookupSource>, key: Option<&str>, e: figment::Error,
) -> ConfigurationError {
    let mut path = field_path(key, &e.path);
    match &e.kind {
        Kind::MissingField(field) => {
            if path.last().map(String::as_str) != Some(&**field) {
                path.push(field.to_string());
            }
            let field = render_path(&path);

            // Environment variables can't address list entries.
            let mut valid_keys = if field.contains('[') {
                Vec::new()
            } else {
                lookup_sources
                    .iter()
                    .map(|source| source.transform_key(&field))
                    .collect::<Vec<_>>()
            };

            // Always specify the original key as a valid key to try.
            valid_keys.insert(0, field.clone());

            let help_text = format!("Try setting `{}`.", valid_keys.join("` or `"));

            ConfigurationError::MissingField {
                help_text,
                field: field.into(),
            }
        }
        Kind::UnknownField(field, expected) => {
            if path.last() != Some(field) {
                path.push(field.clone());
            }
            ConfigurationError::UnknownField {
                field: render_path(&path),
                expected: *expected,
            }
        }
        Kind::InvalidType(actual_ty, expected_ty) => ConfigurationError::InvalidFieldType {
            field: render_path(&path),
            expected_ty: expected_ty.clone(),
            actual_ty: actual_ty.to_string(),
        },
        Kind::Message(reason) if !path.is_empty() => ConfigurationError::InvalidField {
            field: render_path(&path),
            reason: reason.clone(),
        },
        _ => ConfigurationError::Generic { source: e.into() },
    }
}

/// Builds the path to an offending field, in document order, starting from the key that was looked up.
///
/// `figment` reports the path within the extracted value with the looked-up key's segments tacked onto the end, so
/// those are moved to the front.
fn field_path(key: Option<&str>, error_path: &[String]) -> Vec<String> {
    let Some(key) = key.filter(|key| !key.is_empty()) else {
        return error_path.to_vec();
    };

    let key_segments = key.split('.').map(String::from).collect::<Vec<_>>();
    let inner = if error_path.ends_with(&key_segments) {
        &error_path[..error_path.len() - key_segments.len()]
    } else if error_path.starts_with(&key_segments) {
        &error_path[key_segments.len()..]
    } else {
        error_path
    };

    key_segments.iter().chain(inner).cloned().collect()
}

/// Joins path segments with periods, rendering list positions as `[N]`.
fn render_path(segments: &[String]) -> String {
    let mut rendered = String::new();
    for segment in segments {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            rendered.push('[');
            rendered.push_str(segment);
            rendered.push(']');
        } else {
            if !rendered.is_empty() {
                rendered.push('.');
            }
            rendered.push_str(segment);
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use serde::Deserialize;
    use tempfile::NamedTempFile;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Listener {
        address: String,
        #[serde(default)]
        port: u16,
    }

    fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn yaml_file_typed_lookup() {
        let file = write_temp("listener:\n  address: localhost\n  port: 8443\nunrelated: true\n", ".yaml");
        let config = ConfigurationLoader::default().from_yaml(file.path()).unwrap().into_generic();

        let listener = config.get_typed::<Listener>("listener").unwrap();
        assert_eq!(
            listener,
            Listener {
                address: "localhost".to_string(),
                port: 8443
            }
        );
    }

    #[test]
    fn json_file_typed_lookup() {
        let file = write_temp(r#"{"listener": {"address": "127.0.0.1"}}"#, ".json");
        let config = ConfigurationLoader::default().from_json(file.path()).unwrap().into_generic();

        let listener = config.try_get_typed::<Listener>("listener").unwrap();
        assert_eq!(listener.map(|l| l.address), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn missing_yaml_file() {
        let result = ConfigurationLoader::default().from_yaml("/definitely/not/a/real/config.yaml");
        assert!(matches!(result, Err(ConfigurationError::Generic { .. })));

        // The lenient variant just skips it.
        let config = ConfigurationLoader::default()
            .try_from_yaml("/definitely/not/a/real/config.yaml")
            .into_generic();
        assert!(!config.contains("listener"));
    }

    #[test]
    fn later_sources_take_precedence() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("listener:\n  address: first\n  port: 1\n")
            .unwrap()
            .from_yaml_str("listener:\n  address: second\n")
            .unwrap()
            .into_generic();

        let listener = config.get_typed::<Listener>("listener").unwrap();
        assert_eq!(listener.address, "second");
        assert_eq!(listener.port, 1);
    }

    #[test]
    fn absent_key_is_none() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("other: 1\n")
            .unwrap()
            .into_generic();

        assert!(config.try_get_typed::<Listener>("listener").unwrap().is_none());
    }

    #[test]
    fn nested_missing_field_is_reported() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("listener:\n  port: 80\n")
            .unwrap()
            .into_generic();

        match config.try_get_typed::<Listener>("listener") {
            Err(ConfigurationError::MissingField { field, help_text }) => {
                assert_eq!(field, "listener.address");
                assert_eq!(help_text, "Try setting `listener.address`.");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unknown_field_is_reported() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("listener:\n  address: localhost\n  adress: typo\n")
            .unwrap()
            .into_generic();

        match config.get_typed::<Listener>("listener") {
            Err(ConfigurationError::UnknownField { field, expected }) => {
                assert_eq!(field, "listener.adress");
                assert!(expected.contains(&"address"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn invalid_field_type_is_reported() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("listener:\n  address: localhost\n  port: [1, 2]\n")
            .unwrap()
            .into_generic();

        match config.get_typed::<Listener>("listener") {
            Err(ConfigurationError::InvalidFieldType { field, .. }) => assert_eq!(field, "listener.port"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Server {
        listeners: Vec<Listener>,
    }

    #[test]
    fn list_positions_in_field_paths() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("app:\n  server:\n    listeners:\n      - address: a\n      - port: 2\n")
            .unwrap()
            .into_generic();

        match config.get_typed::<Server>("app.server") {
            Err(ConfigurationError::MissingField { field, help_text }) => {
                assert_eq!(field, "app.server.listeners[1].address");
                assert_eq!(help_text, "Try setting `app.server.listeners[1].address`.");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_field_suggests_environment_variable() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("listener:\n  port: 80\n")
            .unwrap()
            .from_environment("hostcfg_help")
            .unwrap()
            .into_generic();

        match config.get_typed::<Listener>("listener") {
            Err(ConfigurationError::MissingField { help_text, .. }) => {
                assert_eq!(help_text, "Try setting `listener.address` or `HOSTCFG_HELP_LISTENER__ADDRESS`.");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[derive(Debug)]
    #[allow(dead_code)]
    struct Even(u32);

    impl<'de> Deserialize<'de> for Even {
        fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let value = u32::deserialize(deserializer)?;
            if value % 2 != 0 {
                return Err(serde::de::Error::custom("value must be even"));
            }
            Ok(Self(value))
        }
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Workers {
        count: Even,
    }

    #[test]
    fn custom_rejection_names_field() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("workers:\n  count: 3\n")
            .unwrap()
            .into_generic();

        match config.get_typed::<Workers>("workers") {
            Err(ConfigurationError::InvalidField { field, reason }) => {
                assert_eq!(field, "workers.count");
                assert!(reason.contains("value must be even"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn field_path_puts_looked_up_key_first() {
        let path = ["client", "0", "cert", "extra_tls_certificates"].map(String::from);
        assert_eq!(
            render_path(&field_path(Some("extra_tls_certificates"), &path)),
            "extra_tls_certificates.client[0].cert"
        );

        let path = ["listeners", "1", "section", "outer"].map(String::from);
        assert_eq!(render_path(&field_path(Some("outer.section"), &path)), "outer.section.listeners[1]");

        assert_eq!(render_path(&field_path(None, &["a".to_string()])), "a");
    }

    #[test]
    fn empty_environment_prefix() {
        let result = ConfigurationLoader::default().from_environment("");
        assert!(matches!(result, Err(ConfigurationError::EmptyPrefix)));
    }

    #[test]
    fn environment_nested_keys() {
        std::env::set_var("HOSTCFG_TEST_LISTENER__ADDRESS", "env-host");
        std::env::set_var("HOSTCFG_TEST_LISTENER__PORT", "9000");

        let config = ConfigurationLoader::default()
            .from_yaml_str("listener:\n  address: file-host\n")
            .unwrap()
            .from_environment("hostcfg_test")
            .unwrap()
            .into_generic();

        let listener = config.get_typed::<Listener>("listener").unwrap();
        assert_eq!(listener.address, "env-host");
        assert_eq!(listener.port, 9000);
    }
}
