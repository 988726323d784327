use std::path::Path;

use figment::{
    providers::{Data, Format, Json, Yaml},
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};

/// A provider whose data has already been read and parsed.
///
/// Reading eagerly means a missing or malformed file surfaces when it is added to the loader, rather than when the
/// merged configuration is first queried.
pub struct ResolvedProvider {
    data: Map<Profile, Dict>,
    metadata: Metadata,
}

impl ResolvedProvider {
    pub fn from_yaml<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file_data = std::fs::read_to_string(path.as_ref()).map_err(|e| e.to_string())?;

        Ok(Self {
            data: parse::<Yaml>(&file_data)?,
            metadata: Metadata::from("YAML file", path.as_ref()),
        })
    }

    pub fn from_json<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file_data = std::fs::read_to_string(path.as_ref()).map_err(|e| e.to_string())?;

        Ok(Self {
            data: parse::<Json>(&file_data)?,
            metadata: Metadata::from("JSON file", path.as_ref()),
        })
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, Error> {
        Ok(Self {
            data: parse::<Yaml>(contents)?,
            metadata: Metadata::named("YAML string"),
        })
    }
}

fn parse<F: Format>(contents: &str) -> Result<Map<Profile, Dict>, Error> {
    Data::<F>::string(contents).data()
}

impl Provider for ResolvedProvider {
    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        Ok(self.data.clone())
    }
}
