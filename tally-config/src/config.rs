use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_log::{LogConfig, LogLevel};
use tally_metrics::{BaselinePolicy, ConverterConfig, TtlConfig};

/// The base name of the config file.
const CONFIG_FILE_NAME: &str = "config.yml";

/// Defines the origin of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => write!(f, " (file {})", file_name.display()),
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    origin: ConfigErrorSource,
    kind: ConfigErrorKind,
    inner: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            origin: ConfigErrorSource::None,
            kind,
            inner: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            inner: Some(inner.into()),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn for_field<E>(inner: E, field: &'static str) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::wrap(inner, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.origin = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.origin = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.origin)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .as_deref()
            .map(|inner| inner as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to save a file.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

/// Values that override the configuration file, taken from CLI parameters or environment
/// variables.
///
/// All values are kept as strings and validated in [`Config::apply_override`], so that errors
/// name the offending field.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The log level, one of `error`, `warn`, `info`, `debug`, `trace` or `off`.
    pub log_level: Option<String>,
    /// Seconds after which inactive series are forgotten.
    pub max_age: Option<String>,
    /// Seconds between two sweeps of inactive series.
    pub sweep_interval: Option<String>,
    /// The baseline policy, `report` or `suppress`.
    pub baseline: Option<String>,
}

/// The contents of the config file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct ConfigValues {
    logging: LogConfig,
    conversion: ConverterConfig,
}

impl ConfigValues {
    fn path(base: &Path) -> PathBuf {
        base.join(CONFIG_FILE_NAME)
    }

    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }

    fn save(&self, base: &Path) -> Result<(), ConfigError> {
        let path = Self::path(base);
        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true).create(true);

        // Remove all non-user permissions for the newly created file
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut f = options
            .open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path))?;

        serde_yaml::to_writer(&mut f, self).map_err(|e| {
            ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path)
        })?;
        f.write_all(b"\n").ok();

        Ok(())
    }
}

/// Config struct.
#[derive(Debug)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// If the folder does not contain a config file, all values are defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let values = if Self::config_exists(&path) {
            ConfigValues::load(&path)?
        } else {
            tally_log::debug!(path = %path.display(), "no config file, using defaults");
            ConfigValues::default()
        };

        Ok(Config { values, path })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(level) = overrides.log_level {
            self.values.logging.level = level
                .parse::<LogLevel>()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        let conversion = &mut self.values.conversion;

        if let Some(max_age) = overrides.max_age {
            conversion.ttl.max_age = max_age
                .parse::<u64>()
                .map_err(|err| ConfigError::for_field(err, "max_age"))?;
        }

        if let Some(sweep_interval) = overrides.sweep_interval {
            conversion.ttl.sweep_interval = sweep_interval
                .parse::<u64>()
                .map_err(|err| ConfigError::for_field(err, "sweep_interval"))?;
        }

        if let Some(baseline) = overrides.baseline {
            conversion.baseline = baseline
                .parse::<BaselinePolicy>()
                .map_err(|err| ConfigError::for_field(err, "baseline"))?;
        }

        if conversion.ttl.max_age == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("max_age"));
        }

        Ok(self)
    }

    /// Checks if the config file exists in the given folder.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Saves the config in the given config folder as `config.yml`.
    ///
    /// Creates the folder if it does not exist.
    pub fn save_in_folder<P: AsRef<Path>>(&self, p: P) -> Result<(), ConfigError> {
        let path = p.as_ref();
        if fs::metadata(path).is_err() {
            fs::create_dir_all(path)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(path))?;
        }
        self.values.save(path)
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the configuration of the metric converter.
    pub fn conversion(&self) -> &ConverterConfig {
        &self.values.conversion
    }

    /// Returns the expiry settings of converter state.
    pub fn ttl(&self) -> TtlConfig {
        self.values.conversion.ttl
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: ConfigValues::default(),
            path: PathBuf::new(),
        }
    }
}
