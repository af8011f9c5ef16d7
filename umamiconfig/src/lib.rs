#![allow(clippy::multiple_crate_versions)]

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const APP_NAME: &str = "umami";
pub const DEFAULT_DAYS_BACK: u32 = 30;

pub const ENV_URL: &str = "UMAMI_URL";
pub const ENV_USERNAME: &str = "UMAMI_USERNAME";
pub const ENV_PASSWORD: &str = "UMAMI_PASSWORD";
pub const ENV_WEBSITE_ID: &str = "UMAMI_WEBSITE_ID";
pub const ENV_DEFAULT_DAYS_BACK: &str = "UMAMI_DEFAULT_DAYS_BACK";

/// Where the password comes from: inline, an environment variable, or the
/// output of a shell command.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Secret {
    Literal(String),
    Env { env: String },
    Cmd { cmd: String },
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(_) => f.write_str("Literal(<redacted>)"),
            Self::Env { env } => f.debug_struct("Env").field("env", env).finish(),
            Self::Cmd { cmd } => f.debug_struct("Cmd").field("cmd", cmd).finish(),
        }
    }
}

impl Default for Secret {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UmamiConfig {
    /// Umami instance URL, e.g. `https://analytics.example.com`
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Secret,
    /// Website to report on
    #[serde(default)]
    pub website_id: String,
    /// Days to look back when a command does not say otherwise
    #[serde(default = "default_days_back")]
    pub default_days_back: u32,
}

impl Default for UmamiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: Secret::default(),
            website_id: String::new(),
            default_days_back: DEFAULT_DAYS_BACK,
        }
    }
}

const fn default_days_back() -> u32 {
    DEFAULT_DAYS_BACK
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Confy(#[from] confy::ConfyError),
    #[error("missing `{field}`; set it in the umami config file or via {env}")]
    MissingField {
        field: &'static str,
        env: &'static str,
    },
    #[error("`default_days_back` must be a positive integer, got {value}")]
    InvalidDaysBack { value: String },
    #[error("environment variable '{env}' not found")]
    MissingEnv { env: String },
    #[error("password command failed: {cmd}: {message}")]
    CommandFailed { cmd: String, message: String },
    #[error("failed to execute password command '{cmd}': {source}")]
    CommandExec { cmd: String, source: io::Error },
    #[error("password command returned empty output: {cmd}")]
    CommandEmpty { cmd: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl UmamiConfig {
    /// Loads the config file from the standard OS location, applies
    /// `UMAMI_*` environment overrides and validates the result.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, an override is malformed,
    /// or a required setting is missing.
    pub fn load() -> Result<Self> {
        let config: Self = confy::load(APP_NAME, None)?;
        config.finish(|name| std::env::var(name).ok())
    }

    /// Like [`UmamiConfig::load`], but reads the given file.
    ///
    /// # Errors
    /// Same as [`UmamiConfig::load`].
    pub fn load_path(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = confy::load_path(path)?;
        config.finish(|name| std::env::var(name).ok())
    }

    /// Path of the config file used by [`UmamiConfig::load`].
    ///
    /// # Errors
    /// Returns an error if the OS config directory cannot be determined.
    pub fn path() -> Result<PathBuf> {
        Ok(confy::get_configuration_file_path(APP_NAME, None)?)
    }

    /// Stores the config to the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn store(&self) -> Result<()> {
        confy::store(APP_NAME, None, self)?;
        Ok(())
    }

    fn finish(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        self.apply_env(lookup)?;
        self.validate()?;
        Ok(self)
    }

    /// Overrides settings with non-blank values returned by `lookup` for the
    /// `UMAMI_*` variable names. `UMAMI_PASSWORD` only has to be non-empty and
    /// is taken verbatim.
    ///
    /// # Errors
    /// Returns an error if `UMAMI_DEFAULT_DAYS_BACK` is not a positive integer.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_blank(ENV_URL) {
            self.url = url;
        }
        if let Some(username) = non_blank(ENV_USERNAME) {
            self.username = username;
        }
        if let Some(password) = lookup(ENV_PASSWORD).filter(|value| !value.is_empty()) {
            self.password = Secret::Literal(password);
        }
        if let Some(website_id) = non_blank(ENV_WEBSITE_ID) {
            self.website_id = website_id;
        }
        if let Some(days) = non_blank(ENV_DEFAULT_DAYS_BACK) {
            self.default_days_back = parse_days_back(&days)?;
        }
        Ok(())
    }

    /// Checks that every required setting is present.
    ///
    /// # Errors
    /// Returns the first missing setting, or `InvalidDaysBack` for a zero
    /// lookback.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("url", ENV_URL, self.url.as_str()),
            ("username", ENV_USERNAME, self.username.as_str()),
            ("website_id", ENV_WEBSITE_ID, self.website_id.as_str()),
        ];
        for (field, env, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField { field, env });
            }
        }
        if let Secret::Literal(value) = &self.password {
            if value.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "password",
                    env: ENV_PASSWORD,
                });
            }
        }
        if self.default_days_back == 0 {
            return Err(ConfigError::InvalidDaysBack {
                value: self.default_days_back.to_string(),
            });
        }
        Ok(())
    }

    /// Resolves the password from the configured source.
    ///
    /// # Errors
    /// Returns an error if the password cannot be resolved or is empty.
    pub fn password(&self) -> Result<String> {
        self.password.resolve()
    }
}

fn parse_days_back(value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(days) if days > 0 => Ok(days),
        _ => Err(ConfigError::InvalidDaysBack {
            value: value.to_string(),
        }),
    }
}

impl Secret {
    /// Passwords are used exactly as configured. Command output only loses
    /// its trailing line break.
    fn resolve(&self) -> Result<String> {
        match self {
            Self::Literal(value) => {
                if value.is_empty() {
                    return Err(ConfigError::MissingField {
                        field: "password",
                        env: ENV_PASSWORD,
                    });
                }
                Ok(value.clone())
            }
            Self::Env { env } => match std::env::var(env) {
                Ok(value) if !value.is_empty() => Ok(value),
                _ => Err(ConfigError::MissingEnv { env: env.clone() }),
            },
            Self::Cmd { cmd } => {
                let output = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .output()
                    .map_err(|source| ConfigError::CommandExec {
                        cmd: cmd.clone(),
                        source,
                    })?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(ConfigError::CommandFailed {
                        cmd: cmd.clone(),
                        message: stderr.trim().to_string(),
                    });
                }

                let stdout = String::from_utf8_lossy(&output.stdout);
                let password = strip_line_break(&stdout);
                if password.is_empty() {
                    return Err(ConfigError::CommandEmpty { cmd: cmd.clone() });
                }
                Ok(password.to_string())
            }
        }
    }
}

fn strip_line_break(output: &str) -> &str {
    output
        .strip_suffix('\n')
        .map_or(output, |line| line.strip_suffix('\r').unwrap_or(line))
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Secret, UmamiConfig, DEFAULT_DAYS_BACK};
    use std::collections::HashMap;
    use std::io::Write;

    fn complete() -> UmamiConfig {
        UmamiConfig {
            url: "https://analytics.example.com".to_string(),
            username: "admin".to_string(),
            password: Secret::Literal("hunter2".to_string()),
            website_id: "site-1".to_string(),
            default_days_back: DEFAULT_DAYS_BACK,
        }
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn default_lookback_is_thirty() {
        assert_eq!(UmamiConfig::default().default_days_back, 30);
    }

    #[test]
    fn complete_config_validates() {
        complete().validate().unwrap();
    }

    #[test]
    fn missing_fields_are_reported_in_order() {
        let mut config = complete();
        config.website_id = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "website_id",
                ..
            }
        ));
        assert!(err.to_string().contains("UMAMI_WEBSITE_ID"));

        let err = UmamiConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "url", .. }));
    }

    #[test]
    fn empty_password_is_missing() {
        let mut config = complete();
        config.password = Secret::Literal(String::new());
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "password",
                ..
            }
        ));
    }

    #[test]
    fn zero_lookback_is_rejected() {
        let mut config = complete();
        config.default_days_back = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidDaysBack { .. }
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = complete();
        config
            .apply_env(env(&[
                ("UMAMI_URL", "https://stats.example.org/"),
                ("UMAMI_PASSWORD", "from-env"),
                ("UMAMI_DEFAULT_DAYS_BACK", "7"),
                ("UMAMI_USERNAME", ""),
            ]))
            .unwrap();
        assert_eq!(config.url, "https://stats.example.org/");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password().unwrap(), "from-env");
        assert_eq!(config.default_days_back, 7);
        assert_eq!(config.website_id, "site-1");
    }

    #[test]
    fn env_lookback_must_be_positive() {
        for bad in ["0", "-3", "thirty"] {
            let mut config = complete();
            let err = config
                .apply_env(env(&[("UMAMI_DEFAULT_DAYS_BACK", bad)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidDaysBack { .. }), "{bad}");
        }
    }

    #[test]
    fn literal_password_keeps_whitespace() {
        let secret = Secret::Literal("  pa ss  ".to_string());
        assert_eq!(secret.resolve().unwrap(), "  pa ss  ");
    }

    #[test]
    fn whitespace_only_password_is_a_password() {
        let mut config = complete();
        config.password = Secret::Literal("   ".to_string());
        config.validate().unwrap();
        assert_eq!(config.password().unwrap(), "   ");
    }

    #[test]
    fn env_password_keeps_whitespace() {
        let var = format!("UMAMICONFIG_TEST_PASSWORD_{}", std::process::id());
        std::env::set_var(&var, " envvalue\t");
        let secret = Secret::Env { env: var.clone() };
        assert_eq!(secret.resolve().unwrap(), " envvalue\t");
        std::env::remove_var(&var);
    }

    #[test]
    fn env_override_password_is_verbatim() {
        let mut config = complete();
        config.apply_env(env(&[("UMAMI_PASSWORD", "  ")])).unwrap();
        assert_eq!(config.password().unwrap(), "  ");

        let mut config = complete();
        config.apply_env(env(&[("UMAMI_PASSWORD", "")])).unwrap();
        assert_eq!(config.password().unwrap(), "hunter2");
    }

    #[test]
    fn cmd_password_loses_only_the_line_break() {
        let secret = Secret::Cmd {
            cmd: "printf ' cmd value \\n'".to_string(),
        };
        assert_eq!(secret.resolve().unwrap(), " cmd value ");

        let secret = Secret::Cmd {
            cmd: "printf 'crlf\\r\\n'".to_string(),
        };
        assert_eq!(secret.resolve().unwrap(), "crlf");
    }

    #[test]
    fn cmd_empty_output_is_error() {
        let secret = Secret::Cmd {
            cmd: "printf ''".to_string(),
        };
        let err = secret.resolve().unwrap_err();
        assert!(matches!(err, ConfigError::CommandEmpty { .. }));
    }

    #[test]
    fn debug_hides_literal_password() {
        let rendered = format!("{:?}", complete());
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "url = \"https://analytics.example.com\"\nusername = \"admin\"\npassword = {{ cmd = \"printf secret\" }}\nwebsite_id = \"site-1\""
        )
        .unwrap();

        let mut config: UmamiConfig = confy::load_path(file.path()).unwrap();
        config.apply_env(env(&[])).unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_days_back, DEFAULT_DAYS_BACK);
        assert!(matches!(config.password, Secret::Cmd { .. }));
        assert_eq!(config.password().unwrap(), "secret");
    }
}
