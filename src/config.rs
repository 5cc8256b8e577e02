use crate::error::ConfigError;
use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "agreement.toml";
pub const DEFAULT_BIND: &str = "127.0.0.1:8501";

#[derive(Deserialize, Debug, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Raw `[email]` section. Any subset of the keys may be present.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct EmailConfig {
    pub sender_email: Option<String>,
    pub password: Option<String>,
    pub smtp_server: Option<String>,
    pub port: Option<u16>,
    pub admin_email: Option<String>,
}

/// Complete outbound mail credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub sender_email: String,
    pub password: String,
    pub smtp_server: String,
    pub port: u16,
    pub admin_email: Option<String>,
}

pub fn load_app_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config_content = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&config_content)?;
    Ok(config)
}

/// A missing file is normal; an unreadable or malformed one is worth a warning.
pub fn load_or_default(path: &Path) -> AppConfig {
    load_app_config(path).unwrap_or_else(|err| {
        let not_found = matches!(&err, ConfigError::IoError(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
        if !not_found {
            warn!("Could not load or parse '{}' ({}). Using defaults.", path.display(), err);
        }
        AppConfig::default()
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Environment values win over the file. `lookup` is `std::env::var(..).ok()`
    /// in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = non_blank(lookup("AGREEMENT_BIND")) {
            self.server.bind = bind;
        }
        let email = &mut self.email;
        for (key, slot) in [
            ("SMTP_SENDER_EMAIL", &mut email.sender_email),
            ("SMTP_PASSWORD", &mut email.password),
            ("SMTP_SERVER", &mut email.smtp_server),
            ("ADMIN_EMAIL", &mut email.admin_email),
        ] {
            if let Some(value) = non_blank(lookup(key)) {
                *slot = Some(value);
            }
        }
        if let Some(port) = non_blank(lookup("SMTP_PORT")) {
            match port.parse::<u16>() {
                Ok(port) => email.port = Some(port),
                Err(e) => warn!("Ignoring SMTP_PORT '{}': {}", port, e),
            }
        }
    }

    /// `None` means download-only mode.
    pub fn mail_settings(&self) -> Option<MailSettings> {
        let email = self.email.clone();
        let sender_email = non_blank(email.sender_email);
        let password = email.password.filter(|p| !p.is_empty());
        let smtp_server = non_blank(email.smtp_server);
        match (sender_email, password, smtp_server, email.port) {
            (Some(sender_email), Some(password), Some(smtp_server), Some(port)) => Some(MailSettings {
                sender_email,
                password,
                smtp_server,
                port,
                admin_email: non_blank(email.admin_email),
            }),
            (None, None, None, None) => None,
            _ => {
                warn!("Email settings are incomplete (need sender_email, password, smtp_server and port). Email sending is disabled.");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
[server]
bind = "0.0.0.0:9000"

[email]
sender_email = "contracts@theatm.agency"
password = "app-password"
smtp_server = "smtp.example.com"
port = 587
admin_email = "admin@theatm.agency"
"#;

    #[test]
    fn full_file_enables_mail() {
        let config: AppConfig = toml::from_str(FULL).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        let mail = config.mail_settings().unwrap();
        assert_eq!(mail.smtp_server, "smtp.example.com");
        assert_eq!(mail.port, 587);
        assert_eq!(mail.admin_email.as_deref(), Some("admin@theatm.agency"));
    }

    #[test]
    fn empty_file_means_download_only() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.mail_settings(), None);
    }

    #[test]
    fn partial_credentials_disable_mail() {
        let config: AppConfig = toml::from_str("[email]\nsender_email = \"a@b.co\"\nport = 587\n").unwrap();
        assert_eq!(config.mail_settings(), None);
    }

    #[test]
    fn environment_overrides_the_file() {
        let mut config: AppConfig = toml::from_str(FULL).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("SMTP_SERVER", "relay.internal"),
            ("SMTP_PORT", "2525"),
            ("ADMIN_EMAIL", "  "),
            ("AGREEMENT_BIND", "127.0.0.1:7000"),
        ]);
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        let mail = config.mail_settings().unwrap();
        assert_eq!(mail.smtp_server, "relay.internal");
        assert_eq!(mail.port, 2525);
        assert_eq!(mail.admin_email.as_deref(), Some("admin@theatm.agency"));
        assert_eq!(config.server.bind, "127.0.0.1:7000");
    }

    #[test]
    fn bad_port_in_environment_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == "SMTP_PORT").then(|| "smtp".to_string()));
        assert_eq!(config.email.port, None);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join(CONFIG_FILE_NAME));
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert!(matches!(
            load_app_config(&dir.path().join(CONFIG_FILE_NAME)),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[email\nport = ").unwrap();
        assert!(matches!(load_app_config(&path), Err(ConfigError::TomlError(_))));
        assert_eq!(load_or_default(&path).mail_settings(), None);
    }
}
