use std::env;
use std::io;
use std::path::PathBuf;

use super::BoxError;

pub const DEFAULT_MAX_CONVERSATIONS_PER_RUN: u32 = 25;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Single SQLite file shared by every store.
    pub db_path: PathBuf,
    /// Bearer secret required on the pipeline endpoints. Unset means open,
    /// for local development.
    pub cron_secret: Option<String>,
    /// PIN for the admin login. Unset means the admin surface is open.
    pub admin_pin: Option<String>,
    pub max_conversations_per_run: u32,
    pub lookback_days: u32,
    pub perplexity_model: String,
    /// Phone numbers from the environment that never get automated drafts.
    pub suppressed_phones: Vec<String>,
    /// Phrases from the environment that suppress drafting when present in
    /// a transcript.
    pub suppressed_phrases: Vec<String>,
    /// Exact auto-reply text to drop from transcripts.
    pub ignored_auto_reply: Option<String>,
    /// Number approved drafts are sent from.
    pub openphone_from_number: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = env::var("TRIAGE_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("TRIAGE_SERVICE_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(9400);

        let db_path = resolve_path(env::var("TRIAGE_DB_PATH").unwrap_or_else(|_| {
            default_runtime_root()
                .map(|root| root.join("state").join("triage.db"))
                .unwrap_or_else(|_| PathBuf::from("triage.db"))
                .to_string_lossy()
                .into_owned()
        }))?;

        let cron_secret = env_var_non_empty("CRON_SECRET");
        let admin_pin = env_var_non_empty("ADMIN_PIN");

        let max_conversations_per_run = env::var("MAX_CONVERSATIONS_PER_RUN")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_CONVERSATIONS_PER_RUN);
        let lookback_days = env::var("GMAIL_LOOKBACK_DAYS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_LOOKBACK_DAYS);

        let perplexity_model =
            env::var("PERPLEXITY_MODEL").unwrap_or_else(|_| "sonar".to_string());

        let suppressed_phones = parse_csv(env::var("SUPPRESSED_PHONES").ok().as_deref());
        let suppressed_phrases = parse_csv(env::var("SUPPRESSED_PHRASES").ok().as_deref());
        let ignored_auto_reply = env_var_non_empty("IGNORED_AUTO_REPLY_TEXT");
        let openphone_from_number = env_var_non_empty("OPENPHONE_FROM_NUMBER");

        Ok(Self {
            host,
            port,
            db_path,
            cron_secret,
            admin_pin,
            max_conversations_per_run,
            lookback_days,
            perplexity_model,
            suppressed_phones,
            suppressed_phrases,
            ignored_auto_reply,
            openphone_from_number,
        })
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn default_runtime_root() -> Result<PathBuf, io::Error> {
    let home =
        env::var("HOME").map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".triage_service"))
}

fn resolve_path(raw: String) -> Result<PathBuf, io::Error> {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir()?;
        Ok(cwd.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        key: String,
        previous: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let previous = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                previous,
            }
        }

        fn unset(key: &str) -> Self {
            let previous = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                previous,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => env::set_var(&self.key, value),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _port = EnvGuard::unset("TRIAGE_SERVICE_PORT");
        let _cap = EnvGuard::unset("MAX_CONVERSATIONS_PER_RUN");
        let _secret = EnvGuard::unset("CRON_SECRET");

        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.port, 9400);
        assert_eq!(config.max_conversations_per_run, 25);
        assert_eq!(config.lookback_days, 3);
        assert!(config.cron_secret.is_none());
    }

    #[test]
    fn csv_lists_are_trimmed_and_filtered() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _phones = EnvGuard::set("SUPPRESSED_PHONES", "+1555000, ,+1555001 ");
        let _phrases = EnvGuard::set("SUPPRESSED_PHRASES", "stop, unsubscribe");

        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.suppressed_phones, vec!["+1555000", "+1555001"]);
        assert_eq!(config.suppressed_phrases, vec!["stop", "unsubscribe"]);
    }

    #[test]
    fn blank_secret_counts_as_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _secret = EnvGuard::set("CRON_SECRET", "   ");

        let config = ServiceConfig::from_env().expect("config");
        assert!(config.cron_secret.is_none());
    }
}
