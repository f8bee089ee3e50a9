use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    classifier::ClassifierRules,
    errors::Error,
    sync::DEFAULT_WINDOW_DAYS,
    webhook::queue::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY},
    Result,
};

const DEFAULT_PORT: u16 = 8000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaidEnvironment {
    Sandbox,
    Development,
    Production,
}

impl PlaidEnvironment {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" => Some(Self::Sandbox),
            "development" => Some(Self::Development),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.plaid.com",
            Self::Development => "https://development.plaid.com",
            Self::Production => "https://production.plaid.com",
        }
    }
}

/// Typed configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Provider
    pub plaid_client_id: String,
    pub plaid_secret: String,
    pub plaid_env: PlaidEnvironment,
    pub plaid_client_name: String,
    pub plaid_webhook_url: Option<String>,
    pub plaid_page_size: u32,
    pub plaid_max_pages: u32,

    // Store
    pub supabase_url: String,
    pub supabase_service_key: String,

    // Places
    pub google_places_api_key: Option<String>,

    // HTTP
    pub bind_addr: SocketAddr,
    pub http_timeout: Duration,

    // Processing
    pub sync_window_days: u32,
    pub webhook_queue_capacity: usize,
    pub webhook_workers: usize,
    pub enrich_max_concurrency: Option<usize>,
    pub classifier_rules_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new("config/.env"));
        load_dotenv_if_present(Path::new(".env"));
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let plaid_client_id = required("PLAID_CLIENT_ID")?;
        let plaid_secret = required("PLAID_SECRET")?;
        let supabase_url = required("SUPABASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let supabase_service_key = required("SUPABASE_SERVICE_KEY")?;

        let plaid_env = match env_str("PLAID_ENV").and_then(non_empty) {
            None => PlaidEnvironment::Sandbox,
            Some(v) => PlaidEnvironment::parse(&v)
                .ok_or_else(|| Error::Config(format!("unknown PLAID_ENV: {v}")))?,
        };
        let plaid_client_name =
            env_str("PLAID_CLIENT_NAME").and_then(non_empty).unwrap_or("FoodFeed".to_string());
        let plaid_webhook_url = env_str("PLAID_WEBHOOK_URL").and_then(non_empty);
        // Plaid caps `count` at 500.
        let plaid_page_size = env_u32("PLAID_PAGE_SIZE").unwrap_or(250).clamp(1, 500);
        let plaid_max_pages = env_u32("PLAID_MAX_PAGES").unwrap_or(40).max(1);

        let google_places_api_key = env_str("GOOGLE_PLACES_API_KEY").and_then(non_empty);

        let bind_addr = resolve_bind_addr(
            env_str("BIND_ADDR").and_then(non_empty),
            env_str("PORT").and_then(non_empty),
        )?;
        let http_timeout = Duration::from_millis(env_u64("HTTP_TIMEOUT_MS").unwrap_or(10_000));

        let sync_window_days = env_u32("SYNC_WINDOW_DAYS").unwrap_or(DEFAULT_WINDOW_DAYS);
        let webhook_queue_capacity =
            env_usize("WEBHOOK_QUEUE_CAPACITY").unwrap_or(DEFAULT_QUEUE_CAPACITY).max(1);
        let webhook_workers = env_usize("WEBHOOK_WORKERS").unwrap_or(DEFAULT_MAX_IN_FLIGHT).max(1);
        let enrich_max_concurrency = env_usize("ENRICH_MAX_CONCURRENCY").filter(|n| *n > 0);
        let classifier_rules_path = env_str("CLASSIFIER_RULES_PATH")
            .and_then(non_empty)
            .map(PathBuf::from);

        Ok(Self {
            plaid_client_id,
            plaid_secret,
            plaid_env,
            plaid_client_name,
            plaid_webhook_url,
            plaid_page_size,
            plaid_max_pages,
            supabase_url,
            supabase_service_key,
            google_places_api_key,
            bind_addr,
            http_timeout,
            sync_window_days,
            webhook_queue_capacity,
            webhook_workers,
            enrich_max_concurrency,
            classifier_rules_path,
        })
    }

    /// Rules file if configured, built-in lists otherwise.
    pub fn classifier_rules(&self) -> Result<ClassifierRules> {
        match &self.classifier_rules_path {
            Some(p) => ClassifierRules::load(p).map_err(|e| {
                Error::Config(format!("failed to load classifier rules {}: {e}", p.display()))
            }),
            None => Ok(ClassifierRules::default()),
        }
    }
}

/// `BIND_ADDR` wins; otherwise all interfaces on `PORT` (default 8000).
fn resolve_bind_addr(bind: Option<String>, port: Option<String>) -> Result<SocketAddr> {
    if let Some(v) = bind {
        return v
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid BIND_ADDR {v}: {e}")));
    }
    let port = match port {
        None => DEFAULT_PORT,
        Some(p) => p
            .trim()
            .parse::<u16>()
            .map_err(|e| Error::Config(format!("invalid PORT {p}: {e}")))?,
    };
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}

fn required(key: &str) -> Result<String> {
    env_str(key)
        .and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
