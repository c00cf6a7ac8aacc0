use std::{collections::HashSet, env::var, fmt};

use reward_utils::reward::RewardPolicy;
use sentry::types::Dsn;
use tracing::{error, warn};

use crate::rewards::RewardService;

#[derive(Clone)]
pub struct AppState {
    pub service: RewardService,
    pub env_vars: EnvVars,
}

#[derive(Clone, Debug)]
pub struct EnvVars {
    pub environment: Environment,
    pub mongodb_uri: String,
    pub sentry_dsn: Option<String>,
    pub port: u16,
    pub request_timeout_in_ms: u64,
    pub request_body_size_limit: usize,
    pub reward_policy: RewardPolicy,
    pub max_ads_per_day: Option<u32>,
    pub admin_user_ids: HashSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" => Environment::Development,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            other => {
                warn!("ENVIRONMENT value '{other}' is not valid. Defaulting to 'production'.");
                Environment::Production
            }
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        };
        f.write_str(s)
    }
}

impl EnvVars {
    pub fn new() -> Self {
        let Ok(mongodb_uri) = var("MONGODB_URI") else {
            error!("MONGODB_URI not set");
            panic!("MONGODB_URI required");
        };
        assert!(!mongodb_uri.is_empty(), "MONGODB_URI must not be empty");

        let sentry_dsn = match var("SENTRY_DSN") {
            Ok(dsn_string) => {
                assert!(
                    valid_sentry_dsn(&dsn_string),
                    "SENTRY_DSN is not valid DSN."
                );
                Some(dsn_string)
            }
            Err(_e) => {
                if cfg!(not(debug_assertions)) {
                    panic!("SENTRY_DSN is not allowed to be unset outside of a debug build");
                }
                warn!("SENTRY_DSN not set.");
                None
            }
        };

        let environment = match var("ENVIRONMENT") {
            Ok(v) => v.into(),
            Err(_e) => {
                warn!("ENVIRONMENT not set. Defaulting to 'production'.");
                Environment::Production
            }
        };

        let port = match var("PORT") {
            Ok(port_string) => port_string.parse().expect("PORT to be parseable as u16"),
            Err(_e) => {
                let default_port = 3003;
                warn!("PORT not set. Defaulting to {default_port}");
                default_port
            }
        };

        let request_timeout_in_ms = match var("REQUEST_TIMEOUT_IN_MS") {
            Ok(s) => s
                .parse()
                .expect("REQUEST_TIMEOUT_IN_MS to be valid unsigned integer"),
            Err(_e) => {
                let default_request_timeout = 30_000;
                warn!("REQUEST_TIMEOUT_IN_MS not set. Defaulting to {default_request_timeout}");
                default_request_timeout
            }
        };

        let request_body_size_limit = match var("REQUEST_BODY_SIZE_LIMIT") {
            Ok(s) => s
                .parse()
                .expect("REQUEST_BODY_SIZE_LIMIT to be valid unsigned integer"),
            Err(_e) => {
                let default_request_body_size_limit = 1 << 20;
                warn!(
                    "REQUEST_BODY_SIZE_LIMIT not set. Defaulting to {default_request_body_size_limit}"
                );
                default_request_body_size_limit
            }
        };

        let reward_policy = match var("REWARD_POLICY") {
            Ok(s) => match s.parse() {
                Ok(policy) => policy,
                Err(e) => panic!("REWARD_POLICY is not valid: {e}"),
            },
            Err(_e) => RewardPolicy::Flat,
        };

        // Unset or 0 means no per-user daily cap
        let max_ads_per_day = match var("MAX_ADS_PER_DAY") {
            Ok(val) => match val.parse::<u32>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(e) => {
                    warn!("Failed to parse MAX_ADS_PER_DAY ('{val}'): {e}; ignoring");
                    None
                }
            },
            Err(_) => None,
        };

        let admin_user_ids = match var("ADMIN_USER_IDS") {
            Ok(val) => parse_id_list(&val),
            Err(_) => {
                warn!("ADMIN_USER_IDS not set. Admin routes are disabled.");
                HashSet::new()
            }
        };

        Self {
            environment,
            mongodb_uri,
            sentry_dsn,
            port,
            request_timeout_in_ms,
            request_body_size_limit,
            reward_policy,
            max_ads_per_day,
            admin_user_ids,
        }
    }
}

fn valid_sentry_dsn(url: &str) -> bool {
    url.parse::<Dsn>().is_ok()
}

fn parse_id_list(val: &str) -> HashSet<String> {
    val.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
