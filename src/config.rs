use std::env;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Per-minute request budgets for the rate limit tiers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub strict_rpm: u32,
    pub standard_rpm: u32,
    pub relaxed_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_rpm: 10,
            standard_rpm: 30,
            relaxed_rpm: 60,
        }
    }
}

/// Mercado Pago credentials and endpoint.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub access_token: String,
    /// When set, webhook `x-signature` headers are verified against it.
    pub webhook_secret: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    pub db_timeout_secs: u64,
    pub gateway: GatewayConfig,
    pub session_secret: Vec<u8>,
    pub session_ttl_hours: u64,
    pub download_base_url: String,
    pub rate_limit: RateLimitConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("STOREFRONT_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_or("PORT", 3000);

        let base_url = env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let access_token = match env::var("MERCADOPAGO_ACCESS_TOKEN") {
            Ok(token) => token,
            Err(_) if dev_mode => {
                tracing::warn!("MERCADOPAGO_ACCESS_TOKEN not set; gateway calls will fail");
                String::new()
            }
            Err(_) => return Err("MERCADOPAGO_ACCESS_TOKEN must be set".into()),
        };

        let session_secret = match env::var("SESSION_SECRET") {
            Ok(encoded) => {
                let decoded = BASE64
                    .decode(encoded.trim())
                    .map_err(|e| format!("Invalid SESSION_SECRET encoding: {}", e))?;
                if decoded.len() < 32 {
                    return Err(format!(
                        "SESSION_SECRET must decode to at least 32 bytes, got {}",
                        decoded.len()
                    ));
                }
                decoded
            }
            Err(_) if dev_mode => {
                tracing::warn!("SESSION_SECRET not set; using an ephemeral key (sessions reset on restart)");
                crate::identity::generate_session_secret()
            }
            Err(_) => return Err("SESSION_SECRET must be set".into()),
        };

        let rate_limit = RateLimitConfig {
            strict_rpm: env_or("RATE_LIMIT_STRICT_RPM", 10),
            standard_rpm: env_or("RATE_LIMIT_STANDARD_RPM", 30),
            relaxed_rpm: env_or("RATE_LIMIT_RELAXED_RPM", 60),
        };
        if rate_limit.strict_rpm == 0 || rate_limit.standard_rpm == 0 || rate_limit.relaxed_rpm == 0 {
            return Err("Rate limits must be greater than 0".into());
        }

        Ok(Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "storefront.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "storefront_audit.db".to_string()),
            download_base_url: env::var("DOWNLOAD_BASE_URL")
                .unwrap_or_else(|_| format!("{}/files", base_url)),
            base_url,
            dev_mode,
            db_timeout_secs: env_or("DB_TIMEOUT_SECS", 5),
            gateway: GatewayConfig {
                access_token,
                webhook_secret: env::var("MERCADOPAGO_WEBHOOK_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty()),
                api_base: env::var("MERCADOPAGO_API_BASE")
                    .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
                timeout_secs: env_or("GATEWAY_TIMEOUT_SECS", 10),
            },
            session_secret,
            session_ttl_hours: env_or("SESSION_TTL_HOURS", 168),
            rate_limit,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
