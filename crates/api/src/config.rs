//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `API_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `API_JWT_SECRET` - HS256 signing secret (min 32 chars, high entropy)
//! - `API_BASE_URL` - Public URL of the shop, used in email links
//!
//! ## Optional
//! - `API_HOST` - Bind address (default: 127.0.0.1)
//! - `API_PORT` - Listen port (default: 4000)
//! - `API_CORS_ORIGINS` - Comma-separated allowed origins (default: `API_BASE_URL`)
//! - `JWT_TTL_HOURS` - Access token lifetime (default: 168)
//! - `UPLOAD_DIR` - Directory for uploaded images (default: uploads)
//! - `UPLOAD_MAX_BYTES` - Maximum upload size (default: 5 MiB)
//! - `TAX_RATE` - Tax rate as a fraction (default: 0.08)
//! - `SHIPPING_FLAT_RATE` - Shipping below the free threshold (default: 5.99)
//! - `FREE_SHIPPING_THRESHOLD` - Subtotal for free shipping (default: 50.00)
//! - `ORDER_RETENTION_DAYS` - Days before order PII is anonymized (default: 2555)
//! - `CURRENCY` - ISO currency code (default: USD)
//! - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`, `STRIPE_PUBLISHABLE_KEY`
//! - `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`, `PAYPAL_WEBHOOK_ID`, `PAYPAL_MODE`
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! Stripe, `PayPal` and SMTP are all-or-nothing groups: leaving a group out
//! disables the feature, setting only part of it is an error.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use emporium_core::{CurrencyCode, PricingRules};

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_UPLOAD_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
    #[error("Incomplete {0} configuration: missing {1}")]
    IncompleteGroup(&'static str, String),
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the shop
    pub base_url: String,
    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
    /// JWT signing secret and token lifetime
    pub jwt: JwtConfig,
    /// Totals, tax and shipping
    pub pricing: PricingRules,
    /// Currency every price is expressed in
    pub currency: CurrencyCode,
    /// Days an order keeps its PII
    pub order_retention_days: i64,
    /// Local image storage
    pub uploads: UploadConfig,
    /// Stripe, if configured
    pub stripe: Option<StripeConfig>,
    /// `PayPal`, if configured
    pub paypal: Option<PayPalConfig>,
    /// SMTP, if configured. Without it emails are logged instead of sent.
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 - 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry performance sample rate (0.0 - 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// JWT issuing configuration.
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub ttl_hours: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}

/// Upload storage configuration.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    /// Safe to hand to browsers.
    pub publishable_key: Option<String>,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("publishable_key", &self.publishable_key)
            .finish()
    }
}

/// `PayPal` environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayPalMode {
    Sandbox,
    Live,
}

impl PayPalMode {
    /// REST API base URL for this environment.
    #[must_use]
    pub const fn api_base(self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-m.sandbox.paypal.com",
            Self::Live => "https://api-m.paypal.com",
        }
    }
}

/// `PayPal` REST API configuration.
#[derive(Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub webhook_id: String,
    pub mode: PayPalMode,
}

impl std::fmt::Debug for PayPalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("webhook_id", &self.webhook_id)
            .field("mode", &self.mode)
            .finish()
    }
}

/// SMTP configuration for transactional email.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("API_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("API_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("API_PORT", "4000")?;
        let base_url = get_required_env("API_BASE_URL")?;
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("API_BASE_URL".to_string(), e.to_string()))?;

        let cors_origins = get_optional_env("API_CORS_ORIGINS").map_or_else(
            || vec![base_url.trim_end_matches('/').to_string()],
            |raw| parse_list(&raw),
        );

        let jwt_secret = get_validated_secret("API_JWT_SECRET")?;
        validate_jwt_secret(&jwt_secret, "API_JWT_SECRET")?;
        let ttl_hours = parse_env_or_default::<i64>("JWT_TTL_HOURS", "168")?;
        if ttl_hours <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "JWT_TTL_HOURS".to_string(),
                "must be positive".to_string(),
            ));
        }

        let pricing = PricingRules {
            tax_rate: parse_env_or_default::<Decimal>("TAX_RATE", "0.08")?,
            shipping_flat_rate: parse_env_or_default::<Decimal>("SHIPPING_FLAT_RATE", "5.99")?,
            free_shipping_threshold: parse_env_or_default::<Decimal>(
                "FREE_SHIPPING_THRESHOLD",
                "50.00",
            )?,
        };
        validate_pricing(&pricing)?;

        let currency = parse_env_or_default::<CurrencyCode>("CURRENCY", "USD")?;
        let order_retention_days = parse_env_or_default::<i64>("ORDER_RETENTION_DAYS", "2555")?;
        if !(1..=36_500).contains(&order_retention_days) {
            return Err(ConfigError::InvalidEnvVar(
                "ORDER_RETENTION_DAYS".to_string(),
                "must be between 1 and 36500".to_string(),
            ));
        }

        let uploads = UploadConfig {
            dir: PathBuf::from(get_env_or_default("UPLOAD_DIR", "uploads")),
            max_bytes: get_optional_env("UPLOAD_MAX_BYTES")
                .map(|v| {
                    v.parse::<usize>().map_err(|e| {
                        ConfigError::InvalidEnvVar("UPLOAD_MAX_BYTES".to_string(), e.to_string())
                    })
                })
                .transpose()?
                .unwrap_or(DEFAULT_UPLOAD_MAX_BYTES),
        };

        let stripe = StripeConfig::from_values(
            get_optional_env("STRIPE_SECRET_KEY"),
            get_optional_env("STRIPE_WEBHOOK_SECRET"),
            get_optional_env("STRIPE_PUBLISHABLE_KEY"),
        )?;
        let paypal = PayPalConfig::from_values(
            get_optional_env("PAYPAL_CLIENT_ID"),
            get_optional_env("PAYPAL_CLIENT_SECRET"),
            get_optional_env("PAYPAL_WEBHOOK_ID"),
            get_optional_env("PAYPAL_MODE"),
        )?;
        let email = EmailConfig::from_values(
            get_optional_env("SMTP_HOST"),
            get_optional_env("SMTP_PORT"),
            get_optional_env("SMTP_USERNAME"),
            get_optional_env("SMTP_PASSWORD"),
            get_optional_env("SMTP_FROM"),
        )?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = parse_env_or_default::<f32>("SENTRY_SAMPLE_RATE", "1.0")?;
        let sentry_traces_sample_rate =
            parse_env_or_default::<f32>("SENTRY_TRACES_SAMPLE_RATE", "0.1")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
            cors_origins,
            jwt: JwtConfig {
                secret: jwt_secret,
                ttl_hours,
            },
            pricing,
            currency,
            order_retention_days,
            uploads,
            stripe,
            paypal,
            email,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StripeConfig {
    fn from_values(
        secret_key: Option<String>,
        webhook_secret: Option<String>,
        publishable_key: Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        match (secret_key, webhook_secret) {
            (None, None) => Ok(None),
            (Some(secret_key), Some(webhook_secret)) => Ok(Some(Self {
                secret_key: SecretString::from(secret_key),
                webhook_secret: SecretString::from(webhook_secret),
                publishable_key,
            })),
            (Some(_), None) => Err(ConfigError::IncompleteGroup(
                "Stripe",
                "STRIPE_WEBHOOK_SECRET".to_string(),
            )),
            (None, Some(_)) => Err(ConfigError::IncompleteGroup(
                "Stripe",
                "STRIPE_SECRET_KEY".to_string(),
            )),
        }
    }
}

impl PayPalConfig {
    fn from_values(
        client_id: Option<String>,
        client_secret: Option<String>,
        webhook_id: Option<String>,
        mode: Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let mode = match mode.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("sandbox") => PayPalMode::Sandbox,
            Some("live") => PayPalMode::Live,
            Some(other) => {
                return Err(ConfigError::InvalidEnvVar(
                    "PAYPAL_MODE".to_string(),
                    format!("expected sandbox or live, got {other}"),
                ));
            }
        };

        let group = [
            ("PAYPAL_CLIENT_ID", client_id.is_some()),
            ("PAYPAL_CLIENT_SECRET", client_secret.is_some()),
            ("PAYPAL_WEBHOOK_ID", webhook_id.is_some()),
        ];

        match (client_id, client_secret, webhook_id) {
            (None, None, None) => Ok(None),
            (Some(client_id), Some(client_secret), Some(webhook_id)) => Ok(Some(Self {
                client_id,
                client_secret: SecretString::from(client_secret),
                webhook_id,
                mode,
            })),
            _ => Err(ConfigError::IncompleteGroup("PayPal", missing_keys(&group))),
        }
    }
}

impl EmailConfig {
    fn from_values(
        host: Option<String>,
        port: Option<String>,
        username: Option<String>,
        password: Option<String>,
        from: Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let group = [
            ("SMTP_HOST", host.is_some()),
            ("SMTP_USERNAME", username.is_some()),
            ("SMTP_PASSWORD", password.is_some()),
            ("SMTP_FROM", from.is_some()),
        ];

        let smtp_port = port
            .as_deref()
            .unwrap_or("587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        match (host, username, password, from) {
            (None, None, None, None) => Ok(None),
            (Some(smtp_host), Some(smtp_username), Some(password), Some(from_address)) => {
                Ok(Some(Self {
                    smtp_host,
                    smtp_port,
                    smtp_username,
                    smtp_password: SecretString::from(password),
                    from_address,
                }))
            }
            _ => Err(ConfigError::IncompleteGroup("SMTP", missing_keys(&group))),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Split a comma-separated list, dropping blanks and trailing slashes.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn missing_keys(group: &[(&str, bool)]) -> String {
    group
        .iter()
        .filter(|(_, present)| !present)
        .map(|(key, _)| *key)
        .collect::<Vec<_>>()
        .join(", ")
}

fn validate_pricing(rules: &PricingRules) -> Result<(), ConfigError> {
    if rules.tax_rate < Decimal::ZERO || rules.tax_rate >= Decimal::ONE {
        return Err(ConfigError::InvalidEnvVar(
            "TAX_RATE".to_string(),
            "must be a fraction in [0, 1)".to_string(),
        ));
    }
    if rules.shipping_flat_rate < Decimal::ZERO {
        return Err(ConfigError::InvalidEnvVar(
            "SHIPPING_FLAT_RATE".to_string(),
            "must not be negative".to_string(),
        ));
    }
    if rules.free_shipping_threshold < Decimal::ZERO {
        return Err(ConfigError::InvalidEnvVar(
            "FREE_SHIPPING_THRESHOLD".to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Validate that the JWT secret meets minimum length requirements.
fn validate_jwt_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// A complete configuration with every optional group disabled.
    pub(crate) fn test_config() -> ApiConfig {
        ApiConfig {
            database_url: SecretString::from("postgres://localhost/emporium_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 4000,
            base_url: "http://localhost:4000".to_string(),
            cors_origins: vec!["http://localhost:5173".to_string()],
            jwt: JwtConfig {
                secret: SecretString::from("k9$Qz!2mW#x7Lp@4Rv&8Tn*1Yb^6Hc%3"),
                ttl_hours: 1,
            },
            pricing: PricingRules::default(),
            currency: CurrencyCode::USD,
            order_retention_days: 2555,
            uploads: UploadConfig {
                dir: std::env::temp_dir().join("emporium-test-uploads"),
                max_bytes: 1024 * 1024,
            },
            stripe: None,
            paypal: None,
            email: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-jwt-secret-here", "TEST_VAR");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"ab".repeat(20), "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_jwt_secret_too_short() {
        let secret = SecretString::from("aB3$xY9!");
        assert!(validate_jwt_secret(&secret, "API_JWT_SECRET").is_err());
    }

    #[test]
    fn test_stripe_group_all_or_nothing() {
        assert!(StripeConfig::from_values(None, None, None).unwrap().is_none());
        assert!(
            StripeConfig::from_values(Some("sk_test_1".into()), Some("whsec_1".into()), None)
                .unwrap()
                .is_some()
        );

        let err = StripeConfig::from_values(Some("sk_test_1".into()), None, None).unwrap_err();
        assert!(err.to_string().contains("STRIPE_WEBHOOK_SECRET"));
    }

    #[test]
    fn test_paypal_group_reports_missing_keys() {
        let err =
            PayPalConfig::from_values(Some("client".into()), None, None, None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("PAYPAL_CLIENT_SECRET"));
        assert!(message.contains("PAYPAL_WEBHOOK_ID"));
        assert!(!message.contains("PAYPAL_CLIENT_ID,"));
    }

    #[test]
    fn test_paypal_mode() {
        let config = PayPalConfig::from_values(
            Some("client".into()),
            Some("secret".into()),
            Some("WH-1".into()),
            Some("LIVE".into()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(config.mode, PayPalMode::Live);
        assert_eq!(config.mode.api_base(), "https://api-m.paypal.com");

        let bad = PayPalConfig::from_values(None, None, None, Some("prod".into()));
        assert!(matches!(bad, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_email_group_default_port() {
        let config = EmailConfig::from_values(
            Some("smtp.example.net".into()),
            None,
            Some("mailer".into()),
            Some("pw".into()),
            Some("Shop <shop@example.net>".into()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(config.smtp_port, 587);

        let partial = EmailConfig::from_values(Some("smtp.example.net".into()), None, None, None, None);
        assert!(matches!(partial, Err(ConfigError::IncompleteGroup("SMTP", _))));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" https://a.test/ , ,https://b.test"),
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );
    }

    #[test]
    fn test_validate_pricing_rejects_full_tax() {
        let rules = PricingRules {
            tax_rate: Decimal::ONE,
            ..PricingRules::default()
        };
        assert!(validate_pricing(&rules).is_err());
        assert!(validate_pricing(&PricingRules::default()).is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 4000);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let stripe = StripeConfig::from_values(
            Some("sk_live_supersecret".into()),
            Some("whsec_supersecret".into()),
            Some("pk_live_visible".into()),
        )
        .unwrap()
        .unwrap();
        let output = format!("{stripe:?} {:?}", test_config().jwt);

        assert!(output.contains("pk_live_visible"));
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("supersecret"));
        assert!(!output.contains("k9$Qz"));
    }
}
