//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use emporium_core::{UserId, UserRole};

use crate::config::ApiConfig;
use crate::db::analytics::DashboardSummary;
use crate::models::product::FacetCount;
use crate::payments::{PayPalClient, PaymentError, StripeClient};
use crate::services::{CheckoutSettings, JwtKeys, MailError, Mailer, UploadStore};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("email setup failed: {0}")]
    Mail(#[from] MailError),
    #[error("payment client setup failed: {0}")]
    Payment(#[from] PaymentError),
}

/// Which facet list a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Categories,
    Brands,
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    jwt: JwtKeys,
    mailer: Mailer,
    stripe: Option<StripeClient>,
    paypal: Option<PayPalClient>,
    uploads: UploadStore,
    facets: Cache<Facet, Arc<Vec<FacetCount>>>,
    dashboard: Cache<(), Arc<DashboardSummary>>,
    accounts: Cache<UserId, Option<UserRole>>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay or a payment client cannot be set up.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, StateError> {
        let jwt = JwtKeys::new(
            &config.jwt.secret,
            chrono::Duration::hours(config.jwt.ttl_hours),
        );
        let mailer = Mailer::new(config.email.as_ref(), &config.base_url, config.currency)?;
        let stripe = config.stripe.as_ref().map(StripeClient::new).transpose()?;
        let paypal = config.paypal.as_ref().map(PayPalClient::new).transpose()?;
        let uploads = UploadStore::new(config.uploads.dir.clone(), config.uploads.max_bytes);

        let facets = Cache::builder()
            .max_capacity(8)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        let dashboard = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(60))
            .build();
        let accounts = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(30))
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                jwt,
                mailer,
                stripe,
                paypal,
                uploads,
                facets,
                dashboard,
                accounts,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn jwt(&self) -> &JwtKeys {
        &self.inner.jwt
    }

    #[must_use]
    pub fn mailer(&self) -> &Mailer {
        &self.inner.mailer
    }

    /// Stripe client, when Stripe is configured.
    #[must_use]
    pub fn stripe(&self) -> Option<&StripeClient> {
        self.inner.stripe.as_ref()
    }

    /// `PayPal` client, when `PayPal` is configured.
    #[must_use]
    pub fn paypal(&self) -> Option<&PayPalClient> {
        self.inner.paypal.as_ref()
    }

    #[must_use]
    pub fn uploads(&self) -> &UploadStore {
        &self.inner.uploads
    }

    /// Settings checkout needs from the configuration.
    #[must_use]
    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            pricing: self.inner.config.pricing,
            currency: self.inner.config.currency,
            retention_days: self.inner.config.order_retention_days,
        }
    }

    /// Category and brand lists (5 minute TTL).
    #[must_use]
    pub fn facet_cache(&self) -> &Cache<Facet, Arc<Vec<FacetCount>>> {
        &self.inner.facets
    }

    /// Dashboard summary (60 second TTL).
    #[must_use]
    pub fn dashboard_cache(&self) -> &Cache<(), Arc<DashboardSummary>> {
        &self.inner.dashboard
    }

    /// Role on record per account, `None` for deleted accounts (30 second
    /// TTL). Bearer tokens are checked against this, not their own claim.
    #[must_use]
    pub fn account_cache(&self) -> &Cache<UserId, Option<UserRole>> {
        &self.inner.accounts
    }

    /// Drop the cached role of an account after it changed or was deleted.
    pub async fn forget_account(&self, id: UserId) {
        self.inner.accounts.invalidate(&id).await;
    }

    /// Drop cached facets and dashboard numbers after a product write.
    pub fn invalidate_catalog(&self) {
        self.inner.facets.invalidate_all();
        self.inner.dashboard.invalidate_all();
    }
}
