//! First-run provisioning of API credentials and a test marketplace.
//!
//! Credentials live in the scenario cache. They are reused as long as the cache
//! targets the same API location and the marketplace can still be fetched with
//! the cached key; otherwise a fresh key and marketplace are provisioned. Either
//! way the marketplace escrow is then topped up to the configured threshold so
//! debit and credit scenarios have funds to move.

use serde_json::Value;
use tracing::{debug, info};

use crate::api::{str_field, PaymentsApi};
use crate::cache::ScenarioCache;
use crate::error::{Error, Result};

/// Upper bound on the number of debits one top-up may issue.
const MAX_TOP_UP_DEBITS: u64 = 100;

/// Escrow balance the bootstrap guarantees, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowPolicy {
    pub threshold: u64,
    pub increment: u64,
}

impl Default for EscrowPolicy {
    fn default() -> Self {
        Self {
            threshold: 2_000_000,
            increment: 500_000,
        }
    }
}

impl EscrowPolicy {
    /// Debit amounts needed to lift `in_escrow` to the threshold.
    ///
    /// Every debit is `increment` except the last, which covers only the
    /// remaining deficit when the deficit is not a multiple of the increment.
    pub fn top_up_debits(&self, in_escrow: u64) -> Result<Vec<u64>> {
        self.validate()?;
        let deficit = self.threshold.saturating_sub(in_escrow);
        let full = deficit / self.increment;
        let remainder = deficit % self.increment;

        let full = usize::try_from(full).map_err(|_| self.too_many_debits())?;
        let mut debits = vec![self.increment; full];
        if remainder > 0 {
            debits.push(remainder);
        }
        Ok(debits)
    }

    /// Reject a zero increment, or one so small that funding from an empty
    /// escrow would take more than [`MAX_TOP_UP_DEBITS`] debits.
    pub fn validate(&self) -> Result<()> {
        if self.increment == 0 {
            return Err(Error::InvalidEscrowPolicy(
                "increment must be greater than zero".to_string(),
            ));
        }
        if self.threshold.div_ceil(self.increment) > MAX_TOP_UP_DEBITS {
            return Err(self.too_many_debits());
        }
        Ok(())
    }

    fn too_many_debits(&self) -> Error {
        Error::InvalidEscrowPolicy(format!(
            "increment {} needs more than {MAX_TOP_UP_DEBITS} debits to reach threshold {}",
            self.increment, self.threshold
        ))
    }
}

/// Per-run credentials and marketplace used to render request templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub api_location: String,
    pub api_key: String,
    pub marketplace_id: String,
    pub marketplace_uri: String,
    pub marketplace: Value,
}

impl ExecutionContext {
    pub fn new(api_location: &str, api_key: &str, marketplace: Value) -> Result<Self> {
        Ok(Self {
            api_location: api_location.to_string(),
            api_key: api_key.to_string(),
            marketplace_id: str_field(&marketplace, "id")?.to_string(),
            marketplace_uri: str_field(&marketplace, "uri")?.to_string(),
            marketplace,
        })
    }

    /// Context stored in the cache, if the cache targets `api_location`.
    pub fn from_cache(cache: &ScenarioCache, api_location: &str) -> Option<Self> {
        if cache.api_location() != Some(api_location) {
            return None;
        }
        let api_key = cache.api_key()?;
        let marketplace = cache.marketplace()?.clone();
        Self::new(api_location, api_key, marketplace).ok()
    }

    fn in_escrow(&self) -> u64 {
        self.marketplace
            .get("in_escrow")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

/// What the bootstrap did.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapOutcome {
    pub context: ExecutionContext,
    /// A new key and marketplace were created.
    pub provisioned: bool,
    /// Debit amounts applied to top up the escrow.
    pub debits: Vec<u64>,
}

/// Provisions or validates credentials against a [`PaymentsApi`].
pub struct Bootstrapper<'a> {
    api: &'a dyn PaymentsApi,
    api_location: String,
    escrow: EscrowPolicy,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(api: &'a dyn PaymentsApi, api_location: impl Into<String>, escrow: EscrowPolicy) -> Self {
        Self {
            api,
            api_location: api_location.into(),
            escrow,
        }
    }

    /// Make sure the cache holds working credentials and a funded marketplace.
    pub async fn ensure(&self, cache: &mut ScenarioCache) -> Result<BootstrapOutcome> {
        self.escrow.validate()?;
        let (mut context, provisioned) = match self.validate_cached(cache).await? {
            Some(context) => {
                debug!(marketplace = %context.marketplace_id, "Reusing cached credentials");
                (context, false)
            }
            None => (self.provision(cache).await?, true),
        };

        let debits = self.top_up_escrow(&mut context).await?;
        cache.set_marketplace(context.marketplace.clone());

        Ok(BootstrapOutcome {
            context,
            provisioned,
            debits,
        })
    }

    async fn validate_cached(&self, cache: &ScenarioCache) -> Result<Option<ExecutionContext>> {
        let Some(cached) = ExecutionContext::from_cache(cache, &self.api_location) else {
            if cache.api_location().is_some_and(|loc| loc != self.api_location) {
                info!(
                    cached = cache.api_location().unwrap_or_default(),
                    target = %self.api_location,
                    "API target changed, provisioning new credentials"
                );
            }
            return Ok(None);
        };

        match self
            .api
            .fetch_marketplace(&cached.api_key, &cached.marketplace_uri)
            .await
        {
            Ok(marketplace) => Ok(Some(ExecutionContext::new(
                &self.api_location,
                &cached.api_key,
                marketplace,
            )?)),
            Err(e) if e.is_credential_failure() => {
                info!(error = %e, "Cached credentials rejected, provisioning new credentials");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn provision(&self, cache: &mut ScenarioCache) -> Result<ExecutionContext> {
        info!(api_location = %self.api_location, "Provisioning API key and marketplace");
        let api_key = self.api.create_api_key().await?;
        let marketplace = self.api.create_marketplace(&api_key).await?;
        let context = ExecutionContext::new(&self.api_location, &api_key, marketplace)?;

        cache.reset_context(&self.api_location, &api_key, context.marketplace.clone());
        info!(marketplace = %context.marketplace_id, "Provisioned marketplace");
        Ok(context)
    }

    async fn top_up_escrow(&self, context: &mut ExecutionContext) -> Result<Vec<u64>> {
        let debits = self.escrow.top_up_debits(context.in_escrow())?;
        if debits.is_empty() {
            return Ok(debits);
        }

        info!(
            in_escrow = context.in_escrow(),
            threshold = self.escrow.threshold,
            debits = debits.len(),
            "Topping up escrow"
        );
        let card = self
            .api
            .create_card(&context.api_key, &context.marketplace_uri)
            .await?;
        let card_uri = str_field(&card, "uri")?.to_string();

        for amount in &debits {
            self.api
                .debit_card(
                    &context.api_key,
                    &context.marketplace_uri,
                    &card_uri,
                    *amount,
                )
                .await?;
        }

        let marketplace = self
            .api
            .fetch_marketplace(&context.api_key, &context.marketplace_uri)
            .await?;
        *context = ExecutionContext::new(&context.api_location, &context.api_key, marketplace)?;
        Ok(debits)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::ApiError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// In-memory payments service recording every call.
    #[derive(Default)]
    pub(crate) struct FakeApi {
        pub calls: Mutex<Vec<String>>,
        pub escrow: Mutex<u64>,
        pub valid_keys: Mutex<Vec<String>>,
        pub keys_issued: Mutex<u32>,
    }

    impl FakeApi {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn marketplace(&self) -> Value {
            json!({
                "id": "MP1",
                "uri": "/v1/marketplaces/MP1",
                "in_escrow": *self.escrow.lock().unwrap(),
            })
        }

        fn check(&self, api_key: &str) -> std::result::Result<(), ApiError> {
            if self.valid_keys.lock().unwrap().iter().any(|k| k == api_key) {
                Ok(())
            } else {
                Err(ApiError::api_error(401, "unauthorized"))
            }
        }
    }

    #[async_trait]
    impl PaymentsApi for FakeApi {
        async fn create_api_key(&self) -> std::result::Result<String, ApiError> {
            self.record("create_api_key");
            let mut issued = self.keys_issued.lock().unwrap();
            *issued += 1;
            let key = format!("ak-{issued}");
            self.valid_keys.lock().unwrap().push(key.clone());
            Ok(key)
        }

        async fn create_marketplace(&self, api_key: &str) -> std::result::Result<Value, ApiError> {
            self.check(api_key)?;
            self.record("create_marketplace");
            Ok(self.marketplace())
        }

        async fn fetch_marketplace(
            &self,
            api_key: &str,
            _marketplace_uri: &str,
        ) -> std::result::Result<Value, ApiError> {
            self.check(api_key)?;
            self.record("fetch_marketplace");
            Ok(self.marketplace())
        }

        async fn create_card(
            &self,
            api_key: &str,
            _marketplace_uri: &str,
        ) -> std::result::Result<Value, ApiError> {
            self.check(api_key)?;
            self.record("create_card");
            Ok(json!({"uri": "/v1/marketplaces/MP1/cards/CC1"}))
        }

        async fn debit_card(
            &self,
            api_key: &str,
            _marketplace_uri: &str,
            _card_uri: &str,
            amount: u64,
        ) -> std::result::Result<Value, ApiError> {
            self.check(api_key)?;
            self.record(format!("debit:{amount}"));
            *self.escrow.lock().unwrap() += amount;
            Ok(json!({"amount": amount}))
        }
    }

    const LOCATION: &str = "http://localhost:5000";

    #[test]
    fn test_top_up_exact_multiple() {
        let policy = EscrowPolicy {
            threshold: 1_500,
            increment: 500,
        };
        assert_eq!(policy.top_up_debits(0).unwrap(), vec![500, 500, 500]);
    }

    #[test]
    fn test_top_up_with_remainder() {
        let policy = EscrowPolicy {
            threshold: 1_700,
            increment: 500,
        };
        let debits = policy.top_up_debits(100).unwrap();
        assert_eq!(debits, vec![500, 500, 500, 100]);
        assert_eq!(debits.iter().sum::<u64>() + 100, 1_700);
    }

    #[test]
    fn test_top_up_already_funded() {
        let policy = EscrowPolicy::default();
        assert!(policy.top_up_debits(policy.threshold + 1).unwrap().is_empty());
    }

    #[test]
    fn test_top_up_zero_increment() {
        let policy = EscrowPolicy {
            threshold: 10,
            increment: 0,
        };
        assert!(matches!(
            policy.top_up_debits(0),
            Err(Error::InvalidEscrowPolicy(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_policy_provisions_nothing() {
        let api = FakeApi::default();
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ScenarioCache::load(dir.path().join("cache.json"));
        let policy = EscrowPolicy {
            threshold: 1_000,
            increment: 0,
        };

        let result = Bootstrapper::new(&api, LOCATION, policy)
            .ensure(&mut cache)
            .await;
        assert!(matches!(result, Err(Error::InvalidEscrowPolicy(_))));
        assert!(api.calls().is_empty());
        assert!(cache.api_key().is_none());
    }

    #[test]
    fn test_top_up_rejects_tiny_increment() {
        let policy = EscrowPolicy {
            threshold: 2_000_000,
            increment: 1,
        };
        let err = policy.top_up_debits(0).unwrap_err();
        assert!(matches!(err, Error::InvalidEscrowPolicy(_)));
        assert!(err.to_string().contains("more than 100 debits"));

        let bounded = EscrowPolicy {
            threshold: 10_000,
            increment: 100,
        };
        assert_eq!(bounded.top_up_debits(0).unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_first_run_provisions_and_funds() {
        let api = FakeApi::default();
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ScenarioCache::load(dir.path().join("cache.json"));
        let policy = EscrowPolicy {
            threshold: 1_200,
            increment: 500,
        };

        let outcome = Bootstrapper::new(&api, LOCATION, policy)
            .ensure(&mut cache)
            .await
            .unwrap();

        assert!(outcome.provisioned);
        assert_eq!(outcome.debits, vec![500, 500, 200]);
        assert_eq!(outcome.context.marketplace_id, "MP1");
        assert_eq!(outcome.context.marketplace["in_escrow"], json!(1_200));
        assert_eq!(cache.api_key(), Some("ak-1"));
        assert_eq!(cache.api_location(), Some(LOCATION));
        assert_eq!(cache.marketplace().unwrap()["in_escrow"], json!(1_200));
    }

    #[tokio::test]
    async fn test_second_run_reuses_credentials() {
        let api = FakeApi::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let policy = EscrowPolicy {
            threshold: 1_000,
            increment: 500,
        };

        let mut cache = ScenarioCache::load(&path);
        Bootstrapper::new(&api, LOCATION, policy)
            .ensure(&mut cache)
            .await
            .unwrap();
        cache.save().unwrap();
        api.calls.lock().unwrap().clear();

        let mut reloaded = ScenarioCache::load(&path);
        let outcome = Bootstrapper::new(&api, LOCATION, policy)
            .ensure(&mut reloaded)
            .await
            .unwrap();

        assert!(!outcome.provisioned);
        assert!(outcome.debits.is_empty());
        assert_eq!(api.calls(), vec!["fetch_marketplace"]);
        assert_eq!(reloaded.api_key(), Some("ak-1"));
    }

    #[tokio::test]
    async fn test_rejected_credentials_reprovision() {
        let api = FakeApi::default();
        let mut cache = ScenarioCache::new("unused.json");
        cache.reset_context(
            LOCATION,
            "ak-revoked",
            json!({"id": "MP0", "uri": "/v1/marketplaces/MP0"}),
        );

        let outcome = Bootstrapper::new(&api, LOCATION, EscrowPolicy::default())
            .ensure(&mut cache)
            .await
            .unwrap();

        assert!(outcome.provisioned);
        assert_eq!(cache.api_key(), Some("ak-1"));
        assert_eq!(api.calls()[0], "create_api_key");
    }

    #[tokio::test]
    async fn test_changed_target_reprovisions() {
        let api = FakeApi::default();
        api.valid_keys.lock().unwrap().push("ak-old".to_string());
        let mut cache = ScenarioCache::new("unused.json");
        cache.reset_context(
            "https://other.example.com",
            "ak-old",
            json!({"id": "MP0", "uri": "/v1/marketplaces/MP0"}),
        );

        let outcome = Bootstrapper::new(&api, LOCATION, EscrowPolicy::default())
            .ensure(&mut cache)
            .await
            .unwrap();

        assert!(outcome.provisioned);
        assert_eq!(cache.api_location(), Some(LOCATION));
        assert_eq!(api.calls()[0], "create_api_key");
    }
}
