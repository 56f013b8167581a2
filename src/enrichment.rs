//! Best-effort profile enrichment.
//!
//! After a message is stored, this module tries to resolve human-readable
//! display identities for the participants and attach them to the stored
//! row. Every failure here is swallowed: enrichment runs under its own short
//! timeout, never changes the persistence outcome, and never re-runs the
//! pipeline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::models::message;
use crate::repositories::MessageRepository;

/// Resolved display identity for a platform user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl DisplayProfile {
    /// The name worth attaching to a message, if the profile carries one.
    pub fn display_name(&self) -> Option<String> {
        self.name.clone().or_else(|| self.username.clone())
    }
}

/// Profile lookup collaborator. May be unavailable without affecting the
/// pipeline's success.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn resolve_profile(&self, user_id: &str) -> Result<DisplayProfile>;
}

/// Profile resolver backed by the platform graph API.
pub struct GraphProfileResolver {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl GraphProfileResolver {
    pub fn new(base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl ProfileResolver for GraphProfileResolver {
    async fn resolve_profile(&self, user_id: &str) -> Result<DisplayProfile> {
        let url = format!("{}/{}", self.base.trim_end_matches('/'), user_id);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", "name,username"),
                ("access_token", self.token.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("profile lookup returned status {}", response.status());
        }

        Ok(response.json::<DisplayProfile>().await?)
    }
}

/// Cache of resolved profiles keyed by platform user id.
pub type ProfileCache = TtlCache<String, DisplayProfile>;

/// Attaches resolved display identities to stored messages.
#[derive(Clone)]
pub struct Enricher {
    resolver: Option<Arc<dyn ProfileResolver>>,
    cache: Arc<ProfileCache>,
    messages: MessageRepository,
    timeout: Duration,
}

impl Enricher {
    pub fn new(
        resolver: Option<Arc<dyn ProfileResolver>>,
        cache: Arc<ProfileCache>,
        messages: MessageRepository,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            cache,
            messages,
            timeout,
        }
    }

    /// Best-effort enrichment of a stored message. Never fails.
    pub async fn enrich(&self, message: &message::Model) {
        let Some(resolver) = &self.resolver else {
            debug!("Profile resolver not configured, skipping enrichment");
            return;
        };

        let sender = self.lookup(resolver.as_ref(), &message.sender_id).await;
        let recipient = self.lookup(resolver.as_ref(), &message.recipient_id).await;

        let sender_name = sender.as_ref().and_then(DisplayProfile::display_name);
        let recipient_name = recipient.as_ref().and_then(DisplayProfile::display_name);

        if sender_name.is_none() && recipient_name.is_none() {
            return;
        }

        if let Err(e) = self
            .messages
            .attach_profiles(&message.id, sender_name, recipient_name)
            .await
        {
            counter!("dm_ingest_enrichment_failures_total").increment(1);
            warn!(
                message_id = %message.id,
                error = ?e,
                "Failed to attach resolved profiles to message"
            );
        }
    }

    async fn lookup(&self, resolver: &dyn ProfileResolver, user_id: &str) -> Option<DisplayProfile> {
        let key = user_id.to_string();
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }

        match tokio::time::timeout(self.timeout, resolver.resolve_profile(user_id)).await {
            Ok(Ok(profile)) => {
                self.cache.insert(key, profile.clone());
                Some(profile)
            }
            Ok(Err(e)) => {
                counter!("dm_ingest_enrichment_failures_total").increment(1);
                warn!(user_id, error = ?e, "Profile lookup failed");
                None
            }
            Err(_) => {
                counter!("dm_ingest_enrichment_failures_total").increment(1);
                warn!(
                    user_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Profile lookup timed out"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::init_pool;
    use crate::models::tenant::ActiveModel as TenantActiveModel;
    use crate::normalization::MessageEvent;
    use chrono::Utc;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticResolver {
        profile: DisplayProfile,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProfileResolver for StaticResolver {
        async fn resolve_profile(&self, _user_id: &str) -> Result<DisplayProfile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.profile.clone())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl ProfileResolver for FailingResolver {
        async fn resolve_profile(&self, _user_id: &str) -> Result<DisplayProfile> {
            bail!("collaborator unavailable")
        }
    }

    async fn setup_message() -> (Arc<DatabaseConnection>, message::Model) {
        let config = AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            ..Default::default()
        };
        let db = init_pool(&config).await.expect("Failed to init test DB");
        Migrator::up(&db, None).await.unwrap();

        let tenant_id = Uuid::new_v4();
        TenantActiveModel {
            id: Set(tenant_id),
            name: Set(None),
            created_at: Set(Utc::now().into()),
        }
        .insert(&db)
        .await
        .unwrap();

        let db = Arc::new(db);
        let repo = MessageRepository::new(db.clone());
        let event = MessageEvent {
            platform_account_id: "acct1".to_string(),
            sender_id: "u1".to_string(),
            recipient_id: "acct1".to_string(),
            platform_message_id: Some("m1".to_string()),
            text: Some("hi".to_string()),
            attachments: None,
            occurred_at: Utc::now(),
            raw: json!({}),
            is_test: false,
        };
        let outcome = repo.insert_idempotent(tenant_id, &event).await.unwrap();
        let model = outcome.model().clone();
        (db, model)
    }

    fn cache() -> Arc<ProfileCache> {
        Arc::new(ProfileCache::new(16, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn graph_resolver_parses_profile_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/u1"))
            .and(query_param("access_token", "token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Alice",
                "username": "alice.ig"
            })))
            .mount(&server)
            .await;

        let resolver = GraphProfileResolver::new(server.uri(), "token");
        let profile = resolver.resolve_profile("u1").await.unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alice"));
        assert_eq!(profile.display_name().as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn graph_resolver_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let resolver = GraphProfileResolver::new(server.uri(), "token");
        assert!(resolver.resolve_profile("u1").await.is_err());
    }

    #[tokio::test]
    async fn enrich_attaches_display_names() {
        let (db, message) = setup_message().await;
        let resolver = Arc::new(StaticResolver {
            profile: DisplayProfile {
                name: Some("Alice".to_string()),
                username: None,
            },
            calls: AtomicUsize::new(0),
        });

        let enricher = Enricher::new(
            Some(resolver),
            cache(),
            MessageRepository::new(db.clone()),
            Duration::from_secs(2),
        );
        enricher.enrich(&message).await;

        let stored = MessageRepository::new(db)
            .find_by_platform_message_id("m1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.sender_name.as_deref(), Some("Alice"));
        assert_eq!(stored.recipient_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn enrich_swallows_resolver_failure() {
        let (db, message) = setup_message().await;

        let enricher = Enricher::new(
            Some(Arc::new(FailingResolver)),
            cache(),
            MessageRepository::new(db.clone()),
            Duration::from_secs(2),
        );
        // Must not panic or surface an error.
        enricher.enrich(&message).await;

        let stored = MessageRepository::new(db)
            .find_by_platform_message_id("m1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.sender_name, None);
        assert_eq!(stored.recipient_name, None);
    }

    #[tokio::test]
    async fn cached_profiles_skip_repeat_lookups() {
        let (db, message) = setup_message().await;
        let resolver = Arc::new(StaticResolver {
            profile: DisplayProfile {
                name: Some("Alice".to_string()),
                username: None,
            },
            calls: AtomicUsize::new(0),
        });

        let enricher = Enricher::new(
            Some(resolver.clone()),
            cache(),
            MessageRepository::new(db),
            Duration::from_secs(2),
        );
        enricher.enrich(&message).await;
        enricher.enrich(&message).await;

        // u1 and acct1 on the first pass, then both served from cache.
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }
}
