//! Named security presets and the orchestrator that applies them.
//!
//! Presets are frozen at registry construction: each is a compiled
//! pipeline plus the `SecurityConfig` it was built from, created once at
//! process start and read-only thereafter. Selection is environment-driven
//! with explicit route-group bindings layered on top (auth/admin/webhook
//! routes always get their own preset).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::{
    CorsVariant, Environment, RateLimitOptions, SanitizationVariant, SecurityConfig,
};
use crate::error::Rejection;
use crate::headers::HeaderPolicy;
use crate::pipeline::{
    BuildError, HeaderStage, Pipeline, PipelineBuilder, RateLimitStage, RequestContext,
    SanitizeStage, ThreatStage,
};
use crate::rate_limit::{RateLimiter, RateStore, RouteClass};

/// The closed set of preset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetName {
    Production,
    Development,
    Test,
    Api,
    Auth,
    Admin,
    Public,
    Webhook,
}

impl PresetName {
    pub const ALL: [PresetName; 8] = [
        PresetName::Production,
        PresetName::Development,
        PresetName::Test,
        PresetName::Api,
        PresetName::Auth,
        PresetName::Admin,
        PresetName::Public,
        PresetName::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Production => "production",
            PresetName::Development => "development",
            PresetName::Test => "test",
            PresetName::Api => "api",
            PresetName::Auth => "auth",
            PresetName::Admin => "admin",
            PresetName::Public => "public",
            PresetName::Webhook => "webhook",
        }
    }
}

impl FromStr for PresetName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown preset: {s}"))
    }
}

/// A frozen preset: its configuration and the pipeline compiled from it.
pub struct CompiledPreset {
    pub name: PresetName,
    pub config: SecurityConfig,
    pipeline: Pipeline,
}

impl CompiledPreset {
    pub fn run(&self, ctx: &mut RequestContext) -> Result<(), Rejection> {
        self.pipeline.run(ctx)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

/// Options shared by every preset in one registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Origins merged into each preset's allow-list.
    pub allowed_origins: Vec<String>,
    /// Force rate limiting off everywhere (automated test runs).
    pub rate_limit_disabled: bool,
}

/// All presets, compiled once against a shared counter store.
pub struct PresetRegistry {
    presets: HashMap<PresetName, Arc<CompiledPreset>>,
}

impl PresetRegistry {
    pub fn build(store: Arc<dyn RateStore>, options: RegistryOptions) -> Result<Self, BuildError> {
        let mut presets = HashMap::new();
        for name in PresetName::ALL {
            let mut config = preset_config(name);
            config
                .allowed_origins
                .extend(options.allowed_origins.iter().cloned());
            if options.rate_limit_disabled {
                config.rate_limit_options.disabled = true;
            }
            let pipeline = compile(&config, store.clone())?;
            presets.insert(
                name,
                Arc::new(CompiledPreset {
                    name,
                    config,
                    pipeline,
                }),
            );
        }
        Ok(Self { presets })
    }

    pub fn get(&self, name: PresetName) -> Arc<CompiledPreset> {
        // Every name in the closed enum is inserted in build().
        Arc::clone(&self.presets[&name])
    }

    /// Environment-driven selection.
    pub fn resolve(&self, environment: Environment) -> Arc<CompiledPreset> {
        match environment {
            Environment::Production => self.get(PresetName::Production),
            Environment::Development => self.get(PresetName::Development),
            Environment::Test => self.get(PresetName::Test),
        }
    }

    /// Route groups with a dedicated preset, regardless of environment.
    pub fn for_route_class(&self, class: RouteClass) -> Option<Arc<CompiledPreset>> {
        match class {
            RouteClass::Auth => Some(self.get(PresetName::Auth)),
            RouteClass::Admin => Some(self.get(PresetName::Admin)),
            RouteClass::Webhook => Some(self.get(PresetName::Webhook)),
            RouteClass::Api | RouteClass::Public => None,
        }
    }
}

/// Compile one pipeline from a config. Disabled stages are left out of the
/// chain entirely; the order of the remaining stages is enforced by the
/// builder.
fn compile(config: &SecurityConfig, store: Arc<dyn RateStore>) -> Result<Pipeline, BuildError> {
    let mut builder = PipelineBuilder::new();
    if config.threat_detection {
        builder = builder.stage(Box::new(ThreatStage::new()));
    }
    if config.security_headers {
        builder = builder.stage(Box::new(HeaderStage::new(HeaderPolicy::new(
            config.cors,
            config.allowed_origins.clone(),
        ))));
    }
    if config.rate_limit {
        let limiter = Arc::new(RateLimiter::new(store, config.rate_limit_options.clone()));
        builder = builder.stage(Box::new(RateLimitStage::new(limiter)));
    }
    if config.sanitization {
        builder = builder.stage(Box::new(SanitizeStage::new(Arc::new(
            config.sanitization_options.policy(),
        ))));
    }
    builder.build()
}

/// The frozen configuration behind each preset name.
fn preset_config(name: PresetName) -> SecurityConfig {
    let defaults = SecurityConfig::default();
    match name {
        PresetName::Production => SecurityConfig {
            cors: CorsVariant::Strict,
            sanitization_options: SanitizationVariant::Strict,
            ..defaults
        },
        PresetName::Development => SecurityConfig {
            cors: CorsVariant::Dev,
            sanitization_options: SanitizationVariant::Moderate,
            rate_limit_options: RateLimitOptions {
                auth_limit: 100,
                api_limit: 1000,
                ..Default::default()
            },
            ..defaults
        },
        PresetName::Test => SecurityConfig {
            cors: CorsVariant::Dev,
            sanitization_options: SanitizationVariant::Moderate,
            rate_limit_options: RateLimitOptions {
                disabled: true,
                ..Default::default()
            },
            ..defaults
        },
        PresetName::Api => SecurityConfig {
            cors: CorsVariant::Api,
            sanitization_options: SanitizationVariant::Api,
            ..defaults
        },
        PresetName::Auth => SecurityConfig {
            cors: CorsVariant::Strict,
            sanitization_options: SanitizationVariant::Strict,
            rate_limit_options: RateLimitOptions {
                auth_limit: 5,
                window_ms: 60_000,
                ..Default::default()
            },
            max_request_size: 64 * 1024,
            ..defaults
        },
        PresetName::Admin => SecurityConfig {
            cors: CorsVariant::Strict,
            sanitization_options: SanitizationVariant::Admin,
            rate_limit_options: RateLimitOptions {
                admin_limit: 30,
                ..Default::default()
            },
            ..defaults
        },
        PresetName::Public => SecurityConfig {
            cors: CorsVariant::Api,
            sanitization_options: SanitizationVariant::Moderate,
            ..defaults
        },
        // Webhook payload shapes are external and fixed, so sanitization is
        // deliberately off; rate limiting and audit stay on.
        PresetName::Webhook => SecurityConfig {
            sanitization: false,
            cors: CorsVariant::Strict,
            rate_limit_options: RateLimitOptions {
                webhook_limit: 60,
                ..Default::default()
            },
            ..defaults
        },
    }
}

/// Owns the preset registry and the active environment preset. The active
/// slot is swappable at runtime; the presets themselves never change.
pub struct Orchestrator {
    registry: PresetRegistry,
    active: ArcSwap<CompiledPreset>,
    store: Arc<dyn RateStore>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RateStore>,
        options: RegistryOptions,
        environment: Environment,
    ) -> Result<Self, BuildError> {
        let registry = PresetRegistry::build(store.clone(), options)?;
        let active = ArcSwap::new(registry.resolve(environment));
        Ok(Self {
            registry,
            active,
            store,
        })
    }

    /// Preset for one request: route-group binding first, then the active
    /// environment preset.
    pub fn resolve_for(&self, class: RouteClass) -> Arc<CompiledPreset> {
        self.registry
            .for_route_class(class)
            .unwrap_or_else(|| self.active.load_full())
    }

    /// Run the stage chain for one request under its resolved preset.
    pub fn apply(&self, ctx: &mut RequestContext) -> Result<(), Rejection> {
        let preset = self.resolve_for(ctx.route_class);
        preset.run(ctx)
    }

    pub fn active(&self) -> Arc<CompiledPreset> {
        self.active.load_full()
    }

    /// Switch the active environment preset without rebuilding anything.
    pub fn swap_environment(&self, environment: Environment) {
        let preset = self.registry.resolve(environment);
        tracing::info!(
            environment = environment.as_str(),
            preset = preset.name.as_str(),
            "Active preset swapped"
        );
        self.active.store(preset);
    }

    pub fn registry(&self) -> &PresetRegistry {
        &self.registry
    }

    /// Evict expired counter records.
    pub fn sweep_store(&self) {
        self.store.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageKind;
    use crate::rate_limit::MemoryStore;
    use axum::http::{HeaderMap, Method};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            Arc::new(MemoryStore::new()),
            RegistryOptions::default(),
            Environment::Production,
        )
        .unwrap()
    }

    #[test]
    fn test_every_preset_compiles() {
        let registry =
            PresetRegistry::build(Arc::new(MemoryStore::new()), RegistryOptions::default())
                .unwrap();
        for name in PresetName::ALL {
            let preset = registry.get(name);
            assert_eq!(preset.name, name);
        }
    }

    #[test]
    fn test_webhook_preset_keeps_rate_limit_without_sanitization() {
        let registry =
            PresetRegistry::build(Arc::new(MemoryStore::new()), RegistryOptions::default())
                .unwrap();
        let webhook = registry.get(PresetName::Webhook);
        assert!(!webhook.config.sanitization);
        assert!(webhook.config.rate_limit);
        assert!(webhook.config.audit);
    }

    /// Config booleans must agree with the stages actually compiled in.
    #[test]
    fn test_compiled_stages_match_config() {
        let registry =
            PresetRegistry::build(Arc::new(MemoryStore::new()), RegistryOptions::default())
                .unwrap();
        let production = registry.get(PresetName::Production);
        assert_eq!(
            production.pipeline().stage_kinds(),
            vec![
                StageKind::Threat,
                StageKind::Headers,
                StageKind::RateLimit,
                StageKind::Sanitize
            ]
        );
        let webhook = registry.get(PresetName::Webhook);
        assert!(!webhook
            .pipeline()
            .stage_kinds()
            .contains(&StageKind::Sanitize));
    }

    #[test]
    fn test_environment_resolution() {
        let registry =
            PresetRegistry::build(Arc::new(MemoryStore::new()), RegistryOptions::default())
                .unwrap();
        assert_eq!(
            registry.resolve(Environment::Production).name,
            PresetName::Production
        );
        assert_eq!(registry.resolve(Environment::Test).name, PresetName::Test);
    }

    #[test]
    fn test_route_group_binding_overrides_environment() {
        let orchestrator = orchestrator();
        assert_eq!(
            orchestrator.resolve_for(RouteClass::Auth).name,
            PresetName::Auth
        );
        assert_eq!(
            orchestrator.resolve_for(RouteClass::Webhook).name,
            PresetName::Webhook
        );
        assert_eq!(
            orchestrator.resolve_for(RouteClass::Api).name,
            PresetName::Production
        );
    }

    #[test]
    fn test_swap_environment_changes_active_preset() {
        let orchestrator = orchestrator();
        assert_eq!(orchestrator.active().name, PresetName::Production);
        orchestrator.swap_environment(Environment::Test);
        assert_eq!(orchestrator.active().name, PresetName::Test);
        // Route-group bindings are unaffected by the swap.
        assert_eq!(
            orchestrator.resolve_for(RouteClass::Admin).name,
            PresetName::Admin
        );
    }

    #[test]
    fn test_registry_disable_flag_reaches_every_preset() {
        let registry = PresetRegistry::build(
            Arc::new(MemoryStore::new()),
            RegistryOptions {
                rate_limit_disabled: true,
                ..Default::default()
            },
        )
        .unwrap();
        for name in PresetName::ALL {
            assert!(registry.get(name).config.rate_limit_options.disabled);
        }
    }

    #[test]
    fn test_auth_preset_limits_fifth_request() {
        let orchestrator = orchestrator();
        let headers = HeaderMap::new();
        for i in 1..=5 {
            let mut ctx = RequestContext::new(&Method::POST, "/auth/login", &headers);
            assert!(
                orchestrator.apply(&mut ctx).is_ok(),
                "request {i} should pass"
            );
        }
        let mut ctx = RequestContext::new(&Method::POST, "/auth/login", &headers);
        assert!(matches!(
            orchestrator.apply(&mut ctx),
            Err(Rejection::RateLimited { limit: 5, .. })
        ));
    }
}
