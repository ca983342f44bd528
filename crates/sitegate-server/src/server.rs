use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use sitegate_auth::federation::{
    AccountMapper, CALLBACK_PATH, LOGIN_PATH, LoginOrchestrator, MapperCollaborators,
    SignedCallbackResolver,
};
use sitegate_auth::http::{
    DoubleSubmitCsrf, ExternalAuthState, LOCAL_AUTH_PATH, LocalAuthState,
    external_callback_handler, external_login_handler, local_login_form_handler,
    local_login_submit_handler,
};
use sitegate_auth::privilege::PrivilegeGate;
use sitegate_auth::storage::{LocalAccount, RoleDirectory};
use sitegate_db_memory::{
    ClaimsSignIn, InMemoryAccountStorage, InMemoryRoleProvider, InMemorySessionStore,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, SeedAccount};

/// Stores and login flow shared by the routes.
#[derive(Clone)]
pub struct AppServices {
    pub accounts: InMemoryAccountStorage,
    pub sessions: InMemorySessionStore,
    pub roles: RoleDirectory,
    pub gate: PrivilegeGate,
    pub orchestrator: Arc<LoginOrchestrator>,
}

impl AppServices {
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let mut roles = RoleDirectory::new();
        for seed in &cfg.roles.providers {
            let provider = InMemoryRoleProvider::with_roles(seed.name.clone(), seed.roles.clone());
            roles = roles.with_provider(Arc::new(provider));
        }

        let accounts = InMemoryAccountStorage::new();
        let mut seeded = Vec::with_capacity(cfg.accounts.len());
        for seed in &cfg.accounts {
            seeded.push(seed_account(seed, &roles).await?);
        }
        let seeded = accounts.seed(seeded).await?;

        let mut sessions = InMemorySessionStore::new(accounts.clone())
            .with_lifetime(cfg.auth.session.persistent_lifetime);
        if let Some(max) = cfg.auth.session.max_sessions {
            sessions = sessions.with_max_sessions(max);
        }
        let gate = PrivilegeGate::new();
        let sign_in = ClaimsSignIn::new(
            Arc::new(accounts.clone()),
            roles.clone(),
            Arc::new(sessions.clone()),
            gate.clone(),
            cfg.auth.provisioning.clone(),
        );

        let collaborators = MapperCollaborators {
            accounts: Arc::new(accounts.clone()),
            roles: roles.clone(),
            sessions: Arc::new(sessions.clone()),
            sign_in: Arc::new(sign_in),
            gate: gate.clone(),
        };
        let resolver = SignedCallbackResolver::from_config(&cfg.auth.external)?;
        let mapper = AccountMapper::from_config(&cfg.auth.external.mapping, collaborators);
        let orchestrator = LoginOrchestrator::new(&cfg.auth, Arc::new(resolver), mapper)?;

        tracing::info!(
            provider = %cfg.auth.external.provider_name,
            strategy = orchestrator.mapper().strategy(),
            role_providers = roles.list_role_providers().len(),
            seeded_accounts = seeded,
            "Login services initialized"
        );

        Ok(Self {
            accounts,
            sessions,
            roles,
            gate,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

async fn seed_account(seed: &SeedAccount, roles: &RoleDirectory) -> anyhow::Result<LocalAccount> {
    let mut builder = LocalAccount::builder(seed.username.clone())
        .backend_user(seed.backend_user)
        .active(seed.active);
    if let Some(email) = &seed.email {
        builder = builder.email(email.clone());
    }
    if let (Some(id), Some(provider)) = (&seed.external_id, &seed.external_provider_name) {
        builder = builder.external_identity(id.clone(), provider.clone());
    }
    for name in &seed.roles {
        match roles.resolve(name).await? {
            Some(role) => builder = builder.add_role(role),
            None => anyhow::bail!("account '{}': unknown role '{name}'", seed.username),
        }
    }
    Ok(builder.build())
}

pub fn router(cfg: &AppConfig, services: &AppServices) -> Router {
    let external = ExternalAuthState {
        orchestrator: Arc::clone(&services.orchestrator),
        session_config: cfg.auth.session.clone(),
    };
    let local = LocalAuthState {
        sessions: Arc::new(services.sessions.clone()),
        csrf: Arc::new(DoubleSubmitCsrf::new()),
        session_config: cfg.auth.session.clone(),
    };

    let external_routes = Router::new()
        .route(LOGIN_PATH, get(external_login_handler))
        .route(CALLBACK_PATH, get(external_callback_handler))
        .with_state(external);
    let local_routes = Router::new()
        .route(
            LOCAL_AUTH_PATH,
            get(local_login_form_handler).post(local_login_submit_handler),
        )
        .with_state(local);

    Router::new()
        .route("/healthz", get(healthz))
        .merge(external_routes)
        .merge(local_routes)
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &axum::http::Request<_>| {
                        use tracing::field::Empty;
                        tracing::info_span!(
                            "http.request",
                            http.method = %req.method(),
                            http.target = %req.uri().path(),
                            http.status_code = Empty,
                        )
                    })
                    .on_response(
                        |res: &axum::http::Response<_>,
                         latency: std::time::Duration,
                         span: &tracing::Span| {
                            span.record(
                                "http.status_code",
                                tracing::field::display(res.status().as_u16()),
                            );
                            tracing::info!(
                                http.status = %res.status().as_u16(),
                                elapsed_ms = %latency.as_millis(),
                                "request handled"
                            );
                        },
                    ),
            ),
        )
}

pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let services = AppServices::from_config(cfg).await?;
    Ok(router(cfg, &services))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub struct SitegateServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<SitegateServer> {
        let app = build_app(&self.config).await?;
        Ok(SitegateServer {
            addr: self.addr,
            app,
        })
    }
}

impl SitegateServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
