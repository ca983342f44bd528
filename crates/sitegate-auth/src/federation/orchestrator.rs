//! Login orchestration.
//!
//! Drives one login attempt from the initial redirect to the final redirect:
//!
//! ```text
//! Idle -> AwaitingCallback -> Resolving -> Mapping -> RedirectedSuccess
//!                                 |            |
//!                                 +------------+----> RedirectedError
//! ```
//!
//! A failed attempt is terminal; the browser starts again at the login path.
//! Callback handling never returns an error: every failure becomes a redirect
//! to the return URL carrying an opaque `error` code.
//!
//! Starting a login issues a [`LoginStates`] value that the HTTP layer binds
//! to the browser. The callback must present it both in the signed query and
//! from the browser, once.

use std::fmt;
use std::sync::Arc;

use url::Url;

use super::error::ResolutionError;
use super::mapper::AccountMapper;
use super::resolver::{CallbackParams, IdentityResolver, RETURN_URL_PARAM};
use super::return_url::{ReturnUrlGuard, append_error};
use super::state::{LoginStates, STATE_PARAM};
use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::storage::{AuthenticationOutcome, LoginSession};

/// Path that starts an external login.
pub const LOGIN_PATH: &str = "/external.auth/login";

/// Path the provider redirects back to.
pub const CALLBACK_PATH: &str = "/external.auth/callback";

/// Phase of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginPhase {
    /// Nothing has happened yet.
    Idle,
    /// The browser was sent to the provider.
    AwaitingCallback,
    /// The callback is being validated.
    Resolving,
    /// The identity is being mapped to a local account.
    Mapping,
    /// Signed in and redirected to the return URL.
    RedirectedSuccess,
    /// Redirected to the return URL with an error code.
    RedirectedError,
}

impl LoginPhase {
    /// Returns the phase name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingCallback => "awaiting_callback",
            Self::Resolving => "resolving",
            Self::Mapping => "mapping",
            Self::RedirectedSuccess => "redirected_success",
            Self::RedirectedError => "redirected_error",
        }
    }

    /// Returns `true` for the two redirect phases.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RedirectedSuccess | Self::RedirectedError)
    }
}

impl fmt::Display for LoginPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A redirect to emit at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInstruction {
    /// Value of the `Location` header.
    pub location: String,

    /// Session to attach as a cookie, on successful sign-in.
    pub session: Option<LoginSession>,

    /// Phase the attempt ended in.
    pub phase: LoginPhase,

    /// Error code, on error redirects.
    pub error_code: Option<&'static str>,

    /// Login state to bind to the browser, on the redirect to the provider.
    pub state: Option<String>,
}

impl RedirectInstruction {
    /// HTTP status of every redirect issued by the login flow.
    pub const STATUS: u16 = 302;

    fn to_provider(url: Url, state: String) -> Self {
        Self {
            location: url.into(),
            session: None,
            phase: LoginPhase::AwaitingCallback,
            error_code: None,
            state: Some(state),
        }
    }

    fn success(return_url: String, session: LoginSession) -> Self {
        Self {
            location: return_url,
            session: Some(session),
            phase: LoginPhase::RedirectedSuccess,
            error_code: None,
            state: None,
        }
    }

    fn error(return_url: &str, code: &'static str) -> Self {
        Self {
            location: append_error(return_url, code),
            session: None,
            phase: LoginPhase::RedirectedError,
            error_code: Some(code),
            state: None,
        }
    }

    /// Returns `true` if the user was signed in.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.phase == LoginPhase::RedirectedSuccess
    }
}

/// Drives the redirect/callback login flow.
pub struct LoginOrchestrator {
    resolver: Arc<dyn IdentityResolver>,
    mapper: AccountMapper,
    return_urls: ReturnUrlGuard,
    states: LoginStates,
    public_base_url: String,
}

impl LoginOrchestrator {
    /// Creates an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the public base URL is invalid.
    pub fn new(
        config: &AuthConfig,
        resolver: Arc<dyn IdentityResolver>,
        mapper: AccountMapper,
    ) -> AuthResult<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        let public_base_url = base_url.as_str().trim_end_matches('/').to_string();
        Ok(Self {
            resolver,
            mapper,
            return_urls: ReturnUrlGuard::new(
                config.external.return_url_policy,
                base_url,
                config.external.default_return_url.clone(),
            ),
            states: LoginStates::new(config.external.login_state_lifetime),
            public_base_url,
        })
    }

    /// The configured mapping strategy.
    #[must_use]
    pub fn mapper(&self) -> &AccountMapper {
        &self.mapper
    }

    /// Pending login states.
    #[must_use]
    pub fn login_states(&self) -> &LoginStates {
        &self.states
    }

    /// Builds the callback URL carrying the return URL and login state.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::InvalidUrl`] if the URL cannot be built.
    pub fn callback_url(&self, return_url: &str, state: &str) -> Result<Url, ResolutionError> {
        let mut url = Url::parse(&format!("{}{CALLBACK_PATH}", self.public_base_url))?;
        url.query_pairs_mut()
            .append_pair(RETURN_URL_PARAM, return_url)
            .append_pair(STATE_PARAM, state);
        Ok(url)
    }

    /// Starts a login: redirects the browser to the provider.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Resolution`] if the provider URL cannot be built.
    pub fn begin_login(&self, return_url: Option<&str>) -> AuthResult<RedirectInstruction> {
        tracing::debug!(login.phase = %LoginPhase::Idle, "Login requested");

        let return_url = self.return_urls.normalize(return_url);
        let state = self.states.issue();
        let callback = self.callback_url(&return_url, &state)?;
        let authorization_url = self.resolver.authorization_url(&callback)?;

        tracing::info!(
            login.phase = %LoginPhase::AwaitingCallback,
            provider = %self.resolver.provider_name(),
            return_url = %return_url,
            "Redirecting to identity provider"
        );
        Ok(RedirectInstruction::to_provider(authorization_url, state))
    }

    /// Completes a login from the provider callback.
    ///
    /// `browser_state` is the login state bound to the browser when the
    /// login started. Always yields a redirect to the return URL, with
    /// `error=<code>` appended on failure.
    pub async fn handle_callback(
        &self,
        params: &CallbackParams,
        browser_state: Option<&str>,
    ) -> RedirectInstruction {
        let return_url = self.return_urls.normalize(params.return_url());

        tracing::debug!(
            login.phase = %LoginPhase::Resolving,
            provider = %self.resolver.provider_name(),
            "Resolving callback"
        );
        let resolved = match self.states.consume(params.get(STATE_PARAM), browser_state) {
            Ok(()) => self.resolver.resolve(params).await,
            Err(err) => Err(err),
        };
        let identity = match resolved {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!(
                    login.phase = %LoginPhase::RedirectedError,
                    error = %err,
                    authenticity = err.is_authenticity_failure(),
                    "Callback resolution failed"
                );
                return RedirectInstruction::error(&return_url, err.code());
            }
        };

        tracing::debug!(
            login.phase = %LoginPhase::Mapping,
            external_id = %identity.external_id,
            strategy = self.mapper.strategy(),
            "Mapping external identity"
        );
        match self.mapper.map(&identity, &return_url).await {
            Ok(AuthenticationOutcome::Success(session)) => {
                tracing::info!(
                    login.phase = %LoginPhase::RedirectedSuccess,
                    account_id = %session.account_id,
                    return_url = %return_url,
                    "External login succeeded"
                );
                let session = session.with_return_url(return_url.clone());
                RedirectInstruction::success(return_url, session)
            }
            Ok(AuthenticationOutcome::Failure(reason)) => {
                tracing::warn!(
                    login.phase = %LoginPhase::RedirectedError,
                    external_id = %identity.external_id,
                    reason = %reason,
                    "External login refused"
                );
                RedirectInstruction::error(&return_url, reason.code())
            }
            Err(err) => {
                tracing::error!(
                    login.phase = %LoginPhase::RedirectedError,
                    external_id = %identity.external_id,
                    error = %err,
                    "External login failed"
                );
                RedirectInstruction::error(&return_url, err.code())
            }
        }
    }
}

impl fmt::Debug for LoginOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginOrchestrator")
            .field("provider", &self.resolver.provider_name())
            .field("mapper", &self.mapper)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomMappingConfig, DelegatedMappingConfig, MappingConfig};
    use crate::federation::identity::ExternalIdentity;
    use crate::federation::mapper::MapperCollaborators;
    use crate::federation::signed::{SIGNATURE_PARAM, SignedCallbackResolver};
    use crate::privilege::PrivilegeGate;
    use crate::storage::{AccountStorage, LocalAccount, LoginFailureReason, RoleDirectory};
    use crate::testing::{FakeAccounts, FakeSessions, FixedRoles, RecordingSignIn};
    use async_trait::async_trait;

    const SECRET: &str = "test-secret";

    struct Harness {
        orchestrator: LoginOrchestrator,
        resolver: SignedCallbackResolver,
        accounts: FakeAccounts,
        gate: PrivilegeGate,
    }

    fn auth_config(mapping: MappingConfig) -> AuthConfig {
        let mut config = AuthConfig::default();
        config.public_base_url = "https://cms.example.com".to_string();
        config.external.shared_secret = SECRET.to_string();
        config.external.mapping = mapping;
        config
    }

    fn harness(mapping: MappingConfig) -> Harness {
        let config = auth_config(mapping);
        let accounts = FakeAccounts::default();
        let gate = PrivilegeGate::new();
        let collaborators = MapperCollaborators {
            accounts: Arc::new(accounts.clone()),
            roles: RoleDirectory::new()
                .with_provider(FixedRoles::new("Default", &["Administrators"])),
            sessions: Arc::new(FakeSessions::new(accounts.clone())),
            sign_in: Arc::new(RecordingSignIn::default()),
            gate: gate.clone(),
        };
        let resolver = SignedCallbackResolver::from_config(&config.external).unwrap();
        let mapper = AccountMapper::from_config(&config.external.mapping, collaborators);
        let orchestrator =
            LoginOrchestrator::new(&config, Arc::new(resolver.clone()), mapper).unwrap();
        Harness {
            orchestrator,
            resolver,
            accounts,
            gate,
        }
    }

    fn admin_mapping() -> MappingConfig {
        MappingConfig::Custom(CustomMappingConfig {
            initial_roles: vec!["Administrators".to_string()],
            ..CustomMappingConfig::default()
        })
    }

    /// Simulates the provider: takes the callback URL it was given and
    /// appends a signed assertion.
    fn provider_callback(h: &Harness, login_location: &str, subject: &str) -> CallbackParams {
        let login = Url::parse(login_location).unwrap();
        let callback = CallbackParams::from_url(&login);
        let callback_url = Url::parse(callback.return_url().unwrap()).unwrap();
        let ts = time::OffsetDateTime::now_utc().unix_timestamp().to_string();

        let params = CallbackParams::from_url(&callback_url)
            .with("sub", subject)
            .with("ts", ts);
        let sig = h.resolver.sign(&params);
        params.with(SIGNATURE_PARAM, sig)
    }

    #[tokio::test]
    async fn test_begin_login_redirects_to_provider() {
        let h = harness(admin_mapping());
        let redirect = h.orchestrator.begin_login(Some("/home")).unwrap();

        assert_eq!(redirect.phase, LoginPhase::AwaitingCallback);
        assert!(redirect.session.is_none());
        assert!(redirect.state.is_some());
        assert!(
            redirect
                .location
                .starts_with("https://www.myidentityprovider.com/login?returnUrl=")
        );
    }

    #[tokio::test]
    async fn test_return_url_round_trips() {
        let h = harness(admin_mapping());
        let redirect = h.orchestrator.begin_login(Some("/home")).unwrap();

        let login = Url::parse(&redirect.location).unwrap();
        let callback_url =
            Url::parse(CallbackParams::from_url(&login).return_url().unwrap()).unwrap();
        assert!(
            callback_url
                .as_str()
                .starts_with("https://cms.example.com/external.auth/callback?returnUrl=%2Fhome&state=")
        );
        let callback = CallbackParams::from_url(&callback_url);
        assert_eq!(callback.return_url(), Some("/home"));
        assert_eq!(callback.get(STATE_PARAM), redirect.state.as_deref());
        assert_eq!(h.orchestrator.login_states().len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_ext_123() {
        let h = harness(admin_mapping());
        let redirect = h.orchestrator.begin_login(Some("/home")).unwrap();
        let params = provider_callback(&h, &redirect.location, "ext-123");

        let result = h
            .orchestrator
            .handle_callback(&params, redirect.state.as_deref())
            .await;
        assert_eq!(result.phase, LoginPhase::RedirectedSuccess);
        assert_eq!(result.location, "/home");
        assert!(result.error_code.is_none());
        let session = result.session.unwrap();
        assert_eq!(session.username, "ext-123");
        assert_eq!(session.return_url.as_deref(), Some("/home"));

        let account = h
            .accounts
            .find_by_username("ext-123")
            .await
            .unwrap()
            .unwrap();
        assert!(account.is_backend_user);
        assert!(account.has_role("Administrators"));
        assert_eq!(h.gate.active_scopes(), 0);
    }

    #[tokio::test]
    async fn test_callback_without_browser_state_is_refused() {
        let h = harness(admin_mapping());
        let redirect = h.orchestrator.begin_login(Some("/home")).unwrap();
        let params = provider_callback(&h, &redirect.location, "ext-123");

        let result = h.orchestrator.handle_callback(&params, None).await;
        assert_eq!(result.location, "/home?error=ResolutionFailed");
        assert!(result.session.is_none());
        assert_eq!(h.accounts.len(), 0);
    }

    #[tokio::test]
    async fn test_callback_from_another_login_is_refused() {
        let h = harness(admin_mapping());
        // The attacker's own login, signed by the provider.
        let attacker = h.orchestrator.begin_login(Some("/home")).unwrap();
        let params = provider_callback(&h, &attacker.location, "attacker");
        // The victim's browser holds the state of its own login.
        let victim = h.orchestrator.begin_login(Some("/home")).unwrap();

        let result = h
            .orchestrator
            .handle_callback(&params, victim.state.as_deref())
            .await;
        assert_eq!(result.phase, LoginPhase::RedirectedError);
        assert_eq!(result.location, "/home?error=ResolutionFailed");
        assert_eq!(h.accounts.len(), 0);
    }

    #[tokio::test]
    async fn test_replayed_callback_is_refused() {
        let h = harness(admin_mapping());
        let redirect = h.orchestrator.begin_login(Some("/home")).unwrap();
        let params = provider_callback(&h, &redirect.location, "ext-123");

        let first = h
            .orchestrator
            .handle_callback(&params, redirect.state.as_deref())
            .await;
        assert!(first.is_success());

        let replay = h
            .orchestrator
            .handle_callback(&params, redirect.state.as_deref())
            .await;
        assert_eq!(replay.phase, LoginPhase::RedirectedError);
        assert_eq!(replay.location, "/home?error=ResolutionFailed");
        assert!(replay.session.is_none());
        assert!(h.orchestrator.login_states().is_empty());
    }

    #[tokio::test]
    async fn test_state_is_covered_by_signature() {
        let h = harness(admin_mapping());
        let signed_for = h.orchestrator.begin_login(Some("/home")).unwrap();
        let params = provider_callback(&h, &signed_for.location, "ext-123");
        let other = h.orchestrator.begin_login(Some("/home")).unwrap();
        let other_state = other.state.clone().unwrap();

        let swapped = params.with(STATE_PARAM, other_state.as_str());
        let result = h
            .orchestrator
            .handle_callback(&swapped, Some(other_state.as_str()))
            .await;
        assert_eq!(result.location, "/home?error=ResolutionFailed");
        assert_eq!(h.accounts.len(), 0);
    }

    #[tokio::test]
    async fn test_invalid_signature_redirects_with_error() {
        let h = harness(admin_mapping());
        let params = CallbackParams::from_pairs([
            ("returnUrl", "/home"),
            ("sub", "ext-123"),
            ("ts", "1700000000"),
            ("sig", "00"),
        ]);

        let result = h.orchestrator.handle_callback(&params, None).await;
        assert_eq!(result.phase, LoginPhase::RedirectedError);
        assert_eq!(result.location, "/home?error=ResolutionFailed");
        assert!(result.session.is_none());
        assert_eq!(h.accounts.len(), 0);
    }

    #[tokio::test]
    async fn test_error_appended_with_ampersand() {
        let h = harness(admin_mapping());
        let params = CallbackParams::from_pairs([
            ("returnUrl", "/home?tab=2"),
            ("error", "access_denied"),
        ]);
        let result = h.orchestrator.handle_callback(&params, None).await;
        assert_eq!(result.location, "/home?tab=2&error=ResolutionFailed");
    }

    #[tokio::test]
    async fn test_foreign_return_url_replaced() {
        let h = harness(admin_mapping());
        let params = CallbackParams::from_pairs([
            ("returnUrl", "https://evil.example.com/"),
            ("error", "access_denied"),
        ]);
        let result = h.orchestrator.handle_callback(&params, None).await;
        assert_eq!(result.location, "/?error=ResolutionFailed");
    }

    #[tokio::test]
    async fn test_store_refusal_uses_reason_code() {
        let h = harness(admin_mapping());
        h.accounts.insert(
            LocalAccount::builder("ext-9")
                .external_identity("ext-9", "CustomIdentityProvider")
                .active(false)
                .build(),
        );
        let redirect = h.orchestrator.begin_login(Some("/home")).unwrap();
        let params = provider_callback(&h, &redirect.location, "ext-9");

        let result = h
            .orchestrator
            .handle_callback(&params, redirect.state.as_deref())
            .await;
        assert_eq!(result.location, "/home?error=UserInactive");
        assert_eq!(
            result.error_code,
            Some(LoginFailureReason::UserInactive.code())
        );
    }

    struct FailingResolver;

    #[async_trait]
    impl IdentityResolver for FailingResolver {
        fn provider_name(&self) -> &str {
            "Failing"
        }

        fn authorization_url(&self, callback_url: &Url) -> Result<Url, ResolutionError> {
            Ok(callback_url.clone())
        }

        async fn resolve(
            &self,
            _params: &CallbackParams,
        ) -> Result<ExternalIdentity, ResolutionError> {
            Err(ResolutionError::MissingSubject)
        }
    }

    #[tokio::test]
    async fn test_failing_resolver_redirects_with_error() {
        let h = harness(admin_mapping());
        let config = auth_config(admin_mapping());
        let orchestrator = LoginOrchestrator::new(
            &config,
            Arc::new(FailingResolver),
            h.orchestrator.mapper().clone(),
        )
        .unwrap();

        // This resolver sends the browser straight back to the callback URL.
        let redirect = orchestrator.begin_login(Some("/home")).unwrap();
        let params = CallbackParams::from_url(&Url::parse(&redirect.location).unwrap());
        let result = orchestrator
            .handle_callback(&params, redirect.state.as_deref())
            .await;
        assert_eq!(RedirectInstruction::STATUS, 302);
        assert_eq!(result.location, "/home?error=ResolutionFailed");
        assert!(result.phase.is_terminal());
    }

    #[tokio::test]
    async fn test_delegated_strategy_writes_nothing_locally() {
        let h = harness(MappingConfig::Delegated(DelegatedMappingConfig::default()));
        let redirect = h.orchestrator.begin_login(Some("/news")).unwrap();
        let params = provider_callback(&h, &redirect.location, "ext-123");

        let result = h
            .orchestrator
            .handle_callback(&params, redirect.state.as_deref())
            .await;
        assert!(result.is_success());
        assert_eq!(result.location, "/news");
        assert_eq!(h.accounts.len(), 0);
        assert_eq!(h.orchestrator.mapper().strategy(), "delegated");
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(LoginPhase::AwaitingCallback.to_string(), "awaiting_callback");
        assert!(!LoginPhase::Mapping.is_terminal());
        assert!(LoginPhase::RedirectedError.is_terminal());
    }
}
