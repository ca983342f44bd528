use reqwest::{StatusCode, header};
use sitegate_auth::config::{CustomMappingConfig, MappingConfig};
use sitegate_auth::federation::{CallbackParams, SignedCallbackResolver};
use sitegate_auth::storage::AccountStorage;
use sitegate_server::config::{AppConfig, SeedAccount};
use sitegate_server::{AppServices, router};
use url::Url;

const SECRET: &str = "endpoint-secret";

struct TestServer {
    base: String,
    services: AppServices,
    resolver: SignedCallbackResolver,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

async fn start_server() -> TestServer {
    // Bind to an ephemeral port first so the public base URL is known.
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let mut cfg = AppConfig::default();
    cfg.auth.public_base_url = base.clone();
    cfg.auth.external.shared_secret = SECRET.to_string();
    cfg.auth.external.mapping = MappingConfig::Custom(CustomMappingConfig {
        initial_roles: vec!["Administrators".to_string()],
        ..CustomMappingConfig::default()
    });
    cfg.accounts.push(SeedAccount {
        username: "editor".to_string(),
        email: None,
        roles: vec!["Users".to_string()],
        backend_user: false,
        active: true,
        external_id: None,
        external_provider_name: None,
    });
    cfg.validate().expect("valid config");

    let services = AppServices::from_config(&cfg).await.expect("services");
    let app = router(&cfg, &services);
    let resolver = SignedCallbackResolver::from_config(&cfg.auth.external).expect("resolver");

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base,
        services,
        resolver,
        shutdown: tx,
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn location(resp: &reqwest::Response) -> String {
    resp.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

fn set_cookies(resp: &reqwest::Response) -> Vec<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the login state cookie set by the login endpoint.
fn login_state(resp: &reqwest::Response) -> String {
    set_cookies(resp)
        .into_iter()
        .find_map(|c| {
            c.strip_prefix("sitegate_login_state=")
                .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
        })
        .expect("login state cookie")
}

/// Follows the provider redirect and returns the signed callback URL for
/// `subject`.
fn signed_callback(server: &TestServer, provider_location: &str, subject: &str) -> Url {
    let provider_url = Url::parse(provider_location).unwrap();
    let callback = CallbackParams::from_url(&provider_url)
        .return_url()
        .expect("callback URL passed to provider")
        .to_string();
    let mut callback_url = Url::parse(&callback).unwrap();

    let ts = time::OffsetDateTime::now_utc().unix_timestamp().to_string();
    let params = CallbackParams::from_url(&callback_url)
        .with("sub", subject)
        .with("ts", ts.clone());
    let sig = server.resolver.sign(&params);

    callback_url
        .query_pairs_mut()
        .append_pair("sub", subject)
        .append_pair("ts", &ts)
        .append_pair("sig", &sig);
    callback_url
}

#[tokio::test]
async fn healthz_reports_ok() {
    let server = start_server().await;
    let resp = client()
        .get(format!("{}/healthz", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn external_login_round_trip() {
    let server = start_server().await;
    let client = client();

    let resp = client
        .get(format!("{}/external.auth/login?returnUrl=/docs/intro", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    let provider_location = location(&resp);
    assert!(provider_location.starts_with("https://www.myidentityprovider.com/login?"));
    let state = login_state(&resp);

    let callback = signed_callback(&server, &provider_location, "ext-123");
    assert!(callback.as_str().starts_with(&format!("{}/external.auth/callback?", server.base)));

    let resp = client
        .get(callback.clone())
        .header(header::COOKIE, format!("sitegate_login_state={state}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/docs/intro");
    let cookies = set_cookies(&resp);
    assert!(cookies.iter().any(|c| c.starts_with("sitegate_session=")));

    // The same callback cannot be used twice.
    let replay = client
        .get(callback)
        .header(header::COOKIE, format!("sitegate_login_state={state}"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&replay), "/docs/intro?error=ResolutionFailed");
    assert!(
        !set_cookies(&replay)
            .iter()
            .any(|c| c.starts_with("sitegate_session="))
    );

    let account = server
        .services
        .accounts
        .find_by_username("ext-123")
        .await
        .unwrap()
        .expect("account created");
    assert!(account.has_role("Administrators"));
    assert!(account.is_backend_user);
    assert!(!server.services.gate.is_elevated());
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn tampered_callback_redirects_with_error() {
    let server = start_server().await;
    let client = client();

    let resp = client
        .get(format!("{}/external.auth/login?returnUrl=/docs", server.base))
        .send()
        .await
        .unwrap();
    let state = login_state(&resp);
    let mut callback = signed_callback(&server, &location(&resp), "ext-123");
    callback.query_pairs_mut().append_pair("claim.role", "admin");

    let resp = client
        .get(callback)
        .header(header::COOKIE, format!("sitegate_login_state={state}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/docs?error=ResolutionFailed");
    assert!(
        !set_cookies(&resp)
            .iter()
            .any(|c| c.starts_with("sitegate_session="))
    );
    assert!(
        server
            .services
            .accounts
            .find_by_username("ext-123")
            .await
            .unwrap()
            .is_none()
    );
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn foreign_return_url_falls_back_to_default() {
    let server = start_server().await;
    let client = client();

    let resp = client
        .get(format!(
            "{}/external.auth/callback?returnUrl=https://evil.example.net/&error=access_denied",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/?error=ResolutionFailed");
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn local_widget_signs_in_with_valid_csrf() {
    let server = start_server().await;
    let client = client();
    let url = format!("{}/samples/local-auth", server.base);

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let csrf_cookie = set_cookies(&resp)
        .into_iter()
        .find(|c| c.starts_with("sitegate_csrf="))
        .expect("csrf cookie");
    let token = csrf_cookie
        .trim_start_matches("sitegate_csrf=")
        .split(';')
        .next()
        .unwrap()
        .to_string();

    // Bad token: empty body, no session.
    let resp = client
        .post(&url)
        .header(header::COOKIE, format!("sitegate_csrf={token}"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("username=editor&csrf_token=forged")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "");

    // Unknown user: form with error.
    let resp = client
        .post(&url)
        .header(header::COOKIE, format!("sitegate_csrf={token}"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(format!("username=nobody&csrf_token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains(">Error<"));

    // Known user with remember me: persistent session cookie.
    let resp = client
        .post(&url)
        .header(header::COOKIE, format!("sitegate_csrf={token}"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(format!("username=editor&remember_me=true&csrf_token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/samples/local-auth");
    let session_cookie = set_cookies(&resp)
        .into_iter()
        .find(|c| c.starts_with("sitegate_session="))
        .expect("session cookie");
    assert!(session_cookie.contains("Max-Age="));
    assert_eq!(server.services.sessions.len(), 1);
    let _ = server.shutdown.send(());
}
