use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::http::header;
use actix_web::{middleware, test, web, App};
use crm_server::auth::guard::route_guard;
use crm_server::auth::SESSION_COOKIE;
use crm_server::{configure_app, AppState, Settings};
use serde_json::{json, Value};
use totp_rs::{Algorithm, Secret, TOTP};

async fn test_state() -> AppState {
    let mut config = Settings::new_for_test().expect("Failed to load test config");
    config.auth.bootstrap_username = Some("admin".into());
    config.auth.bootstrap_password = Some("correct-password".into());
    config.auth.bootstrap_display_name = Some("Admin".into());
    AppState::new(config).await.expect("Failed to build state")
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .wrap(middleware::from_fn(route_guard))
                .configure(configure_app),
        )
        .await
    };
}

fn session_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    resp.response()
        .cookies()
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.into_owned())
}

fn current_code(secret: &str) -> String {
    let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
    TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, "test".to_string())
        .unwrap()
        .generate_current()
        .unwrap()
}

fn login_request(username: &str, password: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": username, "password": password }))
}

#[actix_web::test]
async fn test_login_without_two_factor_sets_cookie() {
    let app = test_app!(test_state().await);

    let resp = test::call_service(&app, login_request("admin", "correct-password").to_request()).await;
    assert_eq!(resp.status(), 200);
    let cookie = session_cookie(&resp).expect("session cookie");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.path(), Some("/"));

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "success": true }));

    // The cookie opens guarded routes
    let req = test::TestRequest::get()
        .uri("/api/auth/session")
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let session: Value = test::read_body_json(resp).await;
    assert_eq!(session["name"], "Admin");
    assert_eq!(session["twoFactorVerified"], false);
}

#[actix_web::test]
async fn test_wrong_password_matches_unknown_user() {
    let app = test_app!(test_state().await);

    let wrong = test::call_service(&app, login_request("admin", "wrong-password").to_request()).await;
    assert_eq!(wrong.status(), 401);
    assert!(session_cookie(&wrong).is_none());
    let wrong_body: Value = test::read_body_json(wrong).await;

    let unknown = test::call_service(&app, login_request("nobody", "wrong-password").to_request()).await;
    assert_eq!(unknown.status(), 401);
    let unknown_body: Value = test::read_body_json(unknown).await;

    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body["success"], false);
}

#[actix_web::test]
async fn test_missing_credentials_rejected() {
    let app = test_app!(test_state().await);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": "admin" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_malformed_body_is_structured_failure() {
    let app = test_app!(test_state().await);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["status"], 400);
    assert_eq!(body["error"]["message"], "Invalid request body");

    // Well-formed JSON with the wrong types takes the same path
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": 42, "password": ["x"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Invalid request body");
}

#[actix_web::test]
async fn test_eleventh_attempt_is_rate_limited() {
    let app = test_app!(test_state().await);

    for _ in 0..10 {
        let resp = test::call_service(&app, login_request("admin", "wrong-password").to_request()).await;
        assert_eq!(resp.status(), 401);
    }

    let resp = test::call_service(&app, login_request("admin", "correct-password").to_request()).await;
    assert_eq!(resp.status(), 429);
    assert!(session_cookie(&resp).is_none());
}

#[actix_web::test]
async fn test_two_factor_enrollment_and_login() {
    let app = test_app!(test_state().await);

    let resp = test::call_service(&app, login_request("admin", "correct-password").to_request()).await;
    let cookie = session_cookie(&resp).unwrap();

    // Propose a secret; nothing is enabled yet
    let req = test::TestRequest::post()
        .uri("/api/account/two-factor/setup")
        .cookie(cookie.clone())
        .to_request();
    let setup: Value = test::call_and_read_body_json(&app, req).await;
    let secret = setup["secret"].as_str().unwrap().to_string();
    assert!(setup["provisioningUri"].as_str().unwrap().starts_with("otpauth://totp/"));

    let req = test::TestRequest::get()
        .uri("/api/account/two-factor")
        .cookie(cookie.clone())
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["enabled"], false);

    // Prove possession, then enable
    let req = test::TestRequest::post()
        .uri("/api/account/two-factor/enable")
        .cookie(cookie.clone())
        .set_json(json!({ "secret": secret, "code": current_code(&secret) }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // Password step now yields a challenge and no cookie
    let resp = test::call_service(&app, login_request("admin", "correct-password").to_request()).await;
    assert_eq!(resp.status(), 200);
    assert!(session_cookie(&resp).is_none());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["requiresTwoFactor"], true);
    let challenge = body["challengeToken"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/auth/verify-2fa")
        .set_json(json!({ "challengeToken": challenge, "code": current_code(&secret) }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let cookie = session_cookie(&resp).expect("session cookie after second factor");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "success": true }));

    let req = test::TestRequest::get()
        .uri("/api/auth/session")
        .cookie(cookie.clone())
        .to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(session["twoFactorVerified"], true);

    // The same challenge cannot be exchanged twice
    let req = test::TestRequest::post()
        .uri("/api/auth/verify-2fa")
        .set_json(json!({ "challengeToken": challenge, "code": current_code(&secret) }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // Disable again: back to single-step login
    let req = test::TestRequest::post()
        .uri("/api/account/two-factor/disable")
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let resp = test::call_service(&app, login_request("admin", "correct-password").to_request()).await;
    assert!(session_cookie(&resp).is_some());
}

#[actix_web::test]
async fn test_verify_two_factor_with_garbage_challenge() {
    let app = test_app!(test_state().await);

    let req = test::TestRequest::post()
        .uri("/api/auth/verify-2fa")
        .set_json(json!({ "challengeToken": "not-a-token", "code": "123456" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Invalid or expired challenge");
}

#[actix_web::test]
async fn test_change_password() {
    let app = test_app!(test_state().await);

    let resp = test::call_service(&app, login_request("admin", "correct-password").to_request()).await;
    let cookie = session_cookie(&resp).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/account/password")
        .cookie(cookie.clone())
        .set_json(json!({ "currentPassword": "correct-password", "newPassword": "short" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/account/password")
        .cookie(cookie)
        .set_json(json!({ "currentPassword": "correct-password", "newPassword": "a-much-better-one" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let resp = test::call_service(&app, login_request("admin", "a-much-better-one").to_request()).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_logout_expires_cookie() {
    let app = test_app!(test_state().await);

    let resp = test::call_service(&app, login_request("admin", "correct-password").to_request()).await;
    let cookie = session_cookie(&resp).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/auth/logout")
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let cleared = session_cookie(&resp).expect("cleared cookie");
    assert_eq!(cleared.value(), "");
    assert_eq!(cleared.max_age(), Some(actix_web::cookie::time::Duration::ZERO));
}
