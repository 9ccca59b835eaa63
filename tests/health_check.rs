use actix_web::{middleware, test, web, App};
use chrono::DateTime;
use crm_server::auth::guard::route_guard;
use crm_server::{configure_app, AppState, Settings};

#[actix_web::test]
async fn test_health_check() {
    // Create test app state
    let config = Settings::new_for_test().expect("Failed to load test config");
    let state = AppState::new(config).await.expect("Failed to build state");

    // Create test app; the health route must stay reachable behind the guard
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .wrap(middleware::from_fn(route_guard))
            .configure(configure_app),
    )
    .await;

    // Send request
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    // Assert response
    assert!(resp.status().is_success());

    // Parse response body
    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    // Verify response format
    assert_eq!(json["status"], "healthy");
    assert!(DateTime::parse_from_rfc3339(
        json["timestamp"].as_str().unwrap()
    ).is_ok());
}
