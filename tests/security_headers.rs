#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App, HttpResponse};
use common::Harness;
use qahub::{config, SecurityHeaders};

#[actix_web::test]
#[serial_test::serial]
async fn test_security_headers_present() {
    let h = Harness::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(false))
            .app_data(web::Data::new(h.state()))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/categories").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("referrer-policy").unwrap(), "same-origin");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
}

#[actix_web::test]
#[serial_test::serial]
async fn test_hsts_enabled() {
    let h = Harness::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(true))
            .app_data(web::Data::new(h.state()))
            .configure(config),
    )
    .await;
    // error responses carry the headers too
    let req = test::TestRequest::get().uri("/api/v1/questions/404").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert!(resp.headers().get("strict-transport-security").unwrap().to_str().unwrap().contains("max-age="));
    assert!(resp.headers().get("content-security-policy").is_some());
}

#[actix_web::test]
async fn handler_headers_are_not_overridden() {
    let app = test::init_service(App::new().wrap(SecurityHeaders::new(false)).route(
        "/framed",
        web::get().to(|| async { HttpResponse::Ok().insert_header(("X-Frame-Options", "SAMEORIGIN")).finish() }),
    ))
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/framed").to_request()).await;
    assert_eq!(resp.headers().get("x-frame-options").unwrap(), "SAMEORIGIN");
    assert_eq!(resp.headers().get("referrer-policy").unwrap(), "same-origin");
}
