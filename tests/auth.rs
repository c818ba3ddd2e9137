#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use common::{bearer, user_token, Harness, LONG_CONTENT, SECRET};
use jsonwebtoken::{encode, EncodingKey, Header};
use qahub::auth::{Claims, Role};
use qahub::repo::UserRepo;
use serde_json::json;
use serial_test::serial;

fn token_with(sub: &str, exp_offset_secs: i64) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        username: "mallory".into(),
        exp: (chrono::Utc::now().timestamp() + exp_offset_secs) as usize,
        roles: vec![Role::Staff],
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

#[actix_web::test]
#[serial]
async fn bad_tokens_are_rejected() {
    let h = Harness::new();
    let app = test_app!(h.state()).await;

    for token in ["garbage".to_string(), token_with("7", -3600), token_with("not-a-number", 3600)] {
        let (status, body) = call_json!(
            app,
            test::TestRequest::post()
                .uri("/api/v1/categories")
                .insert_header(bearer(&token))
                .set_json(json!({"name": "Ops"}))
        );
        assert_eq!(status, 401);
        assert_eq!(body["success"], false);
    }

    // optional auth falls back to anonymous
    let (status, _) = call_json!(
        app,
        test::TestRequest::get().uri("/api/v1/search?query=ops").insert_header(bearer("garbage"))
    );
    assert_eq!(status, 200);
}

#[actix_web::test]
#[serial]
async fn staff_role_comes_from_claims() {
    let h = Harness::new();
    let app = test_app!(h.state()).await;

    let (status, body) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/categories")
            .insert_header(bearer(&user_token(5, "eve")))
            .set_json(json!({"name": "Ops"}))
    );
    assert_eq!(status, 403);
    assert_eq!(body["error"], "Only staff can manage categories");

    let (status, _) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/categories")
            .insert_header(bearer(&token_with("7", 3600)))
            .set_json(json!({"name": "Ops"}))
    );
    assert_eq!(status, 201);
}

#[actix_web::test]
#[serial]
async fn writes_record_the_caller() {
    let h = Harness::new();
    let app = test_app!(h.state()).await;
    let (status, _) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/questions")
            .insert_header(bearer(&user_token(42, "zoe")))
            .set_json(json!({"title": "Who approves travel?", "content": LONG_CONTENT}))
    );
    assert_eq!(status, 201);
    let user = h.repo.get_user(42).await.unwrap();
    assert_eq!(user.username, "zoe");
    assert!(!user.is_staff);
}
