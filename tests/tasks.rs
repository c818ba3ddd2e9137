#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use common::{bearer, multipart_body, staff_token, user_token, Harness, LONG_CONTENT};
use qahub::repo::TaskRepo;
use serde_json::json;
use serial_test::serial;

#[actix_web::test]
#[serial]
async fn tracker_requires_authentication() {
    let h = Harness::new();
    let app = test_app!(h.state()).await;

    let (status, _) = call_json!(app, test::TestRequest::get().uri("/api/v1/tasks"));
    assert_eq!(status, 401);
    let (status, _) = call_json!(
        app,
        test::TestRequest::post().uri("/api/v1/tasks").set_json(json!({"title": "Sneaky"}))
    );
    assert_eq!(status, 401);

    let (_, task) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/tasks")
            .insert_header(bearer(&user_token(2, "alice")))
            .set_json(json!({"title": "Renew certificates"}))
    );
    let id = task["task"]["id"].as_i64().unwrap();
    let (status, _) = call_json!(app, test::TestRequest::get().uri(&format!("/api/v1/files/task/{id}")));
    assert_eq!(status, 401);
    let (status, files) = call_json!(
        app,
        test::TestRequest::get().uri(&format!("/api/v1/files/task/{id}")).insert_header(bearer(&staff_token()))
    );
    assert_eq!(status, 200);
    assert_eq!(files, json!([]));
}

#[actix_web::test]
#[serial]
async fn task_with_notes_lifecycle() {
    let h = Harness::new();
    let app = test_app!(h.state()).await;
    let alice = user_token(2, "alice");
    let bob = user_token(3, "bob");

    let (_, created) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/questions")
            .insert_header(bearer(&alice))
            .set_json(json!({"title": "Laptop battery swelling", "content": LONG_CONTENT}))
    );
    let question_id = created["question"]["id"].as_i64().unwrap();

    let (status, err) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/tasks")
            .insert_header(bearer(&alice))
            .set_json(json!({"title": "Order replacement", "question_id": 9999}))
    );
    assert_eq!(status, 422);
    assert!(err["fields"]["question_id"].is_array());

    let (status, created) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/tasks")
            .insert_header(bearer(&alice))
            .set_json(json!({
                "title": "Order replacement",
                "description": "<p>Ask procurement</p><script>alert(1)</script>",
                "question_id": question_id
            }))
    );
    assert_eq!(status, 201);
    let task_id = created["task"]["id"].as_i64().unwrap();
    assert!(!created["task"]["description"].as_str().unwrap().contains("<script"));

    // notes append in order unless one is given
    for title in ["Called vendor", "Part shipped"] {
        let (status, note) = call_json!(
            app,
            test::TestRequest::post()
                .uri(&format!("/api/v1/tasks/{task_id}/notes"))
                .insert_header(bearer(&alice))
                .set_json(json!({"title": title, "content": "<p>Progress update</p>"}))
        );
        assert_eq!(status, 201);
        assert_eq!(note["can_edit"], true);
    }

    let (status, _) = call_json!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/tasks/{task_id}/notes"))
            .insert_header(bearer(&bob))
            .set_json(json!({"content": "<p>Not my task</p>"}))
    );
    assert_eq!(status, 403);

    let (status, err) = call_json!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/tasks/{task_id}/notes"))
            .insert_header(bearer(&alice))
            .set_json(json!({"content": "<p>   </p>"}))
    );
    assert_eq!(status, 422);
    assert!(err["fields"]["content"].is_array());

    let (status, detail) = call_json!(
        app,
        test::TestRequest::get().uri(&format!("/api/v1/tasks/{task_id}")).insert_header(bearer(&bob))
    );
    assert_eq!(status, 200);
    assert_eq!(detail["can_edit"], false);
    assert_eq!(detail["question"]["id"], question_id);
    let notes = detail["notes"].as_array().unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0]["title"], "Called vendor");
    assert_eq!(notes[0]["order"], 0);
    assert_eq!(notes[1]["order"], 1);
    assert_eq!(notes[1]["can_edit"], false);

    let note_id = notes[1]["id"].as_i64().unwrap();
    let (status, note) = call_json!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/api/v1/notes/{note_id}"))
            .insert_header(bearer(&alice))
            .set_json(json!({"order": 0, "title": "Part shipped early"}))
    );
    assert_eq!(status, 200);
    assert_eq!(note["title"], "Part shipped early");

    let (status, task) = call_json!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/api/v1/tasks/{task_id}"))
            .insert_header(bearer(&alice))
            .set_json(json!({"question_id": null}))
    );
    assert_eq!(status, 200);
    assert!(task["question_id"].is_null());

    let (_, list) = call_json!(
        app,
        test::TestRequest::get().uri("/api/v1/tasks").insert_header(bearer(&bob))
    );
    assert_eq!(list["total"], 1);
    assert_eq!(list["per_page"], 20);
}

#[actix_web::test]
#[serial]
async fn deleting_a_task_purges_note_blobs() {
    let h = Harness::new();
    let app = test_app!(h.state()).await;
    let alice = user_token(2, "alice");

    let (ct, body) = multipart_body(&[("title", "Migrate file share")], &[("inventory.xlsx", b"PK")]);
    let (status, created) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/tasks")
            .insert_header(bearer(&alice))
            .insert_header(("content-type", ct))
            .set_payload(body)
    );
    assert_eq!(status, 201);
    let task_id = created["task"]["id"].as_i64().unwrap();

    let (ct, body) = multipart_body(
        &[("title", "Copied"), ("content", "<p>First batch copied</p>"), ("order", "5")],
        &[("batch1.txt", b"done"), ("batch1.png", b"img")],
    );
    let (status, note) = call_json!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/tasks/{task_id}/notes"))
            .insert_header(bearer(&alice))
            .insert_header(("content-type", ct))
            .set_payload(body)
    );
    assert_eq!(status, 201);
    assert_eq!(note["order"], 5);
    assert_eq!(note["files"].as_array().unwrap().len(), 2);
    let note_id = note["id"].as_i64().unwrap();
    assert!(h.store.get(&format!("task_notes/tasknote_{note_id}/batch1.txt")).is_some());
    assert_eq!(h.store.keys().len(), 3);

    let (status, _) = call_json!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/v1/tasks/{task_id}"))
            .insert_header(bearer(&user_token(3, "bob")))
    );
    assert_eq!(status, 403);

    let (status, _) = call_json!(
        app,
        test::TestRequest::delete().uri(&format!("/api/v1/tasks/{task_id}")).insert_header(bearer(&alice))
    );
    assert_eq!(status, 200);
    assert!(h.store.keys().is_empty());
    assert_eq!(h.store.deleted().len(), 3);

    assert!(h.repo.get_note(note_id).await.is_err());
}

#[actix_web::test]
#[serial]
async fn invalid_note_order_is_a_field_error() {
    let h = Harness::new();
    let app = test_app!(h.state()).await;
    let alice = user_token(2, "alice");
    let (_, created) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/tasks")
            .insert_header(bearer(&alice))
            .set_json(json!({"title": "Audit licences"}))
    );
    let task_id = created["task"]["id"].as_i64().unwrap();

    let (ct, body) = multipart_body(&[("content", "<p>Counted seats</p>"), ("order", "first")], &[]);
    let (status, err) = call_json!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/tasks/{task_id}/notes"))
            .insert_header(bearer(&alice))
            .insert_header(("content-type", ct))
            .set_payload(body)
    );
    assert_eq!(status, 422);
    assert!(err["fields"]["order"].is_array());

    let (status, err) = call_json!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/tasks/{task_id}/notes"))
            .insert_header(bearer(&alice))
            .set_json(json!({"content": "<p>Counted seats</p>", "order": -1}))
    );
    assert_eq!(status, 422);
    assert!(err["fields"]["order"].is_array());

    let (status, err) = call_json!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/tasks/{task_id}/notes"))
            .insert_header(bearer(&alice))
            .set_json(json!({"content": "<p>Counted seats</p>", "order": i32::MAX}))
    );
    assert_eq!(status, 422);
    assert!(err["fields"]["order"].is_array());

    // the largest accepted order still lets later notes append
    let (status, _) = call_json!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/tasks/{task_id}/notes"))
            .insert_header(bearer(&alice))
            .set_json(json!({"content": "<p>Counted seats</p>", "order": qahub::validation::MAX_NOTE_ORDER}))
    );
    assert_eq!(status, 201);
    let (status, note) = call_json!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/tasks/{task_id}/notes"))
            .insert_header(bearer(&alice))
            .set_json(json!({"content": "<p>Renewed seats</p>"}))
    );
    assert_eq!(status, 201);
    assert_eq!(note["order"], qahub::validation::MAX_NOTE_ORDER + 1);
}
