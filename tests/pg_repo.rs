#![cfg(feature = "postgres-store")]

use qahub::models::{ContentKind, NewAttachment, NewCategory, NewQuestion, NewTask, NewTaskNote};
use qahub::repo::pg::PgRepo;
use qahub::repo::{AttachmentRepo, CategoryRepo, QuestionRepo, RepoError, TaskRepo, UserRepo};

async fn pg_repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await
        .ok()?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.ok()?;
    Some(repo)
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

#[tokio::test]
#[serial_test::serial]
async fn duplicate_slug_is_a_conflict() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let slug = unique("cat");
    let new = NewCategory { name: "Category".into(), slug: slug.clone(), description: String::new() };
    let created = repo.create_category(new.clone()).await.unwrap();
    assert!(matches!(repo.create_category(new).await, Err(RepoError::Conflict(_))));
    assert_eq!(repo.get_category_by_slug(&slug).await.unwrap().id, created.id);
    repo.delete_category(created.id).await.unwrap();
}

#[tokio::test]
#[serial_test::serial]
async fn questions_round_trip_with_tags_and_answers() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let tag = unique("tag");
    let q = repo
        .create_question(NewQuestion {
            title: "Stored in postgres".into(),
            content: "<p>Body with enough visible text.</p>".into(),
            category_id: None,
            tags: vec![tag.clone(), "zz-common".into()],
            author_id: None,
        })
        .await
        .unwrap();
    assert_eq!(q.tags, vec![tag.clone(), "zz-common".to_string()]);

    let viewed = repo.increment_views(q.id).await.unwrap();
    assert_eq!(viewed.views, 1);
    assert_eq!(viewed.updated_at, q.updated_at);

    let blank = repo.set_answer(q.id, "<p>&nbsp;</p>").await.unwrap();
    assert!(!blank.has_answer());
    let answered = repo.set_answer(q.id, "<p>A real answer</p>").await.unwrap();
    assert!(answered.has_answer());

    assert!(repo.delete_question(q.id).await.unwrap().is_empty());
    assert!(matches!(repo.get_question(q.id).await, Err(RepoError::NotFound)));
}

#[tokio::test]
#[serial_test::serial]
async fn task_delete_cascades_to_notes_and_files() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let author = 900_000 + (uuid::Uuid::new_v4().as_u128() % 1000) as i64;
    repo.upsert_user(author, "pg-tester", false).await.unwrap();
    let task = repo
        .create_task(NewTask { title: unique("task"), description: String::new(), author_id: author, question_id: None })
        .await
        .unwrap();
    let note = repo
        .create_note(NewTaskNote { task_id: task.id, title: String::new(), content: "<p>n</p>".into(), position: None, author_id: author })
        .await
        .unwrap();
    assert_eq!(note.position, 0);
    for (kind, id) in [(ContentKind::Task, task.id), (ContentKind::TaskNote, note.id)] {
        repo.create_attachment(NewAttachment {
            content_kind: kind,
            object_id: id,
            file_key: format!("{}/{}_{id}/f.txt", kind.folder(), kind),
            name: "f.txt".into(),
            size_bytes: 1,
            uploaded_by: Some(author),
        })
        .await
        .unwrap();
    }

    let removed = repo.delete_task(task.id).await.unwrap();
    assert_eq!(removed.len(), 2);
    assert!(matches!(repo.get_note(note.id).await, Err(RepoError::NotFound)));
}
