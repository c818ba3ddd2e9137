use crate::attachments::FileInfo;
use crate::models::{AttachedFile, Category, CategoryCount, ContentKind, Question, SearchCount, Tag, TagCount, Task, TaskNote};
use crate::routes::answers::AnswerResponse;
use crate::routes::catalog::HomePage;
use crate::routes::questions::{QuestionCreated, QuestionDetail, QuestionView};
use crate::routes::tasks::{NoteView, TaskCreated, TaskDetail};
use crate::routes::Done;
use crate::sidebar::SidebarStats;
use crate::validation::{AnswerForm, CategoryForm, NoteForm, NotePatch, QuestionForm, QuestionPatch, TaskForm, TaskPatch};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::catalog::home,
        crate::routes::catalog::sidebar,
        crate::routes::catalog::list_categories,
        crate::routes::catalog::create_category,
        crate::routes::catalog::delete_category,
        crate::routes::catalog::list_tags,
        crate::routes::questions::list_questions,
        crate::routes::questions::category_questions,
        crate::routes::questions::create_question,
        crate::routes::questions::get_question,
        crate::routes::questions::update_question,
        crate::routes::questions::delete_question,
        crate::routes::answers::submit_answer,
        crate::routes::answers::delete_answer,
        crate::routes::search::search,
        crate::routes::tasks::list_tasks,
        crate::routes::tasks::create_task,
        crate::routes::tasks::get_task,
        crate::routes::tasks::update_task,
        crate::routes::tasks::delete_task,
        crate::routes::tasks::create_note,
        crate::routes::tasks::update_note,
        crate::routes::tasks::delete_note,
        crate::routes::files::list_files,
        crate::routes::files::upload_files,
        crate::routes::files::delete_file,
    ),
    components(schemas(
        Category, CategoryCount, Tag, TagCount, SearchCount, Question, Task, TaskNote,
        AttachedFile, ContentKind,
        QuestionForm, QuestionPatch, AnswerForm, CategoryForm, TaskForm, TaskPatch, NoteForm, NotePatch,
        QuestionView, QuestionDetail, QuestionCreated, HomePage, SidebarStats, AnswerResponse,
        TaskDetail, TaskCreated, NoteView, FileInfo, Done,
    )),
    tags(
        (name = "questions", description = "Questions, answers and categories"),
        (name = "search", description = "Full-text search over published questions"),
        (name = "tasks", description = "Internal task tracker with notes"),
        (name = "files", description = "Attachments for questions, tasks and notes"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/api/v1/questions/{id}/answer",
            "/api/v1/search",
            "/api/v1/tasks/{id}/notes",
            "/api/v1/files/{kind}/{object_id}",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }
}
