use taskgraph_core::db::open_db_in_memory;
use taskgraph_core::{
    NewProject, NewTask, ProjectPatch, ProjectService, ProjectServiceError,
    SqliteProjectRepository, SqliteTaskRepository, TaskService, TaskServiceError,
};
use uuid::Uuid;

fn new_project(name: &str) -> NewProject {
    NewProject {
        name: name.to_string(),
        description: "quarterly goals".to_string(),
    }
}

#[test]
fn create_get_and_list_are_owner_scoped() {
    let conn = open_db_in_memory().unwrap();
    let service = ProjectService::new(SqliteProjectRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let first = service.create_project(owner, &new_project(" Q1 ")).unwrap();
    let second = service.create_project(owner, &new_project("Q2")).unwrap();
    service.create_project(stranger, &new_project("Other")).unwrap();

    let loaded = service.get_project(owner, first.project_id).unwrap();
    assert_eq!(loaded.name, "Q1");
    assert_eq!(loaded.description, "quarterly goals");

    let listed: Vec<_> = service
        .list_projects(owner)
        .unwrap()
        .into_iter()
        .map(|project| project.project_id)
        .collect();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&first.project_id));
    assert!(listed.contains(&second.project_id));

    let err = service.get_project(stranger, first.project_id).unwrap_err();
    assert!(matches!(err, ProjectServiceError::ProjectNotFound(_)));
}

#[test]
fn update_project_applies_patch() {
    let conn = open_db_in_memory().unwrap();
    let service = ProjectService::new(SqliteProjectRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();
    let project = service.create_project(owner, &new_project("Draft")).unwrap();

    let updated = service
        .update_project(
            owner,
            project.project_id,
            &ProjectPatch {
                name: Some("Final".to_string()),
                description: None,
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Final");
    assert_eq!(updated.description, "quarterly goals");

    let err = service
        .update_project(
            owner,
            project.project_id,
            &ProjectPatch {
                name: Some(" ".to_string()),
                description: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ProjectServiceError::Validation(_)));

    let err = service
        .update_project(Uuid::new_v4(), project.project_id, &ProjectPatch::default())
        .unwrap_err();
    assert!(matches!(err, ProjectServiceError::ProjectNotFound(_)));
}

#[test]
fn delete_project_removes_tasks_and_dependencies() {
    let conn = open_db_in_memory().unwrap();
    let projects = ProjectService::new(SqliteProjectRepository::try_new(&conn).unwrap());
    let tasks = TaskService::new(SqliteTaskRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();
    let project = projects
        .create_project(owner, &new_project("Doomed"))
        .unwrap()
        .project_id;

    let a = tasks
        .create_task(owner, project, &NewTask::named("A"))
        .unwrap()
        .task_id;
    let mut request = NewTask::named("B");
    request.blocked_by = vec![a];
    tasks.create_task(owner, project, &request).unwrap();

    let err = projects.delete_project(Uuid::new_v4(), project).unwrap_err();
    assert!(matches!(err, ProjectServiceError::ProjectNotFound(_)));

    let deletion = projects.delete_project(owner, project).unwrap();
    assert_eq!(deletion.tasks_removed, 2);
    assert_eq!(deletion.dependencies_removed, 1);

    let err = tasks.list_tasks(owner, project).unwrap_err();
    assert!(matches!(err, TaskServiceError::ProjectNotFound(_)));
    assert!(projects.list_projects(owner).unwrap().is_empty());
}

#[test]
fn update_project_keeps_updated_at_monotonic() {
    let conn = open_db_in_memory().unwrap();
    let service = ProjectService::new(SqliteProjectRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();

    for index in 0..20 {
        let created = service
            .create_project(owner, &new_project(&format!("Project {index}")))
            .unwrap();
        let first = service
            .update_project(
                owner,
                created.project_id,
                &ProjectPatch {
                    name: Some(format!("Renamed {index}")),
                    description: None,
                },
            )
            .unwrap();
        assert!(
            first.updated_at >= first.created_at,
            "created_at={} updated_at={}",
            first.created_at,
            first.updated_at
        );

        let second = service
            .update_project(owner, created.project_id, &ProjectPatch::default())
            .unwrap();
        assert!(second.updated_at >= first.updated_at);
    }
}
