use rusqlite::Connection;
use std::collections::HashSet;
use taskgraph_core::db::open_db_in_memory;
use taskgraph_core::{
    DependencyEdge, NewProject, NewTask, OwnerId, ProjectId, ProjectService,
    SqliteProjectRepository, SqliteTaskRepository, TaskId, TaskPatch, TaskService,
    TaskServiceError, TaskStatus,
};
use uuid::Uuid;

struct Fixture {
    owner: OwnerId,
    project: ProjectId,
}

fn create_project(conn: &Connection, owner: OwnerId, name: &str) -> ProjectId {
    let projects = ProjectService::new(SqliteProjectRepository::try_new(conn).unwrap());
    projects
        .create_project(
            owner,
            &NewProject {
                name: name.to_string(),
                description: String::new(),
            },
        )
        .unwrap()
        .project_id
}

fn setup(conn: &Connection) -> Fixture {
    let owner = Uuid::new_v4();
    let project = create_project(conn, owner, "Release");
    Fixture { owner, project }
}

fn task_service(conn: &Connection) -> TaskService<SqliteTaskRepository<'_>> {
    TaskService::new(SqliteTaskRepository::try_new(conn).unwrap())
}

fn add_task(
    service: &TaskService<SqliteTaskRepository<'_>>,
    fixture: &Fixture,
    name: &str,
) -> TaskId {
    service
        .create_task(fixture.owner, fixture.project, &NewTask::named(name))
        .unwrap()
        .task_id
}

fn edge_set(
    service: &TaskService<SqliteTaskRepository<'_>>,
    fixture: &Fixture,
) -> HashSet<DependencyEdge> {
    service
        .list_dependencies(fixture.owner, fixture.project)
        .unwrap()
        .into_iter()
        .collect()
}

#[test]
fn reverse_edge_is_rejected_as_cycle() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let a = add_task(&service, &fixture, "A");
    let b = add_task(&service, &fixture, "B");

    service
        .add_dependency(fixture.owner, fixture.project, a, b)
        .unwrap();

    let err = service
        .add_dependency(fixture.owner, fixture.project, b, a)
        .unwrap_err();
    match err {
        TaskServiceError::Cycle {
            blocked,
            blocker,
            path,
        } => {
            assert_eq!((blocked, blocker), (b, a));
            assert_eq!(path, vec![b, a, b]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        edge_set(&service, &fixture),
        HashSet::from([DependencyEdge::new(a, b)])
    );
}

#[test]
fn self_dependency_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let a = add_task(&service, &fixture, "A");

    let err = service
        .add_dependency(fixture.owner, fixture.project, a, a)
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::Cycle { ref path, .. } if path == &vec![a, a]));
    assert!(err.to_string().contains("cannot depend on itself"));
    assert!(edge_set(&service, &fixture).is_empty());
}

#[test]
fn transitive_cycle_is_rejected_and_state_is_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let t1 = add_task(&service, &fixture, "T1");
    let t2 = add_task(&service, &fixture, "T2");
    let t3 = add_task(&service, &fixture, "T3");

    service
        .add_dependency(fixture.owner, fixture.project, t1, t2)
        .unwrap();
    service
        .add_dependency(fixture.owner, fixture.project, t2, t3)
        .unwrap();
    let before = edge_set(&service, &fixture);

    let err = service
        .add_dependency(fixture.owner, fixture.project, t3, t1)
        .unwrap_err();
    match err {
        TaskServiceError::Cycle { path, .. } => assert_eq!(path, vec![t3, t1, t2, t3]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(edge_set(&service, &fixture), before);
}

#[test]
fn duplicate_dependency_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let a = add_task(&service, &fixture, "A");
    let b = add_task(&service, &fixture, "B");

    service
        .add_dependency(fixture.owner, fixture.project, a, b)
        .unwrap();
    let err = service
        .add_dependency(fixture.owner, fixture.project, a, b)
        .unwrap_err();
    assert!(matches!(
        err,
        TaskServiceError::DuplicateDependency { blocked, blocker } if blocked == a && blocker == b
    ));
    assert_eq!(edge_set(&service, &fixture).len(), 1);
}

#[test]
fn missing_tasks_are_reported() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let a = add_task(&service, &fixture, "A");
    let ghost = Uuid::new_v4();

    let err = service
        .add_dependency(fixture.owner, fixture.project, a, ghost)
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::TaskNotFound(id) if id == ghost));

    let err = service
        .add_dependency(fixture.owner, fixture.project, ghost, a)
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::TaskNotFound(id) if id == ghost));
}

#[test]
fn unknown_or_foreign_project_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let stranger = Uuid::new_v4();

    let err = service
        .create_task(stranger, fixture.project, &NewTask::named("intruder"))
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::ProjectNotFound(id) if id == fixture.project));

    let missing = Uuid::new_v4();
    let err = service.list_tasks(fixture.owner, missing).unwrap_err();
    assert!(matches!(err, TaskServiceError::ProjectNotFound(id) if id == missing));
}

#[test]
fn tasks_of_another_project_cannot_be_linked() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let other = Fixture {
        owner: fixture.owner,
        project: create_project(&conn, fixture.owner, "Other"),
    };
    let service = task_service(&conn);
    let local = add_task(&service, &fixture, "local");
    let foreign = add_task(&service, &other, "foreign");

    let err = service
        .add_dependency(fixture.owner, fixture.project, local, foreign)
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::TaskNotFound(id) if id == foreign));

    let err = service
        .get_task(fixture.owner, fixture.project, foreign)
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::TaskNotFound(_)));
}

#[test]
fn deleting_task_cascades_its_edges() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let t1 = add_task(&service, &fixture, "T1");
    let t2 = add_task(&service, &fixture, "T2");
    let t3 = add_task(&service, &fixture, "T3");

    service
        .add_dependency(fixture.owner, fixture.project, t1, t2)
        .unwrap();
    service
        .add_dependency(fixture.owner, fixture.project, t2, t3)
        .unwrap();

    let removed = service
        .delete_task(fixture.owner, fixture.project, t2)
        .unwrap();
    assert_eq!(removed.len(), 2);
    assert!(removed.contains(&DependencyEdge::new(t1, t2)));
    assert!(removed.contains(&DependencyEdge::new(t2, t3)));
    assert!(edge_set(&service, &fixture).is_empty());

    let remaining: HashSet<TaskId> = service
        .list_tasks(fixture.owner, fixture.project)
        .unwrap()
        .into_iter()
        .map(|task| task.task_id)
        .collect();
    assert_eq!(remaining, HashSet::from([t1, t3]));

    // The former chain no longer constrains anything.
    let t2_again = add_task(&service, &fixture, "T2 again");
    service
        .add_dependency(fixture.owner, fixture.project, t3, t1)
        .unwrap();
    service
        .add_dependency(fixture.owner, fixture.project, t1, t2_again)
        .unwrap();
    assert_eq!(edge_set(&service, &fixture).len(), 2);
}

#[test]
fn deleting_missing_task_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let ghost = Uuid::new_v4();

    let err = service
        .delete_task(fixture.owner, fixture.project, ghost)
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::TaskNotFound(id) if id == ghost));
}

#[test]
fn remove_dependency_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let a = add_task(&service, &fixture, "A");
    let b = add_task(&service, &fixture, "B");

    service
        .add_dependency(fixture.owner, fixture.project, a, b)
        .unwrap();
    assert!(service
        .remove_dependency(fixture.owner, fixture.project, a, b)
        .unwrap());
    assert!(!service
        .remove_dependency(fixture.owner, fixture.project, a, b)
        .unwrap());
    assert!(!service
        .remove_dependency(fixture.owner, fixture.project, a, Uuid::new_v4())
        .unwrap());

    // Removing the edge frees the reverse direction.
    service
        .add_dependency(fixture.owner, fixture.project, b, a)
        .unwrap();
}

#[test]
fn remove_dependency_in_unknown_project_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = task_service(&conn);
    let missing = Uuid::new_v4();

    let err = service
        .remove_dependency(Uuid::new_v4(), missing, Uuid::new_v4(), Uuid::new_v4())
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::ProjectNotFound(id) if id == missing));
}

#[test]
fn create_task_with_initial_blockers() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let design = add_task(&service, &fixture, "design");
    let review = add_task(&service, &fixture, "review");

    let mut request = NewTask::named("ship");
    request.blocked_by = vec![design, review];
    let ship = service
        .create_task(fixture.owner, fixture.project, &request)
        .unwrap();

    let blockers: HashSet<TaskId> = service
        .list_blockers(fixture.owner, fixture.project, ship.task_id)
        .unwrap()
        .into_iter()
        .map(|task| task.task_id)
        .collect();
    assert_eq!(blockers, HashSet::from([design, review]));

    let dependents = service
        .list_dependents(fixture.owner, fixture.project, design)
        .unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].task_id, ship.task_id);
}

#[test]
fn create_task_with_bad_blockers_persists_nothing() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let design = add_task(&service, &fixture, "design");

    let mut missing_blocker = NewTask::named("ship");
    missing_blocker.blocked_by = vec![design, Uuid::new_v4()];
    let err = service
        .create_task(fixture.owner, fixture.project, &missing_blocker)
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::TaskNotFound(_)));

    let mut repeated_blocker = NewTask::named("ship");
    repeated_blocker.blocked_by = vec![design, design];
    let err = service
        .create_task(fixture.owner, fixture.project, &repeated_blocker)
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::DuplicateDependency { .. }));

    let tasks = service.list_tasks(fixture.owner, fixture.project).unwrap();
    assert_eq!(tasks.len(), 1);
    assert!(edge_set(&service, &fixture).is_empty());
}

#[test]
fn invalid_task_names_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);

    let err = service
        .create_task(fixture.owner, fixture.project, &NewTask::named("   "))
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::Validation(_)));

    let err = service
        .create_task(fixture.owner, fixture.project, &NewTask::named("x".repeat(101)))
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::Validation(_)));
}

#[test]
fn update_task_applies_patch_and_keeps_edges() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let a = add_task(&service, &fixture, "A");
    let b = add_task(&service, &fixture, "B");
    service
        .add_dependency(fixture.owner, fixture.project, a, b)
        .unwrap();

    let updated = service
        .update_task(
            fixture.owner,
            fixture.project,
            a,
            &TaskPatch {
                name: Some("A renamed".to_string()),
                description: None,
                status: Some(TaskStatus::InProgress),
            },
        )
        .unwrap();
    assert_eq!(updated.name, "A renamed");
    assert_eq!(updated.status, TaskStatus::InProgress);
    assert_eq!(
        service
            .get_task(fixture.owner, fixture.project, a)
            .unwrap()
            .name,
        "A renamed"
    );
    assert_eq!(
        edge_set(&service, &fixture),
        HashSet::from([DependencyEdge::new(a, b)])
    );

    let err = service
        .update_task(
            fixture.owner,
            fixture.project,
            a,
            &TaskPatch {
                name: Some(String::new()),
                ..TaskPatch::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::Validation(_)));
}

#[test]
fn diamond_dependencies_are_allowed() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);
    let top = add_task(&service, &fixture, "top");
    let left = add_task(&service, &fixture, "left");
    let right = add_task(&service, &fixture, "right");
    let bottom = add_task(&service, &fixture, "bottom");

    for (blocked, blocker) in [(top, left), (top, right), (left, bottom), (right, bottom)] {
        service
            .add_dependency(fixture.owner, fixture.project, blocked, blocker)
            .unwrap();
    }

    let err = service
        .add_dependency(fixture.owner, fixture.project, bottom, top)
        .unwrap_err();
    assert!(matches!(err, TaskServiceError::Cycle { .. }));
    assert_eq!(edge_set(&service, &fixture).len(), 4);
}

#[test]
fn update_task_keeps_updated_at_monotonic() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let service = task_service(&conn);

    for index in 0..20 {
        let created = service
            .create_task(
                fixture.owner,
                fixture.project,
                &NewTask::named(format!("task {index}")),
            )
            .unwrap();
        let closed = service
            .update_task(
                fixture.owner,
                fixture.project,
                created.task_id,
                &TaskPatch {
                    status: Some(TaskStatus::Closed),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        assert!(
            closed.updated_at >= closed.created_at,
            "created_at={} updated_at={}",
            closed.created_at,
            closed.updated_at
        );

        let renamed = service
            .update_task(
                fixture.owner,
                fixture.project,
                created.task_id,
                &TaskPatch {
                    name: Some(format!("renamed {index}")),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        assert!(renamed.updated_at >= closed.updated_at);
    }
}
