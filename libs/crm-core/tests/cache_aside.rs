mod common;

use common::{spawn_partner, tenant, World, TOKEN};
use crm_core::cache_aside::keys;
use crm_core::domain::catalog::{Department, NewDepartment, NewStage};
use crm_core::domain::settings::TenantSettings;
use crm_core::domain::ticket::{NewTicket, Ticket, TicketFilter, TicketRefsInput, TicketUpdate};
use crm_core::repository::NoFilter;
use crm_core::{Backend, Entity, TenantId};
use serde_json::json;

async fn department_with_stage(backend: &Backend, tenant: &TenantId, name: &str) -> (Department, uuid::Uuid) {
    let department = backend
        .departments
        .create(tenant, NewDepartment { name: name.into() })
        .await
        .unwrap();
    let stage = backend
        .stages
        .create(
            tenant,
            NewStage {
                name: "Todo".into(),
                arrangement: 0,
                department_id: department.id.to_string(),
            },
        )
        .await
        .unwrap();
    (department, stage.id)
}

fn located(department: &Department, stage: uuid::Uuid) -> TicketRefsInput {
    TicketRefsInput {
        department_id: Some(department.id.to_string()),
        stage_id: Some(stage.to_string()),
        ..Default::default()
    }
}

fn by_department(department: &Department) -> TicketFilter {
    TicketFilter {
        department_id: Some(department.id),
        performer_id: None,
    }
}

fn ids(tickets: &[Ticket]) -> Vec<uuid::Uuid> {
    tickets.iter().map(|t| t.record.id).collect()
}

#[tokio::test]
async fn moving_a_ticket_drops_the_old_department_lists() {
    let world = World::new();
    let acme = tenant("acme");
    let backend = world.factory.build_backend(&acme).await.unwrap();
    let (support, support_stage) = department_with_stage(&backend, &acme, "Support").await;
    let (field, field_stage) = department_with_stage(&backend, &acme, "Field").await;

    let ticket = backend
        .tickets
        .create(
            &acme,
            NewTicket {
                name: "Broken printer".into(),
                refs: located(&support, support_stage),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Warm every list the move affects.
    let warm = backend
        .tickets
        .get_all(&acme, &by_department(&support), true)
        .await
        .unwrap();
    assert_eq!(ids(&warm), vec![ticket.record.id]);
    assert!(backend
        .tickets
        .get_all(&acme, &by_department(&field), true)
        .await
        .unwrap()
        .is_empty());
    backend
        .tickets
        .get_all(&acme, &TicketFilter::default(), true)
        .await
        .unwrap();

    backend
        .tickets
        .update(
            &acme,
            ticket.record.id,
            TicketUpdate {
                refs: Some(located(&field, field_stage)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(backend
        .tickets
        .get_all(&acme, &by_department(&support), true)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        ids(&backend
            .tickets
            .get_all(&acme, &by_department(&field), true)
            .await
            .unwrap()),
        vec![ticket.record.id]
    );
    let all = backend
        .tickets
        .get_all(&acme, &TicketFilter::default(), true)
        .await
        .unwrap();
    assert_eq!(all[0].record.refs.department_id, Some(field.id));
    assert_eq!(
        backend
            .tickets
            .get(&acme, ticket.record.id, true)
            .await
            .unwrap()
            .stage
            .map(|s| s.id),
        Some(field_stage)
    );
}

#[tokio::test]
async fn uncached_reads_never_see_cache_only_values() {
    let world = World::new();
    let acme = tenant("acme");
    let backend = world.factory.build_backend(&acme).await.unwrap();
    let department = backend
        .departments
        .create(&acme, NewDepartment { name: "Sales".into() })
        .await
        .unwrap();

    let key = keys::item_key(keys::Scope::new(&acme, backend.kind), Department::KIND, department.id);
    let planted = serde_json::to_vec(&json!({ "id": department.id, "name": "Planted" })).unwrap();
    crm_core::Cache::set(world.cache.as_ref(), &key, &planted, Some(60))
        .await
        .unwrap();

    assert_eq!(
        backend.departments.get(&acme, department.id, true).await.unwrap().name,
        "Planted"
    );
    assert_eq!(
        backend.departments.get(&acme, department.id, false).await.unwrap().name,
        "Sales"
    );
}

#[tokio::test]
async fn tenants_sharing_a_cache_stay_isolated() {
    let world = World::new();
    let acme = tenant("acme");
    let globex = tenant("globex");
    let acme_backend = world.factory.build_backend(&acme).await.unwrap();
    let globex_backend = world.factory.build_backend(&globex).await.unwrap();

    acme_backend
        .departments
        .create(&acme, NewDepartment { name: "Sales".into() })
        .await
        .unwrap();
    assert_eq!(
        acme_backend.departments.get_all(&acme, &NoFilter, true).await.unwrap().len(),
        1
    );
    assert!(globex_backend
        .departments
        .get_all(&globex, &NoFilter, true)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn partner_reads_are_cached_until_a_write() {
    let world = World::new();
    let acme = tenant("acme");
    let (partner, url) = spawn_partner().await;
    world
        .factory
        .configure(&acme, &TenantSettings::external(url, TOKEN))
        .await
        .unwrap();
    let backend = world.factory.build_backend(&acme).await.unwrap();

    let sales = backend
        .departments
        .create(&acme, NewDepartment { name: "Sales".into() })
        .await
        .unwrap();
    assert_eq!(backend.departments.get_all(&acme, &NoFilter, true).await.unwrap().len(), 1);

    // A row added on the partner side is invisible to cached reads only.
    partner.seed(
        "departments",
        json!({ "guid": uuid::Uuid::new_v4(), "title": "Ops" }),
    );
    assert_eq!(backend.departments.get_all(&acme, &NoFilter, true).await.unwrap().len(), 1);
    assert_eq!(backend.departments.get_all(&acme, &NoFilter, false).await.unwrap().len(), 2);

    backend.departments.delete(&acme, sales.id).await.unwrap();
    let names: Vec<String> = backend
        .departments
        .get_all(&acme, &NoFilter, true)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, ["Ops"]);
}

#[tokio::test]
async fn switching_backends_does_not_serve_the_old_backends_entries() {
    let world = World::new();
    let acme = tenant("acme");
    let native = world.factory.build_backend(&acme).await.unwrap();
    let local = native
        .departments
        .create(&acme, NewDepartment { name: "Local".into() })
        .await
        .unwrap();
    assert_eq!(native.departments.get_all(&acme, &NoFilter, true).await.unwrap().len(), 1);
    native.departments.get(&acme, local.id, true).await.unwrap();

    let (_partner, url) = spawn_partner().await;
    world
        .factory
        .configure(&acme, &TenantSettings::external(url, TOKEN))
        .await
        .unwrap();
    let external = world.factory.build_backend(&acme).await.unwrap();

    assert!(external
        .departments
        .get_all(&acme, &NoFilter, true)
        .await
        .unwrap()
        .is_empty());
    assert!(external
        .departments
        .get(&acme, local.id, true)
        .await
        .unwrap_err()
        .is_not_found());
}
