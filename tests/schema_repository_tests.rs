//! Discovered-schema persistence: upserts, lookups and rollback cascade.

use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

use syncflow::models::{ConnectionColumn, ConnectionDatabase, ConnectionTable, sync::SyncStage};
use syncflow::providers::{DiscoveredColumn, DiscoveredDatabase, DiscoveredTable, Provider};
use syncflow::repositories::{SchemaRepository, SyncRepository};

#[path = "test_utils/mod.rs"]
mod test_utils;

#[tokio::test]
async fn rollback_cascades_to_tables_and_columns() {
    let db = test_utils::setup_test_db().await.unwrap();
    let airtable =
        test_utils::insert_connection(&db, Provider::Airtable, test_utils::airtable_credentials())
            .await
            .unwrap();
    let other =
        test_utils::insert_connection(&db, Provider::Notion, json!({ "api_key": "secret_x" }))
            .await
            .unwrap();
    test_utils::insert_table(&db, airtable.id, "app1", "tbl1", "Leads", &["Name", "Email"])
        .await
        .unwrap();
    test_utils::insert_table(&db, airtable.id, "app2", "tbl2", "Deals", &["Amount"])
        .await
        .unwrap();
    test_utils::insert_table(&db, other.id, "ws", "db1", "Tasks", &["Title"])
        .await
        .unwrap();

    let schema = SchemaRepository::new(db.clone());
    assert_eq!(schema.rollback_database_sync(airtable.id).await.unwrap(), 2);

    assert_eq!(ConnectionDatabase::find().count(&db).await.unwrap(), 1);
    assert_eq!(ConnectionTable::find().count(&db).await.unwrap(), 1);
    assert_eq!(ConnectionColumn::find().count(&db).await.unwrap(), 1);
    assert_eq!(schema.load_schema(other.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rollback_detaches_syncs_instead_of_deleting_them() {
    let db = test_utils::setup_test_db().await.unwrap();
    let airtable =
        test_utils::insert_connection(&db, Provider::Airtable, test_utils::airtable_credentials())
            .await
            .unwrap();
    let leads = test_utils::insert_table(&db, airtable.id, "app1", "tbl1", "Leads", &["Name"])
        .await
        .unwrap();
    let sync = test_utils::insert_sync(
        &db,
        (&airtable, &leads),
        (&airtable, &leads),
        SyncStage::Ready,
    )
    .await
    .unwrap();

    SchemaRepository::new(db.clone())
        .rollback_database_sync(airtable.id)
        .await
        .unwrap();

    let stored = SyncRepository::new(db).get_by_id(sync.id).await.unwrap().unwrap();
    assert_eq!(stored.source_table_id, None);
    assert_eq!(stored.destination_table_id, None);
    assert_eq!(stored.source_connection_id, Some(airtable.id));
}

#[tokio::test]
async fn upsert_replaces_columns_in_place() {
    let db = test_utils::setup_test_db().await.unwrap();
    let airtable =
        test_utils::insert_connection(&db, Provider::Airtable, test_utils::airtable_credentials())
            .await
            .unwrap();
    let schema = SchemaRepository::new(db.clone());
    let base = schema
        .upsert_database(airtable.id, &DiscoveredDatabase::new("app1", "CRM"))
        .await
        .unwrap();

    let first = schema
        .upsert_table(
            airtable.id,
            base.id,
            &DiscoveredTable::new("tbl1", "Leads").with_columns(vec![
                DiscoveredColumn::new("Name", "singleLineText", 1),
                DiscoveredColumn::new("Old", "number", 2),
            ]),
        )
        .await
        .unwrap();
    let second = schema
        .upsert_table(
            airtable.id,
            base.id,
            &DiscoveredTable::new("tbl1", "Leads (renamed)")
                .with_columns(vec![DiscoveredColumn::new("Name", "singleLineText", 1)]),
        )
        .await
        .unwrap();

    assert_eq!(first.table.id, second.table.id);
    assert_eq!(second.table.name, "Leads (renamed)");
    let stored = schema.find_table(first.table.id).await.unwrap().unwrap();
    let names: Vec<&str> = stored.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Name"]);

    let again = schema
        .upsert_database(airtable.id, &DiscoveredDatabase::new("app1", "CRM v2"))
        .await
        .unwrap();
    assert_eq!(again.id, base.id);
    assert_eq!(again.name, "CRM v2");
}

#[tokio::test]
async fn table_lookup_by_key_respects_source_and_match_mode() {
    let db = test_utils::setup_test_db().await.unwrap();
    let airtable =
        test_utils::insert_connection(&db, Provider::Airtable, test_utils::airtable_credentials())
            .await
            .unwrap();
    let in_app1 = test_utils::insert_table(&db, airtable.id, "app1", "tbl1", "Leads", &["Name"])
        .await
        .unwrap();
    let in_app2 = test_utils::insert_table(&db, airtable.id, "app2", "tbl1", "Leads", &["Name"])
        .await
        .unwrap();
    let schema = SchemaRepository::new(db.clone());
    let ids = [airtable.id];

    let both = schema.find_tables_by_key(&ids, "tbl1", false, None).await.unwrap();
    assert_eq!(both.len(), 2);

    let only_app2 = schema
        .find_tables_by_key(&ids, "tbl1", false, Some("app2"))
        .await
        .unwrap();
    assert_eq!(only_app2.len(), 1);
    assert_eq!(only_app2[0].id, in_app2.id);

    let by_name = schema
        .find_tables_by_key(&ids, "Leads", true, Some("app1"))
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].id, in_app1.id);

    assert!(schema.find_tables_by_key(&[], "tbl1", false, None).await.unwrap().is_empty());
    assert!(
        schema
            .find_tables_by_key(&ids, "Leads", false, None)
            .await
            .unwrap()
            .is_empty()
    );
}
