//! End-to-end scenarios over the in-memory source and replica.

use std::future::Future;

use erpsync_core::{
    BatchUpserter, ChangeFetcher, EntityDescriptor, EntitySelection, EntitySync, Error,
    MemoryReplica, MemorySource, Result, SchemaProvisioner, SourceRecord, SyncOptions,
    SyncOrchestrator, SyncPlan, Value, Watermark,
};

const T: &str = "2024-01-01 00:00:00";

fn item(name: &str, modified: &str, cost: &str) -> SourceRecord {
    SourceRecord::from_pairs([
        ("name", Value::from(name)),
        ("modified", Value::from(modified)),
        ("item_category", Value::from("Hardware")),
        ("cost", Value::from(cost)),
    ])
}

fn invoice(name: &str, modified: &str) -> SourceRecord {
    SourceRecord::from_pairs([
        ("name", Value::from(name)),
        ("modified", Value::from(modified)),
        ("posting_date", Value::from("2024-01-01")),
        ("customer", Value::from("ACME")),
        ("docstatus", Value::Int(1)),
        ("grand_total", Value::from("100.00")),
        ("outstanding_amount", Value::from("0.00")),
    ])
}

fn probe_options(batch_size: usize) -> SyncOptions {
    SyncOptions {
        batch_size,
        stop_on_short_batch: false,
        ..Default::default()
    }
}

async fn provisioned(entities: &[EntityDescriptor]) -> MemoryReplica {
    let replica = MemoryReplica::new();
    replica.ensure_schema(entities).await.unwrap();
    replica
}

fn wm(time: &str, key: &str) -> Watermark {
    Watermark::new(erpsync_core::parse_timestamp(time).unwrap(), key)
}

#[tokio::test]
async fn test_tied_timestamps_three_rows_limit_two() {
    let entity = EntityDescriptor::item().unwrap();
    let source = MemorySource::new();
    for name in ["A", "B", "C"] {
        source.insert(&entity.source_table, item(name, T, "1"));
    }
    let replica = provisioned(std::slice::from_ref(&entity)).await;
    let options = probe_options(2);

    let report = EntitySync::new(&entity, &source, &replica, &replica, &options)
        .run()
        .await
        .unwrap();

    assert_eq!(
        replica.cursor_history(&entity.id),
        vec![wm(T, "B"), wm(T, "C")]
    );
    assert_eq!(source.fetch_count(&entity.id), 3);
    assert_eq!(report.fetches, 3);
    assert_eq!(replica.row_count("item"), 3);
}

#[tokio::test]
async fn test_no_loss_when_ties_exceed_batch_size() {
    let entity = EntityDescriptor::item().unwrap();
    let source = MemorySource::new();
    let names: Vec<String> = (0..7).map(|i| format!("ITEM-{i:03}")).collect();
    for name in &names {
        source.insert(&entity.source_table, item(name, T, "1"));
    }
    source.insert(&entity.source_table, item("LATER", "2024-01-02 00:00:00", "1"));

    let replica = provisioned(std::slice::from_ref(&entity)).await;
    let options = SyncOptions::with_batch_size(3);
    EntitySync::new(&entity, &source, &replica, &replica, &options)
        .run()
        .await
        .unwrap();

    assert_eq!(replica.row_count("item"), 8);
    for name in &names {
        assert!(replica.get_row("item", name).is_some(), "{name} missing");
    }
    assert_eq!(replica.stored_watermark(&entity).key(), "LATER");
}

#[tokio::test]
async fn test_replaying_a_batch_is_idempotent() {
    let entity = EntityDescriptor::item().unwrap();
    let replica = provisioned(std::slice::from_ref(&entity)).await;
    let batch = vec![item("A", T, "1.00"), item("B", T, "2.00")];

    replica.upsert_batch(&entity, &batch).await.unwrap();
    let first = replica.rows("item");
    replica.upsert_batch(&entity, &batch).await.unwrap();

    assert_eq!(replica.rows("item"), first);
    assert_eq!(replica.row_count("item"), 2);
}

#[tokio::test]
async fn test_resume_after_crash_between_upsert_and_cursor_save() {
    let entity = EntityDescriptor::item().unwrap();
    let source = MemorySource::new();
    for (i, name) in ["A", "B", "C", "D"].iter().enumerate() {
        source.insert(
            &entity.source_table,
            item(name, &format!("2024-01-01 00:00:0{i}"), "1"),
        );
    }
    let replica = provisioned(std::slice::from_ref(&entity)).await;
    let options = SyncOptions::with_batch_size(2);

    replica.fail_cursor_saves("server closed the connection");
    let err = EntitySync::new(&entity, &source, &replica, &replica, &options)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cursor(_)));
    assert_eq!(replica.row_count("item"), 2);
    assert!(replica.stored_watermark(&entity).is_sentinel());

    replica.heal();
    let report = EntitySync::new(&entity, &source, &replica, &replica, &options)
        .run()
        .await
        .unwrap();

    // The first batch is re-read and re-applied.
    assert_eq!(report.rows, 4);
    assert_eq!(replica.row_count("item"), 4);
    assert_eq!(replica.stored_watermark(&entity).key(), "D");
}

#[tokio::test]
async fn test_cursor_is_monotonic_across_runs() {
    let entity = EntityDescriptor::item().unwrap();
    let source = MemorySource::new();
    for i in 0..10 {
        source.insert(
            &entity.source_table,
            item(&format!("I{i}"), &format!("2024-01-01 00:00:{:02}", i / 3), "1"),
        );
    }
    let replica = provisioned(std::slice::from_ref(&entity)).await;
    let options = SyncOptions::with_batch_size(4);

    EntitySync::new(&entity, &source, &replica, &replica, &options)
        .run()
        .await
        .unwrap();

    // A later edit re-stamps a row and the next run picks it up.
    source.update(
        &entity.source_table,
        "name",
        item("I0", "2024-02-01 00:00:00", "9"),
    );
    EntitySync::new(&entity, &source, &replica, &replica, &options)
        .run()
        .await
        .unwrap();

    let history = replica.cursor_history(&entity.id);
    assert!(history.len() >= 4);
    assert!(history.windows(2).all(|w| w[0] < w[1]));

    let row = replica.get_row("item", "I0").unwrap();
    assert_eq!(row.raw["cost"], "9");
    assert_eq!(replica.row_count("item"), 10);
}

#[tokio::test]
async fn test_fetch_count_is_bounded() {
    let entity = EntityDescriptor::item().unwrap();
    for (total, limit) in [(0usize, 3usize), (1, 3), (6, 3), (7, 3), (10, 1)] {
        let source = MemorySource::new();
        for i in 0..total {
            source.insert(&entity.source_table, item(&format!("R{i:02}"), T, "1"));
        }
        let replica = provisioned(std::slice::from_ref(&entity)).await;
        let options = probe_options(limit);

        EntitySync::new(&entity, &source, &replica, &replica, &options)
            .run()
            .await
            .unwrap();

        let bound = total.div_ceil(limit) + 1;
        assert!(
            source.fetch_count(&entity.id) <= bound,
            "{total} rows / limit {limit}: {} fetches",
            source.fetch_count(&entity.id)
        );
        assert_eq!(replica.row_count("item"), total);
    }
}

#[tokio::test]
async fn test_bad_row_fails_batch_and_keeps_cursor() {
    let entity = EntityDescriptor::item().unwrap();
    let source = MemorySource::new();
    source.insert(&entity.source_table, item("A", T, "1"));
    source.insert(&entity.source_table, item("B", T, "one hundred"));

    let replica = provisioned(std::slice::from_ref(&entity)).await;
    let options = SyncOptions::default();
    let err = EntitySync::new(&entity, &source, &replica, &replica, &options)
        .run()
        .await
        .unwrap_err();

    assert!(err.is_data_error());
    assert_eq!(replica.row_count("item"), 0);
    assert!(replica.cursor_history(&entity.id).is_empty());
}

/// Returns the same rows for every fetch, regardless of the watermark.
struct FixedFetcher {
    rows: Vec<SourceRecord>,
}

impl ChangeFetcher for FixedFetcher {
    fn fetch_changes(
        &self,
        _entity: &EntityDescriptor,
        _after: &Watermark,
        _limit: usize,
    ) -> impl Future<Output = Result<Vec<SourceRecord>>> + Send {
        let rows = self.rows.clone();
        async move { Ok(rows) }
    }
}

#[tokio::test]
async fn test_out_of_order_batch_is_rejected() {
    let entity = EntityDescriptor::item().unwrap();
    let fetcher = FixedFetcher {
        rows: vec![
            item("B", "2024-01-02 00:00:00", "1"),
            item("A", "2024-01-01 00:00:00", "1"),
        ],
    };
    let replica = provisioned(std::slice::from_ref(&entity)).await;
    let options = SyncOptions::default();

    let err = EntitySync::new(&entity, &fetcher, &replica, &replica, &options)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OutOfOrder { .. }));
    assert_eq!(replica.row_count("item"), 0);
    assert!(replica.stored_watermark(&entity).is_sentinel());
}

#[tokio::test]
async fn test_fetcher_repeating_rows_cannot_regress_cursor() {
    let entity = EntityDescriptor::item().unwrap();
    let fetcher = FixedFetcher {
        rows: vec![item("A", T, "1")],
    };
    let replica = provisioned(std::slice::from_ref(&entity)).await;
    let options = probe_options(5);

    // The second fetch returns the row the cursor already points at.
    let err = EntitySync::new(&entity, &fetcher, &replica, &replica, &options)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OutOfOrder { .. }));
    assert_eq!(replica.cursor_history(&entity.id), vec![wm(T, "A")]);
}

/// Hands out one scripted batch per fetch, then empty batches.
struct ScriptedFetcher {
    batches: std::sync::Mutex<std::collections::VecDeque<Vec<SourceRecord>>>,
}

impl ScriptedFetcher {
    fn new(batches: Vec<Vec<SourceRecord>>) -> Self {
        Self {
            batches: std::sync::Mutex::new(batches.into()),
        }
    }
}

impl ChangeFetcher for ScriptedFetcher {
    fn fetch_changes(
        &self,
        _entity: &EntityDescriptor,
        _after: &Watermark,
        _limit: usize,
    ) -> impl Future<Output = Result<Vec<SourceRecord>>> + Send {
        let rows = self.batches.lock().unwrap().pop_front().unwrap_or_default();
        async move { Ok(rows) }
    }
}

#[tokio::test]
async fn test_smaller_key_at_same_time_cannot_regress_cursor() {
    let entity = EntityDescriptor::item().unwrap();
    let fetcher = ScriptedFetcher::new(vec![vec![item("B", T, "1")], vec![item("A", T, "1")]]);
    let replica = provisioned(std::slice::from_ref(&entity)).await;
    let options = probe_options(1);

    let err = EntitySync::new(&entity, &fetcher, &replica, &replica, &options)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OutOfOrder { .. }));
    assert_eq!(replica.cursor_history(&entity.id), vec![wm(T, "B")]);
    assert_eq!(replica.stored_watermark(&entity), wm(T, "B"));
    assert_eq!(replica.row_count("item"), 1);
}

#[tokio::test]
async fn test_orchestrator_runs_selected_entities_in_order() {
    let entities = EntityDescriptor::all().unwrap();
    let source = MemorySource::new();
    source.insert("tabItem", item("ITEM-1", T, "1"));
    source.insert("tabSales Invoice", invoice("SINV-1", T));

    let plan = SyncPlan::new(entities).with_selection(EntitySelection::parse("invoice"));
    let orchestrator = SyncOrchestrator::new(plan, source.clone(), MemoryReplica::new());
    let report = orchestrator.run().await.unwrap();

    let ids: Vec<_> = report.entities.iter().map(|e| e.entity.as_str()).collect();
    assert_eq!(ids, vec!["invoice"]);
    assert_eq!(report.total_rows(), 1);

    let replica = orchestrator.replica();
    assert_eq!(replica.schema_calls(), 1);
    assert_eq!(replica.row_count("sales_invoice"), 1);
    assert_eq!(replica.row_count("item"), 0);
    assert_eq!(source.fetch_count("item"), 0);
}

#[tokio::test]
async fn test_orchestrator_aborts_on_first_failure() {
    let entities = EntityDescriptor::all().unwrap();
    let source = MemorySource::new();
    source.insert("tabItem", item("ITEM-1", "yesterday", "1"));
    source.insert("tabSales Invoice", invoice("SINV-1", T));

    let orchestrator = SyncOrchestrator::new(SyncPlan::new(entities), source.clone(), MemoryReplica::new());
    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, Error::EntityFailed { ref entity, .. } if entity == "item"));
    assert!(err.is_data_error());
    assert_eq!(source.fetch_count("invoice"), 0);
    assert_eq!(orchestrator.replica().row_count("sales_invoice"), 0);
}

#[tokio::test]
async fn test_orchestrator_schema_failure_runs_nothing() {
    let replica = MemoryReplica::new();
    replica.fail_schema("permission denied for schema public");
    let source = MemorySource::new();
    source.insert("tabItem", item("ITEM-1", T, "1"));

    let plan = SyncPlan::new(EntityDescriptor::all().unwrap());
    let orchestrator = SyncOrchestrator::new(plan, source.clone(), replica);
    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, Error::Schema(_)));
    assert_eq!(source.fetch_count("item"), 0);
    assert_eq!(orchestrator.replica().upsert_calls(), 0);
}

#[tokio::test]
async fn test_orchestrator_rejects_unknown_selection() {
    let plan = SyncPlan::new(EntityDescriptor::all().unwrap())
        .with_selection(EntitySelection::parse("item,customer"));
    let orchestrator = SyncOrchestrator::new(plan, MemorySource::new(), MemoryReplica::new());

    let err = orchestrator.run().await.unwrap_err();
    assert!(err.to_string().contains("customer"));
    assert_eq!(orchestrator.replica().schema_calls(), 0);
}
