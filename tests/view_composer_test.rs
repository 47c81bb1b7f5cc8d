// Composition of pinned and unpinned rows through the public API

use grid_view::core::generation::Generation;
use grid_view::data::data_view::{ComposeRequest, ComposedView, ViewComposer};
use grid_view::data::datatable::{DataColumn, DataRow, DataTable, DataValue, RowId};
use grid_view::data::filtering::{FilterOperator, FilterTree};
use grid_view::data::index_map::{IndexMapping, PagingWindow};
use grid_view::data::pending_edits::TransactionLog;
use grid_view::data::pinning::{PinPosition, RowPinRegistry};
use grid_view::data::sorting::SortExpression;

fn create_test_table(rows: i64) -> DataTable {
    let mut table = DataTable::new("test");
    table.add_column(DataColumn::new("ID"));
    table.add_column(DataColumn::new("Name"));

    for i in 1..=rows {
        table
            .add_row(DataRow::new(vec![
                DataValue::Integer(i),
                DataValue::String(format!("row{}", i)),
            ]))
            .unwrap();
    }
    table.set_primary_key("ID").unwrap();
    table.infer_column_types();
    table
}

fn pinned(position: PinPosition, ids: &[&str]) -> RowPinRegistry {
    let mut pins = RowPinRegistry::new(position);
    for id in ids {
        pins.pin(RowId::new(*id), None);
    }
    pins
}

fn ids(view: &ComposedView) -> Vec<&str> {
    view.rows().iter().map(|r| r.id.as_str()).collect()
}

fn compose(request: &ComposeRequest<'_>) -> ComposedView {
    ViewComposer::default()
        .compose(request, Generation::INITIAL.next())
        .unwrap()
}

#[test]
fn test_rows_pinned_to_top_keep_relative_order() {
    let table = create_test_table(10);
    let pins = pinned(PinPosition::Start, &["3", "7"]);

    let view = compose(&ComposeRequest::new(&table, &pins));
    assert_eq!(
        ids(&view),
        vec!["3", "7", "1", "2", "4", "5", "6", "8", "9", "10"]
    );
    assert_eq!(view.pinned_count(), 2);
    assert_eq!(view.pinned_range(), 0..2);
}

#[test]
fn test_rows_pinned_to_bottom() {
    let table = create_test_table(5);
    let pins = pinned(PinPosition::End, &["4", "1"]);

    let view = compose(&ComposeRequest::new(&table, &pins));
    assert_eq!(ids(&view), vec!["2", "3", "5", "4", "1"]);
    assert_eq!(view.pinned_range(), 3..5);
}

#[test]
fn test_partitions_are_sorted_independently() {
    let table = create_test_table(6);
    let pins = pinned(PinPosition::Start, &["2", "5"]);
    let sort = [SortExpression::descending("ID")];

    let mut request = ComposeRequest::new(&table, &pins);
    request.sort = &sort;
    let view = compose(&request);

    // The sort never lifts an unpinned row above a pinned one
    assert_eq!(ids(&view), vec!["5", "2", "6", "4", "3", "1"]);
}

#[test]
fn test_filter_applies_to_pinned_rows_too() {
    let table = create_test_table(6);
    let pins = pinned(PinPosition::Start, &["2", "5"]);
    let filter = FilterTree::condition("ID", FilterOperator::GreaterThan, "3");

    let mut request = ComposeRequest::new(&table, &pins);
    request.filter = Some(&filter);
    let view = compose(&request);
    assert_eq!(ids(&view), vec!["5", "4", "6"]);
}

#[test]
fn test_composition_is_idempotent_and_round_trips() {
    let table = create_test_table(25);
    let pins = pinned(PinPosition::Start, &["20", "4"]);
    let sort = [SortExpression::ascending("Name")];

    let mut request = ComposeRequest::new(&table, &pins);
    request.sort = &sort;
    let first = compose(&request);
    let second = compose(&request);
    assert_eq!(ids(&first), ids(&second));

    for data_index in 0..table.row_count() {
        let view_index = first.to_view_index(data_index).unwrap();
        assert_eq!(first.to_data_index(view_index), Some(data_index));
    }
}

#[test]
fn test_paging_keeps_pinned_rows_on_every_page() {
    let table = create_test_table(10);
    let pins = pinned(PinPosition::Start, &["9"]);

    let mut request = ComposeRequest::new(&table, &pins);
    request.paging = Some(PagingWindow::new(1, 4));
    let view = compose(&request);

    assert_eq!(ids(&view), vec!["9", "5", "6", "7", "8"]);
    assert_eq!(view.unpinned_total(), 9);
}

#[test]
fn test_remote_window_offsets_view_indices() {
    let table = create_test_table(3);
    let pins = RowPinRegistry::new(PinPosition::Start);

    let mut request = ComposeRequest::new(&table, &pins);
    request.mapping = IndexMapping::Remote { offset: 100 };
    let view = compose(&request);

    assert_eq!(view.to_view_index(0), Some(100));
    assert_eq!(view.to_data_index(102), Some(2));
    assert_eq!(view.to_data_index(5), None);
}

#[test]
fn test_pending_adds_and_deletes() {
    let table = create_test_table(4);
    let pins = RowPinRegistry::new(PinPosition::Start);
    let mut log = TransactionLog::new();
    log.add(
        RowId::new("new"),
        DataRow::new(vec![DataValue::Integer(99), DataValue::String("fresh".into())]),
        Some(2),
    );
    log.delete(RowId::new("1"));

    let mut request = ComposeRequest::new(&table, &pins);
    request.edits = Some(&log);
    let view = compose(&request);
    assert_eq!(ids(&view), vec!["2", "3", "new", "4"]);
    assert_eq!(view.to_data_index(2), None);
    assert!(view.is_deleted(&RowId::new("1")));

    request.show_deleted = true;
    let view = compose(&request);
    assert_eq!(view.len(), 5);
    assert!(view.rows().iter().any(|r| r.deleted && r.id.as_str() == "1"));
}

#[test]
fn test_empty_table_composes_empty_view() {
    let mut table = DataTable::new("empty");
    table.add_column(DataColumn::new("ID"));
    let pins = pinned(PinPosition::Start, &["1"]);

    let view = compose(&ComposeRequest::new(&table, &pins));
    assert!(view.is_empty());
}
