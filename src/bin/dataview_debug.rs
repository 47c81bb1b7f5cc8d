// Composed view debug binary
// Run with: cargo run --bin dataview_debug -- [file.csv|file.json] [options]
//
//   --pin-row <id>      pin a record (repeatable)
//   --pin-col <field>   pin a column (repeatable)
//   --sort <field[:desc]>
//   --search <text>
//   --width <px>        container width for column allocation
//   --pin-bottom        pin rows to the bottom instead of the top
//   --verbose           echo the log to stderr

use anyhow::{anyhow, Result};
use comfy_table::{Attribute, Cell, ContentArrangement, Table};

use grid_view::config::GridConfig;
use grid_view::core::grid_engine::GridEngine;
use grid_view::data::datatable::{DataColumn, DataRow, DataTable, DataValue, RowId};
use grid_view::data::datatable_loaders::{load_csv_to_datatable, load_json_to_datatable};
use grid_view::data::pinning::PinPosition;
use grid_view::data::sorting::SortExpression;
use grid_view::data::value_format::display_value;
use grid_view::ui::viewport::column_width_calculator::ContainerWidth;
use grid_view::utils::logging::init_tracing;

#[derive(Debug, Default)]
struct Options {
    data_file: Option<String>,
    pin_rows: Vec<String>,
    pin_cols: Vec<String>,
    sort: Option<SortExpression>,
    search: Option<String>,
    width: Option<u32>,
    pin_bottom: bool,
    verbose: bool,
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} needs a value", flag))
        };
        match arg.as_str() {
            "--pin-row" => options.pin_rows.push(value(arg)?),
            "--pin-col" => options.pin_cols.push(value(arg)?),
            "--sort" => {
                let spec = value(arg)?;
                options.sort = Some(match spec.split_once(':') {
                    Some((field, "desc")) => SortExpression::descending(field),
                    Some((field, _)) => SortExpression::ascending(field),
                    None => SortExpression::ascending(spec),
                });
            }
            "--search" => options.search = Some(value(arg)?),
            "--width" => {
                let raw = value(arg)?;
                options.width = Some(
                    raw.parse()
                        .map_err(|_| anyhow!("--width expects pixels, got '{}'", raw))?,
                );
            }
            "--pin-bottom" => options.pin_bottom = true,
            "--verbose" => options.verbose = true,
            other if other.ends_with(".csv") || other.ends_with(".json") => {
                options.data_file = Some(other.to_string())
            }
            other => return Err(anyhow!("Unknown argument '{}'", other)),
        }
    }
    Ok(options)
}

fn sample_table() -> Result<DataTable> {
    let mut table = DataTable::new("sample");
    for name in ["id", "name", "amount", "category", "active"] {
        table.add_column(DataColumn::new(name));
    }

    let rows = [
        (1, "Alice", 100.50, "Sales", true),
        (2, "Bob", 200.75, "Marketing", false),
        (3, "Charlie", 150.25, "Sales", true),
        (4, "David", 300.00, "Engineering", true),
        (5, "Eve", 175.50, "Marketing", false),
        (6, "Frank", 250.00, "Sales", false),
        (7, "Grace", 180.00, "Engineering", false),
        (8, "Heidi", 90.00, "Support", true),
        (9, "Ivan", 310.40, "Engineering", true),
        (10, "Judy", 120.00, "Support", false),
    ];
    for (id, name, amount, category, active) in rows {
        table
            .add_row(DataRow::new(vec![
                DataValue::Integer(id),
                DataValue::String(name.to_string()),
                DataValue::Float(amount),
                DataValue::String(category.to_string()),
                DataValue::Boolean(active),
            ]))
            .map_err(|e| anyhow!(e))?;
    }
    table.infer_column_types();
    table.set_primary_key("id").map_err(|e| anyhow!(e))?;
    Ok(table)
}

fn load_table(path: Option<&str>) -> Result<DataTable> {
    match path {
        Some(path) if path.ends_with(".json") => load_json_to_datatable(path, "data"),
        Some(path) => load_csv_to_datatable(path, "data"),
        None => sample_table(),
    }
}

fn print_view(engine: &GridEngine) {
    let view = engine.view();
    let columns = engine.columns();
    let table = engine.table();

    let visible: Vec<_> = columns
        .visible_leaves()
        .into_iter()
        .filter_map(|idx| columns.get(idx))
        .collect();

    let mut grid = Table::new();
    grid.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![Cell::new("#").add_attribute(Attribute::Bold)];
    header.extend(visible.iter().map(|c| {
        let label = if c.pinned {
            format!("{} (pinned)", c.header_text())
        } else {
            c.header_text().to_string()
        };
        Cell::new(label).add_attribute(Attribute::Bold)
    }));
    grid.set_header(header);

    for (position, row) in view.rows().iter().enumerate() {
        let marker = match (row.pinned, row.deleted) {
            (_, true) => format!("{} (deleted)", position),
            (true, _) => format!("{} *", position),
            _ => position.to_string(),
        };
        let mut cells = vec![marker];
        for column in &visible {
            let shown = table
                .get_column_index(&column.field)
                .and_then(|col| view.value(table, position, col))
                .map(|v| display_value(v, column.format.as_ref()))
                .unwrap_or_default();
            cells.push(shown);
        }
        grid.add_row(cells);
    }

    println!("{grid}");
    println!("{}", view);
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;
    let logs = init_tracing(options.verbose);

    let table = load_table(options.data_file.as_deref())?;
    let mut config = GridConfig::default();
    if options.pin_bottom {
        config.rows.pin_position = PinPosition::End;
    }
    let mut engine = GridEngine::from_config(table, &[], config)?;

    for id in &options.pin_rows {
        engine.pin_row(RowId::new(id.as_str()), None);
    }
    for field in &options.pin_cols {
        engine.pin_column(field)?;
    }
    if let Some(sort) = options.sort.clone() {
        engine.set_sort(vec![sort]);
    }
    engine.flush()?;

    println!("=== Composed view ===");
    print_view(&engine);

    let container = options
        .width
        .map(ContainerWidth::fixed)
        .unwrap_or_else(ContainerWidth::auto);
    let widths = engine.layout(container);
    println!("\n=== Column widths ({:?}) ===", container.container);
    for entry in widths.entries() {
        println!("  {:<16} {:>5}px", entry.field, entry.width);
    }
    println!("  total {}px", widths.total());

    if let Some(text) = &options.search {
        let count = engine.search_text(text);
        println!("\n=== Search '{}': {} matches ===", text, count);
        for hit in engine.search_state().all_matches() {
            println!(
                "  row {:>3} col {:>2} {:<12} #{} {}",
                hit.row,
                hit.column,
                hit.field,
                hit.occurrence,
                if hit.pinned { "(pinned)" } else { "" }
            );
        }
    }

    if options.verbose {
        println!("\n=== Recent log ===");
        for entry in logs.get_recent(20) {
            println!("{}", entry.format_for_display());
        }
    }
    Ok(())
}
