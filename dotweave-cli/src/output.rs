use comfy_table::{presets, ContentArrangement, Table};
use serde::Serialize;

use crate::app::GlobalOptions;

/// Print `report` as pretty JSON with `--json`, otherwise hand it to `render`.
pub fn print_output<T: Serialize>(
    report: &T,
    opts: &GlobalOptions,
    render: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        render(report);
    }
    Ok(())
}

/// Left-aligned columns without borders, printed below a summary line.
pub struct TabWriter {
    table: Table,
    indent: &'static str,
}

impl TabWriter {
    pub fn new(headers: &[&str], indent: &'static str) -> Self {
        let mut table = Table::new();
        table
            .load_preset(presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(headers.to_vec());

        let last = headers.len().saturating_sub(1);
        for (i, column) in table.column_iter_mut().enumerate() {
            column.set_padding((0, u16::from(i != last) * 2));
        }

        TabWriter { table, indent }
    }

    pub fn row(&mut self, cells: impl IntoIterator<Item = String>) {
        self.table.add_row(cells.into_iter().collect::<Vec<_>>());
    }

    pub fn print(&self) {
        for line in self.table.to_string().lines() {
            println!("{}{}", self.indent, line.trim_end());
        }
    }
}
