use std::fmt::{self, Display, Formatter};

use tabled::{builder::Builder, settings::Style as TableStyle};

/// A structured table that renders via `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a table with column headers and data rows.
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(&self.headers);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn grid_table_renders_headers_and_rows() {
        let table = Table::grid(
            ["address", "state"],
            vec![
                vec!["AA:BB".into(), "connected".into()],
                vec!["CC:DD".into(), "disconnected".into()],
            ],
        )
        .to_string();

        let header = table
            .lines()
            .find(|line| line.contains("address"))
            .expect("header row should render");
        assert_eq!(true, header.contains("state"));
        let row = table
            .lines()
            .find(|line| line.contains("CC:DD"))
            .expect("data row should render");
        assert_eq!(true, row.contains("disconnected"));
    }
}
