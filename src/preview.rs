use crate::loader::Table;
use handlebars::html_escape as escape;

/// Number of rows shown on the overview page
pub const PREVIEW_ROWS: usize = 10;

const TABLE_CLASSES: &str = "dataframe table table-striped table-hover";

/// Render the first [`PREVIEW_ROWS`] rows of a table as HTML
///
/// Columns keep their original order and no row index is emitted.
pub fn preview(table: &Table) -> String {
    to_html(table, PREVIEW_ROWS)
}

/// Render up to `limit` rows of a table as a striped, hoverable HTML table
///
/// Header names and cell values are HTML-escaped.
///
/// # Examples
/// ```no_run
/// use dataview::loader::load_table;
/// use dataview::preview::to_html;
///
/// let table = load_table("static/uploads/data.csv").unwrap();
/// let html = to_html(&table, 5);
/// assert!(html.starts_with("<table"));
/// ```
pub fn to_html(table: &Table, limit: usize) -> String {
    let mut html = String::new();

    html.push_str(&format!(
        "<table border=\"1\" class=\"{}\">\n",
        TABLE_CLASSES
    ));

    html.push_str("  <thead>\n    <tr style=\"text-align: right;\">\n");
    for column in table.columns() {
        html.push_str(&format!("      <th>{}</th>\n", escape(column)));
    }
    html.push_str("    </tr>\n  </thead>\n");

    html.push_str("  <tbody>\n");
    for row in table.head(limit) {
        html.push_str("    <tr>\n");
        for value in row {
            html.push_str(&format!("      <td>{}</td>\n", escape(&value.to_string())));
        }
        html.push_str("    </tr>\n");
    }
    html.push_str("  </tbody>\n</table>");

    html
}
