use time::format_description::FormatItem;
use time::macros::format_description;

use crate::models::Entry;

const HEADER: &str = "ID,Title,Author,Category,Location,Votes,Link,Date";
const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[day padding:none]/[month padding:none]/[year]");

pub fn export_file_name(contest: &str) -> String {
    format!("{contest}_participants.csv")
}

/// Serializes entries with quoted text columns, one line per entry.
pub fn to_csv(entries: &[Entry]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');

    let rows: Vec<String> = entries
        .iter()
        .map(|e| {
            format!(
                "{},{},{},{},{},{},{},{}",
                e.id,
                quoted(&e.title),
                quoted(&e.author),
                quoted(e.category.as_str()),
                quoted(&e.location),
                e.votes,
                quoted(&e.url),
                e.created_at.format(DATE_FORMAT).unwrap_or_default(),
            )
        })
        .collect();

    out.push_str(&rows.join("\n"));
    out
}

fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
