use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::selector;
use crate::error::ExtractError;

pub type Row = [String; 4];

/// Kept rows of every eligible table, one group per table, in document order.
///
/// A table is eligible when its first `tr` has exactly four `td`s; a table that
/// fails that check is skipped whole, even if later rows would fit. Within an
/// eligible table only rows with exactly four cells are kept.
pub fn collect_tables(document: &Html) -> Result<Vec<Vec<Row>>, ExtractError> {
    let table = selector("table")?;
    let tr = selector("tr")?;
    let td = selector("td")?;

    let mut groups = Vec::new();
    for (i, t) in document.select(&table).enumerate() {
        let rows: Vec<ElementRef> = t.select(&tr).collect();
        let Some(first) = rows.first() else {
            debug!("table {} has no rows", i);
            continue;
        };
        if first.select(&td).count() != 4 {
            debug!("table {} skipped, first row is not 4 cells wide", i);
            continue;
        }

        let kept: Vec<Row> = rows.iter().filter_map(|row| four_cells(row, &td)).collect();
        debug!("table {}: kept {} of {} rows", i, kept.len(), rows.len());
        groups.push(kept);
    }

    if groups.is_empty() {
        return Err(ExtractError::NoTablesFound);
    }
    info!("Found {} eligible tables", groups.len());
    Ok(groups)
}

/// All kept rows, concatenated across tables.
pub fn normalize(document: &Html) -> Result<Vec<Row>, ExtractError> {
    Ok(collect_tables(document)?.into_iter().flatten().collect())
}

fn four_cells(row: &ElementRef, td: &Selector) -> Option<Row> {
    let cells: Vec<String> = row
        .select(td)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect();
    Row::try_from(cells).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> String {
        let body: String = rows
            .iter()
            .map(|cells| {
                let tds: String = cells.iter().map(|c| format!("<td>{}</td>", c)).collect();
                format!("<tr>{}</tr>", tds)
            })
            .collect();
        format!("<table>{}</table>", body)
    }

    fn doc(tables: &[String]) -> Html {
        Html::parse_document(&format!("<html><body>{}</body></html>", tables.concat()))
    }

    #[test]
    fn keeps_only_four_cell_rows() {
        let d = doc(&[table(&[
            &["a", "b", "c", "d"],
            &["note spanning the table"],
            &[" e ", "f", "g", "\n h\t"],
        ])]);
        let rows = normalize(&d).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], ["e", "f", "g", "h"].map(String::from));
    }

    #[test]
    fn ineligible_first_row_skips_whole_table() {
        let d = doc(&[
            table(&[&["x", "y", "z"], &["1", "2", "3", "4"]]),
            table(&[&["a", "b", "c", "d"], &["e", "f", "g", "h"]]),
        ]);
        let groups = collect_tables(&d).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0][0][0], "a");
    }

    #[test]
    fn tables_concatenate_in_document_order() {
        let d = doc(&[
            table(&[&["1", "1", "1", "1"]]),
            table(&[&["2", "2", "2", "2"], &["3", "3", "3", "3"]]),
        ]);
        let firsts: Vec<_> = normalize(&d).unwrap().into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(firsts, ["1", "2", "3"]);
    }

    #[test]
    fn empty_cells_still_count() {
        let d = doc(&[table(&[&["a", "", "c", ""]])]);
        assert_eq!(normalize(&d).unwrap()[0][1], "");
    }

    #[test]
    fn no_eligible_tables() {
        let d = doc(&[table(&[&["a", "b"]]), "<table></table>".to_string()]);
        assert!(matches!(normalize(&d), Err(ExtractError::NoTablesFound)));
    }

    #[test]
    fn normalize_is_repeatable() {
        let d = doc(&[table(&[&["a", "b", "c", "d"], &["e", "f", "g", "h"]])]);
        assert_eq!(normalize(&d).unwrap(), normalize(&d).unwrap());
    }
}
