use scraper::{ElementRef, Html};
use tracing::{info, warn};

use super::selector;
use crate::error::ExtractError;

pub const NAME: &str = "Имя:";
pub const AGE: &str = "Возраст:";
pub const BODY_TYPE: &str = "Телосложение:";
pub const TEST_TIME: &str = "Время тестирования:";

/// Value that follows `label ` in the first leaf `td` mentioning `label`.
pub fn extract(document: &Html, label: &'static str) -> Result<String, ExtractError> {
    let td = selector("td")?;
    let not_found = || ExtractError::FieldNotFound { label };

    let text = document
        .select(&td)
        .filter(|cell| is_leaf(cell))
        .map(|cell| cell.text().collect::<String>())
        .find(|text| text.contains(label))
        .ok_or_else(|| {
            warn!("{} no cell mentions the label", label);
            not_found()
        })?;

    let value = text
        .split_once(&format!("{} ", label))
        .map(|(_, rest)| rest.trim())
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| {
            warn!("{} cell has no value after the label: {:?}", label, text.trim());
            not_found()
        })?;

    info!("{} extracted: {}", label, value);
    Ok(value.to_string())
}

// Layout cells that wrap whole inner tables also "contain" every label.
fn is_leaf(cell: &ElementRef) -> bool {
    !cell
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|e| e.value().name() == "td")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{}</body></html>", body))
    }

    #[test]
    fn value_after_label() {
        let d = doc("<table><tr><td>Имя: Петров Пётр</td><td>Возраст: 41</td></tr></table>");
        assert_eq!(extract(&d, NAME).unwrap(), "Петров Пётр");
        assert_eq!(extract(&d, AGE).unwrap(), "41");
    }

    #[test]
    fn first_matching_cell_wins() {
        let d = doc("<table><tr><td>Возраст: 30</td></tr><tr><td>Возраст: 99</td></tr></table>");
        assert_eq!(extract(&d, AGE).unwrap(), "30");
    }

    #[test]
    fn label_without_value_is_not_found() {
        let d = doc("<table><tr><td>Возраст:</td><td>41</td></tr></table>");
        assert!(matches!(
            extract(&d, AGE),
            Err(ExtractError::FieldNotFound { label: AGE })
        ));
    }

    #[test]
    fn trailing_space_only_is_not_found() {
        let d = doc("<table><tr><td>Имя: </td></tr></table>");
        assert!(matches!(extract(&d, NAME), Err(ExtractError::FieldNotFound { .. })));
    }

    #[test]
    fn missing_label_is_not_found() {
        let d = doc("<table><tr><td>Имя: Петров</td></tr></table>");
        assert!(matches!(
            extract(&d, TEST_TIME),
            Err(ExtractError::FieldNotFound { label: TEST_TIME })
        ));
    }

    #[test]
    fn wrapping_layout_cell_is_skipped() {
        let d = doc(
            "<table><tr><td>\
               <table><tr><td>Header</td></tr><tr><td>Телосложение: Астеник</td></tr></table>\
             </td></tr></table>",
        );
        assert_eq!(extract(&d, BODY_TYPE).unwrap(), "Астеник");
    }

    #[test]
    fn label_inside_markup_is_found() {
        let d = doc("<table><tr><td><b>Время тестирования:</b> 01.02.2024 09:00</td></tr></table>");
        assert_eq!(extract(&d, TEST_TIME).unwrap(), "01.02.2024 09:00");
    }
}
