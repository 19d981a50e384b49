use serde::Serialize;

/// Sheet headers, in the order records are written.
pub const COLUMNS: [&str; 8] = [
    "Измеряемый параметр",
    "Диапазон нормальных значений",
    "Результат",
    "Интерпретация результата",
    "ФИО клиента",
    "Возраст",
    "Телосложение",
    "Время тестирования",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub full_name: String,
    pub age: String,
    pub body_type: String,
    pub test_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasurementRow {
    pub parameter: String,
    pub normal_range: String,
    pub result: String,
    pub interpretation: String,
}

impl From<[String; 4]> for MeasurementRow {
    fn from([parameter, normal_range, result, interpretation]: [String; 4]) -> Self {
        MeasurementRow {
            parameter,
            normal_range,
            result,
            interpretation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub client: ClientInfo,
    pub rows: Vec<MeasurementRow>,
}

impl ExtractionResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows with the client fields broadcast onto each one, in `COLUMNS` order.
    pub fn records(&self) -> impl Iterator<Item = [&str; 8]> + '_ {
        let c = &self.client;
        self.rows.iter().map(move |r| {
            [
                r.parameter.as_str(),
                r.normal_range.as_str(),
                r.result.as_str(),
                r.interpretation.as_str(),
                c.full_name.as_str(),
                c.age.as_str(),
                c.body_type.as_str(),
                c.test_time.as_str(),
            ]
        })
    }

    /// Header row followed by every record, ready for a values update.
    pub fn to_grid(&self) -> Vec<Vec<String>> {
        std::iter::once(COLUMNS.map(String::from).to_vec())
            .chain(
                self.records()
                    .map(|rec| rec.iter().map(|s| s.to_string()).collect()),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExtractionResult {
        ExtractionResult {
            client: ClientInfo {
                full_name: "Иванов Иван".into(),
                age: "35".into(),
                body_type: "Нормостеник".into(),
                test_time: "12.03.2024 10:15".into(),
            },
            rows: vec![
                ["Пульс".into(), "60-80".into(), "72".into(), "Норма".into()].into(),
                ["Давление".into(), "110-130".into(), "140".into(), "Выше нормы".into()].into(),
            ],
        }
    }

    #[test]
    fn records_carry_client_fields() {
        let r = sample();
        let recs: Vec<_> = r.records().collect();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|rec| rec[4] == "Иванов Иван" && rec[7] == "12.03.2024 10:15"));
        assert_eq!(recs[1][2], "140");
    }

    #[test]
    fn grid_starts_with_headers() {
        let grid = sample().to_grid();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0][0], "Измеряемый параметр");
        assert_eq!(grid[0][7], "Время тестирования");
        assert!(grid.iter().all(|row| row.len() == COLUMNS.len()));
    }
}
