use chrono::{NaiveDate, NaiveDateTime};

/// Loosely typed cell read back from a columnar file.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            CellValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Float(v) if v.is_finite() => Some(v.round() as i64),
            CellValue::Text(v) => {
                let trimmed = v.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().map(|f| f.round() as i64))
            }
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(v) => Some(v.clone()),
            CellValue::Int(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

/// Column names plus row-major cells, as stored in the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawFrame {
    pub fn height(&self) -> usize {
        self.rows.len()
    }
}
