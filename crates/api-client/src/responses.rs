use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The body of every Tushare Pro call: one endpoint name plus its parameters.
#[derive(Debug, Serialize)]
pub struct TushareRequest<'a> {
    pub api_name: &'a str,
    pub token: &'a str,
    pub params: Value,
    pub fields: &'a str,
}

/// The response envelope. `code` is 0 on success.
#[derive(Debug, Deserialize)]
pub struct TushareResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<TushareTable>,
}

/// A column-oriented table: the field names once, then one array per row.
#[derive(Debug, Clone, Deserialize)]
pub struct TushareTable {
    pub fields: Vec<String>,
    pub items: Vec<Vec<Value>>,
}

impl TushareResponse {
    pub fn into_table(self) -> Result<TushareTable, ApiError> {
        if self.code != 0 {
            return Err(ApiError::ApiError(self.code, self.msg.unwrap_or_default()));
        }
        self.data
            .ok_or_else(|| ApiError::InvalidData("response has no data section".to_string()))
    }
}

impl TushareTable {
    /// Position of `name` in the field list.
    pub fn column(&self, name: &str) -> Result<usize, ApiError> {
        self.fields
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| ApiError::InvalidData(format!("missing column '{}'", name)))
    }

    pub fn column_opt(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }
}

/// Reads a cell as a number. Tushare sends numbers but occasionally nulls or strings.
pub fn cell_f64(row: &[Value], idx: usize) -> Option<f64> {
    match row.get(idx)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn cell_str(row: &[Value], idx: usize) -> Option<&str> {
    row.get(idx)?.as_str()
}
