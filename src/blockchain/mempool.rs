use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::LedgerError;

/// One telemetry sample from a measurement station.
///
/// Vectors are per-phase readings; three phases in the usual deployment but
/// any length is accepted as long as all three vectors agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub recorded_at: i64,
    pub voltage_vector: Vec<f64>,
    pub current_vector: Vec<f64>,
    pub power_vector: Vec<f64>,
    pub node_id: String,
    pub metadata: BTreeMap<String, String>,
}

/// Untrusted measurement payload as it arrives from a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementSubmission {
    pub voltage_vector: Option<Vec<f64>>,
    pub current_vector: Option<Vec<f64>>,
    pub power_vector: Option<Vec<f64>>,
    pub node_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl MeasurementSubmission {
    /// Checks required fields and vector shape, stamping the capture time.
    pub fn validate(self) -> Result<Measurement, LedgerError> {
        let voltage_vector = required_vector("voltage_vector", self.voltage_vector)?;
        let current_vector = required_vector("current_vector", self.current_vector)?;
        let power_vector = required_vector("power_vector", self.power_vector)?;

        let phases = voltage_vector.len();
        if current_vector.len() != phases || power_vector.len() != phases {
            return Err(LedgerError::DataValidation(format!(
                "vector lengths differ: voltage={}, current={}, power={}",
                phases,
                current_vector.len(),
                power_vector.len()
            )));
        }

        let node_id = match self.node_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            Some(_) => {
                return Err(LedgerError::DataValidation(
                    "node_id must not be blank".to_string(),
                ))
            }
            None => return Err(missing("node_id")),
        };

        let mut metadata = BTreeMap::new();
        for (key, value) in self.metadata.unwrap_or_default() {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(LedgerError::DataValidation(format!(
                        "metadata value for {key:?} must be a scalar"
                    )))
                }
            };
            metadata.insert(key, value);
        }

        Ok(Measurement {
            recorded_at: Utc::now().timestamp(),
            voltage_vector,
            current_vector,
            power_vector,
            node_id,
            metadata,
        })
    }
}

fn missing(field: &str) -> LedgerError {
    LedgerError::DataValidation(format!("missing required field {field}"))
}

fn required_vector(field: &str, values: Option<Vec<f64>>) -> Result<Vec<f64>, LedgerError> {
    let values = values.ok_or_else(|| missing(field))?;
    if values.is_empty() {
        return Err(LedgerError::DataValidation(format!("{field} is empty")));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(LedgerError::DataValidation(format!(
            "{field} contains a non-finite value"
        )));
    }
    Ok(values)
}

/// Ordered queue of accepted measurements waiting to be sealed into a block.
#[derive(Debug, Clone)]
pub struct Mempool {
    pending: Vec<Measurement>,
    max_size: usize,
}

impl Mempool {
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_size,
        }
    }

    pub fn add_measurement(&mut self, measurement: Measurement) -> Result<&Measurement, LedgerError> {
        if self.pending.len() >= self.max_size {
            return Err(LedgerError::MempoolFull {
                capacity: self.max_size,
            });
        }
        self.pending.push(measurement);
        Ok(&self.pending[self.pending.len() - 1])
    }

    pub fn pending(&self) -> &[Measurement] {
        &self.pending
    }

    /// Drops the first `count` measurements, the ones sealed into the latest block.
    pub fn remove_mined(&mut self, count: usize) {
        let count = count.min(self.pending.len());
        self.pending.drain(..count);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
