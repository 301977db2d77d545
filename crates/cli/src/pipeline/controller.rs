//! PseudoController - 模拟控制器参数表
//!
//! 每个周期按 `change_probability` 重新随机化每个参数，
//! 只有值真正发生变化的参数才会产出 `Record`。

use std::collections::HashMap;

use contracts::{Address, ParameterConfig, ParameterKind, Record, SourceConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// Four integer/float pairs followed by two booleans
const DEFAULT_KINDS: [ParameterKind; 10] = [
    ParameterKind::Integer,
    ParameterKind::Float,
    ParameterKind::Integer,
    ParameterKind::Float,
    ParameterKind::Integer,
    ParameterKind::Float,
    ParameterKind::Integer,
    ParameterKind::Float,
    ParameterKind::Boolean,
    ParameterKind::Boolean,
];

/// Current value of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    /// 0..=100
    Integer(u8),
    /// [0, 100)
    Float(f64),
    Boolean(bool),
}

impl ParameterValue {
    fn initial(kind: ParameterKind) -> Self {
        match kind {
            ParameterKind::Integer => Self::Integer(0),
            ParameterKind::Float => Self::Float(0.0),
            ParameterKind::Boolean => Self::Boolean(false),
        }
    }

    fn random(kind: ParameterKind, rng: &mut impl Rng) -> Self {
        match kind {
            ParameterKind::Integer => Self::Integer(rng.random_range(0..=100)),
            ParameterKind::Float => Self::Float(rng.random_range(0.0..100.0)),
            ParameterKind::Boolean => Self::Boolean(rng.random_bool(0.5)),
        }
    }

    /// Wire form: integers travel as floats (`42.0`), booleans lower-case
    pub fn render(&self) -> String {
        match self {
            Self::Integer(v) => format!("{:?}", f64::from(*v)),
            Self::Float(v) => format!("{v:?}"),
            Self::Boolean(v) => v.to_string(),
        }
    }
}

/// One addressable controller parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    address: Address,
    name: String,
    kind: ParameterKind,
    value: ParameterValue,
}

impl Parameter {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn value(&self) -> ParameterValue {
        self.value
    }
}

fn kind_prefix(kind: ParameterKind) -> &'static str {
    match kind {
        ParameterKind::Integer => "integer",
        ParameterKind::Float => "float",
        ParameterKind::Boolean => "boolean",
    }
}

/// Simulated controller producing value-change records
pub struct PseudoController {
    parameters: Vec<Parameter>,
    change_probability: f64,
    rng: StdRng,
}

impl PseudoController {
    /// Build the parameter table from configuration
    ///
    /// An empty parameter list yields the default ten-parameter table.
    /// Addresses are assigned from 1 in table order; unnamed parameters are
    /// named after their kind with a per-kind counter (`integer0`, `float0`, ...).
    pub fn from_config(config: &SourceConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let entries: Vec<ParameterConfig> = if config.parameters.is_empty() {
            DEFAULT_KINDS
                .iter()
                .map(|&kind| ParameterConfig { name: None, kind })
                .collect()
        } else {
            config.parameters.clone()
        };

        let mut counters: HashMap<ParameterKind, usize> = HashMap::new();
        let parameters = entries
            .into_iter()
            .zip(1..)
            .map(|(entry, address)| {
                let counter = counters.entry(entry.kind).or_default();
                let name = entry
                    .name
                    .unwrap_or_else(|| format!("{}{}", kind_prefix(entry.kind), counter));
                *counter += 1;
                Parameter {
                    address,
                    name,
                    kind: entry.kind,
                    value: ParameterValue::initial(entry.kind),
                }
            })
            .collect();

        let change_probability = if (0.0..=1.0).contains(&config.change_probability) {
            config.change_probability
        } else {
            warn!(
                change_probability = config.change_probability,
                "change_probability outside [0, 1], parameters will never change"
            );
            0.0
        };

        Self {
            parameters,
            change_probability,
            rng,
        }
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Run one refresh period and return a record for every changed parameter
    pub fn tick(&mut self, timestamp: i64) -> Vec<Record> {
        let mut changed = Vec::new();
        for parameter in &mut self.parameters {
            if !self.rng.random_bool(self.change_probability) {
                continue;
            }
            let next = ParameterValue::random(parameter.kind, &mut self.rng);
            if next == parameter.value {
                continue;
            }
            parameter.value = next;

            match Record::new(parameter.address, next.render(), timestamp) {
                Ok(record) => {
                    debug!(
                        address = parameter.address,
                        name = %parameter.name,
                        value = record.value(),
                        "Parameter changed"
                    );
                    changed.push(record);
                }
                Err(e) => warn!(address = parameter.address, error = %e, "Unencodable value"),
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(parameters: Vec<ParameterConfig>, change_probability: f64) -> SourceConfig {
        SourceConfig {
            change_probability,
            parameters,
            ..SourceConfig::default()
        }
    }

    #[test]
    fn test_default_table() {
        let controller = PseudoController::from_config(&SourceConfig::default(), Some(1));
        let table: Vec<_> = controller
            .parameters()
            .iter()
            .map(|p| (p.address(), p.name().to_string()))
            .collect();

        assert_eq!(table.len(), 10);
        assert_eq!(table[0], (1, "integer0".to_string()));
        assert_eq!(table[1], (2, "float0".to_string()));
        assert_eq!(table[6], (7, "integer3".to_string()));
        assert_eq!(table[7], (8, "float3".to_string()));
        assert_eq!(table[8], (9, "boolean0".to_string()));
        assert_eq!(table[9], (10, "boolean1".to_string()));
    }

    #[test]
    fn test_explicit_names_kept() {
        let source = config(
            vec![
                ParameterConfig {
                    name: Some("pressure".into()),
                    kind: ParameterKind::Float,
                },
                ParameterConfig {
                    name: None,
                    kind: ParameterKind::Float,
                },
            ],
            0.5,
        );
        let controller = PseudoController::from_config(&source, Some(1));
        let names: Vec<_> = controller.parameters().iter().map(Parameter::name).collect();
        assert_eq!(names, vec!["pressure", "float1"]);
    }

    #[test]
    fn test_zero_probability_never_changes() {
        let mut controller = PseudoController::from_config(&config(Vec::new(), 0.0), Some(3));
        for tick in 0..50 {
            assert!(controller.tick(tick).is_empty());
        }
    }

    #[test]
    fn test_rendered_values() {
        let mut controller = PseudoController::from_config(&config(Vec::new(), 1.0), Some(42));
        let mut seen = 0;
        for tick in 0..20 {
            for record in controller.tick(tick) {
                seen += 1;
                assert_eq!(record.timestamp(), tick);
                let kind = controller.parameters()[record.address() as usize - 1].kind();
                match kind {
                    ParameterKind::Integer => {
                        let value: f64 = record.value().parse().unwrap();
                        assert!(record.value().ends_with(".0"), "got {}", record.value());
                        assert!((0.0..=100.0).contains(&value));
                    }
                    ParameterKind::Float => {
                        let value: f64 = record.value().parse().unwrap();
                        assert!((0.0..100.0).contains(&value));
                    }
                    ParameterKind::Boolean => {
                        assert!(record.value() == "true" || record.value() == "false");
                    }
                }
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn test_only_changes_are_emitted() {
        let booleans = (0..4)
            .map(|_| ParameterConfig {
                name: None,
                kind: ParameterKind::Boolean,
            })
            .collect();
        let mut controller = PseudoController::from_config(&config(booleans, 1.0), Some(9));
        let mut last: HashMap<Address, String> =
            (1..=4).map(|address| (address, "false".to_string())).collect();

        for tick in 0..100 {
            for record in controller.tick(tick) {
                let previous = last.insert(record.address(), record.value().to_string());
                assert_ne!(previous.as_deref(), Some(record.value()));
            }
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let source = config(Vec::new(), 0.5);
        let mut a = PseudoController::from_config(&source, Some(7));
        let mut b = PseudoController::from_config(&source, Some(7));
        for tick in 0..10 {
            assert_eq!(a.tick(tick), b.tick(tick));
        }
    }
}
