use serde::{Serialize, Deserialize};

use crate::config::{AlgorithmKind, Hyperparameters};
use crate::error::{PlutusError, Result};
use crate::network::{NetworkParameters, NeuralNetwork};
use crate::types::{ActionKey, StateKey};

/// Format version written into every blob
pub const MODEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub step_count: u64,
    pub episode_count: u64,
    pub version: String,
}

impl ModelMetadata {
    pub fn new(step_count: u64, episode_count: u64) -> Self {
        ModelMetadata {
            step_count,
            episode_count,
            version: MODEL_VERSION.to_string(),
        }
    }
}

/// One value-table cell
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub state: StateKey,
    pub action: ActionKey,
    pub value: f64,
    pub visits: u64,
}

/// Serializable snapshot of a trained learner.
///
/// Network learners concatenate the layers of all their networks into
/// `weights`/`biases`; `layer_counts` says how many layers belong to each
/// network, in the order the learner owns them. Tabular learners leave the
/// network fields empty and fill `table`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelBlob {
    pub algorithm: AlgorithmKind,
    pub weights: Vec<Vec<Vec<f64>>>,
    pub biases: Vec<Vec<f64>>,
    #[serde(default)]
    pub layer_counts: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Vec<TableEntry>>,
    pub hyperparameters: Hyperparameters,
    pub exploration_rate: f32,
    pub metadata: ModelMetadata,
}

impl ModelBlob {
    pub fn from_networks(
        algorithm: AlgorithmKind,
        networks: &[&NeuralNetwork],
        hyperparameters: Hyperparameters,
        exploration_rate: f32,
        metadata: ModelMetadata,
    ) -> Self {
        let mut weights = Vec::new();
        let mut biases = Vec::new();
        let mut layer_counts = Vec::with_capacity(networks.len());
        for network in networks {
            let params = network.parameters();
            layer_counts.push(params.layer_count());
            weights.extend(params.weights);
            biases.extend(params.biases);
        }
        ModelBlob {
            algorithm,
            weights,
            biases,
            layer_counts,
            table: None,
            hyperparameters,
            exploration_rate,
            metadata,
        }
    }

    pub fn from_table(
        table: Vec<TableEntry>,
        hyperparameters: Hyperparameters,
        exploration_rate: f32,
        metadata: ModelMetadata,
    ) -> Self {
        ModelBlob {
            algorithm: AlgorithmKind::Tabular,
            weights: Vec::new(),
            biases: Vec::new(),
            layer_counts: Vec::new(),
            table: Some(table),
            hyperparameters,
            exploration_rate,
            metadata,
        }
    }

    /// Split the flat layer lists back into one parameter set per network
    pub fn network_parameters(&self) -> Result<Vec<NetworkParameters>> {
        let total: usize = self.layer_counts.iter().sum();
        if total != self.weights.len() || total != self.biases.len() {
            return Err(PlutusError::dimension_mismatch(
                format!("{} layers", total),
                format!("{} weight / {} bias layers", self.weights.len(), self.biases.len()),
            ));
        }

        let mut start = 0;
        let mut networks = Vec::with_capacity(self.layer_counts.len());
        for &count in &self.layer_counts {
            networks.push(NetworkParameters {
                weights: self.weights[start..start + count].to_vec(),
                biases: self.biases[start..start + count].to_vec(),
            });
            start += count;
        }
        Ok(networks)
    }

    /// Fails with `UnknownAlgorithm` naming the blob's algorithm when it was
    /// saved by a different learner
    pub fn expect_algorithm(&self, expected: AlgorithmKind) -> Result<()> {
        if self.algorithm == expected {
            Ok(())
        } else {
            Err(PlutusError::UnknownAlgorithm(format!(
                "model saved by {} cannot be loaded into {}",
                self.algorithm, expected
            )))
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activations::Activation;
    use crate::optimizer::{OptimizerWrapper, SGD};
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_json_round_trip_is_bit_exact() {
        let mut rng = StdRng::seed_from_u64(5);
        let net = NeuralNetwork::with_hidden_activation(
            &[3, 8, 2],
            Activation::Relu,
            OptimizerWrapper::SGD(SGD::new()),
            &mut rng,
        )
        .unwrap();
        let blob = ModelBlob::from_networks(
            AlgorithmKind::Dqn,
            &[&net],
            Hyperparameters::default(),
            0.3,
            ModelMetadata::new(10, 2),
        );

        let restored = ModelBlob::from_json(&blob.to_json().unwrap()).unwrap();
        assert_eq!(restored, blob);

        let mut copy = net.clone();
        copy.layers[1].biases.fill(9.0);
        copy.load_parameters(&restored.network_parameters().unwrap()[0]).unwrap();
        let input = array![0.125, -3.5, 0.7];
        let a = net.predict(input.view());
        let b = copy.predict(input.view());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_layer_counts_must_match() {
        let mut blob = ModelBlob::from_table(Vec::new(), Hyperparameters::default(), 0.1, ModelMetadata::new(0, 0));
        blob.layer_counts = vec![2];
        assert!(blob.network_parameters().is_err());
        assert!(blob.expect_algorithm(AlgorithmKind::Dqn).is_err());
        assert!(blob.expect_algorithm(AlgorithmKind::Tabular).is_ok());
    }
}
