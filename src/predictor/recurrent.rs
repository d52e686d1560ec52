use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// LSTM cell with fixed weights drawn from a seeded generator. Gate rows are
/// stacked as `[input, forget, candidate, output]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmCell {
    pub input_size: usize,
    pub hidden_size: usize,
    w_x: Vec<Vec<f64>>,
    w_h: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl LstmCell {
    pub fn seeded(input_size: usize, hidden_size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let limit = (1.0 / hidden_size.max(1) as f64).sqrt();
        let rows = 4 * hidden_size;
        let w_x = (0..rows)
            .map(|_| (0..input_size).map(|_| rng.gen_range(-limit..limit)).collect())
            .collect();
        let w_h = (0..rows)
            .map(|_| (0..hidden_size).map(|_| rng.gen_range(-limit..limit)).collect())
            .collect();
        let mut bias = vec![0.0; rows];
        // Forget gate starts open.
        for b in bias.iter_mut().skip(hidden_size).take(hidden_size) {
            *b = 1.0;
        }
        Self {
            input_size,
            hidden_size,
            w_x,
            w_h,
            bias,
        }
    }

    pub fn step(&self, x: &[f64], h_prev: &[f64], c_prev: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let hs = self.hidden_size;
        let mut pre = self.bias.clone();
        for (r, z) in pre.iter_mut().enumerate() {
            *z += dot(&self.w_x[r], x) + dot(&self.w_h[r], h_prev);
        }
        let mut h = vec![0.0; hs];
        let mut c = vec![0.0; hs];
        for j in 0..hs {
            let i_gate = sigmoid(pre[j]);
            let f_gate = sigmoid(pre[hs + j]);
            let g = pre[2 * hs + j].tanh();
            let o_gate = sigmoid(pre[3 * hs + j]);
            c[j] = f_gate * c_prev[j] + i_gate * g;
            h[j] = o_gate * c[j].tanh();
        }
        (h, c)
    }

    /// Hidden state after every input, starting from zeros.
    pub fn run(&self, inputs: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let mut h = vec![0.0; self.hidden_size];
        let mut c = vec![0.0; self.hidden_size];
        let mut out = Vec::with_capacity(inputs.len());
        for x in inputs {
            let (h_next, c_next) = self.step(x, &h, &c);
            h = h_next;
            c = c_next;
            out.push(h.clone());
        }
        out
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
