// Reference application: sparse logistic regression
//
// The update policy injected into the server's access agents, and the
// training-instance text format shared by the worker-side trainer. The core
// is policy-free; everything learning-rule-specific lives here.

use rand::Rng;

use crate::error::{PsError, Result};
use crate::server::policy::AccessPolicy;

/// AdaGrad fudge factor.
pub const ADAGRAD_EPS: f32 = 1e-6;

/// Authoritative per-key state: the weight and the running sum of squared
/// gradients feeding the AdaGrad step size.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LrParam {
    pub val: f32,
    pub grad2_sum: f32,
}

pub struct LrPolicy {
    learning_rate: f32,
}

impl LrPolicy {
    pub fn new(learning_rate: f32) -> LrPolicy {
        LrPolicy { learning_rate }
    }
}

impl AccessPolicy for LrPolicy {
    type Param = LrParam;

    /// Uniform random weight in [0, 1); the squared-gradient sum starts at
    /// zero.
    fn init_param(&self, _key: u64) -> LrParam {
        LrParam {
            val: rand::rng().random::<f32>(),
            grad2_sum: 0.0,
        }
    }

    /// Workers only see the weight, not the accumulator.
    fn project(&self, _key: u64, param: &LrParam) -> f32 {
        param.val
    }

    /// AdaGrad step on the averaged gradient.
    fn apply(&self, _key: u64, param: &mut LrParam, grad: f32) {
        param.grad2_sum += grad * grad;
        param.val += self.learning_rate * grad / (param.grad2_sum + ADAGRAD_EPS).sqrt();
    }
}

/// One training line: a target followed by the feature ids it touches.
/// Feature values are implicitly 1.0 (binary features).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instance {
    pub target: f32,
    pub keys: Vec<u64>,
}

/// Parse a `target k1 k2 ...` line.
pub fn parse_instance(line: &str) -> Result<Instance> {
    let mut tokens = line.split_whitespace();
    let target = tokens
        .next()
        .ok_or_else(|| PsError::Parse("empty instance line".into()))?;
    let target: f32 = target
        .parse()
        .map_err(|_| PsError::Parse(format!("bad target in line: {}", line.trim())))?;

    let mut keys = Vec::new();
    for token in tokens {
        let key: u64 = token
            .parse()
            .map_err(|_| PsError::Parse(format!("bad feature id: {}", token)))?;
        keys.push(key);
    }
    Ok(Instance { target, keys })
}
