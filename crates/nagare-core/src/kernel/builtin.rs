//! Built-in `f32` batch kernels.
//!
//! Scalar reference implementations of the numeric transforms the engine
//! ships with. Hosts with SIMD or accelerated variants re-register the
//! same names.

use std::sync::Arc;

use crate::value::F32Batch;

use super::{KernelError, KernelParams, KernelRegistry};

#[allow(clippy::cast_precision_loss)]
fn normalize(input: &F32Batch) -> Result<F32Batch, KernelError> {
    let data = input.as_slice();
    if data.is_empty() {
        return Ok(F32Batch::from_vec(Vec::new()));
    }

    let len = data.len() as f32;
    let mean = data.iter().sum::<f32>() / len;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / len;
    let std_dev = variance.sqrt();

    if std_dev == 0.0 {
        return Err(KernelError::InvalidInput {
            kernel: "normalize".to_owned(),
            message: "zero variance".to_owned(),
        });
    }

    Ok(data.iter().map(|x| (x - mean) / std_dev).collect())
}

fn cumsum(input: &F32Batch) -> F32Batch {
    let mut sum = 0.0f32;
    input
        .as_slice()
        .iter()
        .map(|x| {
            sum += x;
            sum
        })
        .collect()
}

/// Registers the built-in kernels into `registry`.
pub(super) fn install(registry: &KernelRegistry) {
    registry.register(
        "square",
        Arc::new(|input, _| Ok(input.as_slice().iter().map(|x| x * x).collect())),
    );

    registry.register(
        "sqrt",
        Arc::new(|input, _| Ok(input.as_slice().iter().map(|x| x.sqrt()).collect())),
    );

    registry.register("normalize", Arc::new(|input, _| normalize(input)));

    registry.register("cumsum", Arc::new(|input, _| Ok(cumsum(input))));

    registry.register(
        "mul_add",
        Arc::new(|input, params: &KernelParams| {
            #[allow(clippy::cast_possible_truncation)]
            let a = params.require("mul_add", "a")? as f32;
            #[allow(clippy::cast_possible_truncation)]
            let b = params.require("mul_add", "b")? as f32;
            Ok(input.as_slice().iter().map(|x| x.mul_add(a, b)).collect())
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::super::{process_f32_batch, KernelParams};
    use crate::value::F32Batch;

    fn batch(data: &[f32]) -> F32Batch {
        F32Batch::from_vec(data.to_vec())
    }

    #[test]
    fn test_square() {
        let out = process_f32_batch("square", &batch(&[1.0, 2.0, 3.0]), &KernelParams::new());
        assert_eq!(out.unwrap().as_slice(), &[1.0, 4.0, 9.0]);
    }

    #[test]
    fn test_sqrt() {
        let out = process_f32_batch("sqrt", &batch(&[4.0, 9.0]), &KernelParams::new());
        assert_eq!(out.unwrap().as_slice(), &[2.0, 3.0]);
    }

    #[test]
    fn test_cumsum() {
        let out = process_f32_batch("cumsum", &batch(&[1.0, 2.0, 3.0]), &KernelParams::new());
        assert_eq!(out.unwrap().as_slice(), &[1.0, 3.0, 6.0]);
    }

    #[test]
    fn test_normalize_zero_mean_unit_variance() {
        let out = process_f32_batch("normalize", &batch(&[1.0, 2.0, 3.0]), &KernelParams::new())
            .unwrap();
        let slice = out.as_slice();
        let mean: f32 = slice.iter().sum::<f32>() / 3.0;
        assert!(mean.abs() < 1e-6);
        assert!((slice[2] - -slice[0]).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_rejects_constant_batch() {
        let err =
            process_f32_batch("normalize", &batch(&[5.0, 5.0]), &KernelParams::new()).unwrap_err();
        assert!(err.to_string().contains("zero variance"));
    }

    #[test]
    fn test_mul_add() {
        let params = KernelParams::new().with("a", 2.0).with("b", 1.0);
        let out = process_f32_batch("mul_add", &batch(&[1.0, 2.0]), &params);
        assert_eq!(out.unwrap().as_slice(), &[3.0, 5.0]);
    }

    #[test]
    fn test_mul_add_missing_param() {
        let params = KernelParams::new().with("a", 2.0);
        assert!(process_f32_batch("mul_add", &batch(&[1.0]), &params).is_err());
    }
}
