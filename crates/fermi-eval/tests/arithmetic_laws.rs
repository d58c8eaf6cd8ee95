//! Property-based checks for the §8.2 arithmetic laws, run against the
//! public `arith` operators rather than against `Engine` so a failure
//! points straight at the arithmetic engine instead of the graph/parser
//! machinery around it.

use fermi_common::{ConfidenceInterpretation, EngineConfig, EngineRng, RichNumber, Value};
use fermi_eval::arith::{add, mul, ArithCtx};
use proptest::prelude::*;

fn finite_scalar() -> impl Strategy<Value = f64> {
    (-1.0e6f64..1.0e6).prop_filter("finite", |v| v.is_finite())
}

fn ctx<'a>(config: &'a EngineConfig, rng: &'a mut EngineRng) -> ArithCtx<'a> {
    ArithCtx { config, rng }
}

proptest! {
    /// §8.2: `add(a, b) == add(b, a)` for scalars.
    #[test]
    fn add_commutes_for_scalars(a in finite_scalar(), b in finite_scalar()) {
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(1);
        let va = Value::raw(a);
        let vb = Value::raw(b);
        let lhs = add(&va, &vb, &mut ctx(&config, &mut rng));
        let rhs = add(&vb, &va, &mut ctx(&config, &mut rng));
        prop_assert_eq!(lhs, rhs);
    }

    /// §8.2: `mul(a, b) == mul(b, a)` for scalars.
    #[test]
    fn mul_commutes_for_scalars(a in finite_scalar(), b in finite_scalar()) {
        let config = EngineConfig::default();
        let mut rng = EngineRng::from_seed(2);
        let va = Value::raw(a);
        let vb = Value::raw(b);
        let lhs = mul(&va, &vb, &mut ctx(&config, &mut rng));
        let rhs = mul(&vb, &va, &mut ctx(&config, &mut rng));
        prop_assert_eq!(lhs, rhs);
    }

    /// §8.2: `Gaussian x scalar(c)`: mean *= c, variance *= c^2.
    #[test]
    fn gaussian_times_scalar_scales_mean_and_variance(
        mean in -100.0f64..100.0,
        variance in 0.1f64..50.0,
        c in (-20.0f64..20.0).prop_filter("nonzero", |c| c.abs() > 0.5),
    ) {
        let config = EngineConfig::default().with_sample_size(20_000);
        let mut rng = EngineRng::from_seed(3);
        let g = Value::Number(RichNumber::Gaussian { mean, variance, samples: None });
        let scalar = Value::raw(c);
        let product = mul(&g, &scalar, &mut ctx(&config, &mut rng));
        let got_mean = match product {
            Value::Number(n) => n.representative(),
            other => panic!("expected number, got {other:?}"),
        };
        let expected_mean = mean * c;
        // 3-sigma-over-sqrt(N) style tolerance, widened with a floor since
        // the expected magnitude can be tiny.
        let tol = (3.0 * (variance * c * c).sqrt() / (20_000f64).sqrt()).max(0.5) + expected_mean.abs() * 0.05;
        prop_assert!((got_mean - expected_mean).abs() < tol, "mean {got_mean} vs expected {expected_mean} (tol {tol})");
    }

    /// §8.2: `Uniform(a, b) + c` fits `Uniform(a+c, b+c)`.
    #[test]
    fn uniform_plus_scalar_shifts_bounds(
        lo in -50.0f64..50.0,
        width in 0.5f64..50.0,
        c in -50.0f64..50.0,
    ) {
        let hi = lo + width;
        let config = EngineConfig::default().with_sample_size(20_000);
        let mut rng = EngineRng::from_seed(4);
        let u = Value::Number(RichNumber::Uniform { lo, hi, samples: None });
        let sum = add(&u, &Value::raw(c), &mut ctx(&config, &mut rng));
        match sum {
            Value::Number(RichNumber::Uniform { lo: got_lo, hi: got_hi, .. }) => {
                let tol = (width * 0.05).max(0.2);
                prop_assert!((got_lo - (lo + c)).abs() < tol, "lo {got_lo} vs {}", lo + c);
                prop_assert!((got_hi - (hi + c)).abs() < tol, "hi {got_hi} vs {}", hi + c);
            }
            other => panic!("expected Uniform, got {other:?}"),
        }
    }

    /// §8.2: `CI[lo, hi] + c`: median shifts by c.
    #[test]
    fn ci_plus_scalar_shifts_median(
        lo in 1.0f64..50.0,
        width in 1.0f64..50.0,
        c in -20.0f64..20.0,
    ) {
        let hi = lo + width;
        let config = EngineConfig::default().with_sample_size(20_000);
        let mut rng = EngineRng::from_seed(5);
        let ci = RichNumber::confidence_interval(lo, hi, 90.0, ConfidenceInterpretation::Normal);
        let before_median = ci.representative();
        let sum = add(&Value::Number(ci), &Value::raw(c), &mut ctx(&config, &mut rng));
        let after = match sum {
            Value::Number(n) => n.representative(),
            other => panic!("expected number, got {other:?}"),
        };
        let tol = (width * 0.1).max(1.0);
        prop_assert!((after - (before_median + c)).abs() < tol, "after {after} vs expected {}", before_median + c);
    }
}
