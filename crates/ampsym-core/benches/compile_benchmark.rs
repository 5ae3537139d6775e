use ampsym_core::{compile, CoefficientFamily, Expr, Index, IndexRange, Sign, Symbol, Value};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ndarray::Array2;
use num::complex::Complex64;

const N_PHI: usize = 100;
const N_COSTHETA: usize = 50;

fn partial_wave_sum() -> Expr {
    let theta = Expr::from(Symbol::coordinate("theta"));
    let phi = Expr::from(Symbol::coordinate("phi"));
    let big_phi = Expr::from(Symbol::parameter("Phi"));
    let family = CoefficientFamily::new("A", Sign::Negative);
    let body = Expr::coefficient(&family, vec![Index::var("m"), Index::Value(0)])
        * Expr::zlm(Index::var("l"), Index::var("m"), theta, phi, big_phi).re();
    Expr::pool_sum(
        body,
        vec![
            IndexRange::inclusive("l", 0, 4),
            IndexRange::inclusive("m", -2, 2),
        ],
    )
    .norm_sqr()
}

fn compile_benchmarks(c: &mut Criterion) {
    let expr = partial_wave_sum();
    let args = expr.sorted_free_variables();

    let mut group = c.benchmark_group("numeric_compiler");
    group.sample_size(30);
    group.bench_function("compile_partial_wave_sum", |b| {
        b.iter(|| black_box(compile(black_box(&expr), black_box(&args))))
    });

    let function = compile(&expr, &args).expect("benchmark expression should compile");
    let theta = Array2::from_shape_fn((N_PHI, N_COSTHETA), |(_, j)| {
        (-1.0 + 2.0 * j as f64 / (N_COSTHETA - 1) as f64).acos()
    });
    let phi = Array2::from_shape_fn((N_PHI, N_COSTHETA), |(i, _)| {
        2.0 * std::f64::consts::PI * i as f64 / N_PHI as f64
    });
    let call_args: Vec<Value> = args
        .iter()
        .map(|arg| match arg.name().as_str() {
            "theta" => Value::from(theta.clone()),
            "phi" => Value::from(phi.clone()),
            "Phi" => Value::from(0.3),
            _ => Value::from(Complex64::new(0.5, 0.25)),
        })
        .collect();
    group.throughput(Throughput::Elements((N_PHI * N_COSTHETA) as u64));
    group.bench_function("call_on_grid", |b| {
        b.iter(|| black_box(function.call(black_box(&call_args))))
    });
    group.finish();
}

criterion_group!(benches, compile_benchmarks);
criterion_main!(benches);
