use criterion::{
    criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use kdaccel::prelude::*;

fn random_boxes(i: usize) -> Vec<BoundingBox<3>> {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let extent = (i as f32).cbrt() * 4.0;

    (0..i)
        .map(|_| {
            let min: [f32; 3] = std::array::from_fn(|_| rng.gen_range(0.0..extent));
            let size: [f32; 3] = std::array::from_fn(|_| rng.gen_range(0.1..2.0));
            BoundingBox::new(min, std::array::from_fn(|k| min[k] + size[k]))
        })
        .collect()
}

fn random_rays(bbox: &BoundingBox<3>, count: usize) -> Vec<Ray<3>> {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let center = bbox.center();

    (0..count)
        .map(|_| {
            let origin: [f32; 3] =
                std::array::from_fn(|k| rng.gen_range(bbox.min[k]..=bbox.max[k]));
            let target: [f32; 3] =
                std::array::from_fn(|k| center[k] + rng.gen_range(-1.0..1.0));
            Ray::new(origin, std::array::from_fn(|k| target[k] - origin[k]))
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("kdaccel");
    group
        .plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic))
        .warm_up_time(std::time::Duration::from_secs(1))
        .sample_size(20);

    for i in (10..=18).step_by(2).map(|i| 2_usize.pow(i)) {
        let boxes = random_boxes(i);

        group.bench_with_input(BenchmarkId::new("build", i), &boxes, |b, input| {
            b.iter(|| {
                let mut tree: KdTree<_, 3> = KdTree::new(input.as_slice());
                tree.build().unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("build_exact", i), &boxes, |b, input| {
            b.iter(|| {
                let mut tree: KdTree<_, 3> = KdTree::new(input.as_slice());
                tree.set_exact_primitive_threshold(usize::MAX);
                tree.build().unwrap()
            })
        });

        let mut tree: KdTree<_, 3> = KdTree::new(boxes.as_slice());
        tree.build().unwrap();
        let rays = random_rays(tree.tight_bbox(), 1024);

        group.bench_with_input(BenchmarkId::new("ray_intersect", i), &rays, |b, input| {
            b.iter(|| input.iter().filter_map(|ray| tree.ray_intersect(ray)).count())
        });

        group.bench_with_input(BenchmarkId::new("ray_occluded", i), &rays, |b, input| {
            b.iter(|| input.iter().filter(|ray| tree.ray_occluded(ray)).count())
        });
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
