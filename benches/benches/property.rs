// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `understory_dependency`.

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use std::rc::Rc;
use std::sync::{LazyLock, Once};

use understory_dependency::{
    BoundExpression, DependencyClass, DependencyObject, DependencyObjectExt, DependencyProperty,
    ExpressionContext, PropertyContainer, PropertyMetadata, PropertyMetadataBuilder,
    PropertyResult, ValueProvider,
};

struct Elem {
    container: PropertyContainer,
}

impl Elem {
    fn new() -> Self {
        Self {
            container: PropertyContainer::new::<Self>(),
        }
    }
}

impl DependencyClass for Elem {}

impl DependencyObject for Elem {
    fn dependency_container(&self) -> &PropertyContainer {
        &self.container
    }
}

static WIDTH: LazyLock<DependencyProperty<f64>> = LazyLock::new(|| {
    DependencyProperty::register::<Elem>("Width", PropertyMetadata::new(0.0_f64))
        .expect("Width is a valid declaration")
});

static OPACITY: LazyLock<DependencyProperty<f64>> = LazyLock::new(|| {
    DependencyProperty::register::<Elem>(
        "Opacity",
        PropertyMetadataBuilder::new(1.0_f64)
            .validate(|_, v: &f64| v.is_finite())
            .coerce(|_, v: f64| v.clamp(0.0, 1.0))
            .build(),
    )
    .expect("Opacity is a valid declaration")
});

static TEXT: LazyLock<DependencyProperty<String>> = LazyLock::new(|| {
    DependencyProperty::register::<Elem>(
        "Text",
        PropertyMetadataBuilder::new(String::new())
            .on_changed(|_, args| {
                black_box(args.new_value.len());
            })
            .build(),
    )
    .expect("Text is a valid declaration")
});

struct Fixed(f64);

struct FixedExpression(f64);

impl ValueProvider<f64> for Fixed {
    fn create_expression(&self, _: &DependencyProperty<f64>) -> Box<dyn BoundExpression<f64>> {
        Box::new(FixedExpression(self.0))
    }
}

impl BoundExpression<f64> for FixedExpression {
    fn on_initialize(&mut self, cx: &ExpressionContext<'_, f64>) -> PropertyResult<()> {
        cx.change_value(self.0)
    }
}

fn bench_property(c: &mut Criterion) {
    static PRINT_SIZES: Once = Once::new();
    PRINT_SIZES.call_once(|| {
        eprintln!(
            "sizes: PropertyContainer={} DependencyProperty<f64>={} ErasedValue={}",
            size_of::<PropertyContainer>(),
            size_of::<DependencyProperty<f64>>(),
            size_of::<understory_dependency::ErasedValue>(),
        );
    });

    let mut group = c.benchmark_group("property/get");

    group.bench_function("default", |b| {
        let element = Elem::new();
        b.iter(|| black_box(element.get_value(&WIDTH)));
    });

    group.bench_function("local", |b| {
        let element = Elem::new();
        element.set_value(&WIDTH, 100.0).expect("valid value");
        b.iter(|| black_box(element.get_value(&WIDTH)));
    });

    group.bench_function("coerced", |b| {
        let element = Elem::new();
        element.set_value(&OPACITY, 4.0).expect("valid value");
        b.iter(|| black_box(element.get_value(&OPACITY)));
    });

    group.bench_function("provider", |b| {
        let element = Elem::new();
        element
            .set_value_extension(&WIDTH, Some(Rc::new(Fixed(42.0))))
            .expect("provider initializes");
        b.iter(|| black_box(element.get_value(&WIDTH)));
    });

    group.bench_function("erased", |b| {
        let element = Elem::new();
        element.set_value(&WIDTH, 100.0).expect("valid value");
        let width = WIDTH.to_ref();
        b.iter(|| black_box(element.get_value_erased(&width)));
    });

    group.finish();

    let mut group = c.benchmark_group("property/mutate");

    group.bench_function("set/f64", |b| {
        let element = Elem::new();
        let mut next = 0.0;
        b.iter(|| {
            next += 1.0;
            black_box(element.set_value(&WIDTH, next))
        });
    });

    group.bench_function("set/f64/unchanged", |b| {
        let element = Elem::new();
        element.set_value(&WIDTH, 5.0).expect("valid value");
        b.iter(|| black_box(element.set_value(&WIDTH, 5.0)));
    });

    group.bench_function("set/f64/coerced", |b| {
        let element = Elem::new();
        let mut next = 0.0;
        b.iter(|| {
            next += 0.25;
            black_box(element.set_value(&OPACITY, next % 2.0))
        });
    });

    group.bench_function("set/string/with_callback", |b| {
        b.iter_batched(
            Elem::new,
            |element| {
                black_box(element.set_value(&TEXT, "hello world hello world".to_string()))
                    .expect("valid value");
                black_box(element);
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("set_then_clear", |b| {
        let element = Elem::new();
        b.iter(|| {
            element.set_value(&WIDTH, 7.0).expect("valid value");
            element.clear_value(&WIDTH).expect("clear succeeds");
        });
    });

    group.bench_function("coerce_value", |b| {
        let element = Elem::new();
        element.set_value(&OPACITY, 0.5).expect("valid value");
        b.iter(|| black_box(element.coerce_value(&OPACITY)));
    });

    group.bench_function("attach_detach_provider", |b| {
        let element = Elem::new();
        let provider: Rc<dyn ValueProvider<f64>> = Rc::new(Fixed(3.0));
        b.iter(|| {
            element
                .set_value_extension(&WIDTH, Some(Rc::clone(&provider)))
                .expect("provider initializes");
            element
                .set_value_extension(&WIDTH, None)
                .expect("provider detaches");
        });
    });

    group.finish();
}

criterion_group!(benches, bench_property);
criterion_main!(benches);
