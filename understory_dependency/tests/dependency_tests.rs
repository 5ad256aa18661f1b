// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end behavior of dependency objects: coercion, notification,
//! value providers, read-only keys, attached properties and eviction.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::thread;

use understory_dependency::{
    BoundExpression, ClassId, DependencyClass, DependencyObject, DependencyObjectExt,
    DependencyProperty, ErasedValue, ExpressionContext, ExpressionHandle, ExpressionLayer,
    PropertyChangedEvent, PropertyContainer, PropertyError, PropertyKey, PropertyMetadata,
    PropertyMetadataBuilder, PropertyResult, TypeRegistry, ValueProvider,
};

struct TestObject {
    container: PropertyContainer,
}

impl TestObject {
    fn new() -> Self {
        Self {
            container: PropertyContainer::new::<Self>(),
        }
    }
}

impl DependencyClass for TestObject {}

impl DependencyObject for TestObject {
    fn dependency_container(&self) -> &PropertyContainer {
        &self.container
    }
}

struct Other {
    container: PropertyContainer,
}

impl DependencyClass for Other {}

impl DependencyObject for Other {
    fn dependency_container(&self) -> &PropertyContainer {
        &self.container
    }
}

/// Non-negative, raised to at least 10 while `COERCE_TOGGLE` is on.
static TEST_PROPERTY: LazyLock<DependencyProperty<f32>> = LazyLock::new(|| {
    DependencyProperty::register::<TestObject>(
        "Test",
        PropertyMetadataBuilder::new(1.0_f32)
            .validate(|_, v: &f32| *v >= 0.0)
            .coerce(|owner, v: f32| {
                if owner.get_value(&COERCE_TOGGLE) {
                    v.max(10.0)
                } else {
                    v
                }
            })
            .build(),
    )
    .expect("Test is a valid declaration")
});

static COERCE_TOGGLE: LazyLock<DependencyProperty<bool>> = LazyLock::new(|| {
    DependencyProperty::register::<TestObject>(
        "CoerceToggle",
        PropertyMetadataBuilder::new(false)
            .on_changed(|owner, _| {
                owner
                    .coerce_value(&TEST_PROPERTY)
                    .expect("Test is valid on TestObject");
            })
            .build(),
    )
    .expect("CoerceToggle is a valid declaration")
});

/// Clamps itself to 100 from inside its own changed callback.
static REENTRANT: LazyLock<DependencyProperty<i32>> = LazyLock::new(|| {
    DependencyProperty::register::<TestObject>(
        "Reentrant",
        PropertyMetadataBuilder::new(0_i32)
            .on_changed(|owner, args| {
                if *args.new_value > 100 {
                    owner
                        .set_value(&REENTRANT, 100)
                        .expect("100 is a valid value");
                }
            })
            .build(),
    )
    .expect("Reentrant is a valid declaration")
});

static NAME: LazyLock<DependencyProperty<String>> = LazyLock::new(|| {
    DependencyProperty::register::<TestObject>("Name", PropertyMetadata::new(String::new()))
        .expect("Name is a valid declaration")
});

static COUNTER: LazyLock<PropertyKey<u32>> = LazyLock::new(|| {
    DependencyProperty::register_read_only::<TestObject>("Counter", PropertyMetadata::new(0_u32))
        .expect("Counter is a valid declaration")
});

static ROW: LazyLock<DependencyProperty<i32>> = LazyLock::new(|| {
    DependencyProperty::register_attached::<TestObject>("TestObject.Row", PropertyMetadata::new(0))
        .expect("TestObject.Row is a valid declaration")
});

/// Rounded down to a multiple of `STEP`.
static AMOUNT: LazyLock<DependencyProperty<i32>> = LazyLock::new(|| {
    DependencyProperty::register::<TestObject>(
        "Amount",
        PropertyMetadataBuilder::new(0_i32)
            .coerce(|owner, v: i32| v - v % owner.get_value(&STEP))
            .on_changed(|owner, _| {
                owner.coerce_value(&STEP).expect("Step is valid on TestObject");
            })
            .build(),
    )
    .expect("Amount is a valid declaration")
});

/// At least a tenth of `AMOUNT`.
static STEP: LazyLock<DependencyProperty<i32>> = LazyLock::new(|| {
    DependencyProperty::register::<TestObject>(
        "Step",
        PropertyMetadataBuilder::new(1_i32)
            .coerce(|owner, v: i32| v.max(owner.get_value(&AMOUNT) / 10))
            .on_changed(|owner, _| {
                owner.coerce_value(&AMOUNT).expect("Amount is valid on TestObject");
            })
            .build(),
    )
    .expect("Step is a valid declaration")
});

static ITEMS_CREATED: AtomicUsize = AtomicUsize::new(0);

static ITEMS: LazyLock<DependencyProperty<Vec<i32>>> = LazyLock::new(|| {
    DependencyProperty::register::<TestObject>(
        "Items",
        PropertyMetadataBuilder::with_factory(|_| {
            ITEMS_CREATED.fetch_add(1, Ordering::Relaxed);
            Vec::new()
        })
        .build(),
    )
    .expect("Items is a valid declaration")
});

#[derive(Default)]
struct ProviderLog {
    initialized: Cell<usize>,
    released: Cell<usize>,
    handle: RefCell<Option<ExpressionHandle<f32>>>,
}

/// What a pushing expression does after its first push.
#[derive(Clone, Copy)]
enum AfterPush {
    Succeed,
    Fail,
    /// Sets the property explicitly, which detaches the expression.
    SetExplicitly(f32),
}

/// Pushes a fixed value when initialized.
struct PushProvider {
    value: f32,
    after: AfterPush,
    log: Rc<ProviderLog>,
}

struct PushExpression {
    value: f32,
    after: AfterPush,
    log: Rc<ProviderLog>,
}

impl ValueProvider<f32> for PushProvider {
    fn create_expression(&self, _: &DependencyProperty<f32>) -> Box<dyn BoundExpression<f32>> {
        Box::new(PushExpression {
            value: self.value,
            after: self.after,
            log: Rc::clone(&self.log),
        })
    }
}

impl BoundExpression<f32> for PushExpression {
    fn on_initialize(&mut self, cx: &ExpressionContext<'_, f32>) -> PropertyResult<()> {
        self.log.initialized.set(self.log.initialized.get() + 1);
        cx.change_value(self.value)?;
        *self.log.handle.borrow_mut() = Some(cx.handle());
        match self.after {
            AfterPush::Succeed => Ok(()),
            AfterPush::Fail => Err(PropertyError::provider("connection refused")),
            AfterPush::SetExplicitly(value) => cx.owner().set_value(&TEST_PROPERTY, value),
        }
    }

    fn on_release(&mut self) {
        self.log.released.set(self.log.released.get() + 1);
    }
}

fn provider(value: f32, after: AfterPush, log: &Rc<ProviderLog>) -> Rc<dyn ValueProvider<f32>> {
    Rc::new(PushProvider {
        value,
        after,
        log: Rc::clone(log),
    })
}

fn pushing(value: f32, log: &Rc<ProviderLog>) -> Rc<dyn ValueProvider<f32>> {
    provider(value, AfterPush::Succeed, log)
}

fn failing(value: f32, log: &Rc<ProviderLog>) -> Rc<dyn ValueProvider<f32>> {
    provider(value, AfterPush::Fail, log)
}

/// A provider-changed event as (layer, new provider value, old provider value).
type ExtensionRecord = (ExpressionLayer, Option<f32>, Option<f32>);

/// Records provider-changed events, naming providers by the value they push.
fn record_extension_events(object: &TestObject) -> Arc<Mutex<Vec<ExtensionRecord>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    object.container.on_extension_changed(move |_, event| {
        let pushed = |provider: Option<&dyn Any>| {
            provider
                .and_then(|p| p.downcast_ref::<PushProvider>())
                .map(|p| p.value)
        };
        sink.lock().unwrap().push((
            event.layer,
            pushed(event.new_provider),
            pushed(event.old_provider),
        ));
    });
    seen
}

/// Counts provider-changed events: (attached or replaced, removed).
fn count_extension_events(object: &TestObject) -> Arc<(AtomicUsize, AtomicUsize)> {
    let counts = Arc::new((AtomicUsize::new(0), AtomicUsize::new(0)));
    let sink = Arc::clone(&counts);
    object.container.on_extension_changed(move |_, event| {
        if event.new_provider.is_some() {
            sink.0.fetch_add(1, Ordering::Relaxed);
        } else {
            sink.1.fetch_add(1, Ordering::Relaxed);
        }
    });
    counts
}

fn events(counts: &(AtomicUsize, AtomicUsize)) -> (usize, usize) {
    (
        counts.0.load(Ordering::Relaxed),
        counts.1.load(Ordering::Relaxed),
    )
}

#[test]
fn defaults_before_any_write() {
    let object = TestObject::new();
    assert_eq!(object.get_value(&TEST_PROPERTY), 1.0);
    assert_eq!(object.get_base_value(&TEST_PROPERTY), 1.0);
    assert!(!object.get_value(&COERCE_TOGGLE));
    assert_eq!(object.get_value(&NAME), "");
    assert!(object.get_value_extension(&TEST_PROPERTY).unwrap().is_none());
    assert!(object.get_value_expression_override(&TEST_PROPERTY).unwrap().is_none());
    assert!(object.container.touched_properties().is_empty());
}

#[test]
fn set_and_get() {
    let object = TestObject::new();
    object.set_value(&TEST_PROPERTY, 5.1).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 5.1);
    assert_eq!(object.get_base_value(&TEST_PROPERTY), 5.1);
}

#[test]
fn coercion_round_trip() {
    let object = TestObject::new();

    object.set_value(&COERCE_TOGGLE, true).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 10.0);

    object.set_value(&COERCE_TOGGLE, false).unwrap();
    object.set_value(&TEST_PROPERTY, 5.1).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 5.1);

    object.set_value(&COERCE_TOGGLE, true).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 10.0);
    assert_eq!(object.get_base_value(&TEST_PROPERTY), 5.1);

    // Clearing resets the base to 1, which still coerces to 10.
    object.clear_value(&TEST_PROPERTY).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 10.0);
    assert_eq!(object.get_base_value(&TEST_PROPERTY), 1.0);
}

#[test]
fn validation_rejects_without_changing_state() {
    let object = TestObject::new();
    object.set_value(&TEST_PROPERTY, 3.0).unwrap();
    let err = object.set_value(&TEST_PROPERTY, -1.0).unwrap_err();
    assert!(matches!(
        err,
        PropertyError::InvalidValue {
            property: "Test",
            ..
        }
    ));
    assert_eq!(object.get_value(&TEST_PROPERTY), 3.0);
    assert_eq!(object.get_base_value(&TEST_PROPERTY), 3.0);
}

#[test]
fn identical_set_notifies_once() {
    let object = TestObject::new();
    let fired = Rc::new(Cell::new(0));
    let sink = Rc::clone(&fired);
    object
        .add_change_handler(&NAME, move |_, _| sink.set(sink.get() + 1))
        .unwrap();

    object.set_value(&NAME, String::from("a")).unwrap();
    object.set_value(&NAME, String::from("a")).unwrap();
    assert_eq!(fired.get(), 1);
}

#[test]
fn reentrant_change_notifies_outermost_transition_once() {
    let object = TestObject::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    object
        .add_change_handler(&REENTRANT, move |_, args| {
            sink.borrow_mut()
                .push((*args.old_value, *args.new_value, args.is_base_change));
        })
        .unwrap();
    let object_wide = Arc::new(AtomicUsize::new(0));
    let wide_sink = Arc::clone(&object_wide);
    object.container.on_property_changed(move |_, event| {
        if event.property.name() == "Reentrant" {
            wide_sink.fetch_add(1, Ordering::Relaxed);
        }
    });

    object.set_value(&REENTRANT, 150).unwrap();

    assert_eq!(object.get_value(&REENTRANT), 100);
    assert_eq!(*seen.borrow(), vec![(0, 150, true)]);
    assert_eq!(object_wide.load(Ordering::Relaxed), 1);
}

#[test]
fn coerced_to_current_value_commits_base_silently() {
    let object = TestObject::new();
    object.set_value(&COERCE_TOGGLE, true).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 10.0);

    let fired = Rc::new(Cell::new(0));
    let sink = Rc::clone(&fired);
    object
        .add_change_handler(&TEST_PROPERTY, move |_, _| sink.set(sink.get() + 1))
        .unwrap();
    let object_wide = Arc::new(AtomicUsize::new(0));
    let wide_sink = Arc::clone(&object_wide);
    object.container.on_property_changed(move |_, event| {
        if event.property.name() == "Test" {
            wide_sink.fetch_add(1, Ordering::Relaxed);
        }
    });

    object.set_value(&TEST_PROPERTY, 5.0).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 10.0);
    assert_eq!(object.get_base_value(&TEST_PROPERTY), 5.0);
    assert_eq!(fired.get(), 0);
    assert_eq!(object_wide.load(Ordering::Relaxed), 0);

    // The silently committed base shows once coercion lets go.
    object.set_value(&COERCE_TOGGLE, false).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 5.0);
    assert_eq!(fired.get(), 1);
    assert_eq!(object_wide.load(Ordering::Relaxed), 1);
}

#[test]
fn cross_property_cascade_notifies_each_property_once() {
    let object = TestObject::new();
    let amounts = Rc::new(RefCell::new(Vec::new()));
    let steps = Rc::new(RefCell::new(Vec::new()));
    let amount_sink = Rc::clone(&amounts);
    object
        .add_change_handler(&AMOUNT, move |_, args| {
            amount_sink
                .borrow_mut()
                .push((*args.old_value, *args.new_value, args.is_base_change));
        })
        .unwrap();
    let step_sink = Rc::clone(&steps);
    object
        .add_change_handler(&STEP, move |_, args| {
            step_sink
                .borrow_mut()
                .push((*args.old_value, *args.new_value, args.is_base_change));
        })
        .unwrap();
    let object_wide = Arc::new(Mutex::new(Vec::new()));
    let wide_sink = Arc::clone(&object_wide);
    object.container.on_property_changed(move |_, event| {
        wide_sink.lock().unwrap().push(event.property.name());
    });

    // Amount 125 raises Step to 12, which rounds Amount down to 120.
    object.set_value(&AMOUNT, 125).unwrap();

    assert_eq!(object.get_value(&AMOUNT), 120);
    assert_eq!(object.get_base_value(&AMOUNT), 125);
    assert_eq!(object.get_value(&STEP), 12);
    assert_eq!(*amounts.borrow(), vec![(0, 125, true)]);
    assert_eq!(*steps.borrow(), vec![(1, 12, true)]);
    assert_eq!(*object_wide.lock().unwrap(), vec!["Step", "Amount"]);
}

#[test]
fn changed_handler_may_write_other_properties() {
    let object = TestObject::new();
    object
        .add_change_handler(&NAME, |owner, args| {
            let length = i32::try_from(args.new_value.len()).unwrap_or(i32::MAX);
            owner.set_value(&ROW, length).expect("Row accepts any value");
        })
        .unwrap();
    object.set_value(&NAME, String::from("abcd")).unwrap();
    assert_eq!(object.get_value(&ROW), 4);
}

#[test]
fn provider_drives_value_until_removed() {
    let object = TestObject::new();
    let log = Rc::new(ProviderLog::default());
    let provider = pushing(20.0, &log);

    object
        .set_value_extension(&TEST_PROPERTY, Some(Rc::clone(&provider)))
        .unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 20.0);
    assert_eq!(object.get_base_value(&TEST_PROPERTY), 1.0);
    assert!(object.get_value_extension(&TEST_PROPERTY).unwrap().is_some());

    // Re-attaching the same provider is a no-op.
    object
        .set_value_extension(&TEST_PROPERTY, Some(provider))
        .unwrap();
    assert_eq!(log.initialized.get(), 1);

    object.set_value_extension(&TEST_PROPERTY, None).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 1.0);
    assert_eq!(log.released.get(), 1);
    assert!(object.container.is_empty());
}

#[test]
fn explicit_set_detaches_provider() {
    let object = TestObject::new();
    let log = Rc::new(ProviderLog::default());
    object
        .set_value_extension(&TEST_PROPERTY, Some(pushing(20.0, &log)))
        .unwrap();
    let counts = count_extension_events(&object);

    object.set_value(&TEST_PROPERTY, 7.0).unwrap();

    assert_eq!(object.get_value(&TEST_PROPERTY), 7.0);
    assert!(object.get_value_extension(&TEST_PROPERTY).unwrap().is_none());
    assert_eq!(events(&counts), (0, 1));
    assert_eq!(log.released.get(), 1);
}

#[test]
fn explicit_set_reports_one_detach_for_both_layers() {
    let object = TestObject::new();
    let primary = Rc::new(ProviderLog::default());
    let overriding = Rc::new(ProviderLog::default());
    object
        .set_value_extension(&TEST_PROPERTY, Some(pushing(20.0, &primary)))
        .unwrap();
    object
        .set_value_extension_override(&TEST_PROPERTY, Some(pushing(40.0, &overriding)))
        .unwrap();
    let seen = record_extension_events(&object);

    object.set_value(&TEST_PROPERTY, 5.0).unwrap();

    assert_eq!(object.get_value(&TEST_PROPERTY), 5.0);
    assert!(object.get_value_extension(&TEST_PROPERTY).unwrap().is_none());
    assert!(object.get_value_extension_override(&TEST_PROPERTY).unwrap().is_none());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(ExpressionLayer::Primary, None, Some(20.0))]
    );
    assert_eq!(primary.released.get(), 1);
    assert_eq!(overriding.released.get(), 1);
}

#[test]
fn explicit_set_over_lone_override_names_the_override() {
    let object = TestObject::new();
    let overriding = Rc::new(ProviderLog::default());
    object
        .set_value_extension_override(&TEST_PROPERTY, Some(pushing(40.0, &overriding)))
        .unwrap();
    let seen = record_extension_events(&object);

    object.set_value(&TEST_PROPERTY, 5.0).unwrap();

    assert_eq!(object.get_value(&TEST_PROPERTY), 5.0);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(ExpressionLayer::Override, None, Some(40.0))]
    );
    assert_eq!(overriding.released.get(), 1);
}

#[test]
fn provider_detached_while_initializing_reports_both_removals() {
    let object = TestObject::new();
    let first = Rc::new(ProviderLog::default());
    let second = Rc::new(ProviderLog::default());
    object
        .set_value_extension(&TEST_PROPERTY, Some(pushing(20.0, &first)))
        .unwrap();
    let seen = record_extension_events(&object);

    object
        .set_value_extension(
            &TEST_PROPERTY,
            Some(provider(30.0, AfterPush::SetExplicitly(7.0), &second)),
        )
        .unwrap();

    assert_eq!(object.get_value(&TEST_PROPERTY), 7.0);
    assert!(object.get_value_extension(&TEST_PROPERTY).unwrap().is_none());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (ExpressionLayer::Primary, None, Some(30.0)),
            (ExpressionLayer::Primary, None, Some(20.0)),
        ]
    );
    assert_eq!(first.released.get(), 1);
    assert_eq!(second.released.get(), 1);
}

#[test]
fn explicit_set_of_base_value_still_detaches() {
    let object = TestObject::new();
    let log = Rc::new(ProviderLog::default());
    object
        .set_value_extension(&TEST_PROPERTY, Some(pushing(20.0, &log)))
        .unwrap();

    // The base value is already 1; the provider's 20 must still go away.
    object.set_value(&TEST_PROPERTY, 1.0).unwrap();

    assert_eq!(object.get_value(&TEST_PROPERTY), 1.0);
    assert!(object.get_value_extension(&TEST_PROPERTY).unwrap().is_none());
    assert!(object.container.is_empty());
}

#[test]
fn handle_pushes_until_detached() {
    let object = TestObject::new();
    let log = Rc::new(ProviderLog::default());
    object
        .set_value_extension(&TEST_PROPERTY, Some(pushing(20.0, &log)))
        .unwrap();
    let handle = log.handle.borrow().clone().expect("handle kept by expression");
    assert_eq!(handle.layer(), ExpressionLayer::Primary);
    assert!(handle.is_bound(&object));

    handle.change_value(&object, 30.0).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 30.0);

    // Rejected pushes are returned to the provider and change nothing.
    assert!(matches!(
        handle.change_value(&object, -5.0),
        Err(PropertyError::InvalidValue { .. })
    ));
    assert_eq!(object.get_value(&TEST_PROPERTY), 30.0);

    object.set_value(&TEST_PROPERTY, 2.0).unwrap();
    assert!(!handle.is_bound(&object));
    assert_eq!(
        handle.change_value(&object, 40.0),
        Err(PropertyError::ExpressionDetached { property: "Test" })
    );
    assert_eq!(object.get_value(&TEST_PROPERTY), 2.0);
}

#[test]
fn override_layers_over_primary() {
    let object = TestObject::new();
    let primary = Rc::new(ProviderLog::default());
    let overriding = Rc::new(ProviderLog::default());

    object
        .set_value_extension(&TEST_PROPERTY, Some(pushing(20.0, &primary)))
        .unwrap();
    object
        .set_value_extension_override(&TEST_PROPERTY, Some(pushing(40.0, &overriding)))
        .unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 40.0);
    assert!(object.get_value_expression_override(&TEST_PROPERTY).unwrap().is_some());

    object
        .set_value_extension_override(&TEST_PROPERTY, None)
        .unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 20.0);
    assert_eq!(primary.initialized.get(), 1);
    assert_eq!(overriding.released.get(), 1);
    assert_eq!(primary.released.get(), 0);
}

#[test]
fn override_survives_primary_removal() {
    let object = TestObject::new();
    let primary = Rc::new(ProviderLog::default());
    let overriding = Rc::new(ProviderLog::default());
    let counts = count_extension_events(&object);

    object
        .set_value_extension(&TEST_PROPERTY, Some(pushing(20.0, &primary)))
        .unwrap();
    object
        .set_value_extension_override(&TEST_PROPERTY, Some(pushing(40.0, &overriding)))
        .unwrap();

    object.set_value_extension(&TEST_PROPERTY, None).unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 40.0);
    assert!(object.get_value_extension(&TEST_PROPERTY).unwrap().is_none());
    assert!(object.get_value_extension_override(&TEST_PROPERTY).unwrap().is_some());
    assert_eq!(primary.released.get(), 1);

    object
        .set_value_extension_override(&TEST_PROPERTY, None)
        .unwrap();
    assert_eq!(object.get_value(&TEST_PROPERTY), 1.0);
    assert_eq!(events(&counts), (2, 2));
    assert!(object.container.is_empty());
}

#[test]
fn failed_initialization_rolls_back() {
    let object = TestObject::new();
    let good = Rc::new(ProviderLog::default());
    let bad = Rc::new(ProviderLog::default());
    object
        .set_value_extension(&TEST_PROPERTY, Some(pushing(20.0, &good)))
        .unwrap();
    let counts = count_extension_events(&object);

    let err = object
        .set_value_extension(&TEST_PROPERTY, Some(failing(99.0, &bad)))
        .unwrap_err();

    assert_eq!(err, PropertyError::Provider(String::from("connection refused")));
    assert!(object.get_value_extension(&TEST_PROPERTY).unwrap().is_none());
    assert_eq!(object.get_value(&TEST_PROPERTY), 1.0);
    assert_eq!(good.released.get(), 1);
    assert_eq!(bad.released.get(), 1);
    // Only the removal of the previous provider is reported.
    assert_eq!(events(&counts), (0, 1));
}

#[test]
fn dropping_object_releases_expressions() {
    let log = Rc::new(ProviderLog::default());
    {
        let object = TestObject::new();
        object
            .set_value_extension(&TEST_PROPERTY, Some(pushing(20.0, &log)))
            .unwrap();
        object
            .set_value_extension_override(&TEST_PROPERTY, Some(pushing(30.0, &log)))
            .unwrap();
        assert_eq!(log.released.get(), 0);
    }
    assert_eq!(log.initialized.get(), 2);
    assert_eq!(log.released.get(), 2);
}

#[test]
fn read_only_requires_key() {
    let object = TestObject::new();
    let counter = COUNTER.property();
    assert!(counter.is_read_only());

    assert_eq!(
        object.set_value(counter, 5),
        Err(PropertyError::ReadOnly { property: "Counter" })
    );
    assert_eq!(
        object.set_value_erased(&counter.to_ref(), &ErasedValue::new(5_u32)),
        Err(PropertyError::ReadOnly { property: "Counter" })
    );
    assert_eq!(object.get_value(counter), 0);

    object.set_value_with_key(&COUNTER, 5).unwrap();
    assert_eq!(object.get_value(counter), 5);
    assert!(object.clear_value(counter).is_err());
    object.clear_value_with_key(&COUNTER).unwrap();
    assert_eq!(object.get_value(counter), 0);
}

#[test]
fn attached_property_on_foreign_class() {
    let other = Other {
        container: PropertyContainer::new::<Other>(),
    };
    assert!(ROW.is_attached());
    assert_eq!(ROW.owner_class(), ClassId::of::<TestObject>());

    other.set_value(&ROW, 4).unwrap();
    assert_eq!(other.get_value(&ROW), 4);
    assert_eq!(other.container.attached_properties(), vec![ROW.to_ref()]);

    // Non-attached properties stay bound to their class.
    assert!(matches!(
        other.set_value(&NAME, String::from("x")),
        Err(PropertyError::InvalidOwner { property: "Name", .. })
    ));
}

#[test]
fn attached_names_must_be_dotted_identifiers() {
    for name in ["", "   ", "Not A Name", "Grid..Row", "1Grid.Row"] {
        assert_eq!(
            DependencyProperty::register_attached::<Other>(name, PropertyMetadata::new(0_u8))
                .unwrap_err(),
            PropertyError::InvalidName { name }
        );
    }
    assert!(
        DependencyProperty::register_attached::<Other>("Other.Column", PropertyMetadata::new(0_u8))
            .is_ok()
    );
}

#[test]
fn clear_evicts_slot() {
    let object = TestObject::new();
    object.set_value(&NAME, String::from("button")).unwrap();
    assert_eq!(object.container.touched_properties(), vec![NAME.to_ref()]);

    object.clear_value(&NAME).unwrap();
    assert!(object.container.touched_properties().is_empty());
    assert_eq!(object.get_value(&NAME), "");
}

#[test]
fn factory_default_runs_once_per_object() {
    let a = TestObject::new();
    let b = TestObject::new();
    let before = ITEMS_CREATED.load(Ordering::Relaxed);

    assert!(a.get_value(&ITEMS).is_empty());
    assert!(a.get_value(&ITEMS).is_empty());
    a.clear_value(&ITEMS).unwrap();
    assert!(a.get_value(&ITEMS).is_empty());
    assert_eq!(ITEMS_CREATED.load(Ordering::Relaxed) - before, 1);

    b.set_value(&ITEMS, vec![1]).unwrap();
    assert_eq!(ITEMS_CREATED.load(Ordering::Relaxed) - before, 2);
}

#[test]
fn registry_lists_declared_properties() {
    LazyLock::force(&TEST_PROPERTY);
    LazyLock::force(&NAME);
    let class = TypeRegistry::global()
        .get(ClassId::of::<TestObject>())
        .expect("class registered by its properties");
    let test = class.find_property("Test").expect("Test is declared");
    assert!(test.is::<f32>());
    assert_eq!(test, *TEST_PROPERTY);
    assert!(class.declared_properties().contains(&NAME.to_ref()));
    assert_eq!(
        DependencyProperty::register::<TestObject>("Name", PropertyMetadata::new(String::new()))
            .unwrap_err(),
        PropertyError::DuplicateName {
            name: "Name",
            class: ClassId::of::<TestObject>().name(),
        }
    );
}

#[test]
fn object_wide_channel_accepts_subscribers_from_threads() {
    let object = TestObject::new();
    let channel = Arc::clone(object.container.property_changed());
    let hits = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let channel = Arc::clone(&channel);
            let hits = Arc::clone(&hits);
            thread::spawn(move || {
                for _ in 0..25 {
                    let hits = Arc::clone(&hits);
                    channel.subscribe(Arc::new(
                        move |_: &dyn DependencyObject, _: &PropertyChangedEvent<'_>| {
                            hits.fetch_add(1, Ordering::Relaxed);
                        },
                    ));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("subscriber thread panicked");
    }
    assert_eq!(channel.len(), 100);

    object.set_value(&NAME, String::from("go")).unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 100);
}
