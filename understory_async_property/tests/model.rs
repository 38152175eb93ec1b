// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end tests for the `understory_async_property` crate.
//!
//! Each test builds a small model object the way an application would: a
//! struct that owns a helper and exposes its properties as methods.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::LocalPool;
use understory_async_property::{
    AsyncPropertyHelper, AsyncValidationHelper, CalculatedAsyncPropertyHelper, CancellationToken,
    ComputeError, ObservableVec, PropertyError, RecordingListener, TaskListener, TaskOutcome,
};
use understory_calculated::DependencyTracker;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> (Log, impl Fn(&str) + 'static) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    (log, move |name: &str| sink.borrow_mut().push(name.to_owned()))
}

/// A profile whose display name is loaded from a slow backend.
struct Profile {
    props: AsyncPropertyHelper,
    formula_runs: Rc<Cell<u32>>,
    pending: Rc<RefCell<Option<oneshot::Receiver<String>>>>,
}

impl Profile {
    fn sum(&self) -> i32 {
        let runs = self.formula_runs.clone();
        self.props.get("Sum", move || {
            runs.set(runs.get() + 1);
            1 + 1
        })
    }

    fn display_name(&self, listener: Option<Rc<RecordingListener>>) -> String {
        let pending = self.pending.clone();
        self.props.get_async_with(
            "DisplayName",
            move |_| {
                let rx = pending.borrow_mut().take();
                async move {
                    match rx {
                        Some(rx) => rx.await.map_err(|_| ComputeError::Cancelled),
                        None => Ok(String::from("reloaded")),
                    }
                }
            },
            CancellationToken::new(),
            listener.map(|l| l as Rc<dyn TaskListener>),
        )
    }
}

#[test]
fn sync_formula_runs_once() {
    init_tracing();
    let pool = LocalPool::new();
    let (changed, on_changed) = log();
    let profile = Profile {
        props: AsyncPropertyHelper::new(Rc::new(pool.spawner()), on_changed),
        formula_runs: Rc::new(Cell::new(0)),
        pending: Rc::new(RefCell::new(None)),
    };

    assert_eq!(profile.sum(), 2);
    assert_eq!(profile.sum(), 2);
    assert_eq!(profile.formula_runs.get(), 1);
    assert!(changed.borrow().is_empty());
}

#[test]
fn async_value_arrives_later() {
    init_tracing();
    let mut pool = LocalPool::new();
    let (changed, on_changed) = log();
    let (tx, rx) = oneshot::channel();
    let profile = Profile {
        props: AsyncPropertyHelper::new(Rc::new(pool.spawner()), on_changed),
        formula_runs: Rc::new(Cell::new(0)),
        pending: Rc::new(RefCell::new(Some(rx))),
    };
    let listener = RecordingListener::new();

    assert_eq!(profile.display_name(Some(listener.clone())), "");
    // A second read while computing joins the same run.
    assert_eq!(profile.display_name(Some(listener.clone())), "");
    pool.run_until_stalled();
    assert!(changed.borrow().is_empty());
    assert_eq!(listener.started(), 1);

    tx.send(String::from("done")).unwrap();
    pool.run_until_stalled();

    assert_eq!(*changed.borrow(), ["DisplayName"]);
    assert_eq!(profile.display_name(None), "done");
    assert_eq!(listener.outcomes(), [TaskOutcome::Succeeded]);
}

#[test]
fn abandoned_run_is_silent_and_retried_on_next_read() {
    init_tracing();
    let mut pool = LocalPool::new();
    let (changed, on_changed) = log();
    let (tx, rx) = oneshot::channel::<String>();
    let profile = Profile {
        props: AsyncPropertyHelper::new(Rc::new(pool.spawner()), on_changed),
        formula_runs: Rc::new(Cell::new(0)),
        pending: Rc::new(RefCell::new(Some(rx))),
    };
    let listener = RecordingListener::new();

    profile.display_name(Some(listener.clone()));
    drop(tx);
    pool.run_until_stalled();
    assert_eq!(listener.outcomes(), [TaskOutcome::Cancelled]);
    assert!(changed.borrow().is_empty());

    // Nothing was stored, so reading again starts a fresh run.
    assert_eq!(profile.display_name(None), "");
    pool.run_until_stalled();
    assert_eq!(*changed.borrow(), ["DisplayName"]);
    assert_eq!(profile.display_name(None), "reloaded");
}

#[test]
fn cancelled_token_reports_cancellation() {
    init_tracing();
    let mut pool = LocalPool::new();
    let (changed, on_changed) = log();
    let props = AsyncPropertyHelper::new(Rc::new(pool.spawner()), on_changed);
    let listener = RecordingListener::new();
    let token = CancellationToken::new();
    let (tx, rx) = oneshot::channel::<()>();
    let rx = RefCell::new(Some(rx));

    props.get_async_with(
        "Report",
        move |token| {
            let rx = rx.borrow_mut().take();
            async move {
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
                token.check()?;
                Ok::<_, ComputeError>(42_u32)
            }
        },
        token.clone(),
        Some(listener.clone()),
    );
    token.cancel();
    tx.send(()).unwrap();
    pool.run_until_stalled();

    assert_eq!(listener.outcomes(), [TaskOutcome::Cancelled]);
    assert_eq!(listener.outcomes()[0].as_success(), None);
    assert!(changed.borrow().is_empty());
    assert!(!props.store().get("Report").unwrap().is_valid());
}

/// A to-do list whose summary is calculated from a stored collection and an
/// asynchronously loaded owner.
struct TodoList {
    props: Rc<CalculatedAsyncPropertyHelper>,
}

impl TodoList {
    fn new(pool: &LocalPool, on_changed: impl Fn(&str) + 'static) -> Self {
        let props = CalculatedAsyncPropertyHelper::new(
            DependencyTracker::new(),
            Rc::new(pool.spawner()),
            on_changed,
        );
        Self {
            props: Rc::new(props),
        }
    }

    fn items(&self) -> ObservableVec<String> {
        self.props.get_or_init("Items", ObservableVec::new())
    }

    fn set_items(&self, items: ObservableVec<String>) -> bool {
        self.props.set("Items", items)
    }

    fn owner(&self) -> String {
        self.props
            .get_async("Owner", |_| async { Ok::<_, ComputeError>(String::from("Ada")) })
    }

    fn summary(&self) -> String {
        let this = Self {
            props: self.props.clone(),
        };
        self.props.calculated("Summary", move || {
            format!("{} has {} items", this.owner(), this.items().len())
        })
    }
}

#[test]
fn calculated_summary_follows_collection_and_async_owner() {
    init_tracing();
    let mut pool = LocalPool::new();
    let (changed, on_changed) = log();
    let todo = TodoList::new(&pool, on_changed);
    let items = ObservableVec::from(vec![String::from("milk")]);
    todo.set_items(items.clone());

    assert_eq!(todo.summary(), " has 1 items");
    pool.run_until_stalled();
    assert_eq!(todo.summary(), "Ada has 1 items");

    changed.borrow_mut().clear();
    items.push(String::from("eggs"));
    assert_eq!(*changed.borrow(), ["Summary", "Items"]);
    assert_eq!(todo.summary(), "Ada has 2 items");

    // Replacing the collection moves the watch to the new one.
    let replacement = ObservableVec::from(vec![String::from("tea")]);
    assert!(todo.set_items(replacement.clone()));
    assert_eq!(todo.summary(), "Ada has 1 items");
    changed.borrow_mut().clear();
    items.push(String::from("bread"));
    assert!(changed.borrow().is_empty());
    replacement.clear();
    assert_eq!(*changed.borrow(), ["Summary", "Items"]);
    assert_eq!(todo.summary(), "Ada has 0 items");
}

#[test]
fn trigger_facade_rejects_entity_invalidation() {
    let pool = LocalPool::new();
    let todo = TodoList::new(&pool, |_: &str| {});
    assert_eq!(
        todo.props.invalidate(""),
        Err(PropertyError::EntityInvalidationUnsupported)
    );
    todo.items();
    assert_eq!(todo.props.invalidate("Items"), Ok(true));
}

#[test]
fn validation_notification_depends_on_flag() {
    init_tracing();
    for (notify_on_invalidate, expected) in [(false, 0), (true, 1)] {
        let pool = LocalPool::new();
        let (changed, on_changed) = log();
        let errors = AsyncValidationHelper::<String>::builder(Rc::new(pool.spawner()), on_changed)
            .notify_on_invalidate(notify_on_invalidate)
            .build();

        assert_eq!(errors.get("Title", |_| Some(Vec::new())), Some(Vec::new()));
        assert!(errors.invalidate("Title"));
        assert_eq!(changed.borrow().len(), expected);
    }
}
