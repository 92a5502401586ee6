use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use holdfast::prelude::*;

struct FnModule<F>(F);

impl<F> Module for FnModule<F>
where
    F: Fn(&mut dyn Configurer) -> Result<(), DynError>,
{
    fn configure(&self, configurer: &mut dyn Configurer) -> Result<(), DynError> {
        (self.0)(configurer)
    }
}

fn container(setup: impl Fn(&mut dyn Configurer) -> Result<(), DynError>) -> Container {
    Container::init(FnModule(setup)).unwrap()
}

#[test]
fn concurrent_gets_construct_a_singleton_exactly_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let container = {
        let builds = Arc::clone(&builds);
        container(move |configurer| {
            let builds = Arc::clone(&builds);
            bind(token::named::<Arc<String>>("config"))
                .to_factory(move |_| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    Ok(Arc::new(String::from("loaded")))
                })
                .set_on(configurer);
            Ok(())
        })
    };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            thread::spawn(move || container.get(&token::named::<Arc<String>>("config")).unwrap())
        })
        .collect();
    let instances: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    for pair in instances.windows(2) {
        assert!(Arc::ptr_eq(&pair[0], &pair[1]));
    }
}

#[test]
fn request_contexts_isolate_request_scoped_instances() {
    let container = container(|configurer| {
        bind(token::named::<Arc<String>>("session"))
            .to_factory(|_| Ok(Arc::new(String::from("fresh"))))
            .in_scope(Scope::Request)
            .set_on(configurer);
        Ok(())
    });
    let session = token::named::<Arc<String>>("session");

    let r1 = container.begin_request("r1").unwrap();
    let r2 = container.begin_request("r2").unwrap();
    let first = r1.get(&session).unwrap();
    let second = r2.get(&session).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    container.end_request("r1").unwrap();
    let second_again = r2.get(&session).unwrap();
    assert!(Arc::ptr_eq(&second, &second_again));
}

#[test]
fn singletons_stay_shared_across_request_contexts() {
    let container = container(|configurer| {
        bind(token::named::<Arc<String>>("shared"))
            .to_factory(|_| Ok(Arc::new(String::from("one"))))
            .set_on(configurer);
        Ok(())
    });
    let shared = token::named::<Arc<String>>("shared");

    let r1 = container.begin_request("r1").unwrap();
    let r2 = container.begin_request("r2").unwrap();
    let a = r1.get(&shared).unwrap();
    let b = r2.get(&shared).unwrap();
    let c = container.get(&shared).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
}

#[test]
fn invalidating_a_dependency_cascades_to_its_dependents() {
    let container = container(|configurer| {
        bind(token::named::<Arc<String>>("b"))
            .to_factory(|_| Ok(Arc::new(String::from("b"))))
            .set_on(configurer);
        bind(token::named::<Arc<String>>("a"))
            .to_factory(|injector| {
                let b = injector.get(&token::named::<Arc<String>>("b"))?;
                Ok(Arc::new(format!("a-of-{b}")))
            })
            .set_on(configurer);
        Ok(())
    });
    let a_token = token::named::<Arc<String>>("a");

    let first = container.get(&a_token).unwrap();
    container.invalidate("b");

    assert!(container.try_get_sync(&a_token).is_none());
    let second = container.get(&a_token).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn concurrent_invalidations_destroy_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let container = {
        let runs = Arc::clone(&runs);
        container(move |configurer| {
            let runs = Arc::clone(&runs);
            bind(token::named::<Arc<String>>("victim"))
                .to_factory(|_| Ok(Arc::new(String::new())))
                .on_destroy(move |_| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .set_on(configurer);
            Ok(())
        })
    };
    container.get(&token::named::<Arc<String>>("victim")).unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| container.invalidate("victim"));
        }
    });

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(container
        .try_get_sync(&token::named::<Arc<String>>("victim"))
        .is_none());
}

#[test]
fn dispose_destroys_dependents_before_their_dependencies() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let container = {
        let order = Arc::clone(&order);
        container(move |configurer| {
            for (name, dep) in [("c", None), ("b", Some("c")), ("a", Some("b"))] {
                let order = Arc::clone(&order);
                bind(token::named::<Arc<String>>(name))
                    .to_factory(move |injector| {
                        if let Some(dep) = dep {
                            injector.get(&token::named::<Arc<String>>(dep))?;
                        }
                        Ok(Arc::new(String::from(name)))
                    })
                    .on_destroy(move |_| {
                        order.lock().push(name);
                        Ok(())
                    })
                    .set_on(configurer);
            }
            Ok(())
        })
    };

    container.get(&token::named::<Arc<String>>("a")).unwrap();
    container.dispose();

    assert_eq!(*order.lock(), ["a", "b", "c"]);
    assert_eq!(container.holder_count(), 0);
}

#[test]
fn expired_instances_are_reported_lazily() {
    let container = container(|configurer| {
        bind(token::named::<Arc<String>>("ephemeral"))
            .to_factory(|_| Ok(Arc::new(String::new())))
            .with_ttl(Duration::from_millis(30))
            .set_on(configurer);
        Ok(())
    });
    let ephemeral = token::named::<Arc<String>>("ephemeral");

    container.get(&ephemeral).unwrap();
    thread::sleep(Duration::from_millis(80));

    assert!(matches!(
        container.get(&ephemeral),
        Err(ResolveError::Expired { .. })
    ));
    assert!(container.try_get_sync(&ephemeral).is_none());

    container.invalidate("ephemeral");
    assert!(container.get(&ephemeral).is_ok());
}

#[test]
fn request_scope_restarts_cleanly_after_end() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let container = {
        let destroyed = Arc::clone(&destroyed);
        container(move |configurer| {
            let destroyed = Arc::clone(&destroyed);
            bind(token::named::<Arc<String>>("per-req"))
                .to_factory(|_| Ok(Arc::new(String::new())))
                .in_scope(Scope::Request)
                .on_destroy(move |_| {
                    destroyed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .set_on(configurer);
            Ok(())
        })
    };
    let per_req = token::named::<Arc<String>>("per-req");

    let r1 = container.begin_request("r1").unwrap();
    let first = r1.get(&per_req).unwrap();
    let again = r1.get(&per_req).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    container.end_request("r1").unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(matches!(
        r1.get(&per_req),
        Err(ResolveError::ContextEnded { .. })
    ));

    let restarted = container.begin_request("r1").unwrap();
    let fresh = restarted.get(&per_req).unwrap();
    assert!(!Arc::ptr_eq(&first, &fresh));
}

#[test]
fn parameterized_factories_cache_per_argument_set() {
    let builds = Arc::new(AtomicUsize::new(0));
    let container = {
        let builds = Arc::clone(&builds);
        container(move |configurer| {
            let builds = Arc::clone(&builds);
            bind(token::named::<Arc<String>>("tenant"))
                .to_factory_with_args(move |_, args| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    let foo = args.get("foo").and_then(|v| v.as_str()).unwrap_or("?");
                    Ok(Arc::new(foo.to_string()))
                })
                .set_on(configurer);
            Ok(())
        })
    };
    let tenant = token::named::<Arc<String>>("tenant");

    let a1 = container.get_with(&tenant, &json!({"foo": "a"})).unwrap();
    let b = container.get_with(&tenant, &json!({"foo": "b"})).unwrap();
    let a2 = container.get_with(&tenant, &json!({"foo": "a"})).unwrap();

    assert!(!Arc::ptr_eq(&a1, &b));
    assert!(Arc::ptr_eq(&a1, &a2));
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[test]
fn request_scope_fails_fast_without_an_active_context() {
    let container = container(|configurer| {
        bind(token::named::<Arc<String>>("per-req"))
            .to_factory(|_| Ok(Arc::new(String::new())))
            .in_scope(Scope::Request)
            .set_on(configurer);
        Ok(())
    });

    assert!(matches!(
        container.get(&token::named::<Arc<String>>("per-req")),
        Err(ResolveError::CrossScope { .. })
    ));
}

#[test]
fn duplicate_request_ids_conflict_while_active() {
    let container = container(|_| Ok(()));

    let _held = container.begin_request("dup").unwrap();
    assert!(matches!(
        container.begin_request("dup"),
        Err(RequestError::Conflict { .. })
    ));
    assert!(matches!(
        container.end_request("missing"),
        Err(RequestError::NotActive { .. })
    ));

    container.end_request("dup").unwrap();
    assert!(container.begin_request("dup").is_ok());
}

#[test]
fn request_metadata_and_priority_are_readable() {
    let container = container(|_| Ok(()));
    let metadata = HashMap::from([(String::from("user"), json!("u-1"))]);

    let scoped = container.begin_request_with("meta", metadata, 7).unwrap();
    assert_eq!(scoped.id(), "meta");
    assert_eq!(scoped.priority(), 7);
    assert_eq!(scoped.metadata("user"), Some(json!("u-1")));

    scoped.set_metadata("trace", json!(123));
    assert_eq!(scoped.metadata("trace"), Some(json!(123)));
    scoped.dispose();
}

#[test]
fn destroy_events_reach_subscribers() {
    let container = container(|configurer| {
        bind(token::named::<Arc<String>>("watched"))
            .to_factory(|_| Ok(Arc::new(String::new())))
            .set_on(configurer);
        Ok(())
    });

    let events = container.subscribe("watched");
    container.get(&token::named::<Arc<String>>("watched")).unwrap();
    container.invalidate("watched");

    let event = events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(event.name, "watched");
}

#[test]
fn try_get_sync_never_constructs() {
    let builds = Arc::new(AtomicUsize::new(0));
    let container = {
        let builds = Arc::clone(&builds);
        container(move |configurer| {
            let builds = Arc::clone(&builds);
            bind(token::named::<Arc<String>>("lazy"))
                .to_factory(move |_| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(String::new()))
                })
                .set_on(configurer);
            Ok(())
        })
    };
    let lazy = token::named::<Arc<String>>("lazy");

    assert!(container.try_get_sync(&lazy).is_none());
    assert_eq!(builds.load(Ordering::SeqCst), 0);

    let constructed = container.get(&lazy).unwrap();
    let synced = container.try_get_sync(&lazy).unwrap();
    assert!(Arc::ptr_eq(&constructed, &synced));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[test]
fn seeded_instances_resolve_without_a_binding() {
    let container = container(|_| Ok(()));
    let seeded = token::named::<Arc<String>>("seeded");

    assert!(!container.is_registered(&seeded));
    assert!(matches!(
        container.get(&seeded),
        Err(ResolveError::NotFound { .. })
    ));

    container
        .add_instance(&seeded, Arc::new(String::from("hand-made")))
        .unwrap();
    let got = container.get(&seeded).unwrap();
    assert_eq!(*got, "hand-made");
}

#[test]
fn transient_resolutions_always_construct_anew() {
    let builds = Arc::new(AtomicUsize::new(0));
    let container = {
        let builds = Arc::clone(&builds);
        container(move |configurer| {
            let builds = Arc::clone(&builds);
            bind(token::named::<Arc<String>>("fleeting"))
                .to_factory(move |_| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(String::new()))
                })
                .in_scope(Scope::Transient)
                .set_on(configurer);
            Ok(())
        })
    };
    let fleeting = token::named::<Arc<String>>("fleeting");

    let first = container.get(&fleeting).unwrap();
    let second = container.get(&fleeting).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[test]
fn construct_bindings_run_their_teardown_hook() {
    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    struct Clock {
        start: u64,
    }

    impl Construct for Clock {
        fn construct(_injector: &dyn Injector) -> Result<Self, DynError> {
            Ok(Self { start: 1 })
        }

        fn on_destroy(&self) -> Result<(), DynError> {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let container = container(|configurer| {
        bind(token::of::<Arc<Clock>>()).to_construct().set_on(configurer);
        Ok(())
    });

    let clock = container.get(&token::of::<Arc<Clock>>()).unwrap();
    assert_eq!(clock.start, 1);

    container.dispose();
    assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
}
