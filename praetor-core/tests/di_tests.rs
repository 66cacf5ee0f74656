use praetor_core::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Clock;

impl Construct for Clock {
    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(Clock)
    }
}

impl Injectable for Clock {
    fn singleton() -> bool {
        true
    }
}

struct Counter;

impl Construct for Counter {
    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(Counter)
    }
}

impl Injectable for Counter {}

struct Audit {
    clock: Arc<Clock>,
    request_id: uuid::Uuid,
}

impl Construct for Audit {
    fn signature() -> Signature {
        Signature::new().injectable::<Clock>("clock").context("ctx")
    }

    fn construct(args: &mut Arguments<'_>) -> Result<Self> {
        Ok(Audit {
            clock: args.injected("clock")?,
            request_id: args.context_param("ctx")?.request_id(),
        })
    }
}

impl Injectable for Audit {}

#[test]
fn test_context_parameter_is_the_request_itself() {
    let mut ctx = RequestContext::new().with_parameter("id", 7);
    let expected: *const RequestContext = &ctx;
    let injector = Injector::new(SharedInstanceCache::new());
    let signature = Signature::new().context("request").scalar("id", ScalarKind::Int);

    let args = injector.resolve(&signature, &mut ctx).unwrap();

    assert!(std::ptr::eq(args.context_param("request").unwrap(), expected));
    assert!(std::ptr::eq(args.context(), expected));
}

#[test]
fn test_nested_injectable_sees_the_same_context() {
    let ctx = RequestContext::new();
    let injector = Injector::new(SharedInstanceCache::new());

    let audit: Arc<Audit> = injector.instance(&ctx).unwrap();

    assert_eq!(audit.request_id, ctx.request_id());
}

#[test]
fn test_singleton_is_shared() {
    let ctx = RequestContext::new();
    let injector = Injector::new(SharedInstanceCache::new());

    let a: Arc<Clock> = injector.instance(&ctx).unwrap();
    let b: Arc<Clock> = injector.instance(&ctx).unwrap();
    let audit: Arc<Audit> = injector.instance(&ctx).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &audit.clock));
    assert!(injector.cache().contains::<Clock>());
}

#[test]
fn test_non_singletons_are_distinct() {
    let ctx = RequestContext::new();
    let injector = Injector::new(SharedInstanceCache::new());

    let a: Arc<Audit> = injector.instance(&ctx).unwrap();
    let b: Arc<Audit> = injector.instance(&ctx).unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!injector.cache().contains::<Audit>());
}

#[test]
fn test_seeded_instance_wins_over_construction() {
    let cache = SharedInstanceCache::new();
    let seeded = Arc::new(Counter);
    assert!(cache.insert(seeded.clone()));

    let injector = Injector::new(cache);
    let resolved: Arc<Counter> = injector.instance(&RequestContext::new()).unwrap();

    assert!(Arc::ptr_eq(&seeded, &resolved));
}

#[test]
fn test_cache_is_shared_between_injectors() {
    let cache = SharedInstanceCache::new();
    let first = Injector::new(cache.clone());
    let second = Injector::new(cache);
    let ctx = RequestContext::new();

    let a: Arc<Clock> = first.instance(&ctx).unwrap();
    let b: Arc<Clock> = second.instance(&ctx).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
}

#[derive(Debug)]
struct Narcissus;

impl Construct for Narcissus {
    fn signature() -> Signature {
        Signature::new().injectable::<Narcissus>("me")
    }

    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(Narcissus)
    }
}

impl Injectable for Narcissus {
    fn singleton() -> bool {
        true
    }
}

#[test]
fn test_self_dependency_is_circular() {
    let injector = Injector::new(SharedInstanceCache::new());

    let err = injector
        .instance::<Narcissus>(&RequestContext::new())
        .unwrap_err();

    assert!(matches!(err, Error::CircularDependency(_)));
    assert_eq!(err.status_code().as_u16(), 500);
    assert!(!injector.cache().contains::<Narcissus>());
}

struct Chicken;
struct Egg;

impl Construct for Chicken {
    fn signature() -> Signature {
        Signature::new().injectable::<Egg>("egg")
    }

    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(Chicken)
    }
}

impl Injectable for Chicken {}

impl Construct for Egg {
    fn signature() -> Signature {
        Signature::new().injectable::<Chicken>("chicken")
    }

    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(Egg)
    }
}

impl Injectable for Egg {}

#[test]
fn test_indirect_cycle_is_detected() {
    let injector = Injector::new(SharedInstanceCache::new());

    match injector.instance::<Chicken>(&RequestContext::new()) {
        Err(Error::CircularDependency(chain)) => {
            assert!(chain.ends_with("Chicken"), "unexpected chain: {}", chain);
            assert!(chain.contains("Egg"));
        }
        other => panic!("expected a circular dependency, got {:?}", other.map(|_| ())),
    }
}

static FACTORY_CALLS: AtomicUsize = AtomicUsize::new(0);

struct Connection {
    dsn: String,
}

impl Construct for Connection {
    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Err(Error::Internal("Connection must come from its factory".into()))
    }
}

impl Injectable for Connection {
    fn singleton() -> bool {
        true
    }

    fn factory() -> Option<Factory<Self>> {
        Some(
            Factory::new(|args| {
                FACTORY_CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(Connection {
                    dsn: args.get("dsn")?,
                })
            })
            .with_signature(Signature::new().scalar("dsn", ScalarKind::String)),
        )
    }
}

#[test]
fn test_factory_builds_singleton_once() {
    let ctx = RequestContext::new().with_parameter("dsn", "sqlite://memory");
    let injector = Injector::new(SharedInstanceCache::new());

    let a: Arc<Connection> = injector.instance(&ctx).unwrap();
    let b: Arc<Connection> = injector.instance(&ctx).unwrap();

    assert_eq!(a.dsn, "sqlite://memory");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(FACTORY_CALLS.load(Ordering::SeqCst), 1);
}

#[derive(Debug)]
struct Flaky;

impl Construct for Flaky {
    fn signature() -> Signature {
        Signature::new().scalar("ready", ScalarKind::Bool)
    }

    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(Flaky)
    }
}

impl Injectable for Flaky {
    fn singleton() -> bool {
        true
    }
}

#[test]
fn test_failed_singleton_build_can_retry() {
    let injector = Injector::new(SharedInstanceCache::new());

    let err = injector
        .instance::<Flaky>(&RequestContext::new())
        .unwrap_err();
    assert!(matches!(err, Error::DependenciesNotMet(_)));
    assert!(!injector.cache().contains::<Flaky>());

    let ctx = RequestContext::new().with_parameter("ready", true);
    assert!(injector.instance::<Flaky>(&ctx).is_ok());
    assert!(injector.cache().contains::<Flaky>());
}
