use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use holdfast::prelude::*;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let container = Container::init(AppModule::new("postgres://localhost/app")).unwrap();

    // Singletons are shared: both handles hit the same connection pool.
    let pool = container.get(&token::of::<Arc<Pool>>()).unwrap();
    let again = container.get(&token::of::<Arc<Pool>>()).unwrap();
    assert!(Arc::ptr_eq(&pool, &again));

    // Each request context owns its session; two requests never share one.
    let r1 = container
        .begin_request_with(
            "req-1",
            HashMap::from([(String::from("user"), json!("alice"))]),
            0,
        )
        .unwrap();
    let r2 = container.begin_request("req-2").unwrap();

    let s1 = r1.get(&token::of::<Arc<Session>>()).unwrap();
    let s2 = r2.get(&token::of::<Arc<Session>>()).unwrap();
    println!("sessions: {} / {}", s1.label, s2.label);
    assert!(!Arc::ptr_eq(&s1, &s2));

    container.end_request("req-1").unwrap();
    container.end_request("req-2").unwrap();

    // Invalidation tears the pool down together with everything built on
    // top of it; the next resolution reconstructs.
    container.invalidate_token(&token::of::<Arc<Pool>>());
    let rebuilt = container.get(&token::of::<Arc<Pool>>()).unwrap();
    assert!(!Arc::ptr_eq(&pool, &rebuilt));

    container.dispose();
}

struct AppModule {
    database_url: &'static str,
}

impl AppModule {
    fn new(database_url: &'static str) -> Self {
        Self { database_url }
    }
}

impl Module for AppModule {
    fn configure(&self, configurer: &mut dyn Configurer) -> Result<(), DynError> {
        bind(token::named::<Arc<String>>("database_url"))
            .to_instance(Arc::new(self.database_url.to_string()))
            .set_on(configurer);
        bind(token::of::<Arc<Pool>>()).to_construct().set_on(configurer);
        bind(token::of::<Arc<Session>>())
            .to_construct()
            .in_scope(Scope::Request)
            .set_on(configurer);
        Ok(())
    }
}

struct Pool {
    url: Arc<String>,
}

impl Construct for Pool {
    fn construct(injector: &dyn Injector) -> Result<Self, DynError> {
        let url = injector.get(&token::named::<Arc<String>>("database_url"))?;
        println!("opening pool against {url}");
        Ok(Self { url })
    }

    fn on_destroy(&self) -> Result<(), DynError> {
        println!("closing pool against {}", self.url);
        Ok(())
    }
}

struct Session {
    label: String,
}

impl Construct for Session {
    fn construct(injector: &dyn Injector) -> Result<Self, DynError> {
        let pool = injector.get(&token::of::<Arc<Pool>>())?;
        Ok(Self {
            label: format!("session@{}", pool.url),
        })
    }
}
